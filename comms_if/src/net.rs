//! # Network Module
//!
//! Networking abstractions over ZMQ for bench and simulation use. Each of
//! the watchdog's physical links (the lander RS422 line and the compute
//! module serial line) is carried over a PAIR socket: the watchdog binds,
//! the peer connects, and receives are always non-blocking so the main loop
//! never stalls on a link.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network endpoint parameters, loaded from `net.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetParams {
    /// Endpoint of the lander (ground) link.
    pub lander_endpoint: String,

    /// Endpoint of the compute module link.
    pub cm_endpoint: String,
}

/// A PAIR socket carrying one of the watchdog's point-to-point links.
pub struct PairSocket {
    socket: zmq::Socket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors associated with the network module.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Could not create the socket: {0}")]
    CreateError(zmq::Error),

    #[error("Could not bind the socket to {0}: {1}")]
    BindError(String, zmq::Error),

    #[error("Could not connect the socket to {0}: {1}")]
    ConnectError(String, zmq::Error),

    #[error("Could not send on the socket: {0}")]
    SendError(zmq::Error),

    #[error("Could not receive from the socket: {0}")]
    RecvError(zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PairSocket {
    /// Create a PAIR socket bound to the given endpoint (the watchdog side of
    /// a link).
    pub fn bind(ctx: &zmq::Context, endpoint: &str) -> Result<Self, NetError> {
        let socket = ctx.socket(zmq::PAIR).map_err(NetError::CreateError)?;

        socket
            .bind(endpoint)
            .map_err(|e| NetError::BindError(endpoint.into(), e))?;

        debug!("PAIR socket bound to {}", endpoint);

        Ok(Self { socket })
    }

    /// Create a PAIR socket connected to the given endpoint (the peer side of
    /// a link, used by test tooling).
    pub fn connect(ctx: &zmq::Context, endpoint: &str) -> Result<Self, NetError> {
        let socket = ctx.socket(zmq::PAIR).map_err(NetError::CreateError)?;

        socket
            .connect(endpoint)
            .map_err(|e| NetError::ConnectError(endpoint.into(), e))?;

        debug!("PAIR socket connected to {}", endpoint);

        Ok(Self { socket })
    }

    /// Receive a single frame if one is waiting, without blocking.
    pub fn try_recv(&self) -> Result<Option<Vec<u8>>, NetError> {
        match self.socket.recv_bytes(zmq::DONTWAIT) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => {
                warn!("PAIR socket receive error: {}", e);
                Err(NetError::RecvError(e))
            }
        }
    }

    /// Send a single frame. Queues in zmq, does not wait for delivery.
    pub fn send(&self, bytes: &[u8]) -> Result<(), NetError> {
        self.socket
            .send(bytes, zmq::DONTWAIT)
            .map_err(NetError::SendError)
    }
}
