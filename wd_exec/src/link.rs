//! # Message link collaborators
//!
//! The lander and compute module links both expose the same narrow
//! interface: a non-blocking "try get one frame" pump and a transmit call.
//! The state machine never blocks on a link.
//!
//! Two implementations exist: the zmq [`PairSocket`] used on the bench, and
//! an in-memory link used by the unit tests.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use comms_if::net::{NetError, PairSocket};
use thiserror::Error;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A point-to-point message link.
pub trait Link {
    /// Receive a single frame if one is waiting. Never blocks.
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, LinkError>;

    /// Transmit a single frame. Never blocks.
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError>;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with a message link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Network error on the link: {0}")]
    Net(#[from] NetError),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// In-memory link used by tests: frames pushed through the handle appear on
/// the receive side, transmitted frames are collected for inspection.
pub struct MemLink {
    inner: Rc<RefCell<MemLinkInner>>,
}

/// Test-side handle onto a [`MemLink`].
#[derive(Clone)]
pub struct MemLinkHandle {
    inner: Rc<RefCell<MemLinkInner>>,
}

#[derive(Default)]
struct MemLinkInner {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Link for PairSocket {
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        Ok(PairSocket::try_recv(self)?)
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        Ok(PairSocket::send(self, frame)?)
    }
}

impl MemLink {
    /// Create a new link and the handle used to drive it.
    pub fn new() -> (Self, MemLinkHandle) {
        let inner = Rc::new(RefCell::new(MemLinkInner::default()));

        (
            Self {
                inner: inner.clone(),
            },
            MemLinkHandle { inner },
        )
    }
}

impl Link for MemLink {
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        Ok(self.inner.borrow_mut().rx.pop_front())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.inner.borrow_mut().tx.push(frame.to_vec());
        Ok(())
    }
}

impl MemLinkHandle {
    /// Queue a frame for the watchdog to receive.
    pub fn push_rx(&self, frame: Vec<u8>) {
        self.inner.borrow_mut().rx.push_back(frame);
    }

    /// Take all frames the watchdog has transmitted so far.
    pub fn take_tx(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.inner.borrow_mut().tx)
    }
}
