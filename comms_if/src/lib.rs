//! # Communications interface crate.
//!
//! Provides the wire-level message definitions shared between the watchdog,
//! the ground segment and the compute module, plus the network transport used
//! to carry them during bench testing.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Ground (lander) link command and response definitions
pub mod gnd;

/// Compute module link message definitions
pub mod cm;

/// Network module
pub mod net;
