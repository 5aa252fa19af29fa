//! # Watchdog library.
//!
//! This library allows other crates in the workspace (and the integration
//! tests) to access items defined inside the watchdog crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// ADC collaborator interface - voltage and thermistor sampling
pub mod adc;

/// Compute module link processing - stroke, downlink and reset handling
pub mod cm_proc;

/// Ground command processing - magic gates, permission matrix and responses
pub mod cmd_proc;

/// Shared context - the single mutable aggregate threaded through every handler
pub mod context;

/// Event definitions and the interrupt-safe event queue
pub mod events;

/// Hardware control line collaborator interface
pub mod hw;

/// I2C action scheduler and bus collaborator interface
pub mod i2c;

/// Message link collaborator interface
pub mod link;

/// Executable parameters
pub mod params;

/// Hierarchical rover state machine
pub mod state;
