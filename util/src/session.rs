//! Session management
//!
//! Each execution of the watchdog gets its own timestamped session directory
//! under the software root, holding the log file for that run. The persistent
//! store lives outside the session directories so that it survives restarts,
//! standing in for the non-volatile memory of the flight hardware.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

// Internal imports
use crate::params;
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// A chrono format string used for session directory names. See
/// https://docs.rs/chrono/0.4.11/chrono/format/strftime/index.html for more
/// information.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A struct storing information about the current session
#[derive(Clone)]
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,

    /// The directory holding data which must survive a restart
    pub persistent_root: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (DEIMOS_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error(
        "Cannot initialise the session epoch, have you already initialised the\
         session? (conquer_once error: {0})"
    )]
    CannotInitEpoch(conquer_once::TryInitError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Create a new session for the given executable.
    ///
    /// The session directory is created under `<sw_root>/<sessions_dir>` and
    /// is named with the executable name and the session epoch. Also sets the
    /// session epoch, so must only be called once per execution.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        // Set the epoch for this session
        let epoch = Utc::now();
        SESSION_EPOCH
            .try_init_once(|| epoch)
            .map_err(SessionError::CannotInitEpoch)?;

        let sw_root = params::get_sw_root().map_err(|_| SessionError::SwRootNotSet)?;

        // Build and create the session directory
        let mut session_root = sw_root.clone();
        session_root.push(sessions_dir);
        session_root.push(format!(
            "{}_{}",
            exec_name,
            epoch.format(TIMESTAMP_FORMAT)
        ));

        fs::create_dir_all(&session_root).map_err(SessionError::CannotCreateDir)?;

        // The persistent directory is shared between sessions
        let mut persistent_root = sw_root;
        persistent_root.push("persistent");

        fs::create_dir_all(&persistent_root).map_err(SessionError::CannotCreateDir)?;

        let log_file_path = session_root.join(format!("{}.log", exec_name));

        Ok(Self {
            session_root,
            log_file_path,
            persistent_root,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the epoch (start time) of the current session.
///
/// Panics if the session has not been initialised.
pub fn get_epoch() -> DateTime<Utc> {
    *SESSION_EPOCH
        .get()
        .expect("Attempted to get session epoch before the session was initialised")
}

/// Get the number of seconds elapsed since the session epoch.
///
/// If the session has not been initialised zero is returned.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(epoch) => {
            time::duration_to_seconds(Utc::now().signed_duration_since(*epoch)).unwrap_or(0.0)
        }
        None => 0.0,
    }
}
