//! Session management

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use erased_serde::Serialize;
use log::{debug, warn};
use std::{
    ffi::OsStr,
    fs,
    io,
    path::{Path, PathBuf},
    sync::{Mutex, mpsc::{channel, Receiver, Sender}},
    thread
};
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();
static SAVE_SENDER: OnceCell<Mutex<Sender<SaveRequest>>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// A chrono format string which diplays a timestamp. See
/// https://docs.rs/chrono/0.4.11/chrono/format/strftime/index.html for more
/// information.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Data queued for saving, with its session-relative path.
type SaveRequest = (PathBuf, Box<dyn Serialize + Send>);

/// A struct storing information about the current session
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable ({}) is not set", crate::host::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error(
        "Cannot initialise the session epoch, have you already initialised the \
         session? (conquer_once error: {0})"
    )]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the epoch time, did you forget to initialise the session?")]
    CannotGetEpoch,
}

/// Reasons a save request could not be written.
#[derive(Error, Debug)]
enum SaveError {
    #[error("only .json files are supported, got extension {0:?}")]
    UnsupportedExtension(Option<String>),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a new session within the given directory.
    ///
    /// This will create a new session directory named `{exec_name}_{timestamp}`
    /// inside `$LEV_SW_ROOT/{sessions_dir}`.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        // Set the session epoch
        SESSION_EPOCH
            .try_init_once(Utc::now)
            .map_err(SessionError::CannotInitEpoch)?;

        // Format the session epoch as a timestamp
        let timestamp = match SESSION_EPOCH.get() {
            Some(e) => e.format(TIMESTAMP_FORMAT),
            None => return Err(SessionError::CannotGetEpoch),
        };

        // Create the session path
        let mut path = crate::host::get_lev_sw_root().map_err(|_| SessionError::SwRootNotSet)?;
        path.push(sessions_dir);
        path.push(format!("{}_{}", exec_name, timestamp));

        fs::create_dir_all(&path).map_err(SessionError::CannotCreateDir)?;

        // Create the log file path
        let log_file_path = path.join(format!("{}.log", exec_name));

        // The sender lives in a static so that modules can save data without a reference to the
        // session
        let (tx, rx) = channel();
        SAVE_SENDER.init_once(|| Mutex::new(tx));

        // Spawn the save thread, which lives for the rest of the process
        let session_root = path.clone();
        thread::spawn(move || save_thread(session_root, rx));

        Ok(Session {
            session_root: path,
            log_file_path,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// Returns `NAN` if the session has not been started yet.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(e) => time::duration_to_seconds(Utc::now() - *e).unwrap_or(std::f64::NAN),
        None => std::f64::NAN,
    }
}

/// The session's epoch, `None` before a [`Session`] is created.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}

/// Save the given data into the session-relative path
pub fn save<P: AsRef<Path>, T: serde::Serialize + Send + 'static>(path: P, data: T) {
    match SAVE_SENDER.get() {
        Some(m) => match m.lock() {
            Ok(s) => {
                if let Err(e) = s.send((path.as_ref().to_path_buf(), Box::new(data))) {
                    warn!(
                        "Couldn't send data to save thread for file {:?}: {}",
                        path.as_ref(),
                        e
                    )
                }
            }
            Err(_) => {
                warn!("Couldn't get lock on save sender");
            }
        },
        None => {
            warn!("Cannot save data as session is not initialised yet");
        }
    }
}

/// Saves the given data to the path, appending a timestamp before the path's extension
pub fn save_with_timestamp<P: AsRef<Path>, T: serde::Serialize + Send + 'static>(path: P, data: T) {
    save(timestamped_path(path.as_ref(), &Utc::now()), data);
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Insert a timestamp between the stem and the extension of the path.
fn timestamped_path(path: &Path, now: &DateTime<Utc>) -> PathBuf {
    let stem = path.file_stem().unwrap_or_else(|| OsStr::new(""));

    let mut file_name = stem.to_os_string();
    file_name.push("_");
    // Milliseconds keep results saved within the same second apart
    file_name.push(now.format("%Y%m%d_%H%M%S_%3f").to_string());

    if let Some(ext) = path.extension() {
        file_name.push(".");
        file_name.push(ext);
    }

    path.with_file_name(file_name)
}

fn save_thread(session_root: PathBuf, receiver: Receiver<SaveRequest>) {
    for (path, data) in receiver {
        let full_path = session_root.join(&path);
        match write_json(&full_path, data.as_ref()) {
            Ok(()) => debug!("Saved {:?}", full_path),
            Err(e) => warn!("Could not save {:?}: {}", full_path, e)
        }
    }
}

/// Write `data` as pretty JSON, creating the parent directories as needed.
fn write_json(full_path: &Path, data: &(dyn Serialize + Send)) -> Result<(), SaveError> {
    match full_path.extension().and_then(OsStr::to_str) {
        Some("json") => (),
        ext => return Err(SaveError::UnsupportedExtension(ext.map(String::from)))
    }

    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = fs::File::create(full_path)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)?;
    io::Write::flush(&mut writer)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamped_path() {
        let now = Utc.ymd(2024, 3, 9).and_hms_milli(14, 5, 6, 789);

        assert_eq!(
            timestamped_path(Path::new("evals/eval.json"), &now),
            PathBuf::from("evals/eval_20240309_140506_789.json")
        );
        assert_eq!(
            timestamped_path(Path::new("history"), &now),
            PathBuf::from("history_20240309_140506_789")
        );
    }

    #[test]
    fn test_write_json() -> Result<(), SaveError> {
        let dir = std::env::temp_dir().join(format!("util_session_{}", std::process::id()));
        let path = dir.join("evals/eval.json");

        write_json(&path, &vec![1.5, 2.5])?;
        let saved: Vec<f64> = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(saved, vec![1.5, 2.5]);

        assert!(matches!(
            write_json(&dir.join("eval.csv"), &1),
            Err(SaveError::UnsupportedExtension(Some(ref e))) if e == "csv"
        ));

        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
