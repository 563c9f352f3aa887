//! # Telecommand processor module
//!
//! The telecommand processor executes tuning commands coming from any source, the local console or
//! the network command channel, against the parameter store, and formats the one line response
//! returned to the caller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::Instant;
use log::{debug, warn};

// Internal
use comms_if::{
    tc::{Tc, PidTuneCmd, TcParseError},
    tm::{LevStatus, FfEntry}
};
use crate::{
    gain_sched::ScheduleError,
    param_store::ParamStore
};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Successful result of a telecommand.
#[derive(Debug, Clone, PartialEq)]
pub enum TcResponse {
    /// Status snapshot
    Status(LevStatus),

    /// Gains and/or target were changed, status after the change
    Updated(LevStatus),

    /// The feedforward table
    Feedforward(Vec<FfEntry>),

    /// A feedforward row was replaced
    FeedforwardSet(FfEntry),

    /// An evaluation window was started
    EvalStarted {
        duration_ms: u64
    },
}

/// Reasons a telecommand was rejected. A rejected command never changes the state.
#[derive(Debug, thiserror::Error)]
pub enum TuningError {
    #[error(transparent)]
    Parse(#[from] TcParseError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// How JSON payloads are laid out in a response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseFormat {
    /// Single line, for the network channel
    Compact,

    /// Indented, for the interactive console
    Pretty,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Execute a telecommand.
///
/// All values are applied under a single lock acquisition.
pub fn exec(store: &ParamStore, tc: &Tc, now: Instant) -> Result<TcResponse, TuningError> {
    match *tc {
        Tc::GetStatus | Tc::PidTune(PidTuneCmd::Status) => {
            Ok(TcResponse::Status(store.status()))
        },
        Tc::PidTune(PidTuneCmd::Set(ref set)) => {
            debug!("Applying tuning set {:?}", set);
            Ok(TcResponse::Updated(store.with(|lc| {
                lc.apply_tune_set(set);
                lc.status()
            })))
        },
        Tc::PidTune(PidTuneCmd::ShowFeedforward) => {
            Ok(TcResponse::Feedforward(store.with(|lc| lc.feedforward_table())))
        },
        Tc::PidTune(PidTuneCmd::SetFeedforward { index, height_mm, speed }) => {
            store.with(|lc| lc.set_feedforward_entry(index, height_mm, speed))?;
            debug!(
                "Feedforward entry {} set to height = {} mm, speed = {}",
                index, height_mm, speed
            );
            Ok(TcResponse::FeedforwardSet(FfEntry { index, height_mm, speed }))
        },
        Tc::PidEval { duration_ms } => {
            store.with(|lc| lc.start_eval(duration_ms, now));
            Ok(TcResponse::EvalStarted { duration_ms })
        }
    }
}

/// Parse and execute one command line, returning the response line.
///
/// Failures are reported in the response as `ERROR: <reason>`.
pub fn exec_line(store: &ParamStore, line: &str, format: ResponseFormat) -> String {
    let result = Tc::from_line(line)
        .map_err(TuningError::from)
        .and_then(|tc| exec(store, &tc, Instant::now()));

    match result {
        Ok(response) => {
            debug!("Command {:?} accepted", line.trim());
            response.to_line(format)
        },
        Err(e) => {
            warn!("Command {:?} rejected: {}", line.trim(), e);
            format!("ERROR: {}", e)
        }
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TcResponse {
    /// Format the response as it is sent back to the caller.
    pub fn to_line(&self, format: ResponseFormat) -> String {
        match self {
            TcResponse::Status(status) => to_json(status, format),
            TcResponse::Updated(status) => {
                format!("OK: {}", to_json(status, ResponseFormat::Compact))
            },
            TcResponse::Feedforward(table) => to_json(table, format),
            TcResponse::FeedforwardSet(e) => format!(
                "OK: feedforward entry {} set to height={:.1} mm, speed={:.4}",
                e.index, e.height_mm, e.speed
            ),
            TcResponse::EvalStarted { duration_ms } => {
                format!("OK: evaluation started for {} ms", duration_ms)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn to_json<T: serde::Serialize>(value: &T, format: ResponseFormat) -> String {
    let res = match format {
        ResponseFormat::Compact => serde_json::to_string(value),
        ResponseFormat::Pretty => serde_json::to_string_pretty(value)
    };

    match res {
        Ok(s) => s,
        Err(e) => format!("ERROR: Could not serialize the response: {}", e)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
