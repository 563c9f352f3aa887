//! # Telecommand module
//!
//! Tuning telecommands are plain text lines of space separated tokens, identical whether they come
//! from the local console or from the network command channel:
//!
//! | Command                                   | Effect                                  |
//! |-------------------------------------------|-----------------------------------------|
//! | `pid_tune`                                | return the full status                  |
//! | `pid_tune -p <v> -i <v> -d <v> -t <v>`    | manual gain and/or target override      |
//! | `pid_tune -ff`                            | list the feedforward table              |
//! | `pid_tune -ff_set <idx> <height> <speed>` | replace one feedforward row             |
//! | `pid_eval <duration_ms>`                  | start a timed evaluation window         |
//! | `get_status`                              | return the full status                  |
//!
//! Any subset of the `-p`, `-i`, `-d` and `-t` flags may be given, in any order. Parsing never
//! has side effects, a command which fails to parse must not change anything.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Serialize, Deserialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const CMD_PID_TUNE: &str = "pid_tune";
const CMD_PID_EVAL: &str = "pid_eval";
const CMD_GET_STATUS: &str = "get_status";

const FLAG_KP: &str = "-p";
const FLAG_KI: &str = "-i";
const FLAG_KD: &str = "-d";
const FLAG_TARGET: &str = "-t";
const FLAG_FF: &str = "-ff";
const FLAG_FF_SET: &str = "-ff_set";

/// All flags understood by `pid_tune`, used to detect a flag standing where a value was expected.
const PID_TUNE_FLAGS: [&str; 6] = [FLAG_KP, FLAG_KI, FLAG_KD, FLAG_TARGET, FLAG_FF, FLAG_FF_SET];

/// Usage summary printed by interactive frontends.
pub const USAGE: &str = "\
pid_tune                                  (show status)
pid_tune -p <kp> -i <ki> -d <kd> -t <mm>  (manual gain/target override, any subset)
pid_tune -ff                              (show feedforward table)
pid_tune -ff_set <idx> <height> <speed>   (replace feedforward entry)
pid_eval <duration_ms>                    (start timed evaluation)
get_status                                (show status)";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A tuning telecommand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Tc {
    /// `pid_tune` and all of its variants
    PidTune(PidTuneCmd),

    /// Start an evaluation window lasting the given number of milliseconds
    PidEval {
        duration_ms: u64
    },

    /// Request a status snapshot
    GetStatus,
}

/// The variants of the `pid_tune` command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PidTuneCmd {
    /// No options, report the status
    Status,

    /// Manual gain and target override
    Set(TuneSet),

    /// List the feedforward table
    ShowFeedforward,

    /// Replace a single row of the feedforward table
    SetFeedforward {
        index: usize,
        height_mm: f64,
        speed: f64
    },
}

/// Possible parsing errors.
#[derive(Debug, Error, PartialEq)]
pub enum TcParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Unknown option '{0}'")]
    UnknownOption(String),

    #[error("Missing value for '{0}'")]
    MissingValue(String),

    #[error("Invalid value '{value}' for '{flag}'")]
    InvalidValue {
        flag: String,
        value: String
    },

    #[error("Unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The set of values given in a `pid_tune -p/-i/-d/-t` command.
///
/// Fields which were not given are `None` and must be left untouched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuneSet {
    pub kp: Option<f64>,
    pub ki: Option<f64>,
    pub kd: Option<f64>,
    pub target_height_mm: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {

    /// Parse a TC from a single command line.
    ///
    /// Leading/trailing whitespace (including a trailing `\r\n`) is ignored, and tokens may be
    /// separated by any amount of whitespace.
    pub fn from_line(line: &str) -> Result<Self, TcParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let (cmd, args) = match tokens.split_first() {
            Some((c, a)) => (*c, a),
            None => return Err(TcParseError::Empty)
        };

        match cmd {
            CMD_PID_TUNE => Ok(Tc::PidTune(parse_pid_tune(args)?)),
            CMD_PID_EVAL => parse_pid_eval(args),
            CMD_GET_STATUS => match args.first() {
                Some(a) => Err(TcParseError::UnexpectedArgument(a.to_string())),
                None => Ok(Tc::GetStatus)
            },
            other => Err(TcParseError::UnknownCommand(other.to_string()))
        }
    }
}

impl TuneSet {
    /// True if at least one gain was given.
    pub fn has_gains(&self) -> bool {
        self.kp.is_some() || self.ki.is_some() || self.kd.is_some()
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_pid_tune(args: &[&str]) -> Result<PidTuneCmd, TcParseError> {
    match args.first() {
        None => return Ok(PidTuneCmd::Status),
        Some(&FLAG_FF) => {
            return match args.get(1) {
                Some(a) => Err(TcParseError::UnexpectedArgument(a.to_string())),
                None => Ok(PidTuneCmd::ShowFeedforward)
            }
        },
        Some(&FLAG_FF_SET) => return parse_ff_set(&args[1..]),
        Some(_) => ()
    }

    let mut set = TuneSet::default();
    let mut iter = args.iter();

    while let Some(&flag) = iter.next() {
        let field = match flag {
            FLAG_KP => &mut set.kp,
            FLAG_KI => &mut set.ki,
            FLAG_KD => &mut set.kd,
            FLAG_TARGET => &mut set.target_height_mm,
            // The table flags are only valid on their own
            FLAG_FF | FLAG_FF_SET =>
                return Err(TcParseError::UnexpectedArgument(flag.to_string())),
            other => return Err(TcParseError::UnknownOption(other.to_string()))
        };

        let value = value_after(flag, iter.next().copied())?;

        // Last occurence of a flag wins
        *field = Some(parse_f64(flag, value)?);
    }

    Ok(PidTuneCmd::Set(set))
}

fn parse_ff_set(args: &[&str]) -> Result<PidTuneCmd, TcParseError> {
    if args.len() < 3 {
        return Err(TcParseError::MissingValue(FLAG_FF_SET.to_string()))
    }
    if let Some(extra) = args.get(3) {
        return Err(TcParseError::UnexpectedArgument(extra.to_string()))
    }

    let index = args[0].parse::<usize>().map_err(|_| invalid(FLAG_FF_SET, args[0]))?;
    let height_mm = parse_f64(FLAG_FF_SET, args[1])?;
    let speed = parse_f64(FLAG_FF_SET, args[2])?;

    Ok(PidTuneCmd::SetFeedforward {
        index,
        height_mm,
        speed
    })
}

fn parse_pid_eval(args: &[&str]) -> Result<Tc, TcParseError> {
    let value = value_after(CMD_PID_EVAL, args.first().copied())?;

    if let Some(extra) = args.get(1) {
        return Err(TcParseError::UnexpectedArgument(extra.to_string()))
    }

    match value.parse::<u64>() {
        Ok(d) if d > 0 => Ok(Tc::PidEval { duration_ms: d }),
        _ => Err(invalid(CMD_PID_EVAL, value))
    }
}

/// Get the value token following a flag.
///
/// A missing token, or another flag where the value should be, is a missing value.
fn value_after<'a>(flag: &str, token: Option<&'a str>) -> Result<&'a str, TcParseError> {
    match token {
        Some(t) if !PID_TUNE_FLAGS.contains(&t) => Ok(t),
        _ => Err(TcParseError::MissingValue(flag.to_string()))
    }
}

/// Parse a finite float.
fn parse_f64(flag: &str, value: &str) -> Result<f64, TcParseError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(flag, value))
    }
}

fn invalid(flag: &str, value: &str) -> TcParseError {
    TcParseError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
