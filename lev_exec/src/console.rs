//! # Console
//!
//! Interactive tuning console on the terminal the executable runs in. Lines are executed by the
//! same processor as network commands, with status output pretty printed. Ending the console never
//! stops the control loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{path::{Path, PathBuf}, thread::{self, JoinHandle}};
use log::{info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};

use comms_if::tc::USAGE;

use crate::{
    param_store::ParamStore,
    tc_processor::{self, ResponseFormat}
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "lev $ ";

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// What the console should do after a line.
#[derive(Debug, PartialEq)]
pub enum ConsoleAction {
    /// Print the text and prompt again
    Print(String),

    /// Prompt again without output
    Continue,

    /// Leave the console
    Exit,
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Handle one console line.
pub fn handle_line(store: &ParamStore, line: &str) -> ConsoleAction {
    match line.trim() {
        "" => ConsoleAction::Continue,
        "help" => ConsoleAction::Print(USAGE.to_string()),
        "exit" | "quit" => ConsoleAction::Exit,
        cmd => ConsoleAction::Print(tc_processor::exec_line(store, cmd, ResponseFormat::Pretty))
    }
}

/// Start the console thread.
///
/// History is loaded from and saved to `history_path`.
pub fn spawn(store: ParamStore, history_path: PathBuf) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = run(&store, &history_path) {
            warn!("Console stopped on error: {}", e);
        }
    })
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn run(store: &ParamStore, history_path: &Path) -> Result<(), ReadlineError> {
    let mut rl = DefaultEditor::new()?;

    if rl.load_history(history_path).is_err() {
        info!("No console history found at {:?}", history_path);
    }

    println!("Levitation tuning console, type 'help' for the list of commands");

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e)
        };

        if let Err(e) = rl.add_history_entry(line.as_str()) {
            warn!("Could not add the line to the console history: {}", e);
        }

        match handle_line(store, &line) {
            ConsoleAction::Print(s) => println!("{}", s),
            ConsoleAction::Continue => (),
            ConsoleAction::Exit => break
        }
    }

    if let Err(e) = rl.save_history(history_path) {
        warn!("Could not save the console history: {}", e);
    }

    info!("Console closed, control continues");

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
