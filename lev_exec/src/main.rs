//! # Levitation Control Executable
//!
//! This executable holds an object at a target height above a fan:
//! - Initialise the session, logging and parameters
//! - Open the distance sensor and the fan
//! - Start the network command server, the telemetry server and the local console
//! - Main loop:
//!     - Sense the height
//!     - Ramp the setpoint, schedule gains, compute PID with feedforward and anti-windup
//!     - Actuate the fan
//!     - Publish telemetry
//!
//! Tuning commands are applied to the shared parameter store by the server and console threads
//! and take effect on the next cycle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{
    sync::{Arc, atomic::AtomicBool},
    thread,
    time::Instant
};
use color_eyre::{Result, eyre::WrapErr};
use log::{error, info, warn};
use structopt::StructOpt;

// Internal
use comms_if::{net::zmq, tm::TmPacket};
use lev_lib::{
    console,
    control_loop::{ControlLoop, CycleOutcome},
    fan,
    lev_ctrl::LevCtrl,
    param_store::ParamStore,
    params::LevExecParams,
    sensor::IioDistanceSensor,
    tc_server::TcServer,
    tm_server::TmServer
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module,
    session::{self, Session},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of consecutive overruns after which an error is reported.
const OVERRUN_ERROR_LIMIT: u64 = 20;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Command line options.
#[derive(Debug, StructOpt)]
#[structopt(name = "lev_exec", about = "Gain scheduled fan levitation controller")]
struct Opts {
    /// Parameter file, relative to `$LEV_SW_ROOT/params`
    #[structopt(short, long, default_value = "lev_exec.toml")]
    params: String,

    /// Do not start the interactive console
    #[structopt(long)]
    no_console: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {

    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "lev_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    let log_level = match opts.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };

    // Initialise logger
    logger_init(log_level, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Levitation Control Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: LevExecParams = util::params::load(&opts.params)
        .wrap_err_with(|| format!("Failed to load parameters from {}", opts.params))?;
    params.validate().wrap_err("Invalid executable parameters")?;

    info!("Parameters loaded");

    // ---- MODULE INITIALISATION ----

    let lev_ctrl: LevCtrl = module::init_state(params.lev_ctrl.clone())
        .wrap_err("Failed to initialise LevCtrl")?;
    let store = ParamStore::new(lev_ctrl);

    info!("LevCtrl initialised, target height {} mm", store.status().target_height_mm);

    // ---- DEVICE INITIALISATION ----

    let sensor = IioDistanceSensor::open(&params.sensor)
        .wrap_err("Failed to open the distance sensor")?;
    let fan = fan::open(&params.fan)
        .wrap_err("Failed to open the fan")?;

    info!("Devices opened");

    let mut control_loop = ControlLoop::new(sensor, fan, store.clone());
    control_loop.stop_fan();

    // ---- SERVER INITIALISATION ----

    let ctx = zmq::Context::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let tc_server = TcServer::new(&ctx, &params.net, store.clone())
        .wrap_err("Failed to initialise the TC server")?;
    let _tc_handle = tc_server.spawn(shutdown.clone());

    let mut tm_server = TmServer::new(&ctx, &params.net)
        .wrap_err("Failed to initialise the TM server")?;

    info!("Servers initialised");

    // ---- CONSOLE ----

    if !opts.no_console {
        console::spawn(
            store.clone(),
            session.session_root.join("console_history.txt")
        );
    }

    // ---- MAIN LOOP ----

    info!("Initialisation complete, entering main loop\n");

    let cycle_period = params.cycle_period();
    let mut num_consec_cycle_overruns: u64 = 0;

    loop {
        let cycle_start_instant = Instant::now();

        let outcome = control_loop.cycle(cycle_start_instant);

        // ---- TELEMETRY ----

        if control_loop.num_cycles() % params.net.tm_decimation == 0 {
            let packet = TmPacket {
                cycle: control_loop.num_cycles(),
                session_time_s: session::get_elapsed_seconds(),
                status: store.status(),
            };
            if let Err(e) = tm_server.send(&packet) {
                warn!("TmServer error: {}", e);
            }
        }

        // ---- CYCLE MANAGEMENT ----

        let period = match outcome {
            CycleOutcome::SensorFailure => params.sensor_retry_delay(),
            _ => cycle_period
        };

        let cycle_dur = Instant::now() - cycle_start_instant;

        match period.checked_sub(cycle_dur) {
            Some(d) => {
                num_consec_cycle_overruns = 0;
                thread::sleep(d);
            },
            None => {
                num_consec_cycle_overruns += 1;
                warn!(
                    "Cycle overran by {:.06} s ({} consecutive)",
                    (cycle_dur - period).as_secs_f64(),
                    num_consec_cycle_overruns
                );

                if num_consec_cycle_overruns == OVERRUN_ERROR_LIMIT {
                    error!(
                        "{} consecutive cycle overruns, the control rate cannot be held",
                        OVERRUN_ERROR_LIMIT
                    );
                }
            }
        }
    }
}
