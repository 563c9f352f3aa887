//! # Levitation library.
//!
//! This library allows the executable, its benchmarks, and other crates in the workspace to access
//! items defined inside the levitation crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Console - interactive tuning on the local terminal
pub mod console;

/// Control loop - one sense, control, actuate cycle
pub mod control_loop;

/// Device helpers shared by the sysfs drivers
pub mod device;

/// Fan drivers - set the fan speed
pub mod fan;

/// Gain scheduler - interpolates the PID gain and feedforward tables by height
pub mod gain_sched;

/// Levitation control module - setpoint ramp, gain scheduled PID with feedforward and anti-windup
pub mod lev_ctrl;

/// Parameter store - the controller state shared between the control loop and tuning callers
pub mod param_store;

/// Parameters for the levitation executable
pub mod params;

/// Distance sensor drivers - measure the object height
pub mod sensor;

/// Telecommand processor - executes tuning commands
pub mod tc_processor;

/// Telecommand server - receives tuning commands over the network
pub mod tc_server;

/// Telemetry server - publishes the controller status
pub mod tm_server;
