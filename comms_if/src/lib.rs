//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the levitation software: the textual tuning
//! command language, the status and telemetry structures sent back to clients, and the networking
//! abstractions used to carry them.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Tuning telecommands and their parser
pub mod tc;

/// Status and telemetry structures
pub mod tm;

/// Network module
pub mod net;
