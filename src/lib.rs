//! leakfinder - interactive memory leak hunting harness.
//!
//! Repeatedly runs named test actions against a library and reports how the
//! process memory counters moved relative to a baseline taken at startup.
//!
//! - `sampler`: process memory counters and report rendering
//! - `registry`: ordered name → action mapping, help and completion
//! - `driver`: repeat-N execution with per-call failure isolation
//! - `session`: the interactive read/dispatch/report loop
//! - `input`: line sources (piped stdin, raw terminal editor, scripted)
//! - `probes`: PostgreSQL client test actions

pub mod driver;
pub mod input;
pub mod probes;
pub mod registry;
pub mod sampler;
pub mod session;
