//! Collection-and-transmission core.
//!
//! * `barrier`: per-cycle completion barrier
//! * `hostname`: startup hostname resolution with fallback
//! * `probes`: CPU, load average and memory probes
//! * `report`: report type and per-cycle builder
//! * `transport`: fire-and-forget UDP delivery
//! * `scheduler`: the back-to-back cycle loop
//! * `state`: observable agent phase

pub mod barrier;
pub mod hostname;
pub mod probes;
pub mod report;
pub mod scheduler;
pub mod state;
pub mod transport;
