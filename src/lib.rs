//! serverhealth, a lightweight host health agent.
//!
//! The agent samples CPU utilization, load averages and memory usage,
//! stamps them with the host name and fires the result at a collector as a
//! single UDP datagram, then immediately starts over. Delivery is never
//! acknowledged or retried, and nothing is stored locally.
//!
//! ## Modules
//!
//! * `config`: TOML configuration: logger, agent identity, collector
//!   endpoint and probe sources, validated with `validator`.
//!
//! * `core`: the collection loop:
//!   - completion barrier joining concurrently running probes
//!   - hostname resolver with short/full fallback
//!   - probe set and lenient parsers for `vmstat`, `/proc/loadavg`,
//!     `/proc/meminfo`
//!   - report builder and UDP transport
//!   - cycle scheduler
//!
//! * `logger`: `tracing` subscriber setup with console (compact, pretty,
//!   JSON) and optional journald output.

pub mod config;
pub mod core;
pub mod logger;
