//! Command builders for the external scanners redfox drives.
//!
//! Each module assembles the argv for one tool, either natively or wrapped
//! in its container image, and owns whatever parsing of that tool's output
//! the orchestration needs. Nothing here executes anything; the supervisor
//! in `watchdog` does.

pub mod gobuster;
pub mod hydra;
pub mod nikto;
pub mod nmap;
