//! Single-job supervisor with a live output relay and an interactive prompt bridge.
//!
//! A remote caller launches one payload script at a time, watches its output
//! as an ordered event stream, and answers questions the script asks while it
//! runs. The crate keeps the same split throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (response sanitizing, path and
//!   origin checks, line classification, prompt markers). No I/O.
//! - **[`io`]**: Side-effecting pieces (config files, the wrapped job process,
//!   the output log, the token slot, the prompt mailbox, the catalog builder).
//!
//! [`supervisor`] owns the single active job slot and [`relay`] turns a job's
//! output log into the event stream served to clients.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod relay;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
