//! I/O pieces behind the supervisor.

pub mod bridge;
pub mod catalog;
pub mod config;
pub mod job;
pub mod output_log;
pub mod token;
