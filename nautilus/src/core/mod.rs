//! Pure logic shared by the supervisor, relay and server.

pub mod origin;
pub mod output;
pub mod payload_path;
pub mod prompt;
pub mod response;
pub mod types;
