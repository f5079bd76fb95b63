//! Unix socket job interface: one request line in, one event line per
//! milestone out.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::submit_job;
pub use protocol::{JobRequest, WireEvent};
pub use server::JobServer;
