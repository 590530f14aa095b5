//! Signal relay — bidirectional gateway between a messaging backend and an
//! internal automation inbox.

pub mod config;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod forward;
pub mod poller;
pub mod routes;
pub mod transport;
