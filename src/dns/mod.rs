//! DNS Server Module
//!
//! Answers `A` queries from the record store, forwarding names under the
//! configured suffix to the host resolver.

pub mod codec;
mod handler;
mod server;
mod upstream;

pub use handler::RecordsDnsHandler;
pub use server::run_dns_server;
pub use upstream::{SystemResolver, Upstream};
