//! tether-core — protocol types, configuration, and error taxonomy.
//! All other tether crates depend on this one.

pub mod command;
pub mod config;
pub mod envelope;
pub mod reply;

pub use command::{CommandError, CommandFields, Rejection, TcpCommand, Transport, UdpCommand};
pub use envelope::{Inbound, ParseError};
pub use reply::{Reply, Status};
