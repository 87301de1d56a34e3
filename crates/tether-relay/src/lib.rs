//! tether-relay — session tables, socket tasks and the per-client
//! dispatcher that ties them to a control channel.

pub mod channel;
pub mod event;
pub mod queue;
pub mod registry;
pub mod table;
pub mod tcp;
pub mod udp;

pub use channel::ControlChannel;
pub use registry::{ChannelRegistry, ChannelSnapshot};
pub use table::{SessionState, SessionSummary};
