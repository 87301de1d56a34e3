//! CLI command modules.

pub mod channels;
pub mod http;
pub mod status;
