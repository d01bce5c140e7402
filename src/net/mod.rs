pub mod command;
pub mod connection;

pub use command::{encode_command, CommandChannel, CommandKind};
pub use connection::{wait_ready, ConnectionManager, Readiness};
