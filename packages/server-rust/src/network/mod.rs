//! Networking: configuration, transport, per-connection handling, the accept
//! loop, and shutdown control.

pub mod config;
pub mod connection;
pub mod handler;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use connection::*;
pub use handler::ConnectionHandler;
pub use module::NetworkModule;
pub use shutdown::*;
