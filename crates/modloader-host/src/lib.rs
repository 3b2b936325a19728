//! Modloader host bridge: JSON-RPC over stdio between a host application and the asset pipeline.

pub mod config;
pub mod outbound;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

pub use config::HostPaths;
pub use outbound::Outbound;
pub use protocol::ProtocolHandler;
pub use session::HostSession;
pub use transport::StdioTransport;
