//! Session lifecycle for the host bridge.

pub mod manager;

pub use manager::HostSession;
