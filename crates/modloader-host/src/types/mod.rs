//! Wire types for the host bridge.

pub mod error;
pub mod message;
pub mod notification;
pub mod response;

pub use error::*;
pub use message::*;
pub use notification::*;
pub use response::*;
