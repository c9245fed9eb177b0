pub use error::{FrameError, ProtocolError};
pub use message::{Inbound, Message, RoomEvent};
pub use transport::{Offline, Transport};

pub mod client;
pub mod connection;
mod error;
mod message;
mod transport;
