pub mod client;
pub mod transport;
pub mod wire;

pub use client::{ClientConfig, DispatchClient, DispatchError, RebaseFn, DEFAULT_QUEUE_CAPACITY};
pub use transport::{HttpTransport, Transport, TransportError};
pub use wire::{LogValue, PushRequest, PushStream};
