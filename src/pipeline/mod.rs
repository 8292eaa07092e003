pub mod poller;

pub use poller::{PollError, Poller};
