pub mod entry;
pub mod scanner;
pub mod timestamp;

pub use entry::{Entry, Metadata};
pub use scanner::{parse_entries, ParseError};
