pub mod cursor;

pub use cursor::{Cursor, CursorError, CursorStore};
