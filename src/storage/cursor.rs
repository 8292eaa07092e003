use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("cursor file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cursor file {path} has {lines} lines, expected 2 (timestamp, sequence number)")]
    Malformed { path: PathBuf, lines: usize },
}

pub type Result<T> = std::result::Result<T, CursorError>;

/// Watermark of the last forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub last_time: DateTime<Utc>,
    pub last_seq_num: u64,
}

impl Default for Cursor {
    /// The zero cursor: no progress recorded yet.
    fn default() -> Self {
        Self {
            last_time: DateTime::<Utc>::MIN_UTC,
            last_seq_num: 0,
        }
    }
}

impl Cursor {
    pub fn new(last_time: DateTime<Utc>, last_seq_num: u64) -> Self {
        Self {
            last_time,
            last_seq_num,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Whether a record at `(time, seq_num)` was already forwarded.
    ///
    /// Records are ordered by time first, then by sequence number, so several
    /// records sharing one second are told apart by their sequence numbers.
    /// A record older than the cursor is covered even when its sequence number
    /// is larger, and the record the cursor points at is covered too. This is
    /// stricter than skipping only when the time is strictly older and the
    /// sequence number is not larger.
    pub fn covers(&self, time: DateTime<Utc>, seq_num: u64) -> bool {
        (time, seq_num) <= (self.last_time, self.last_seq_num)
    }

    /// Resume point at startup: the persisted cursor unless the configured
    /// start time is later than it.
    pub fn resume_from(persisted: Cursor, start_time: DateTime<Utc>) -> Cursor {
        if persisted.last_time > start_time {
            persisted
        } else {
            Cursor::new(start_time, 0)
        }
    }
}

/// Two-line text file holding a [`Cursor`] between runs.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted cursor.
    ///
    /// A missing file, or one whose fields do not parse, yields the zero
    /// cursor. A file with the wrong number of lines is an error: guessing
    /// could skip or repeat records.
    pub fn load(&self) -> Result<Cursor> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No cursor file, starting without prior progress");
                return Ok(Cursor::default());
            }
            Err(e) => {
                return Err(CursorError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let lines: Vec<&str> = content.lines().collect();
        if lines.len() != 2 {
            return Err(CursorError::Malformed {
                path: self.path.clone(),
                lines: lines.len(),
            });
        }

        let last_time = match DateTime::parse_from_rfc3339(lines[0].trim()) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), value = lines[0], error = %e, "Unreadable cursor timestamp, starting without prior progress");
                return Ok(Cursor::default());
            }
        };
        let last_seq_num = match lines[1].trim().parse::<u64>() {
            Ok(seq) => seq,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), value = lines[1], error = %e, "Unreadable cursor sequence number, starting without prior progress");
                return Ok(Cursor::default());
            }
        };

        let cursor = Cursor::new(last_time, last_seq_num);
        tracing::info!(
            path = %self.path.display(),
            last_time = %cursor.last_time,
            last_seq_num = cursor.last_seq_num,
            "Loaded cursor"
        );
        Ok(cursor)
    }

    /// Overwrite the file with `cursor` and sync it before closing.
    pub fn save(&self, cursor: &Cursor) -> Result<()> {
        let io_err = |e| CursorError::Io {
            path: self.path.clone(),
            source: e,
        };

        let content = format!(
            "{}\n{}",
            cursor
                .last_time
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            cursor.last_seq_num
        );

        let mut file = File::create(&self.path).map_err(io_err)?;
        file.write_all(content.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        tracing::debug!(
            path = %self.path.display(),
            last_time = %cursor.last_time,
            last_seq_num = cursor.last_seq_num,
            "Cursor saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CursorStore {
        CursorStore::new(dir.path().join(".pos.dat"))
    }

    #[test]
    fn test_missing_file_is_zero() {
        let dir = TempDir::new().unwrap();
        let cursor = store_in(&dir).load().unwrap();
        assert!(cursor.is_zero());
    }

    #[test]
    fn test_save_load_round_trip_keeps_nanos() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let time = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let cursor = Cursor::new(time, 4242);

        store.save(&cursor).unwrap();

        assert_eq!(store.load().unwrap(), cursor);
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "2024-03-05T07:08:09.123456789Z\n4242");
    }

    #[test]
    fn test_save_truncates_previous_content() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "x".repeat(512)).unwrap();

        let cursor = Cursor::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), 1);
        store.save(&cursor).unwrap();

        assert_eq!(store.load().unwrap(), cursor);
    }

    #[test]
    fn test_wrong_line_count_is_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        std::fs::write(store.path(), "2024-03-05T07:08:09Z").unwrap();
        assert!(matches!(
            store.load(),
            Err(CursorError::Malformed { lines: 1, .. })
        ));

        std::fs::write(store.path(), "2024-03-05T07:08:09Z\n1\nextra").unwrap();
        assert!(matches!(
            store.load(),
            Err(CursorError::Malformed { lines: 3, .. })
        ));
    }

    #[test]
    fn test_trailing_newline_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "2024-03-05T07:08:09Z\n17\n").unwrap();

        let cursor = store.load().unwrap();

        assert_eq!(cursor.last_seq_num, 17);
    }

    #[test]
    fn test_unparsable_fields_are_zero() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        std::fs::write(store.path(), "last tuesday\n17").unwrap();
        assert!(store.load().unwrap().is_zero());

        std::fs::write(store.path(), "2024-03-05T07:08:09Z\nseventeen").unwrap();
        assert!(store.load().unwrap().is_zero());
    }

    #[test]
    fn test_resume_from_takes_later_of_persisted_and_start() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Cursor::new(start + chrono::Duration::hours(1), 99);
        let earlier = Cursor::new(start - chrono::Duration::hours(1), 99);

        assert_eq!(Cursor::resume_from(later, start), later);
        assert_eq!(Cursor::resume_from(earlier, start), Cursor::new(start, 0));
        assert_eq!(
            Cursor::resume_from(Cursor::default(), start),
            Cursor::new(start, 0)
        );
    }

    #[test]
    fn test_covers_orders_by_time_then_sequence() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        let cursor = Cursor::new(t, 5);

        assert!(cursor.covers(t, 5));
        assert!(cursor.covers(t, 4));
        assert!(!cursor.covers(t, 6));
        assert!(cursor.covers(t - chrono::Duration::seconds(1), 100));
        assert!(!cursor.covers(t + chrono::Duration::seconds(1), 0));
        assert!(!Cursor::default().covers(t, 0));
    }
}
