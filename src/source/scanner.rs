//! Incremental record parser for the event-log export.
//!
//! The export is a sequence of records separated by a blank line followed by
//! `seqNum: `. Every poll re-reads the whole file; the [`Cursor`] decides which
//! records were already forwarded.

use crate::source::entry::Entry;
use crate::source::timestamp::{parse_record_time, TimestampError};
use crate::storage::cursor::Cursor;
use thiserror::Error;
use tracing::debug;

/// Separator between two consecutive records.
pub const RECORD_DELIMITER: &str = "\n\nseqNum: ";

/// Marker preceding the first record of the file.
const RECORD_MARKER: &str = "seqNum: ";

const DATA_RULE: &str = "===========";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("record {record}: invalid {field} '{value}': {source}")]
    Number {
        record: String,
        field: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("record {record}: invalid time: {source}")]
    Time {
        record: String,
        #[source]
        source: TimestampError,
    },
}

/// Field slices of a record that matched the layout, not yet converted.
#[derive(Debug, PartialEq, Eq)]
struct RawRecord<'a> {
    seq_num: &'a str,
    time: &'a str,
    code: &'a str,
    class: &'a str,
    locale: &'a str,
    description: &'a str,
    data: &'a str,
}

struct Scanner<'a> {
    rest: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    fn literal(&mut self, expected: &str) -> Option<()> {
        self.rest = self.rest.strip_prefix(expected)?;
        Some(())
    }

    /// Everything up to the next newline, which is consumed.
    fn line(&mut self) -> Option<&'a str> {
        let end = self.rest.find('\n')?;
        let line = &self.rest[..end];
        self.rest = &self.rest[end + 1..];
        Some(line)
    }

    /// A non-empty line of ASCII word characters.
    fn word_line(&mut self) -> Option<&'a str> {
        let line = self.line()?;
        let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
        (!line.is_empty() && line.bytes().all(is_word)).then_some(line)
    }

    /// A line holding an optionally negative run of ASCII digits.
    fn signed_decimal_line(&mut self) -> Option<&'a str> {
        let line = self.line()?;
        let digits = line.strip_prefix('-').unwrap_or(line);
        (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(line)
    }

    fn remainder(self) -> &'a str {
        self.rest
    }
}

/// Match one segment (with its `seqNum: ` marker already removed) against the
/// record layout. Returns `None` when the segment does not fit, which is the
/// normal case for a record still being written.
fn scan_record(segment: &str) -> Option<RawRecord<'_>> {
    let mut s = Scanner::new(segment);

    s.literal("0x")?;
    let seq_num = s.word_line()?;
    s.literal("Time: ")?;
    let time = s.line()?;
    s.literal("\nCode: 0x")?;
    let code = s.word_line()?;
    s.literal("Class: ")?;
    let class = s.signed_decimal_line()?;
    s.literal("Locale: 0x")?;
    let locale = s.word_line()?;
    s.literal("Event Description: ")?;
    let description = s.line()?;
    s.literal("Event Data:\n")?;
    s.literal(DATA_RULE)?;
    s.literal("\n")?;

    Some(RawRecord {
        seq_num,
        time,
        code,
        class,
        locale,
        description,
        data: s.remainder(),
    })
}

/// Split raw export content into the record bodies following each marker.
fn segments(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_DELIMITER)
        .enumerate()
        .filter_map(|(index, segment)| {
            if index == 0 {
                // Anything before the first marker is file preamble.
                segment
                    .find(RECORD_MARKER)
                    .map(|pos| &segment[pos + RECORD_MARKER.len()..])
            } else {
                Some(segment)
            }
        })
}

fn parse_hex(record: &str, field: &'static str, value: &str) -> Result<u64, ParseError> {
    u64::from_str_radix(value, 16).map_err(|e| ParseError::Number {
        record: record.to_string(),
        field,
        value: value.to_string(),
        source: e,
    })
}

/// Parse every record not yet covered by `cursor`, in file order.
///
/// On success the cursor moves to the last returned entry. On error nothing is
/// returned and the cursor is left untouched.
pub fn parse_entries(raw: &[u8], cursor: &mut Cursor) -> Result<Vec<Entry>, ParseError> {
    let text = String::from_utf8_lossy(raw);
    let mut entries = Vec::new();

    for segment in segments(&text) {
        let Some(record) = scan_record(segment) else {
            debug!(
                bytes = segment.len(),
                "Skipping segment that does not match the record layout"
            );
            continue;
        };

        let seq_num = parse_hex(record.seq_num, "seqNum", record.seq_num)?;
        let time = parse_record_time(record.time).map_err(|e| ParseError::Time {
            record: record.seq_num.to_string(),
            source: e,
        })?;

        if cursor.covers(time, seq_num) {
            continue;
        }

        let code = parse_hex(record.seq_num, "code", record.code)?;
        let class = record
            .class
            .parse::<i64>()
            .map_err(|e| ParseError::Number {
                record: record.seq_num.to_string(),
                field: "class",
                value: record.class.to_string(),
                source: e,
            })?;
        let locale = parse_hex(record.seq_num, "locale", record.locale)?;

        entries.push(Entry {
            seq_num,
            time,
            code,
            class,
            locale,
            event_description: record.description.to_string(),
            event_data: record.data.to_string(),
        });
    }

    if let Some(last) = entries.last() {
        *cursor = Cursor::new(last.time, last.seq_num);
    }

    Ok(entries)
}
