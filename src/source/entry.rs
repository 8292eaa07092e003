use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use crate::source::timestamp::RECORD_TIME_FORMAT;

/// Structured metadata attached to a forwarded line
pub type Metadata = BTreeMap<String, String>;

/// A single event record from the export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub seq_num: u64,
    pub time: DateTime<Utc>,
    pub code: u64,
    pub class: i64,
    pub locale: u64,
    pub event_description: String,
    pub event_data: String,
}

impl Entry {
    /// The line forwarded to the sink: description, newline, data.
    pub fn format_line(&self) -> String {
        let mut line =
            String::with_capacity(self.event_description.len() + self.event_data.len() + 1);
        line.push_str(&self.event_description);
        line.push('\n');
        line.push_str(&self.event_data);
        line
    }

    /// Numeric fields as decimal strings.
    ///
    /// `unix_nano` carries the record time and is what the origin-timestamp
    /// rebase hook reads back.
    pub fn metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("seq_num".to_string(), self.seq_num.to_string());
        meta.insert("unix_nano".to_string(), unix_nanos(&self.time).to_string());
        meta.insert("code".to_string(), self.code.to_string());
        meta.insert("class".to_string(), self.class.to_string());
        meta.insert("locale".to_string(), self.locale.to_string());
        meta
    }
}

/// Renders the entry in the export's record layout, including the leading
/// `seqNum: ` marker but not the blank line separating it from the previous
/// record.
impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seqNum: 0x{:X}\nTime: {}\n\nCode: 0x{:X}\nClass: {}\nLocale: 0x{:X}\nEvent Description: {}\nEvent Data:\n===========\n{}",
            self.seq_num,
            self.time.format(RECORD_TIME_FORMAT),
            self.code,
            self.class,
            self.locale,
            self.event_description,
            self.event_data,
        )
    }
}

/// Nanoseconds since the Unix epoch, saturating outside the representable range.
pub fn unix_nanos(time: &DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt().unwrap_or(if time.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}
