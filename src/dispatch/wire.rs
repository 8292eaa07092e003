use crate::source::entry::Metadata;
use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// One log line as pushed: `[timestamp, line]` or `[timestamp, line, metadata]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogValue {
    /// Unix nanoseconds as a decimal string
    pub timestamp: String,
    pub line: String,
    pub metadata: Option<Metadata>,
}

impl Serialize for LogValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.metadata.is_some() { 3 } else { 2 };
        let mut tuple = serializer.serialize_tuple(len)?;
        tuple.serialize_element(&self.timestamp)?;
        tuple.serialize_element(&self.line)?;
        if let Some(metadata) = &self.metadata {
            tuple.serialize_element(metadata)?;
        }
        tuple.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PushStream {
    #[serde(rename = "stream")]
    pub labels: BTreeMap<String, String>,
    pub values: Vec<LogValue>,
}

/// Body of a push request.
#[derive(Debug, Clone, Serialize)]
pub struct PushRequest {
    pub streams: Vec<PushStream>,
}

impl PushRequest {
    /// Wrap a batch as a single stream under `labels`.
    pub fn single_stream(labels: BTreeMap<String, String>, values: Vec<LogValue>) -> Self {
        Self {
            streams: vec![PushStream { labels, values }],
        }
    }
}
