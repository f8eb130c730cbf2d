use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::fmt;

/// Names the object whose arrival triggered this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDescriptor {
    pub bucket: String,
    /// Object key, already URL-decoded.
    pub key: String,
}

impl TriggerDescriptor {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Build a descriptor from the raw JSON of a storage notification.
    pub fn from_event_json(raw: &[u8]) -> Result<Self> {
        let event: NotificationEvent = serde_json::from_slice(raw)
            .map_err(|e| Error::Trigger(format!("malformed notification event: {}", e)))?;
        event.descriptor()
    }
}

impl fmt::Display for TriggerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// The subset of an S3-style notification the step reads.
#[derive(Debug, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectEntity {
    /// Form-encoded, as delivered by the notification source.
    pub key: String,
}

impl NotificationEvent {
    /// Only the first record is consulted.
    pub fn descriptor(&self) -> Result<TriggerDescriptor> {
        let record = self
            .records
            .first()
            .ok_or_else(|| Error::Trigger("notification event has no records".into()))?;

        let bucket = record.s3.bucket.name.as_str();
        if bucket.is_empty() {
            return Err(Error::Trigger("notification event has an empty bucket name".into()));
        }
        let key = decode_object_key(&record.s3.object.key);
        if key.is_empty() {
            return Err(Error::Trigger("notification event has an empty object key".into()));
        }

        Ok(TriggerDescriptor::new(bucket, key))
    }
}

/// `+` means space, then `%XX` escapes are decoded. Invalid UTF-8 sequences
/// are replaced with U+FFFD.
pub fn decode_object_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}
