use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::content::ContentKind;

/// Object described by a storage-finalize event.
///
/// Immutable for one invocation. `name` is the unique object identifier used for
/// both destination naming and status-record keying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    pub name: String,
    pub bucket: String,
    #[serde(deserialize_with = "deserialize_size")]
    pub size: u64,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub media_link: Option<String>,
}

impl ObjectDescriptor {
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        size: u64,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            bucket: bucket.into(),
            size,
            content_type: content_type.into(),
            media_link: None,
        }
    }

    pub fn content_kind(&self) -> Option<ContentKind> {
        ContentKind::from_content_type(&self.content_type)
    }
}

/// Trigger payload as delivered by the event runtime: either wrapped as
/// `{"data": ..., "context": ...}` or the bare object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TriggerEvent {
    Wrapped {
        data: ObjectDescriptor,
        #[serde(default)]
        context: serde_json::Value,
    },
    Bare(ObjectDescriptor),
}

impl TriggerEvent {
    pub fn into_descriptor(self) -> ObjectDescriptor {
        match self {
            TriggerEvent::Wrapped { data, .. } => data,
            TriggerEvent::Bare(data) => data,
        }
    }

    pub fn context(&self) -> Option<&serde_json::Value> {
        match self {
            TriggerEvent::Wrapped { context, .. } if !context.is_null() => Some(context),
            _ => None,
        }
    }
}

// Storage events encode `size` as a decimal string.
fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct SizeVisitor;

    impl<'de> Visitor<'de> for SizeVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom(format!("negative size: {}", v)))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.trim()
                .parse::<u64>()
                .map_err(|_| E::custom(format!("invalid size: {:?}", v)))
        }
    }

    deserializer.deserialize_any(SizeVisitor)
}
