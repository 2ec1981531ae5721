use std::{fmt::Display, str::FromStr, sync::Arc};

use thiserror::Error;

/// The primitive families a collection can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Counter,
    Map,
    Queue,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Counter, Family::Map, Family::Queue];

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Counter => "counter",
            Family::Map => "map",
            Family::Queue => "queue",
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid collection name {0:?}: must be non-empty and contain only ASCII letters and digits")]
pub struct InvalidName(pub String);

/// A validated collection name, matching `[A-Za-z0-9]+`.
///
/// Names are checked once at construction so backends can use them as keys
/// without further escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionName(Arc<str>);

impl CollectionName {
    pub fn parse(raw: &str) -> Result<Self, InvalidName> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(InvalidName(raw.to_string()));
        }
        Ok(Self(Arc::from(raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CollectionName {
    type Err = InvalidName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One element of a queue.
///
/// `payload` is the JSON text exactly as it was written; positions are unique
/// and strictly increasing for the lifetime of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub position: u64,
    pub payload: String,
}

impl QueueItem {
    pub fn new(position: u64, payload: impl Into<String>) -> Self {
        Self {
            position,
            payload: payload.into(),
        }
    }
}
