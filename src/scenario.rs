//! Scenario definitions
//!
//! A scenario binds an identity, a topic and a payload to the verdict the ACL policy is
//! supposed to produce. Scenarios are independent of each other; their order only fixes the
//! order of the report.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the policy is expected to do with a publish
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    Allow,
    Deny,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Allow => write!(f, "ALLOW"),
            Expectation::Deny => write!(f, "DENY"),
        }
    }
}

/// One (identity, topic, expectation) probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Unique name, used as the result key
    pub name: String,

    /// Registry label of the identity; `None` publishes without any credential
    pub credential: Option<String>,

    pub topic: String,

    pub payload: Bytes,

    pub expected: Expectation,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        credential: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        expected: Expectation,
    ) -> Self {
        Self {
            name: name.into(),
            credential: Some(credential.into()),
            topic: topic.into(),
            payload: payload.into(),
            expected,
        }
    }

    /// A scenario that sends no access key or signature at all
    pub fn anonymous(
        name: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        expected: Expectation,
    ) -> Self {
        Self {
            name: name.into(),
            credential: None,
            topic: topic.into(),
            payload: payload.into(),
            expected,
        }
    }

    /// Human-readable identity for logs and listings
    pub fn identity(&self) -> &str {
        self.credential.as_deref().unwrap_or("<anonymous>")
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} -> {}] expect {}",
            self.name,
            self.identity(),
            self.topic,
            self.expected
        )
    }
}
