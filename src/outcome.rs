//! Observed outcomes and per-scenario results

use crate::scenario::Expectation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified result of a single publish attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// The broker acknowledged the message; carries the message id
    Delivered(String),

    /// The broker refused the request on authorization grounds
    AuthDenied(String),

    /// No session could be established with the broker
    ConnectionFailed(String),

    /// Any other failure that says nothing about the policy
    OtherError(String),
}

impl Outcome {
    pub fn class(&self) -> OutcomeClass {
        match self {
            Outcome::Delivered(_) => OutcomeClass::Allow,
            Outcome::AuthDenied(_) => OutcomeClass::Deny,
            Outcome::ConnectionFailed(_) | Outcome::OtherError(_) => OutcomeClass::Indeterminate,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Outcome::Delivered(detail)
            | Outcome::AuthDenied(detail)
            | Outcome::ConnectionFailed(detail)
            | Outcome::OtherError(detail) => detail,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Delivered(id) => write!(f, "Delivered({})", id),
            Outcome::AuthDenied(detail) => write!(f, "AuthDenied({})", detail),
            Outcome::ConnectionFailed(detail) => write!(f, "ConnectionFailed({})", detail),
            Outcome::OtherError(detail) => write!(f, "OtherError({})", detail),
        }
    }
}

/// Outcome class compared against a scenario's expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Allow,
    Deny,
    /// Transport or protocol failure; never equals an expectation
    Indeterminate,
    /// The scenario could not be attempted because its setup is broken
    Misconfigured,
}

impl OutcomeClass {
    pub fn satisfies(self, expected: Expectation) -> bool {
        matches!(
            (self, expected),
            (OutcomeClass::Allow, Expectation::Allow) | (OutcomeClass::Deny, Expectation::Deny)
        )
    }
}

impl fmt::Display for OutcomeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeClass::Allow => write!(f, "ALLOW"),
            OutcomeClass::Deny => write!(f, "DENY"),
            OutcomeClass::Indeterminate => write!(f, "INDETERMINATE"),
            OutcomeClass::Misconfigured => write!(f, "MISCONFIGURED"),
        }
    }
}

/// Verdict for one scenario. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub scenario: String,
    pub expected: Expectation,
    /// Adapter observation; absent when the scenario never reached the broker
    pub observed: Option<Outcome>,
    pub class: OutcomeClass,
    pub passed: bool,
    pub detail: String,
}
