//! Scenario runner
//!
//! Drives the adapter once per scenario and turns each observation into a [`TestResult`].
//! A failing scenario never stops the run, and exactly one result is produced per scenario,
//! in declaration order, whatever the concurrency.

use crate::client::PublishAdapter;
use crate::config::BrokerConnectionConfig;
use crate::credentials::CredentialRegistry;
use crate::error::ProbeError;
use crate::outcome::{Outcome, OutcomeClass, TestResult};
use crate::report::Aggregator;
use crate::scenario::{Expectation, Scenario};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

pub struct ScenarioRunner<A> {
    adapter: A,
    concurrency: usize,
}

impl<A: PublishAdapter> ScenarioRunner<A> {
    /// Sequential runner
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` scenarios in flight. Results keep declaration order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Run every scenario, recording each result into `aggregator` as it completes
    pub async fn run(
        &self,
        scenarios: &[Scenario],
        registry: &CredentialRegistry,
        connection: &BrokerConnectionConfig,
        aggregator: &Aggregator,
    ) -> Vec<TestResult> {
        info!(
            scenarios = scenarios.len(),
            concurrency = self.concurrency,
            "Starting ACL verification run"
        );

        stream::iter(scenarios)
            .map(|scenario| self.run_scenario(scenario, registry, connection))
            .buffered(self.concurrency)
            .inspect(|result| aggregator.record(result.clone()))
            .collect()
            .await
    }

    pub async fn run_scenario(
        &self,
        scenario: &Scenario,
        registry: &CredentialRegistry,
        connection: &BrokerConnectionConfig,
    ) -> TestResult {
        info!(
            scenario = %scenario.name,
            identity = scenario.identity(),
            topic = %scenario.topic,
            expected = %scenario.expected,
            "Running scenario"
        );

        let credential = match &scenario.credential {
            Some(label) => match registry.resolve(label) {
                Ok(credential) => Some(credential),
                Err(e) => {
                    let result = misconfigured(scenario, &e);
                    log_verdict(&result);
                    return result;
                }
            },
            None => None,
        };

        let outcome = self
            .adapter
            .attempt_publish(connection, credential, &scenario.topic, &scenario.payload)
            .await;

        let result = evaluate(scenario, outcome);
        log_verdict(&result);
        result
    }
}

/// Compare an observed outcome with the scenario's expectation
pub fn evaluate(scenario: &Scenario, outcome: Outcome) -> TestResult {
    let class = outcome.class();
    let passed = class.satisfies(scenario.expected);

    let detail = match (&outcome, scenario.expected) {
        (Outcome::Delivered(id), Expectation::Allow) => {
            format!("delivered as expected (message id {})", id)
        }
        (Outcome::Delivered(id), Expectation::Deny) => {
            format!("unexpected delivery (message id {}), policy should have denied", id)
        }
        (Outcome::AuthDenied(reason), Expectation::Deny) => format!("denied as expected: {}", reason),
        (Outcome::AuthDenied(reason), Expectation::Allow) => format!("unexpected denial: {}", reason),
        (Outcome::ConnectionFailed(reason), _) => {
            format!("indeterminate, broker unreachable: {}", reason)
        }
        (Outcome::OtherError(reason), _) => {
            format!("indeterminate, no authorization verdict: {}", reason)
        }
    };

    TestResult {
        scenario: scenario.name.clone(),
        expected: scenario.expected,
        observed: Some(outcome),
        class,
        passed,
        detail,
    }
}

/// Result for a scenario whose credential cannot be resolved
pub fn misconfigured(scenario: &Scenario, error: &ProbeError) -> TestResult {
    let detail = match error {
        ProbeError::UnknownCredential(label) => {
            format!("configuration error: unresolved credential '{}'", label)
        }
        ProbeError::IncompleteCredential { label, missing } => {
            format!("configuration error: credential '{}' is missing {}", label, missing)
        }
        other => format!("configuration error: {}", other),
    };

    TestResult {
        scenario: scenario.name.clone(),
        expected: scenario.expected,
        observed: None,
        class: OutcomeClass::Misconfigured,
        passed: false,
        detail,
    }
}

fn log_verdict(result: &TestResult) {
    if result.passed {
        info!(
            scenario = %result.scenario,
            expected = %result.expected,
            observed = %result.class,
            "PASS: {}",
            result.detail
        );
    } else {
        warn!(
            scenario = %result.scenario,
            expected = %result.expected,
            observed = %result.class,
            "FAIL: {}",
            result.detail
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(expected: Expectation) -> Scenario {
        Scenario::new("s", "admin", "topic", "payload", expected)
    }

    #[test]
    fn test_evaluate_matrix() {
        let cases = [
            (Outcome::Delivered("m".into()), Expectation::Allow, true),
            (Outcome::Delivered("m".into()), Expectation::Deny, false),
            (Outcome::AuthDenied("d".into()), Expectation::Deny, true),
            (Outcome::AuthDenied("d".into()), Expectation::Allow, false),
            (Outcome::ConnectionFailed("c".into()), Expectation::Allow, false),
            (Outcome::ConnectionFailed("c".into()), Expectation::Deny, false),
            (Outcome::OtherError("o".into()), Expectation::Allow, false),
            (Outcome::OtherError("o".into()), Expectation::Deny, false),
        ];

        for (outcome, expected, passed) in cases {
            let result = evaluate(&scenario(expected), outcome.clone());
            assert_eq!(result.passed, passed, "{:?} vs {:?}", outcome, expected);
            assert_eq!(result.observed, Some(outcome));
        }
    }

    #[test]
    fn test_indeterminate_detail_names_cause() {
        let result = evaluate(
            &scenario(Expectation::Deny),
            Outcome::ConnectionFailed("connection refused".into()),
        );
        assert_eq!(result.class, OutcomeClass::Indeterminate);
        assert!(result.detail.contains("broker unreachable"));
        assert!(result.detail.contains("connection refused"));
    }

    #[test]
    fn test_misconfigured_result() {
        let error = ProbeError::UnknownCredential("ghost".to_string());
        let result = misconfigured(&scenario(Expectation::Deny), &error);
        assert!(!result.passed);
        assert!(result.observed.is_none());
        assert_eq!(result.class, OutcomeClass::Misconfigured);
        assert!(result.detail.contains("unresolved credential 'ghost'"));

        let error = ProbeError::IncompleteCredential {
            label: "reader".to_string(),
            missing: "access_key and secret_key".to_string(),
        };
        let result = misconfigured(&scenario(Expectation::Allow), &error);
        assert_eq!(result.class, OutcomeClass::Misconfigured);
        assert_eq!(
            result.detail,
            "configuration error: credential 'reader' is missing access_key and secret_key"
        );
    }
}
