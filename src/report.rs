//! Result aggregation and reporting

use crate::error::Result;
use crate::outcome::TestResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Append-only store of results keyed by scenario name.
///
/// Safe to share between concurrent writers. A repeated name replaces the earlier result but
/// keeps its original position.
#[derive(Debug, Default)]
pub struct Aggregator {
    state: Mutex<AggregatorState>,
}

#[derive(Debug, Default)]
struct AggregatorState {
    order: Vec<String>,
    results: HashMap<String, TestResult>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: TestResult) {
        let mut state = self.state.lock();
        if !state.results.contains_key(&result.scenario) {
            state.order.push(result.scenario.clone());
        }
        state.results.insert(result.scenario.clone(), result);
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded results in first-recorded order
    pub fn results(&self) -> Vec<TestResult> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|name| state.results.get(name).cloned())
            .collect()
    }

    pub fn summarize(&self) -> Summary {
        Summary::from_results(&self.results())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedScenario {
    pub name: String,
    pub detail: String,
}

/// Derived view over a set of results; recomputed on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failures: Vec<FailedScenario>,
}

impl Summary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let failures = results
            .iter()
            .filter(|result| !result.passed)
            .map(|result| FailedScenario {
                name: result.scenario.clone(),
                detail: result.detail.clone(),
            })
            .collect();

        Self {
            total: results.len(),
            passed: results.iter().filter(|result| result.passed).count(),
            failures,
        }
    }

    pub fn failed(&self) -> usize {
        self.total - self.passed
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Everything a caller needs to render the run in any format
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<TestResult>,
    pub summary: Summary,
}

impl Report {
    pub fn from_aggregator(aggregator: &Aggregator) -> Self {
        let results = aggregator.results();
        let summary = Summary::from_results(&results);
        Self {
            generated_at: Utc::now(),
            results,
            summary,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render_text(&self) -> String {
        let width = self
            .results
            .iter()
            .map(|result| result.scenario.len())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for result in &self.results {
            let _ = writeln!(
                out,
                "[{}] {:<width$}  expected {}, observed {}: {}",
                if result.passed { "PASS" } else { "FAIL" },
                result.scenario,
                result.expected,
                result.class,
                result.detail,
                width = width
            );
        }

        let summary = &self.summary;
        let _ = writeln!(
            out,
            "\n{} scenarios: {} passed, {} failed",
            summary.total,
            summary.passed,
            summary.failed()
        );
        if !summary.failures.is_empty() {
            let _ = writeln!(out, "Failed:");
            for failure in &summary.failures {
                let _ = writeln!(out, "  - {}: {}", failure.name, failure.detail);
            }
        }
        out
    }
}
