pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod outcome;
pub mod report;
pub mod runner;
pub mod scenario;

pub use client::{PublishAdapter, RemotingAdapter};
pub use config::{BrokerConnectionConfig, ProbeConfig};
pub use credentials::{Credential, CredentialRegistry};
pub use error::{ProbeError, Result};
pub use outcome::{Outcome, OutcomeClass, TestResult};
pub use report::{Aggregator, Report, Summary};
pub use runner::ScenarioRunner;
pub use scenario::{Expectation, Scenario};
