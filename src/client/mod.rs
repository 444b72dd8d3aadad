//! Broker client adapter
//!
//! [`PublishAdapter`] is the only seam between the harness and a live broker: one call, one
//! publish attempt, one classified [`Outcome`]. It never compares against expectations, so the
//! runner can be driven by canned outcomes in tests.

pub mod protocol;
pub mod route;
pub mod session;
pub mod signing;

use crate::config::{BrokerConnectionConfig, DenialConfig};
use crate::credentials::Credential;
use crate::outcome::Outcome;
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

pub use session::{PublishSession, RemotingConnection};

#[async_trait]
pub trait PublishAdapter: Send + Sync {
    /// Attempt exactly one publish of `payload` to `topic`.
    ///
    /// `credential` is `None` for anonymous attempts. Every resource acquired for the attempt
    /// is released before this returns.
    async fn attempt_publish(
        &self,
        connection: &BrokerConnectionConfig,
        credential: Option<&Credential>,
        topic: &str,
        payload: &[u8],
    ) -> Outcome;
}

/// Adapter speaking the RocketMQ remoting protocol with plain-ACL signing
#[derive(Debug, Clone, Default)]
pub struct RemotingAdapter {
    denial: DenialConfig,
}

impl RemotingAdapter {
    pub fn new(denial: DenialConfig) -> Self {
        Self { denial }
    }

    pub fn denial(&self) -> &DenialConfig {
        &self.denial
    }
}

#[async_trait]
impl PublishAdapter for RemotingAdapter {
    async fn attempt_publish(
        &self,
        connection: &BrokerConnectionConfig,
        credential: Option<&Credential>,
        topic: &str,
        payload: &[u8],
    ) -> Outcome {
        let mut session = PublishSession::new(connection, credential, &self.denial);

        let outcome = match timeout(connection.attempt_timeout, session.publish(topic, payload)).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::OtherError(format!(
                "publish attempt timed out after {}ms",
                connection.attempt_timeout.as_millis()
            )),
        };

        session.shutdown().await;
        debug!(topic = %topic, outcome = %outcome, "Publish attempt finished");
        outcome
    }
}
