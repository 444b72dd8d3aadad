//! Per-attempt broker session
//!
//! A session owns every socket it opens. [`PublishSession::shutdown`] closes them all and is
//! called by the adapter on every exit path, including an elapsed attempt deadline.

use crate::client::protocol::{request_code, response_code, RemotingCodec, RemotingCommand};
use crate::client::route::{PublishTarget, TopicRouteData};
use crate::client::signing;
use crate::config::{BrokerConnectionConfig, DenialConfig};
use crate::credentials::Credential;
use crate::error::{ProbeError, Result};
use crate::outcome::Outcome;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};
use uuid::Uuid;

/// Topic the broker clones when auto-creating topics
const DEFAULT_TOPIC: &str = "TBW102";
const DEFAULT_TOPIC_QUEUE_NUMS: i32 = 4;

const NAME_VALUE_SEPARATOR: char = '\u{1}';
const PROPERTY_SEPARATOR: char = '\u{2}';
const PROPERTY_UNIQ_KEY: &str = "UNIQ_KEY";
const PROPERTY_WAIT_STORE_MSG_OK: &str = "WAIT";

/// A single TCP connection speaking the remoting protocol
pub struct RemotingConnection {
    addr: String,
    framed: Framed<TcpStream, RemotingCodec>,
    next_opaque: i32,
}

impl RemotingConnection {
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProbeError::Timeout {
                timeout_ms: connect_timeout.as_millis() as u64,
            })?
            .map_err(|e| ProbeError::Connection(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true)?;

        debug!(addr = %addr, "Connected");
        Ok(Self {
            addr: addr.to_string(),
            framed: Framed::new(stream, RemotingCodec),
            next_opaque: 0,
        })
    }

    /// Send `request` and wait for the response carrying the same opaque
    pub async fn invoke(
        &mut self,
        mut request: RemotingCommand,
        request_timeout: Duration,
    ) -> Result<RemotingCommand> {
        self.next_opaque = self.next_opaque.wrapping_add(1);
        request.opaque = self.next_opaque;
        let opaque = request.opaque;
        debug!(addr = %self.addr, code = request.code, opaque, "Sending request");

        timeout(
            request_timeout,
            Self::exchange(&mut self.framed, &self.addr, request, opaque),
        )
        .await
        .map_err(|_| ProbeError::Timeout {
            timeout_ms: request_timeout.as_millis() as u64,
        })?
    }

    async fn exchange(
        framed: &mut Framed<TcpStream, RemotingCodec>,
        addr: &str,
        request: RemotingCommand,
        opaque: i32,
    ) -> Result<RemotingCommand> {
        framed.send(request).await?;
        loop {
            match framed.next().await {
                Some(Ok(reply)) if reply.is_response() && reply.opaque == opaque => return Ok(reply),
                Some(Ok(other)) => {
                    debug!(addr = %addr, code = other.code, opaque = other.opaque, "Ignoring unrelated frame");
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(ProbeError::Connection(format!(
                        "{} closed the connection",
                        addr
                    )))
                }
            }
        }
    }

    pub async fn close(mut self) {
        if let Err(e) = self.framed.close().await {
            debug!(addr = %self.addr, error = %e, "Error while closing connection");
        }
    }
}

type Step<T> = std::result::Result<T, Outcome>;

/// Name server lookup plus one send, observed and classified
pub struct PublishSession<'a> {
    connection: &'a BrokerConnectionConfig,
    credential: Option<&'a Credential>,
    denial: &'a DenialConfig,
    name_server: Option<RemotingConnection>,
    broker: Option<RemotingConnection>,
}

impl<'a> PublishSession<'a> {
    pub fn new(
        connection: &'a BrokerConnectionConfig,
        credential: Option<&'a Credential>,
        denial: &'a DenialConfig,
    ) -> Self {
        Self {
            connection,
            credential,
            denial,
            name_server: None,
            broker: None,
        }
    }

    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Outcome {
        match self.try_publish(topic, payload).await {
            Ok(outcome) | Err(outcome) => outcome,
        }
    }

    /// Close every connection opened by this session
    pub async fn shutdown(&mut self) {
        if let Some(name_server) = self.name_server.take() {
            name_server.close().await;
        }
        if let Some(broker) = self.broker.take() {
            broker.close().await;
        }
    }

    async fn try_publish(&mut self, topic: &str, payload: &[u8]) -> Step<Outcome> {
        let route = self.lookup_route(topic).await?;
        let target = route.publish_target().ok_or_else(|| {
            Outcome::OtherError(format!("no writable master broker in route for topic {}", topic))
        })?;
        self.send(&target, topic, payload).await
    }

    async fn connect_name_server(&mut self) -> Step<&mut RemotingConnection> {
        let connection = self.connection;
        let mut failures = Vec::new();
        for addr in &connection.name_servers {
            match RemotingConnection::connect(addr, connection.connect_timeout).await {
                Ok(name_server) => return Ok(self.name_server.insert(name_server)),
                Err(e) => {
                    warn!(name_server = %addr, error = %e, "Name server unreachable");
                    failures.push(e.to_string());
                }
            }
        }

        Err(Outcome::ConnectionFailed(format!(
            "no name server reachable: {}",
            failures.join("; ")
        )))
    }

    async fn lookup_route(&mut self, topic: &str) -> Step<TopicRouteData> {
        let mut fields = BTreeMap::new();
        fields.insert("topic".to_string(), topic.to_string());
        let request = self.signed(RemotingCommand::request(
            request_code::GET_ROUTEINFO_BY_TOPIC,
            fields,
            Bytes::new(),
        ))?;

        let request_timeout = self.connection.request_timeout;
        let name_server = self.connect_name_server().await?;
        let reply = name_server
            .invoke(request, request_timeout)
            .await
            .map_err(|e| Outcome::OtherError(format!("route lookup failed: {}", e)))?;

        match reply.code {
            response_code::SUCCESS => TopicRouteData::parse(&reply.body)
                .map_err(|e| Outcome::OtherError(format!("malformed route data: {}", e))),
            code if self.denial.is_denial(code, reply.remark()) => {
                Err(Outcome::AuthDenied(describe(code, reply.remark())))
            }
            response_code::TOPIC_NOT_EXIST => Err(Outcome::OtherError(format!(
                "no route for topic {}: {}",
                topic,
                reply.remark()
            ))),
            code => Err(Outcome::OtherError(format!(
                "route lookup rejected, {}",
                describe(code, reply.remark())
            ))),
        }
    }

    async fn send(&mut self, target: &PublishTarget, topic: &str, payload: &[u8]) -> Step<Outcome> {
        let message_id = Uuid::new_v4().simple().to_string().to_uppercase();
        let request = self.signed(RemotingCommand::request(
            request_code::SEND_MESSAGE,
            self.send_header(target, topic, &message_id),
            Bytes::copy_from_slice(payload),
        ))?;

        let broker = RemotingConnection::connect(&target.addr, self.connection.connect_timeout)
            .await
            .map_err(|e| {
                Outcome::ConnectionFailed(format!("broker {} unreachable: {}", target.broker_name, e))
            })?;
        let broker = self.broker.insert(broker);

        let reply = broker
            .invoke(request, self.connection.request_timeout)
            .await
            .map_err(|e| Outcome::OtherError(format!("send failed: {}", e)))?;

        let outcome = match reply.code {
            response_code::SUCCESS
            | response_code::FLUSH_DISK_TIMEOUT
            | response_code::FLUSH_SLAVE_TIMEOUT
            | response_code::SLAVE_NOT_AVAILABLE => {
                debug!(
                    message_id = %message_id,
                    offset_msg_id = reply.ext_fields.get("msgId").map(String::as_str).unwrap_or(""),
                    code = reply.code,
                    "Message stored"
                );
                Outcome::Delivered(message_id)
            }
            code if self.denial.is_denial(code, reply.remark()) => {
                Outcome::AuthDenied(describe(code, reply.remark()))
            }
            code => Outcome::OtherError(format!("send rejected, {}", describe(code, reply.remark()))),
        };
        Ok(outcome)
    }

    fn send_header(&self, target: &PublishTarget, topic: &str, message_id: &str) -> BTreeMap<String, String> {
        let properties = format!(
            "{}{}{}{}{}{}{}{}",
            PROPERTY_UNIQ_KEY,
            NAME_VALUE_SEPARATOR,
            message_id,
            PROPERTY_SEPARATOR,
            PROPERTY_WAIT_STORE_MSG_OK,
            NAME_VALUE_SEPARATOR,
            "true",
            PROPERTY_SEPARATOR
        );

        let mut fields = BTreeMap::new();
        fields.insert("producerGroup".to_string(), self.producer_group());
        fields.insert("topic".to_string(), topic.to_string());
        fields.insert("defaultTopic".to_string(), DEFAULT_TOPIC.to_string());
        fields.insert("defaultTopicQueueNums".to_string(), DEFAULT_TOPIC_QUEUE_NUMS.to_string());
        fields.insert("queueId".to_string(), target.queue_id.to_string());
        fields.insert("sysFlag".to_string(), "0".to_string());
        fields.insert("bornTimestamp".to_string(), chrono::Utc::now().timestamp_millis().to_string());
        fields.insert("flag".to_string(), "0".to_string());
        fields.insert("properties".to_string(), properties);
        fields.insert("reconsumeTimes".to_string(), "0".to_string());
        fields.insert("unitMode".to_string(), "false".to_string());
        fields.insert("batch".to_string(), "false".to_string());
        fields
    }

    fn producer_group(&self) -> String {
        producer_group(
            &self.connection.group_prefix,
            self.credential.map(|credential| credential.label.as_str()),
        )
    }

    fn signed(&self, mut request: RemotingCommand) -> Step<RemotingCommand> {
        if let Some(credential) = self.credential {
            signing::sign(&mut request, credential)
                .map_err(|e| Outcome::OtherError(format!("cannot sign request: {}", e)))?;
        }
        Ok(request)
    }
}

/// Producer group for an identity, restricted to the characters brokers accept
pub fn producer_group(prefix: &str, label: Option<&str>) -> String {
    let label: String = label
        .unwrap_or("anonymous")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '%' | '|') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}", prefix, label)
}

fn describe(code: i32, remark: &str) -> String {
    if remark.is_empty() {
        format!("code {}", code)
    } else {
        format!("code {}: {}", code, remark)
    }
}
