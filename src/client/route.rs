//! Topic route data returned by the name server

use crate::error::Result;
use serde::Deserialize;
use std::collections::HashMap;

pub const PERM_WRITE: i32 = 0x2;
pub const MASTER_ID: &str = "0";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRouteData {
    #[serde(default)]
    pub queue_datas: Vec<QueueData>,
    #[serde(default)]
    pub broker_datas: Vec<BrokerData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueData {
    pub broker_name: String,
    #[serde(default)]
    pub read_queue_nums: i32,
    #[serde(default)]
    pub write_queue_nums: i32,
    #[serde(default)]
    pub perm: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerData {
    #[serde(default)]
    pub cluster: String,
    pub broker_name: String,
    #[serde(default)]
    pub broker_addrs: HashMap<String, String>,
}

/// Master broker and queue a message will be sent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub broker_name: String,
    pub addr: String,
    pub queue_id: i32,
}

impl TopicRouteData {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(body);
        Ok(serde_json::from_str(&quote_numeric_keys(&text))?)
    }

    /// First writable queue whose broker has a reachable master
    pub fn publish_target(&self) -> Option<PublishTarget> {
        self.queue_datas
            .iter()
            .filter(|queue| queue.write_queue_nums > 0 && queue.perm & PERM_WRITE != 0)
            .find_map(|queue| {
                let broker = self
                    .broker_datas
                    .iter()
                    .find(|broker| broker.broker_name == queue.broker_name)?;
                let addr = broker.broker_addrs.get(MASTER_ID)?;
                Some(PublishTarget {
                    broker_name: broker.broker_name.clone(),
                    addr: addr.clone(),
                    queue_id: 0,
                })
            })
    }
}

/// Name servers serialize `brokerAddrs` with bare integer keys (`{0:"host:port"}`), which is
/// not JSON. Quote integer tokens that sit in key position.
pub(crate) fn quote_numeric_keys(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut key_position = false;
    let mut skip_until = 0;

    for (i, c) in raw.char_indices() {
        if i < skip_until {
            continue;
        }

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                key_position = false;
                out.push(c);
            }
            '{' | ',' => {
                key_position = true;
                out.push(c);
            }
            c if c.is_ascii_whitespace() => out.push(c),
            c if key_position && (c.is_ascii_digit() || c == '-') => {
                let end = i + 1 + bytes[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
                let next = bytes[end..]
                    .iter()
                    .position(|b| !b.is_ascii_whitespace())
                    .map(|offset| bytes[end + offset]);
                if next == Some(b':') {
                    out.push('"');
                    out.push_str(&raw[i..end]);
                    out.push('"');
                } else {
                    out.push_str(&raw[i..end]);
                }
                skip_until = end;
                key_position = false;
            }
            _ => {
                key_position = false;
                out.push(c);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ROUTE: &str = r#"{"brokerDatas":[{"brokerAddrs":{0:"10.0.0.5:10911",1:"10.0.0.6:10911"},"brokerName":"broker-a","cluster":"DefaultCluster"}],"filterServerTable":{},"queueDatas":[{"brokerName":"broker-a","perm":6,"readQueueNums":4,"topicSysFlag":0,"writeQueueNums":4}]}"#;

    #[test]
    fn test_quote_numeric_keys() {
        assert_eq!(
            quote_numeric_keys(r#"{0:"a", 1 : "b","n":[1,2,-3],"s":"{5:x}"}"#),
            r#"{"0":"a", "1" : "b","n":[1,2,-3],"s":"{5:x}"}"#
        );
    }

    #[test]
    fn test_quote_numeric_keys_leaves_valid_json_alone() {
        let json = r#"{"a":{"b":[1.5,{"c":2}]},"d":"x\"y"}"#;
        assert_eq!(quote_numeric_keys(json), json);
    }

    #[test]
    fn test_parse_name_server_route() {
        let route = TopicRouteData::parse(ROUTE.as_bytes()).unwrap();
        assert_eq!(route.broker_datas[0].broker_addrs["0"], "10.0.0.5:10911");
        assert_eq!(
            route.publish_target(),
            Some(PublishTarget {
                broker_name: "broker-a".to_string(),
                addr: "10.0.0.5:10911".to_string(),
                queue_id: 0,
            })
        );
    }

    #[test]
    fn test_read_only_route_has_no_target() {
        let body = ROUTE.replace(r#""perm":6"#, r#""perm":4"#);
        let route = TopicRouteData::parse(body.as_bytes()).unwrap();
        assert_eq!(route.publish_target(), None);
    }

    #[test]
    fn test_route_without_master_has_no_target() {
        let body = ROUTE.replace(r#"0:"10.0.0.5:10911","#, "");
        let route = TopicRouteData::parse(body.as_bytes()).unwrap();
        assert_eq!(route.publish_target(), None);
    }
}
