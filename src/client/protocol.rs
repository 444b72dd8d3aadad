//! RocketMQ remoting commands and their frame codec
//!
//! Frame layout: `[total_len u32][serialize_type u8 | header_len u24][header][body]`, all
//! big-endian, where `total_len` covers everything after itself. Only JSON headers are
//! spoken here.

use crate::error::{ProbeError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tokio_util::codec::{Decoder, Encoder};

pub mod request_code {
    pub const SEND_MESSAGE: i32 = 10;
    pub const GET_ROUTEINFO_BY_TOPIC: i32 = 105;
}

pub mod response_code {
    pub const SUCCESS: i32 = 0;
    pub const SYSTEM_ERROR: i32 = 1;
    pub const FLUSH_DISK_TIMEOUT: i32 = 10;
    pub const SLAVE_NOT_AVAILABLE: i32 = 11;
    pub const FLUSH_SLAVE_TIMEOUT: i32 = 12;
    pub const NO_PERMISSION: i32 = 16;
    pub const TOPIC_NOT_EXIST: i32 = 17;
}

pub const JSON_SERIALIZE_TYPE: u8 = 0;
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;
const MAX_HEADER_LEN: usize = 0x00FF_FFFF;

/// Language tag understood by every broker release
pub const CLIENT_LANGUAGE: &str = "OTHER";
/// Client version ordinal advertised in request headers
pub const CLIENT_VERSION: i32 = 317;

const RESPONSE_FLAG: i32 = 0b01;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotingCommand {
    pub code: i32,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub opaque: i32,
    #[serde(default)]
    pub flag: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "BTreeMap::is_empty")]
    pub ext_fields: BTreeMap<String, String>,
    #[serde(rename = "serializeTypeCurrentRPC", default = "json_rpc_type")]
    pub serialize_type_current_rpc: String,
    #[serde(skip)]
    pub body: Bytes,
}

fn json_rpc_type() -> String {
    "JSON".to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RemotingCommand {
    pub fn request(code: i32, ext_fields: BTreeMap<String, String>, body: Bytes) -> Self {
        Self {
            code,
            language: CLIENT_LANGUAGE.to_string(),
            version: CLIENT_VERSION,
            opaque: 0,
            flag: 0,
            remark: None,
            ext_fields,
            serialize_type_current_rpc: json_rpc_type(),
            body,
        }
    }

    pub fn response(code: i32, opaque: i32, remark: Option<String>) -> Self {
        Self {
            code,
            language: CLIENT_LANGUAGE.to_string(),
            version: CLIENT_VERSION,
            opaque,
            flag: RESPONSE_FLAG,
            remark,
            ext_fields: BTreeMap::new(),
            serialize_type_current_rpc: json_rpc_type(),
            body: Bytes::new(),
        }
    }

    pub fn is_response(&self) -> bool {
        self.flag & RESPONSE_FLAG != 0
    }

    pub fn remark(&self) -> &str {
        self.remark.as_deref().unwrap_or("")
    }
}

/// Length-prefixed codec for [`RemotingCommand`]
#[derive(Debug, Default, Clone, Copy)]
pub struct RemotingCodec;

impl Decoder for RemotingCodec {
    type Item = RemotingCommand;
    type Error = ProbeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RemotingCommand>> {
        if src.len() < 4 {
            return Ok(None);
        }

        let total_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if total_len < 4 || total_len > MAX_FRAME_LEN {
            return Err(ProbeError::Protocol(format!(
                "invalid frame length {}",
                total_len
            )));
        }

        if src.len() < 4 + total_len {
            src.reserve(4 + total_len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let mut frame = src.split_to(total_len);
        let header_word = frame.get_u32();
        let serialize_type = (header_word >> 24) as u8;
        let header_len = (header_word & MAX_HEADER_LEN as u32) as usize;

        if serialize_type != JSON_SERIALIZE_TYPE {
            return Err(ProbeError::Protocol(format!(
                "unsupported header serialization type {}",
                serialize_type
            )));
        }
        if header_len > frame.len() {
            return Err(ProbeError::Protocol(format!(
                "header length {} exceeds frame length {}",
                header_len,
                frame.len()
            )));
        }

        let header = frame.split_to(header_len);
        let mut command: RemotingCommand = serde_json::from_slice(&header)?;
        command.body = frame.freeze();
        Ok(Some(command))
    }
}

impl Encoder<RemotingCommand> for RemotingCodec {
    type Error = ProbeError;

    fn encode(&mut self, item: RemotingCommand, dst: &mut BytesMut) -> Result<()> {
        let header = serde_json::to_vec(&item)?;
        if header.len() > MAX_HEADER_LEN {
            return Err(ProbeError::Protocol(format!(
                "header too large: {} bytes",
                header.len()
            )));
        }

        let total_len = 4 + header.len() + item.body.len();
        if total_len > MAX_FRAME_LEN {
            return Err(ProbeError::Protocol(format!(
                "frame too large: {} bytes",
                total_len
            )));
        }

        dst.reserve(4 + total_len);
        dst.put_u32(total_len as u32);
        dst.put_u32(((JSON_SERIALIZE_TYPE as u32) << 24) | header.len() as u32);
        dst.put_slice(&header);
        dst.put_slice(&item.body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_layout() {
        let mut fields = BTreeMap::new();
        fields.insert("topic".to_string(), "topicA".to_string());
        let command = RemotingCommand::request(
            request_code::GET_ROUTEINFO_BY_TOPIC,
            fields,
            Bytes::from_static(b"xyz"),
        );

        let mut buf = BytesMut::new();
        RemotingCodec.encode(command, &mut buf).unwrap();

        let total_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(total_len, buf.len() - 4);
        assert_eq!(buf[4], JSON_SERIALIZE_TYPE);
        let header_len = u32::from_be_bytes([0, buf[5], buf[6], buf[7]]) as usize;
        let header: serde_json::Value = serde_json::from_slice(&buf[8..8 + header_len]).unwrap();
        assert_eq!(header["code"], 105);
        assert_eq!(header["language"], "OTHER");
        assert_eq!(header["extFields"]["topic"], "topicA");
        assert_eq!(&buf[8 + header_len..], b"xyz");
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let mut buf = BytesMut::new();
        RemotingCodec
            .encode(RemotingCommand::response(0, 7, None), &mut buf)
            .unwrap();
        let mut partial = buf.split_to(buf.len() - 1);

        assert!(RemotingCodec.decode(&mut partial).unwrap().is_none());
        partial.unsplit(buf);
        let decoded = RemotingCodec.decode(&mut partial).unwrap().unwrap();
        assert!(decoded.is_response());
        assert_eq!(decoded.opaque, 7);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_decode_java_style_response() {
        // Java brokers send null extFields and remark and extra header keys
        let header = br#"{"code":16,"extFields":null,"flag":1,"language":"JAVA","opaque":3,"remark":null,"serializeTypeCurrentRPC":"JSON","version":399}"#;
        let mut buf = BytesMut::new();
        buf.put_u32((4 + header.len()) as u32);
        buf.put_u32(header.len() as u32);
        buf.put_slice(header);

        let decoded = RemotingCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.code, response_code::NO_PERMISSION);
        assert_eq!(decoded.remark(), "");
        assert!(decoded.ext_fields.is_empty());
        assert!(decoded.body.is_empty());
    }

    #[test]
    fn test_decode_rejects_binary_headers() {
        let mut buf = BytesMut::new();
        buf.put_u32(6);
        buf.put_u32((1u32 << 24) | 2);
        buf.put_slice(b"{}");
        let err = RemotingCodec.decode(&mut buf).unwrap_err();
        assert!(err.to_string().contains("unsupported header serialization type 1"));
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_LEN + 1) as u32);
        assert!(RemotingCodec.decode(&mut buf).is_err());
    }
}
