//! RocketMQ plain-ACL request signing
//!
//! The signature is HmacSHA1 over the values of all ext fields (access key included),
//! concatenated in key order, followed by the body, and Base64 encoded.

use crate::client::protocol::RemotingCommand;
use crate::credentials::Credential;
use crate::error::{ProbeError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

pub const ACCESS_KEY_FIELD: &str = "AccessKey";
pub const SIGNATURE_FIELD: &str = "Signature";

/// Add `AccessKey` and `Signature` ext fields for `credential`
pub fn sign(command: &mut RemotingCommand, credential: &Credential) -> Result<()> {
    command.ext_fields.remove(SIGNATURE_FIELD);
    command
        .ext_fields
        .insert(ACCESS_KEY_FIELD.to_string(), credential.access_key.clone());

    let signature = signature(&command.ext_fields, &command.body, &credential.secret_key)?;
    command
        .ext_fields
        .insert(SIGNATURE_FIELD.to_string(), signature);
    Ok(())
}

pub fn signature(fields: &BTreeMap<String, String>, body: &[u8], secret_key: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret_key.as_bytes())
        .map_err(|e| ProbeError::Protocol(format!("cannot key request signature: {}", e)))?;
    for value in fields.values() {
        mac.update(value.as_bytes());
    }
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::protocol::request_code;
    use bytes::Bytes;

    #[test]
    fn test_signature_matches_rfc2202_vector() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), "what do ya ".to_string());
        fields.insert("b".to_string(), "want for nothing?".to_string());

        assert_eq!(
            signature(&fields, b"", "Jefe").unwrap(),
            "7/zfauXrL6LSdBbV8YTfnCWafHk="
        );
    }

    #[test]
    fn test_sign_includes_access_key_and_body() {
        let mut fields = BTreeMap::new();
        fields.insert("topic".to_string(), "topicA".to_string());
        let mut command = RemotingCommand::request(
            request_code::SEND_MESSAGE,
            fields,
            Bytes::from_static(b"body"),
        );

        sign(&mut command, &Credential::new("admin", "rocketmq2", "12345678")).unwrap();

        assert_eq!(command.ext_fields[ACCESS_KEY_FIELD], "rocketmq2");
        assert_eq!(command.ext_fields[SIGNATURE_FIELD], "8aLxBlbZ2jtZt1nvKtwK5eeHFIw=");
    }

    #[test]
    fn test_resigning_replaces_signature() {
        let mut command = RemotingCommand::request(request_code::SEND_MESSAGE, BTreeMap::new(), Bytes::new());
        sign(&mut command, &Credential::new("a", "ak", "one")).unwrap();
        let first = command.ext_fields[SIGNATURE_FIELD].clone();
        sign(&mut command, &Credential::new("a", "ak", "two")).unwrap();

        assert_ne!(first, command.ext_fields[SIGNATURE_FIELD]);
        assert_eq!(command.ext_fields.len(), 2);
    }
}
