use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RelayError;

/// Body of a relayed message: which endpoint to call and with what payload.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageEnvelope {
    pub endpoint: Url,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl MessageEnvelope {
    /// Parses a raw delivery body. A missing or null `endpoint` is reported
    /// apart from plain JSON decode failures so logs name the actual defect,
    /// though both settle the delivery the same way.
    pub fn parse(body: &str) -> std::result::Result<Self, RelayError> {
        let raw: serde_json::Value = serde_json::from_str(body)?;
        if raw.get("endpoint").map_or(true, |v| v.is_null()) {
            return Err(RelayError::MissingEndpoint);
        }
        Ok(serde_json::from_value(raw)?)
    }
}

/// Published to the reply destination when the original message asked for
/// one. `data` is null when the downstream body was empty.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseEnvelope {
    pub status_code: u16,
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope() {
        let env =
            MessageEnvelope::parse(r#"{"endpoint":"http://svc/api","payload":{"k":"v"}}"#).unwrap();
        assert_eq!(env.endpoint.as_str(), "http://svc/api");
        assert_eq!(env.payload, Some(serde_json::json!({"k":"v"})));
    }

    #[test]
    fn test_parse_envelope_without_payload() {
        let env = MessageEnvelope::parse(r#"{"endpoint":"http://svc/api"}"#).unwrap();
        assert!(env.payload.is_none());
    }

    #[test]
    fn test_parse_envelope_missing_endpoint() {
        assert!(matches!(
            MessageEnvelope::parse(r#"{"payload":{"k":"v"}}"#),
            Err(RelayError::MissingEndpoint)
        ));
        assert!(matches!(
            MessageEnvelope::parse(r#"{"endpoint":null}"#),
            Err(RelayError::MissingEndpoint)
        ));
    }

    #[test]
    fn test_parse_envelope_malformed() {
        assert!(matches!(
            MessageEnvelope::parse("{]"),
            Err(RelayError::MalformedPayload(_))
        ));
        // An endpoint that is not a URL is a decode failure, not a missing field
        assert!(matches!(
            MessageEnvelope::parse(r#"{"endpoint":"not a url"}"#),
            Err(RelayError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_response_envelope_wire_format() {
        let envelope = ResponseEnvelope {
            status_code: 200,
            data: Some(serde_json::json!({"response":"ok"})),
        };
        assert_eq!(
            serde_json::to_string(&envelope).unwrap(),
            r#"{"status_code":200,"data":{"response":"ok"}}"#
        );
        let envelope = ResponseEnvelope {
            status_code: 204,
            data: None,
        };
        assert_eq!(
            serde_json::to_string(&envelope).unwrap(),
            r#"{"status_code":204,"data":null}"#
        );
    }
}
