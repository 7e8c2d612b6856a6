//! Control messages delivered to a connector by the control-plane transport
//!
//! On the wire a control message is a JSON object carrying an `action` string
//! plus action-specific fields. The three outgoing actions are decoded into
//! typed requests; anything else is kept as a [`GenericMessage`] for the base
//! protocol to inspect.

use crate::descriptor::ConnectorDescriptor;
use crate::error::{ConnectorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ACTION_SEND: &str = "OUTGOING_ZMQ_SEND";
pub const ACTION_EDIT: &str = "OUTGOING_ZMQ_EDIT";
pub const ACTION_DELETE: &str = "OUTGOING_ZMQ_DELETE";

/// Dispatch key for control messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Send,
    Edit,
    Delete,
    Generic,
}

impl ActionKind {
    /// Actions routed to a connector by name
    pub fn is_outgoing(self) -> bool {
        matches!(self, ActionKind::Send | ActionKind::Edit | ActionKind::Delete)
    }
}

/// Put a payload on the named connector's socket
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SendRequest {
    pub name: String,
    pub body: String,

    /// Carried for the producer's benefit, never interpreted by the connector
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeleteRequest {
    pub name: String,
}

/// Any action the outgoing connector does not own
#[derive(Debug, Clone, PartialEq)]
pub struct GenericMessage {
    pub action: String,
    pub name: Option<String>,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Send(SendRequest),
    /// Carries the replacement descriptor in full
    Edit(ConnectorDescriptor),
    Delete(DeleteRequest),
    Generic(GenericMessage),
}

impl ControlMessage {
    pub fn send(name: impl Into<String>, body: impl Into<String>) -> Self {
        ControlMessage::Send(SendRequest {
            name: name.into(),
            body: body.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        })
    }

    pub fn delete(name: impl Into<String>) -> Self {
        ControlMessage::Delete(DeleteRequest { name: name.into() })
    }

    pub fn generic(action: impl Into<String>) -> Self {
        ControlMessage::Generic(GenericMessage {
            action: action.into(),
            name: None,
            fields: Map::new(),
        })
    }

    pub fn action(&self) -> ActionKind {
        match self {
            ControlMessage::Send(_) => ActionKind::Send,
            ControlMessage::Edit(_) => ActionKind::Edit,
            ControlMessage::Delete(_) => ActionKind::Delete,
            ControlMessage::Generic(_) => ActionKind::Generic,
        }
    }

    /// The action string as it appears on the wire
    pub fn action_name(&self) -> &str {
        match self {
            ControlMessage::Send(_) => ACTION_SEND,
            ControlMessage::Edit(_) => ACTION_EDIT,
            ControlMessage::Delete(_) => ACTION_DELETE,
            ControlMessage::Generic(msg) => &msg.action,
        }
    }

    /// Target connector name, if the message carries one
    pub fn name(&self) -> Option<&str> {
        match self {
            ControlMessage::Send(req) => Some(&req.name),
            ControlMessage::Edit(descriptor) => Some(&descriptor.name),
            ControlMessage::Delete(req) => Some(&req.name),
            ControlMessage::Generic(msg) => msg.name.as_deref(),
        }
    }

    /// Decode one JSON control message
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let mut fields: Map<String, Value> = serde_json::from_slice(raw)?;

        let action = match fields.remove("action") {
            Some(Value::String(action)) => action,
            Some(other) => {
                return Err(ConnectorError::MalformedMessage(format!(
                    "action must be a string, got {}",
                    other
                )))
            }
            None => {
                return Err(ConnectorError::MalformedMessage(
                    "missing 'action' field".to_string(),
                ))
            }
        };

        let message = match action.as_str() {
            ACTION_SEND => ControlMessage::Send(serde_json::from_value(Value::Object(fields))?),
            ACTION_EDIT => ControlMessage::Edit(serde_json::from_value(Value::Object(fields))?),
            ACTION_DELETE => ControlMessage::Delete(serde_json::from_value(Value::Object(fields))?),
            _ => {
                let name = fields
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                ControlMessage::Generic(GenericMessage {
                    action,
                    name,
                    fields,
                })
            }
        };

        Ok(message)
    }

    /// Encode as a single-line JSON object
    pub fn to_json(&self) -> Result<String> {
        let mut fields = match self {
            ControlMessage::Send(req) => into_object(serde_json::to_value(req)?),
            ControlMessage::Edit(descriptor) => into_object(serde_json::to_value(descriptor)?),
            ControlMessage::Delete(req) => into_object(serde_json::to_value(req)?),
            ControlMessage::Generic(msg) => {
                let mut fields = msg.fields.clone();
                if let Some(name) = &msg.name {
                    fields.insert("name".to_string(), Value::String(name.clone()));
                }
                fields
            }
        };

        fields.insert(
            "action".to_string(),
            Value::String(self.action_name().to_string()),
        );

        Ok(serde_json::to_string(&Value::Object(fields))?)
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ConnectorId, SocketKind};

    #[test]
    fn test_decode_send() {
        let raw = br#"{"action":"OUTGOING_ZMQ_SEND","name":"orders","body":"hello","args":[1],"kwargs":{"k":"v"}}"#;
        let msg = ControlMessage::from_json(raw).unwrap();

        assert_eq!(msg.action(), ActionKind::Send);
        assert_eq!(msg.name(), Some("orders"));
        match msg {
            ControlMessage::Send(req) => {
                assert_eq!(req.body, "hello");
                assert_eq!(req.args.len(), 1);
                assert_eq!(req.kwargs["k"], "v");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_decode_edit_carries_descriptor() {
        let raw = br#"{"action":"OUTGOING_ZMQ_EDIT","id":4,"name":"orders","address":"tcp://10.0.0.1:7000","socket_kind":"pub","is_active":true}"#;
        let msg = ControlMessage::from_json(raw).unwrap();

        match msg {
            ControlMessage::Edit(descriptor) => {
                assert_eq!(descriptor.id, ConnectorId(4));
                assert_eq!(descriptor.address, "tcp://10.0.0.1:7000");
                assert_eq!(descriptor.socket_kind, SocketKind::Pub);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_is_generic() {
        let raw = br#"{"action":"CLOSE","reason":"shutdown"}"#;
        let msg = ControlMessage::from_json(raw).unwrap();

        assert_eq!(msg.action(), ActionKind::Generic);
        assert_eq!(msg.action_name(), "CLOSE");
        assert_eq!(msg.name(), None);
    }

    #[test]
    fn test_missing_action_rejected() {
        let err = ControlMessage::from_json(br#"{"name":"orders"}"#).unwrap_err();
        assert!(matches!(err, ConnectorError::MalformedMessage(_)));

        let err = ControlMessage::from_json(br#"{"action":7}"#).unwrap_err();
        assert!(matches!(err, ConnectorError::MalformedMessage(_)));
    }

    #[test]
    fn test_send_missing_body_rejected() {
        let err = ControlMessage::from_json(br#"{"action":"OUTGOING_ZMQ_SEND","name":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, ConnectorError::MalformedMessage(_)));
    }

    #[test]
    fn test_encoded_delete_keeps_action() {
        let json = ControlMessage::delete("orders").to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["action"], ACTION_DELETE);
        assert_eq!(value["name"], "orders");
    }
}
