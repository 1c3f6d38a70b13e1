//! Event payloads and the delivery-channel push envelope.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use ledgerline_shared::types::TenantId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::error::EventError;
use crate::event::reference::ReferenceType;

/// What happened to the referenced document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Document was confirmed; post its ledger effect.
    #[default]
    Create,
    /// Document changed; reverse the active effect and post the new one.
    Update,
    /// Document was voided; reverse the active effect.
    Void,
    /// Document was deleted; reverse the active effect.
    Delete,
}

impl EventAction {
    /// Returns true if existing rows for the reference must be reversed first.
    #[must_use]
    pub const fn reverses_existing(self) -> bool {
        !matches!(self, Self::Create)
    }

    /// Returns true if new rows are posted for the reference.
    #[must_use]
    pub const fn posts_new(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Void => "void",
            Self::Delete => "delete",
        }
    }
}

/// A business event that must be applied to the ledger exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Owning business.
    pub tenant_id: TenantId,
    /// Kind of document that changed.
    pub reference_type: ReferenceType,
    /// Identifier of the document within its kind.
    pub reference_id: String,
    /// Logical message identity used for idempotency.
    pub message_id: String,
    /// Correlation id carried from the originating request.
    #[serde(default)]
    pub correlation_id: String,
    /// What happened to the document.
    #[serde(default)]
    pub action: EventAction,
    /// Accounting date the effect applies to.
    pub effective_date: NaiveDate,
    /// Business-specific fields consumed by the posting routine.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LedgerEvent {
    /// Decodes and validates an event from a JSON value.
    ///
    /// A missing correlation id falls back to the message id.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        if let Some(raw) = value.get("reference_type").and_then(Value::as_str) {
            raw.parse::<ReferenceType>()?;
        }
        let mut event: Self = serde_json::from_value(value)
            .map_err(|e| EventError::InvalidPayload(e.to_string()))?;
        event.validate()?;
        if event.correlation_id.trim().is_empty() {
            event.correlation_id.clone_from(&event.message_id);
        }
        Ok(event)
    }

    /// Decodes and validates an event from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EventError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| EventError::InvalidPayload(e.to_string()))?;
        Self::from_value(value)
    }

    /// Checks that every required identifier is present.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.tenant_id.0.is_nil() {
            return Err(EventError::MissingIdentifier("tenant_id"));
        }
        if self.reference_id.trim().is_empty() {
            return Err(EventError::MissingIdentifier("reference_id"));
        }
        if self.message_id.trim().is_empty() {
            return Err(EventError::MissingIdentifier("message_id"));
        }
        Ok(())
    }

    /// Serializes the event for publishing.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Deserializes a business field, if present.
    pub fn field<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>, EventError> {
        self.fields
            .get(name)
            .map(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| EventError::InvalidPayload(format!("field `{name}`: {e}")))
            })
            .transpose()
    }
}

/// Message wrapper delivered by the channel's push subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    /// The delivered message.
    pub message: PushMessage,
    /// Subscription that delivered it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

/// One delivered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    /// Channel-assigned message id.
    pub message_id: String,
    /// The event body.
    pub data: Value,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// When the channel accepted the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<DateTime<Utc>>,
}

impl PushEnvelope {
    /// Wraps an event for publishing.
    #[must_use]
    pub fn wrap(event: &LedgerEvent, subscription: Option<String>) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("tenant_id".to_string(), event.tenant_id.to_string());
        attributes.insert(
            "reference_type".to_string(),
            event.reference_type.as_str().to_string(),
        );
        attributes.insert("correlation_id".to_string(), event.correlation_id.clone());
        Self {
            message: PushMessage {
                message_id: event.message_id.clone(),
                data: event.to_value(),
                attributes,
                publish_time: Some(Utc::now()),
            },
            subscription,
        }
    }

    /// Parses a push body and extracts the event.
    ///
    /// When the event body carries no `message_id`, the channel's message id
    /// is used instead so redeliveries still deduplicate.
    pub fn decode(bytes: &[u8]) -> Result<LedgerEvent, EventError> {
        let envelope: Self = serde_json::from_slice(bytes)
            .map_err(|e| EventError::InvalidPayload(e.to_string()))?;
        envelope.into_event()
    }

    /// Extracts the event from an already parsed envelope.
    pub fn into_event(self) -> Result<LedgerEvent, EventError> {
        let mut data = self.message.data;
        let Value::Object(ref mut map) = data else {
            return Err(EventError::InvalidPayload(
                "message data must be a JSON object".to_string(),
            ));
        };
        let has_message_id = map
            .get("message_id")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !has_message_id {
            map.insert(
                "message_id".to_string(),
                Value::String(self.message.message_id),
            );
        }
        LedgerEvent::from_value(data)
    }
}
