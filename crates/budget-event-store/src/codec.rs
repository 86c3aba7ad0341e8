//! Event codec: selective payload encryption.
//!
//! Designated top-level fields of an event payload are serialized to JSON
//! and sealed with the data key of the payload's owner. The owner is the
//! `user_id` field when present, otherwise the aggregate itself. The owner
//! field is never encrypted; the registry refuses schemas that try.

use std::collections::HashMap;
use std::sync::Arc;

use budget_core::error::DomainError;
use budget_core::projection::EventDecoder;
use budget_core::registry::EventTypeRegistry;
pub use budget_core::registry::KEY_OWNER_FIELD;
use budget_core::repository::StoredEvent;
use serde_json::Value;
use uuid::Uuid;

use crate::cipher::{self, CipherError, KeyProvider};

/// Encrypts and decrypts designated payload fields.
#[derive(Clone)]
pub struct EventCodec {
    keys: Arc<dyn KeyProvider>,
}

impl std::fmt::Debug for EventCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCodec").finish_non_exhaustive()
    }
}

impl EventCodec {
    /// Creates a codec over a key provider.
    #[must_use]
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Self { keys }
    }

    /// Returns a copy of `event` with `encrypted_fields` sealed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the payload is not an object,
    /// no key can be obtained, or encryption fails.
    pub fn encode(
        &self,
        event: &StoredEvent,
        encrypted_fields: &[&str],
    ) -> Result<StoredEvent, DomainError> {
        if encrypted_fields.is_empty() {
            return Ok(event.clone());
        }
        let mut encoded = event.clone();
        let owner = key_owner(event);
        let key = self.keys.ensure_key(owner)?;
        let fields = encoded.payload.as_object_mut().ok_or_else(|| {
            DomainError::Infrastructure(format!(
                "payload of {} is not an object",
                event.event_type
            ))
        })?;
        for name in encrypted_fields {
            let Some(value) = fields.get_mut(*name) else {
                continue;
            };
            let plaintext = serde_json::to_vec(value).map_err(|e| {
                DomainError::Infrastructure(format!("field {name} serialization failed: {e}"))
            })?;
            let sealed = cipher::seal(&key, &plaintext).map_err(|e| {
                DomainError::Infrastructure(format!("field {name} encryption failed: {e}"))
            })?;
            *value = Value::String(sealed);
        }
        Ok(encoded)
    }

    /// Returns a copy of `event` with `encrypted_fields` opened.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::CorruptedEvent` if a designated field is not
    /// sealed, the owner's key is missing, or decryption fails.
    pub fn decode(
        &self,
        event: &StoredEvent,
        encrypted_fields: &[&str],
    ) -> Result<StoredEvent, DomainError> {
        if encrypted_fields.is_empty() {
            return Ok(event.clone());
        }
        let corrupted = |reason: String| DomainError::CorruptedEvent {
            aggregate_id: event.aggregate_id,
            stream_version: event.stream_version,
            reason,
        };
        let mut decoded = event.clone();
        let owner = key_owner(event);
        let key = self
            .keys
            .key_for(owner)?
            .ok_or_else(|| corrupted(format!("no encryption key for owner {owner}")))?;
        let fields = decoded
            .payload
            .as_object_mut()
            .ok_or_else(|| corrupted("payload is not an object".to_owned()))?;
        for name in encrypted_fields {
            let Some(value) = fields.get_mut(*name) else {
                continue;
            };
            let sealed = value
                .as_str()
                .ok_or_else(|| corrupted(format!("field {name} is not sealed")))?;
            let plaintext = cipher::open(&key, sealed)
                .map_err(|e| corrupted(format!("field {name}: {e}")))?;
            *value = serde_json::from_slice(&plaintext)
                .map_err(|e| corrupted(format!("field {name} is not JSON: {e}")))?;
        }
        Ok(decoded)
    }

    /// Seals a whole snapshot state under `owner`'s key.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on key or encryption failure.
    pub fn seal_state(&self, owner: Uuid, state: &Value) -> Result<Value, DomainError> {
        let key = self.keys.ensure_key(owner)?;
        let plaintext = serde_json::to_vec(state).map_err(|e| {
            DomainError::Infrastructure(format!("snapshot serialization failed: {e}"))
        })?;
        let sealed = cipher::seal(&key, &plaintext).map_err(|e| {
            DomainError::Infrastructure(format!("snapshot encryption failed: {e}"))
        })?;
        Ok(Value::String(sealed))
    }

    /// Opens a snapshot state sealed by [`EventCodec::seal_state`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the key is missing or the
    /// state cannot be decrypted.
    pub fn open_state(&self, owner: Uuid, sealed: &Value) -> Result<Value, DomainError> {
        let key = self.keys.key_for(owner)?.ok_or_else(|| {
            DomainError::Infrastructure(format!("no encryption key for owner {owner}"))
        })?;
        let sealed = sealed
            .as_str()
            .ok_or(CipherError::NotSealed)
            .map_err(snapshot_error)?;
        let plaintext = cipher::open(&key, sealed).map_err(snapshot_error)?;
        serde_json::from_slice(&plaintext).map_err(|e| {
            DomainError::Infrastructure(format!("snapshot state is not JSON: {e}"))
        })
    }
}

/// Opens stored events of any registered type, for consumers that read the
/// whole log rather than one aggregate's stream.
#[derive(Clone)]
pub struct PayloadDecoder {
    codec: EventCodec,
    encrypted_fields: HashMap<&'static str, &'static [&'static str]>,
}

impl std::fmt::Debug for PayloadDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.encrypted_fields.keys().collect();
        types.sort();
        f.debug_struct("PayloadDecoder")
            .field("event_types", &types)
            .finish_non_exhaustive()
    }
}

impl PayloadDecoder {
    /// Creates a decoder that knows no event types yet.
    #[must_use]
    pub fn new(codec: EventCodec) -> Self {
        Self {
            codec,
            encrypted_fields: HashMap::new(),
        }
    }

    /// Adds every event type of `registry`.
    #[must_use]
    pub fn with_registry<K: 'static>(mut self, registry: &EventTypeRegistry<K>) -> Self {
        self.encrypted_fields.extend(registry.schemas());
        self
    }
}

impl EventDecoder for PayloadDecoder {
    fn decode(&self, event: &StoredEvent) -> Result<StoredEvent, DomainError> {
        let fields = self
            .encrypted_fields
            .get(event.event_type.as_str())
            .ok_or_else(|| DomainError::UnknownEventType {
                aggregate_id: event.aggregate_id,
                event_type: event.event_type.clone(),
            })?;
        self.codec.decode(event, fields)
    }
}

fn snapshot_error(e: CipherError) -> DomainError {
    DomainError::Infrastructure(format!("snapshot decryption failed: {e}"))
}

fn key_owner(event: &StoredEvent) -> Uuid {
    event
        .payload
        .get(KEY_OWNER_FIELD)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or(event.aggregate_id)
}
