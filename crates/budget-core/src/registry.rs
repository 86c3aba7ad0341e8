//! Event type registry.
//!
//! Maps the `event_type` discriminator of a stored event to the decoder
//! that rebuilds the typed payload and to the list of payload fields the
//! codec must encrypt. A registry is built once at startup and shared
//! read-only afterwards.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// Payload field naming the owner whose data key seals an event. It is
/// read before decryption and so can never be encrypted itself.
pub const KEY_OWNER_FIELD: &str = "user_id";

/// Wire schema of a single event payload.
pub trait EventSchema: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Discriminator stored next to the payload.
    const EVENT_TYPE: &'static str;

    /// Top-level payload fields stored encrypted.
    const ENCRYPTED_FIELDS: &'static [&'static str] = &[];
}

type Decoder<K> = Box<dyn Fn(serde_json::Value) -> Result<K, serde_json::Error> + Send + Sync>;

struct Descriptor<K> {
    encrypted_fields: &'static [&'static str],
    decode: Decoder<K>,
}

/// Immutable lookup table from event type to payload decoder.
pub struct EventTypeRegistry<K> {
    descriptors: HashMap<&'static str, Descriptor<K>>,
}

impl<K> fmt::Debug for EventTypeRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.descriptors.keys().collect();
        types.sort();
        f.debug_struct("EventTypeRegistry")
            .field("event_types", &types)
            .finish()
    }
}

impl<K: 'static> EventTypeRegistry<K> {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> EventTypeRegistryBuilder<K> {
        EventTypeRegistryBuilder {
            descriptors: HashMap::new(),
            duplicates: Vec::new(),
            sealed_owners: Vec::new(),
        }
    }

    /// Returns the encrypted fields for `event_type`, or `None` if the type
    /// is not registered.
    #[must_use]
    pub fn encrypted_fields(&self, event_type: &str) -> Option<&'static [&'static str]> {
        self.descriptors.get(event_type).map(|d| d.encrypted_fields)
    }

    /// Iterates over every registered event type with its encrypted fields.
    pub fn schemas(&self) -> impl Iterator<Item = (&'static str, &'static [&'static str])> + '_ {
        self.descriptors
            .iter()
            .map(|(event_type, d)| (*event_type, d.encrypted_fields))
    }

    /// Returns `true` if `event_type` is registered.
    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.descriptors.contains_key(event_type)
    }

    /// Decodes the (already decrypted) payload of `stored`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` for unregistered types and
    /// `DomainError::CorruptedEvent` if the payload does not match its schema.
    pub fn decode(&self, stored: &StoredEvent) -> Result<K, DomainError> {
        let descriptor = self.descriptors.get(stored.event_type.as_str()).ok_or_else(|| {
            DomainError::UnknownEventType {
                aggregate_id: stored.aggregate_id,
                event_type: stored.event_type.clone(),
            }
        })?;
        (descriptor.decode)(stored.payload.clone()).map_err(|e| DomainError::CorruptedEvent {
            aggregate_id: stored.aggregate_id,
            stream_version: stored.stream_version,
            reason: format!("payload does not match {}: {e}", stored.event_type),
        })
    }
}

/// Builder for [`EventTypeRegistry`].
pub struct EventTypeRegistryBuilder<K> {
    descriptors: HashMap<&'static str, Descriptor<K>>,
    duplicates: Vec<&'static str>,
    sealed_owners: Vec<&'static str>,
}

impl<K: 'static> EventTypeRegistryBuilder<K> {
    /// Registers payload schema `S`, wrapped into the sum type by `wrap`.
    #[must_use]
    pub fn register<S: EventSchema>(mut self, wrap: fn(S) -> K) -> Self {
        let descriptor = Descriptor {
            encrypted_fields: S::ENCRYPTED_FIELDS,
            decode: Box::new(move |value| serde_json::from_value::<S>(value).map(wrap)),
        };
        if S::ENCRYPTED_FIELDS.contains(&KEY_OWNER_FIELD) {
            self.sealed_owners.push(S::EVENT_TYPE);
        }
        if self.descriptors.insert(S::EVENT_TYPE, descriptor).is_some() {
            self.duplicates.push(S::EVENT_TYPE);
        }
        self
    }

    /// Finishes the registry.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if an event type was registered
    /// twice or lists [`KEY_OWNER_FIELD`] among its encrypted fields.
    pub fn build(self) -> Result<EventTypeRegistry<K>, DomainError> {
        if !self.sealed_owners.is_empty() {
            return Err(DomainError::Infrastructure(format!(
                "event types encrypt their key owner field {KEY_OWNER_FIELD}: {}",
                self.sealed_owners.join(", ")
            )));
        }
        if !self.duplicates.is_empty() {
            return Err(DomainError::Infrastructure(format!(
                "event types registered more than once: {}",
                self.duplicates.join(", ")
            )));
        }
        Ok(EventTypeRegistry {
            descriptors: self.descriptors,
        })
    }
}
