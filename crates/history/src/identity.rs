use crate::KeyValueStore;
use chrono::Utc;
use rand::RngCore;
use std::fmt;
use tracing::warn;

pub const CLIENT_ID_KEY: &str = "vp_client_id";

/// Per-install token tagging every record. Identification only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
        Self(format!("cid_{}_{}", Utc::now().timestamp_millis(), hex))
    }

    /// Returns the persisted identity, creating and storing one on first use.
    /// If it cannot be stored the identity only lives for this process.
    pub fn load_or_create(kv: &mut impl KeyValueStore) -> Self {
        if let Some(existing) = kv.get(CLIENT_ID_KEY).filter(|id| !id.trim().is_empty()) {
            return Self(existing);
        }
        let identity = Self::generate();
        if let Err(err) = kv.set(CLIENT_ID_KEY, identity.as_str()) {
            warn!(error = %err, "client identity not persisted");
        }
        identity
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
