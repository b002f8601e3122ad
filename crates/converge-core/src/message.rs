//! Cryptographically signed, immutable messages
//!
//! A message is a value object: signing and payload encryption return new
//! messages rather than mutating in place. Once a signature is present,
//! changing any signed field invalidates verification.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use converge_crypto::{verify_detached, CryptoError, Identity};
use converge_types::{ConvergeError, Result, Topic};

/// Payload key marking an encrypted payload envelope
pub const ENCRYPTED_KEY: &str = "_encrypted";

/// A signed communication unit exchanged between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier
    pub id: String,
    /// Fingerprint of the sending agent; empty before signing
    pub sender: String,
    /// Optional point-to-point destination fingerprint
    pub recipient: Option<String>,
    /// Topics this message is routed to, in order
    pub topics: Vec<Topic>,
    /// Message content; after encryption, the single `_encrypted` key
    pub payload: Map<String, Value>,
    /// Reference to a task context
    pub task_id: Option<String>,
    /// Milliseconds since the Unix epoch, assigned at creation
    pub timestamp: i64,
    /// Ed25519 signature over the canonical digest; empty until signed
    #[serde(with = "serde_bytes", default)]
    pub signature: Vec<u8>,
}

/// Signed fields in canonical order; the digest excludes `signature`.
///
/// MessagePack map encoding (`to_vec_named`) pins both the field order and
/// the map rendering; payload maps are B-trees, so nested keys are visited
/// lexicographically at every depth.
#[derive(Serialize)]
struct SigningFields<'a> {
    id: &'a str,
    sender: &'a str,
    recipient: Option<&'a str>,
    topics: Vec<String>,
    payload: &'a Map<String, Value>,
    task_id: Option<&'a str>,
    timestamp: i64,
}

/// Wire form: the signed fields plus the signature
#[derive(Serialize, Deserialize)]
struct WireMessage {
    id: String,
    sender: String,
    recipient: Option<String>,
    topics: Vec<String>,
    payload: Map<String, Value>,
    task_id: Option<String>,
    timestamp: i64,
    #[serde(with = "serde_bytes", default)]
    signature: Vec<u8>,
}

fn crypto_err(e: CryptoError) -> ConvergeError {
    match e {
        CryptoError::InvalidKeyFormat(r) | CryptoError::MissingPrivateKey(r) => {
            ConvergeError::InvalidArgument { reason: r }
        }
        other => ConvergeError::Crypto {
            reason: other.to_string(),
        },
    }
}

impl Message {
    /// Create an unsigned message with a fresh id and current timestamp
    pub fn new(payload: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: String::new(),
            recipient: None,
            topics: Vec::new(),
            payload,
            task_id: None,
            timestamp: Utc::now().timestamp_millis(),
            signature: Vec::new(),
        }
    }

    /// Convenience constructor for a single-key text payload
    pub fn with_content(content: impl Into<Value>) -> Self {
        let mut payload = Map::new();
        payload.insert("content".to_string(), content.into());
        Self::new(payload)
    }

    /// Set the sender fingerprint, returning the updated message
    pub fn from_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Set the point-to-point recipient, returning the updated message
    pub fn to_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Add a routing topic, returning the updated message
    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topics.push(topic);
        self
    }

    /// Attach a task context, returning the updated message
    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    fn canonical_topics(&self) -> Vec<String> {
        self.topics.iter().map(Topic::canonical).collect()
    }

    /// The canonical signing digest bytes (all fields except the signature)
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let fields = SigningFields {
            id: &self.id,
            sender: &self.sender,
            recipient: self.recipient.as_deref(),
            topics: self.canonical_topics(),
            payload: &self.payload,
            task_id: self.task_id.as_deref(),
            timestamp: self.timestamp,
        };
        rmp_serde::to_vec_named(&fields).map_err(|e| ConvergeError::serialization(e.to_string()))
    }

    /// Sign with the given identity
    ///
    /// Returns a new message whose `sender` is the identity's fingerprint
    /// and whose signature covers the canonical digest of the result.
    pub fn sign(&self, identity: &Identity) -> Result<Self> {
        let mut signed = self.clone();
        signed.sender = identity.fingerprint().to_string();
        let digest = signed.signing_bytes()?;
        signed.signature = identity.sign(&digest).map_err(crypto_err)?;
        Ok(signed)
    }

    /// Verify the signature against the sender's public key
    ///
    /// Returns false on an empty signature or any structural or
    /// cryptographic failure; never errors.
    pub fn verify(&self, sender_public_key: &[u8]) -> bool {
        if self.signature.is_empty() {
            return false;
        }
        let Ok(digest) = self.signing_bytes() else {
            return false;
        };
        verify_detached(sender_public_key, &digest, &self.signature)
    }

    /// Encrypt the payload with AES-256-GCM
    ///
    /// Returns a new message whose payload is the single `_encrypted` key
    /// holding `base64(nonce || ciphertext)`. The key must be 32 bytes.
    pub fn encrypt_payload(&self, key: &[u8]) -> Result<Self> {
        let plaintext = serde_json::to_vec(&self.payload)
            .map_err(|e| ConvergeError::serialization(e.to_string()))?;
        let envelope = converge_crypto::encrypt(&plaintext, key, None).map_err(crypto_err)?;

        let mut payload = Map::new();
        payload.insert(
            ENCRYPTED_KEY.to_string(),
            Value::String(BASE64.encode(envelope)),
        );

        let mut encrypted = self.clone();
        encrypted.payload = payload;
        Ok(encrypted)
    }

    /// Decrypt a payload produced by [`encrypt_payload`]
    ///
    /// A message without the `_encrypted` key is returned unchanged.
    pub fn decrypt_payload(&self, key: &[u8]) -> Result<Self> {
        let Some(envelope_b64) = self.payload.get(ENCRYPTED_KEY) else {
            return Ok(self.clone());
        };
        let envelope_b64 = envelope_b64
            .as_str()
            .ok_or_else(|| ConvergeError::crypto("encrypted envelope is not a string"))?;
        let envelope = BASE64
            .decode(envelope_b64)
            .map_err(|e| ConvergeError::crypto(format!("invalid base64 envelope: {e}")))?;
        let plaintext = converge_crypto::decrypt(&envelope, key, None).map_err(crypto_err)?;
        let payload: Map<String, Value> = serde_json::from_slice(&plaintext)
            .map_err(|e| ConvergeError::serialization(e.to_string()))?;

        let mut decrypted = self.clone();
        decrypted.payload = payload;
        Ok(decrypted)
    }

    /// Serialize to wire bytes (canonical encoding plus signature)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let wire = WireMessage {
            id: self.id.clone(),
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            topics: self.canonical_topics(),
            payload: self.payload.clone(),
            task_id: self.task_id.clone(),
            timestamp: self.timestamp,
            signature: self.signature.clone(),
        };
        rmp_serde::to_vec_named(&wire).map_err(|e| ConvergeError::serialization(e.to_string()))
    }

    /// Deserialize from wire bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let wire: WireMessage =
            rmp_serde::from_slice(data).map_err(|e| ConvergeError::serialization(e.to_string()))?;
        let topics = wire
            .topics
            .iter()
            .map(|s| {
                Topic::parse_canonical(s)
                    .ok_or_else(|| ConvergeError::serialization(format!("invalid topic: {s}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: wire.id,
            sender: wire.sender,
            recipient: wire.recipient,
            topics,
            payload: wire.payload,
            task_id: wire.task_id,
            timestamp: wire.timestamp,
            signature: wire.signature,
        })
    }
}
