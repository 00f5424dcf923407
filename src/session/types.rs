// Session entity and token policy types

use crate::store::{self, StoreError, TokenStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Device recorded for a login that did not name one
pub const DEFAULT_DEVICE: &str = "default-device";

// Sentinel values stored in the token→identity mapping in place of a real
// identity, recording why a token stopped being valid. A real identity is
// any non-empty string that is none of these.
pub(crate) const NOT_TOKEN: &str = "-1";
pub(crate) const INVALID_TOKEN: &str = "-2";
pub(crate) const TOKEN_TIMEOUT: &str = "-3";
pub(crate) const BE_REPLACED: &str = "-4";
pub(crate) const KICK_OUT: &str = "-5";
pub(crate) const TOKEN_FREEZE: &str = "-6";
pub(crate) const NO_PREFIX: &str = "-7";

/// Token/session policy, fixed at manager construction
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Namespace prefix for every storage key
    pub token_name: String,
    /// Session timeout; the TTL applied to every record written
    pub timeout: Duration,
    /// Idle timeout; carried for configuration compatibility, not enforced
    /// by the core
    pub active_timeout: Option<Duration>,
    /// Allow one identity to stay logged in on several devices at once
    pub is_concurrent: bool,
    /// When concurrent, a repeat login on the same device reuses the
    /// existing token instead of minting a new one
    pub is_share: bool,
    /// Shape of generated token values
    pub token_style: TokenStyle,
    /// Push the mapping TTL back to `timeout` on every successful lookup
    pub auto_renew: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            token_name: "sessauth".to_string(),
            timeout: Duration::from_secs(30 * 60),
            active_timeout: None,
            is_concurrent: false,
            is_share: false,
            token_style: TokenStyle::SimpleUuid,
            auto_renew: false,
        }
    }
}

/// Shape of generated token values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenStyle {
    /// 32 lowercase hex characters, no separators
    #[default]
    SimpleUuid,
    /// Hyphenated v4 uuid
    Uuid,
}

/// Per-login options
#[derive(Debug, Clone, Default)]
pub struct LoginModel {
    /// Device this login belongs to; defaults to [`DEFAULT_DEVICE`]
    pub device: Option<String>,
    /// Overrides the configured timeout for this login's token mapping
    pub timeout: Option<Duration>,
    /// Caller-supplied fixed token value; skips generation when non-empty
    pub token: Option<String>,
}

impl LoginModel {
    pub(crate) fn device_or_default(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }
}

/// One active login for one identity on one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSign {
    pub value: String,
    pub device: String,
    #[serde(default)]
    pub tag: Value,
}

/// Discriminates the stored session shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    /// Aggregate record of one identity's active tokens
    #[serde(rename = "Account-Session")]
    Account,
    /// Private data bag of one issued token
    #[serde(rename = "Token-Session")]
    Token,
    /// Caller-managed record outside the two lifecycles above
    #[serde(rename = "Custom-Session")]
    Custom,
}

/// Outcome of resolving a token against the token→identity mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// Token currently maps to a live identity
    Valid(String),
    /// Token was never issued, or its mapping is gone
    NotIssued,
    Invalid,
    TimedOut,
    /// Superseded by a newer login on the same device
    Replaced,
    KickedOut,
    Frozen,
    MissingPrefix,
}

impl TokenStatus {
    /// Decode a raw mapping value; absent and empty both mean never issued
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw {
            None | Some("") | Some(NOT_TOKEN) => TokenStatus::NotIssued,
            Some(INVALID_TOKEN) => TokenStatus::Invalid,
            Some(TOKEN_TIMEOUT) => TokenStatus::TimedOut,
            Some(BE_REPLACED) => TokenStatus::Replaced,
            Some(KICK_OUT) => TokenStatus::KickedOut,
            Some(TOKEN_FREEZE) => TokenStatus::Frozen,
            Some(NO_PREFIX) => TokenStatus::MissingPrefix,
            Some(login_id) => TokenStatus::Valid(login_id.to_string()),
        }
    }
}

/// A stored session record: either an identity's aggregate login state or
/// one token's private data bag
///
/// In-memory copies are independent of the stored record until [`save`]
/// performs a full overwrite; nothing is written implicitly. Mutators take
/// `&mut self`: a `Session` is not safe for shared concurrent mutation
/// across copies, and two copies of the same stored key saving concurrently
/// is last-write-wins. Callers needing stronger consistency must serialize
/// their read-modify-write cycles per key.
///
/// [`save`]: Session::save
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub login_type: String,
    /// Set on identity sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
    /// Set on token sessions
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    /// Milliseconds since epoch at creation
    pub create_time: i64,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub token_sign_list: Vec<TokenSign>,
    #[serde(skip)]
    pub(crate) store: Option<Arc<dyn TokenStore>>,
}

impl Session {
    pub(crate) fn new(id: String, store: Arc<dyn TokenStore>) -> Self {
        Self {
            id,
            kind: SessionKind::Custom,
            login_type: String::new(),
            login_id: None,
            token: String::new(),
            create_time: Utc::now().timestamp_millis(),
            data: HashMap::new(),
            token_sign_list: Vec::new(),
            store: Some(store),
        }
    }

    /// Re-bind a deserialized session to the store it was loaded from
    pub(crate) fn attach_store(&mut self, store: Arc<dyn TokenStore>) {
        self.store = Some(store);
    }

    /// Read a value from the free-form data map
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Write a value into the free-form data map
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Remove a value from the free-form data map
    pub fn delete(&mut self, key: &str) {
        self.data.remove(key);
    }

    /// Persist this session: a full overwrite of the stored record,
    /// keeping its remaining TTL
    pub async fn save(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store::update_object(store.as_ref(), &self.id, self).await,
            None => Err(StoreError::Connection(
                "session is not attached to a store".to_string(),
            )),
        }
    }

    /// Add a sign, or overwrite the device/tag of an existing one in place.
    /// The sign list never holds two entries with the same value.
    pub(crate) fn add_token_sign(&mut self, sign: TokenSign) {
        match self
            .token_sign_list
            .iter_mut()
            .find(|existing| existing.value == sign.value)
        {
            Some(existing) => {
                existing.device = sign.device;
                existing.tag = sign.tag;
            }
            None => self.token_sign_list.push(sign),
        }
    }

    pub(crate) fn remove_token_sign(&mut self, token_value: &str) {
        self.token_sign_list.retain(|sign| sign.value != token_value);
    }

    /// Signs for one device, or every sign when `device` is `None`
    pub fn token_signs_by_device(&self, device: Option<&str>) -> Vec<&TokenSign> {
        self.token_sign_list
            .iter()
            .filter(|sign| device.map_or(true, |d| sign.device == d))
            .collect()
    }

    /// Token values held by one device
    pub fn token_values_by_device(&self, device: &str) -> Vec<String> {
        self.token_sign_list
            .iter()
            .filter(|sign| sign.device == device)
            .map(|sign| sign.value.clone())
            .collect()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("login_type", &self.login_type)
            .field("login_id", &self.login_id)
            .field("token", &self.token)
            .field("create_time", &self.create_time)
            .field("data", &self.data)
            .field("token_sign_list", &self.token_sign_list)
            .finish()
    }
}
