// Token/session manager
// Login lifecycle, device replace/kick-out policy, and token resolution

use super::types::{
    LoginModel, Session, SessionKind, TokenConfig, TokenSign, TokenStatus, TokenStyle, BE_REPLACED,
    KICK_OUT,
};
use crate::store::{self, StoreError, TokenStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Token validation and session operation failures
#[derive(Debug)]
pub enum AuthError {
    /// Token was never issued, or its mapping is gone
    NoToken,
    InvalidToken,
    TokenTimeout,
    /// Superseded by a newer login on the same device
    BeReplaced,
    KickedOut,
    Frozen,
    /// Token lacked the required prefix
    NoPrefix,
    /// Backend failure, propagated unchanged
    Store(StoreError),
}

impl AuthError {
    /// Stable numeric identifier for the invalidity variants; outer layers
    /// map these to status codes and localized messages
    pub fn code(&self) -> Option<u32> {
        match self {
            AuthError::NoToken => Some(10000),
            AuthError::InvalidToken => Some(10001),
            AuthError::TokenTimeout => Some(10002),
            AuthError::BeReplaced => Some(10003),
            AuthError::KickedOut => Some(10004),
            AuthError::Frozen => Some(10005),
            AuthError::NoPrefix => Some(10006),
            AuthError::Store(_) => None,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::NoToken => write!(f, "token does not exist"),
            AuthError::InvalidToken => write!(f, "token is invalid"),
            AuthError::TokenTimeout => write!(f, "token has timed out"),
            AuthError::BeReplaced => write!(f, "token was replaced by a newer login"),
            AuthError::KickedOut => write!(f, "token was kicked out"),
            AuthError::Frozen => write!(f, "token is frozen"),
            AuthError::NoPrefix => write!(f, "token is missing the required prefix"),
            AuthError::Store(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Store(e)
    }
}

/// An absent identity-session is a normal outcome for lookups and logouts
fn absent_ok(result: Result<Session, AuthError>) -> Result<Option<Session>, AuthError> {
    match result {
        Ok(sess) => Ok(Some(sess)),
        Err(AuthError::Store(StoreError::ObjectNotExist)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Token/session manager: issues bearer tokens, tracks which tokens belong
/// to which identity per device, and enforces the login policy from its
/// [`TokenConfig`]
///
/// Every operation is a direct sequence of storage round-trips on the
/// caller's task; there are no cross-key transactions, no retries, and no
/// rollback of already-applied writes. Operations are idempotent or
/// self-correcting, so a partially-failed call is safe to retry as-is.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    config: TokenConfig,
    login_type: String,
}

impl TokenManager {
    /// Manager for the default `"login"` token space
    pub fn new(store: Arc<dyn TokenStore>, config: TokenConfig) -> Self {
        Self::with_login_type(store, "login", config)
    }

    /// Manager for an independent token space, e.g. `"admin"`
    pub fn with_login_type(
        store: Arc<dyn TokenStore>,
        login_type: impl Into<String>,
        config: TokenConfig,
    ) -> Self {
        Self {
            store,
            config,
            login_type: login_type.into(),
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn login_type(&self) -> &str {
        &self.login_type
    }

    // Storage keys follow {token_name}:{login_type}:{kind}:{identifier}

    fn key_session(&self, login_id: &str) -> String {
        format!(
            "{}:{}:session:{}",
            self.config.token_name, self.login_type, login_id
        )
    }

    fn key_token(&self, token: &str) -> String {
        format!(
            "{}:{}:token:{}",
            self.config.token_name, self.login_type, token
        )
    }

    fn key_token_session(&self, token: &str) -> String {
        format!(
            "{}:{}:token-session:{}",
            self.config.token_name, self.login_type, token
        )
    }

    /// Log an identity in and return its bearer token
    ///
    /// Under the single-device policy the previous login on the model's
    /// device is pushed off first; its old token resolves to
    /// [`TokenStatus::Replaced`] from now on. Under the share policy a
    /// repeat login on the same device returns the existing token. A
    /// non-empty `model.token` is used verbatim.
    pub async fn login(&self, login_id: &str, model: LoginModel) -> Result<String, AuthError> {
        let token = self.resolve_token_value(login_id, &model).await?;

        let mut sess = self.session_by_login_id(login_id, true).await?;
        sess.add_token_sign(TokenSign {
            value: token.clone(),
            device: model.device_or_default().to_string(),
            tag: Value::Null,
        });
        sess.save().await?;

        let timeout = model.timeout.unwrap_or(self.config.timeout);
        self.store
            .set(&self.key_token(&token), login_id, timeout)
            .await?;

        info!(
            "Login for {} on device {} in the {} space",
            login_id,
            model.device_or_default(),
            self.login_type
        );
        Ok(token)
    }

    /// Resolve a token to its identity
    ///
    /// The hot path: one mapping read (plus a TTL write when `auto_renew`
    /// is enabled). A sentinel in the mapping becomes its typed error so
    /// callers can present the precise invalidation reason.
    pub async fn get_login_id(&self, token: &str) -> Result<String, AuthError> {
        match self.token_status(token).await? {
            TokenStatus::Valid(login_id) => {
                if self.config.auto_renew {
                    self.store
                        .set_ttl(&self.key_token(token), self.config.timeout)
                        .await?;
                }
                Ok(login_id)
            }
            TokenStatus::NotIssued => Err(AuthError::NoToken),
            TokenStatus::Invalid => Err(AuthError::InvalidToken),
            TokenStatus::TimedOut => Err(AuthError::TokenTimeout),
            TokenStatus::Replaced => Err(AuthError::BeReplaced),
            TokenStatus::KickedOut => Err(AuthError::KickedOut),
            TokenStatus::Frozen => Err(AuthError::Frozen),
            TokenStatus::MissingPrefix => Err(AuthError::NoPrefix),
        }
    }

    /// The same mapping read without turning invalidity into an error
    pub async fn token_status(&self, token: &str) -> Result<TokenStatus, StoreError> {
        let raw = self.store.get(&self.key_token(token)).await?;
        Ok(TokenStatus::from_stored(raw.as_deref()))
    }

    /// Log a single token out. Idempotent: a token that is already gone,
    /// invalid, or half-cleaned is cleaned the rest of the way without error.
    pub async fn logout_by_token(&self, token: &str) -> Result<(), AuthError> {
        self.store.delete(&self.key_token_session(token)).await?;

        // best-effort read; an unreadable mapping leaves nothing to resolve
        let raw = self.store.get(&self.key_token(token)).await.unwrap_or(None);
        if raw.as_deref().is_some_and(|value| !value.is_empty()) {
            self.store.delete(&self.key_token(token)).await?;
        }

        let login_id = match TokenStatus::from_stored(raw.as_deref()) {
            TokenStatus::Valid(login_id) => login_id,
            _ => return Ok(()),
        };

        let Some(mut sess) = absent_ok(self.session_by_login_id(&login_id, false).await)? else {
            return Ok(());
        };
        sess.remove_token_sign(token);
        debug!("Logout by token for {}", login_id);
        self.save_or_delete(sess).await
    }

    /// Log an identity out on one device, or on every device when `device`
    /// is `None`. An absent identity-session is a successful no-op.
    pub async fn logout_by_login_id(
        &self,
        login_id: &str,
        device: Option<&str>,
    ) -> Result<(), AuthError> {
        let Some(mut sess) = absent_ok(self.session_by_login_id(login_id, false).await)? else {
            return Ok(());
        };

        let values: Vec<String> = sess
            .token_signs_by_device(device)
            .iter()
            .map(|sign| sign.value.clone())
            .collect();
        for value in &values {
            sess.remove_token_sign(value);
            self.store.delete(&self.key_token(value)).await?;
            self.store.delete(&self.key_token_session(value)).await?;
        }

        info!("Logged out {} token(s) for {}", values.len(), login_id);
        self.save_or_delete(sess).await
    }

    /// Force an identity's logins off one device (or all devices). Unlike a
    /// logout, each evicted token's mapping is overwritten with the
    /// kicked-out marker so the holder learns why it stopped working.
    pub async fn kickout(&self, login_id: &str, device: Option<&str>) -> Result<(), AuthError> {
        let Some(mut sess) = absent_ok(self.session_by_login_id(login_id, false).await)? else {
            return Ok(());
        };

        let values: Vec<String> = sess
            .token_signs_by_device(device)
            .iter()
            .map(|sign| sign.value.clone())
            .collect();
        for value in &values {
            sess.remove_token_sign(value);
            self.store.update(&self.key_token(value), KICK_OUT).await?;
        }

        if !values.is_empty() {
            info!("Kicked out {} token(s) for {}", values.len(), login_id);
        }
        self.save_or_delete(sess).await
    }

    /// Fetch (or create) the per-token session for request-scoped data.
    /// An invalid token never yields a session.
    pub async fn get_session(&self, token: &str, create: bool) -> Result<Session, AuthError> {
        self.get_login_id(token).await?;
        self.token_session_by_token(token, create).await
    }

    // --- login internals ---------------------------------------------------

    async fn resolve_token_value(
        &self,
        login_id: &str,
        model: &LoginModel,
    ) -> Result<String, AuthError> {
        // single-device policy: push previous logins off first. A model with
        // no device replaces signs on every device.
        if !self.config.is_concurrent {
            self.replace(login_id, model.device.as_deref()).await?;
        }

        if let Some(token) = model.token.as_deref() {
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }

        if self.config.is_concurrent && self.config.is_share {
            if let Some(token) = self
                .shared_token(login_id, model.device_or_default())
                .await?
            {
                return Ok(token);
            }
        }

        Ok(self.generate_token_value())
    }

    /// Remove the device's existing signs and flip their mappings to the
    /// replaced marker, keeping each mapping's remaining TTL
    async fn replace(&self, login_id: &str, device: Option<&str>) -> Result<(), AuthError> {
        let Some(mut sess) = absent_ok(self.session_by_login_id(login_id, false).await)? else {
            return Ok(());
        };

        let values: Vec<String> = sess
            .token_signs_by_device(device)
            .iter()
            .map(|sign| sign.value.clone())
            .collect();
        for value in &values {
            sess.remove_token_sign(value);
            sess.save().await?;
            self.store.update(&self.key_token(value), BE_REPLACED).await?;
        }

        if !values.is_empty() {
            info!("Replaced {} token(s) for {}", values.len(), login_id);
        }
        Ok(())
    }

    /// Existing token for this identity/device pair, if any
    async fn shared_token(
        &self,
        login_id: &str,
        device: &str,
    ) -> Result<Option<String>, AuthError> {
        Ok(absent_ok(self.session_by_login_id(login_id, false).await)?
            .and_then(|sess| sess.token_values_by_device(device).into_iter().next()))
    }

    fn generate_token_value(&self) -> String {
        match self.config.token_style {
            TokenStyle::SimpleUuid => Uuid::new_v4().simple().to_string(),
            TokenStyle::Uuid => Uuid::new_v4().to_string(),
        }
    }

    /// Delete the identity-session once its last sign is gone, else persist
    /// the reduced sign list
    async fn save_or_delete(&self, sess: Session) -> Result<(), AuthError> {
        if sess.token_sign_list.is_empty() {
            self.store.delete(&sess.id).await?;
        } else {
            sess.save().await?;
        }
        Ok(())
    }

    // --- session plumbing --------------------------------------------------

    async fn session_by_login_id(
        &self,
        login_id: &str,
        create: bool,
    ) -> Result<Session, AuthError> {
        let login_type = self.login_type.clone();
        let login_id_owned = login_id.to_string();
        self.session_by_id(self.key_session(login_id), create, move |sess| {
            sess.kind = SessionKind::Account;
            sess.login_type = login_type;
            sess.login_id = Some(login_id_owned);
        })
        .await
    }

    async fn token_session_by_token(
        &self,
        token: &str,
        create: bool,
    ) -> Result<Session, AuthError> {
        let login_type = self.login_type.clone();
        let token_owned = token.to_string();
        self.session_by_id(self.key_token_session(token), create, move |sess| {
            sess.kind = SessionKind::Token;
            sess.login_type = login_type;
            sess.token = token_owned;
        })
        .await
    }

    /// Fetch a session record, creating and persisting a fresh one on miss
    /// when `create` is set
    async fn session_by_id<F>(
        &self,
        session_id: String,
        create: bool,
        init: F,
    ) -> Result<Session, AuthError>
    where
        F: FnOnce(&mut Session),
    {
        match self.fetch_session(&session_id).await {
            Ok(sess) => Ok(sess),
            Err(StoreError::ObjectNotExist) if create => {
                let mut sess = Session::new(session_id.clone(), Arc::clone(&self.store));
                init(&mut sess);
                store::set_object(self.store.as_ref(), &session_id, &sess, self.config.timeout)
                    .await?;
                debug!("Created session record {}", session_id);
                Ok(sess)
            }
            Err(e) => Err(AuthError::Store(e)),
        }
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Session, StoreError> {
        let mut sess: Session = store::get_object(self.store.as_ref(), session_id).await?;
        sess.attach_store(Arc::clone(&self.store));
        Ok(sess)
    }
}
