// Session management module
// Token issuance, device login policy, and per-token session state

pub mod manager;
pub mod types;

pub use manager::{AuthError, TokenManager};
pub use types::{
    LoginModel, Session, SessionKind, TokenConfig, TokenSign, TokenStatus, TokenStyle,
    DEFAULT_DEVICE,
};
