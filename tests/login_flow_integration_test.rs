use sessauth::session::{AuthError, LoginModel, TokenConfig, TokenManager, TokenStatus};
use sessauth::store::MemoryTokenStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

fn manager(config: TokenConfig) -> TokenManager {
    TokenManager::new(Arc::new(MemoryTokenStore::new()), config)
}

fn on_device(device: &str) -> LoginModel {
    LoginModel {
        device: Some(device.to_string()),
        ..LoginModel::default()
    }
}

/// Login, stash request-scoped data in the token-session, and read it back
/// through a fresh fetch
#[tokio::test]
async fn test_login_session_data_flow() {
    let mgr = manager(TokenConfig::default());

    let token = mgr.login("u1", on_device("app")).await.unwrap();

    let mut sess = mgr.get_session(&token, true).await.unwrap();
    sess.set("k", "v");
    sess.save().await.unwrap();

    let reloaded = mgr.get_session(&token, false).await.unwrap();
    assert_eq!(reloaded.get("k").and_then(Value::as_str), Some("v"));
}

/// Single-device policy: the second login supersedes the first, and the
/// superseded caller learns precisely why
#[tokio::test]
async fn test_single_device_policy_flow() {
    let mgr = manager(TokenConfig::default());

    let t1 = mgr.login("u1", LoginModel::default()).await.unwrap();
    let t2 = mgr.login("u1", LoginModel::default()).await.unwrap();
    assert_ne!(t1, t2);

    let err = mgr.get_login_id(&t1).await.unwrap_err();
    assert!(matches!(err, AuthError::BeReplaced));
    assert_eq!(err.code(), Some(10003));

    assert_eq!(mgr.get_login_id(&t2).await.unwrap(), "u1");
}

/// Multi-device logins followed by a bulk logout across all devices
#[tokio::test]
async fn test_bulk_logout_flow() {
    let mgr = manager(TokenConfig {
        is_concurrent: true,
        ..TokenConfig::default()
    });

    let app = mgr.login("u1", on_device("app")).await.unwrap();
    let web = mgr.login("u1", on_device("web")).await.unwrap();
    assert_ne!(app, web);

    mgr.logout_by_login_id("u1", None).await.unwrap();

    for token in [&app, &web] {
        let err = mgr.get_login_id(token).await.unwrap_err();
        assert!(matches!(err, AuthError::NoToken));
        assert_eq!(err.code(), Some(10000));
    }
}

/// Share policy: repeat logins on one device hand out the same token until
/// it is logged out
#[tokio::test]
async fn test_shared_token_flow() {
    let mgr = manager(TokenConfig {
        is_concurrent: true,
        is_share: true,
        ..TokenConfig::default()
    });

    let t1 = mgr.login("u1", on_device("app")).await.unwrap();
    let t2 = mgr.login("u1", on_device("app")).await.unwrap();
    assert_eq!(t1, t2);

    mgr.logout_by_token(&t1).await.unwrap();

    let t3 = mgr.login("u1", on_device("app")).await.unwrap();
    assert_ne!(t1, t3);
}

/// A never-issued token reports no status, not an error, through the
/// status API
#[tokio::test]
async fn test_token_status_flow() {
    let mgr = manager(TokenConfig::default());

    assert_eq!(
        mgr.token_status("never-issued").await.unwrap(),
        TokenStatus::NotIssued
    );

    let token = mgr.login("u1", LoginModel::default()).await.unwrap();
    assert_eq!(
        mgr.token_status(&token).await.unwrap(),
        TokenStatus::Valid("u1".to_string())
    );
}

/// Tokens expire with their mapping's TTL
#[tokio::test]
async fn test_token_expiry_flow() {
    let mgr = manager(TokenConfig {
        timeout: Duration::from_millis(40),
        ..TokenConfig::default()
    });

    let token = mgr.login("u1", LoginModel::default()).await.unwrap();
    assert_eq!(mgr.get_login_id(&token).await.unwrap(), "u1");

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(matches!(
        mgr.get_login_id(&token).await,
        Err(AuthError::NoToken)
    ));
}
