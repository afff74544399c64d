//! Credential store behavior against token files on disk and a mock token endpoint

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mockito::Matcher;
use serde_json::json;
use tempfile::TempDir;

use gmail_mcp::config::{gmail::SCOPES, Config};
use gmail_mcp::error::{AuthError, ConfigError, GmailMcpError, Result};
use gmail_mcp::gmail::auth::{unix_now, Authorizer, OAuthKeys, StoredCredentials};
use gmail_mcp::gmail::credentials::CredentialStore;

/// Authorizer that hands out a fixed credential and counts how often it ran
struct StubAuthorizer {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Authorizer for StubAuthorizer {
    async fn authorize(&self, keys: &OAuthKeys, scopes: &[String]) -> Result<StoredCredentials> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StoredCredentials {
            access_token: "fresh-from-consent".to_string(),
            refresh_token: Some("consent-refresh".to_string()),
            token_type: "Bearer".to_string(),
            expiry_date: Some(unix_now() + 3600),
            scopes: scopes.to_vec(),
            client_id: Some(keys.client_id.clone()),
            client_secret: Some(keys.client_secret.clone()),
            token_uri: Some(keys.token_uri.clone()),
        })
    }
}

struct Fixture {
    dir: TempDir,
    calls: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn config(&self) -> Config {
        Config::with_paths(
            self.dir.path().join("token.json"),
            self.dir.path().join("credentials.json"),
        )
    }

    fn store(&self) -> CredentialStore {
        let authorizer = StubAuthorizer {
            calls: self.calls.clone(),
        };
        CredentialStore::new(&self.config(), Box::new(authorizer))
    }

    fn write_token(&self, token: serde_json::Value) {
        std::fs::write(self.config().token_path, token.to_string()).unwrap();
    }

    fn write_credentials_file(&self, token_uri: &str) {
        let keys = json!({
            "installed": {
                "client_id": "client-123",
                "client_secret": "secret-456",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": token_uri,
                "redirect_uris": ["http://localhost"]
            }
        });
        std::fs::write(self.config().credentials_path, keys.to_string()).unwrap();
    }

    fn read_token(&self) -> StoredCredentials {
        let content = std::fs::read_to_string(self.config().token_path).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    fn authorizer_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn test_no_token_and_no_credentials_file() {
    let fixture = Fixture::new();
    let store = fixture.store();

    let preflight = store.preflight().unwrap_err();
    assert!(matches!(
        preflight,
        GmailMcpError::Config(ConfigError::CredentialsFileNotFound { .. })
    ));

    let err = store.get_session().await.unwrap_err();
    assert!(matches!(
        err,
        GmailMcpError::Config(ConfigError::CredentialsFileNotFound { .. })
    ));
    assert!(err.to_string().contains("credentials.json"));
    assert_eq!(fixture.authorizer_calls(), 0);
}

#[tokio::test]
async fn test_valid_token_used_as_is() {
    let fixture = Fixture::new();
    fixture.write_token(json!({
        "access_token": "still-good",
        "refresh_token": "r",
        "expiry_date": unix_now() + 3600,
        "scopes": SCOPES,
    }));

    let store = fixture.store();
    tokio_test::assert_ok!(store.preflight());

    let session = store.get_session().await.unwrap();
    assert_eq!(session.access_token(), "still-good");
    assert_eq!(session.scopes().len(), 3);
    assert_eq!(fixture.authorizer_calls(), 0);
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let mut server = mockito::Server::new_async().await;
    let token_endpoint = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "long-lived".into()),
            Matcher::UrlEncoded("client_id".into(), "client-123".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"refreshed","expires_in":3599,"token_type":"Bearer"}"#)
        .expect(1)
        .create_async()
        .await;

    let fixture = Fixture::new();
    fixture.write_token(json!({
        "access_token": "stale",
        "refresh_token": "long-lived",
        "expiry_date": unix_now() - 10,
        "scopes": SCOPES,
        "client_id": "client-123",
        "client_secret": "secret-456",
        "token_uri": format!("{}/token", server.url()),
    }));

    let session = fixture.store().get_session().await.unwrap();
    assert_eq!(session.access_token(), "refreshed");
    token_endpoint.assert_async().await;

    let persisted = fixture.read_token();
    assert_eq!(persisted.access_token, "refreshed");
    assert_eq!(persisted.refresh_token.as_deref(), Some("long-lived"));
    assert!(persisted.expiry_date.unwrap() > unix_now());
    assert_eq!(fixture.authorizer_calls(), 0);
}

#[tokio::test]
async fn test_refresh_uses_credentials_file_when_token_lacks_client() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"via-keys-file","expires_in":3599}"#)
        .expect(1)
        .create_async()
        .await;

    let fixture = Fixture::new();
    fixture.write_credentials_file(&format!("{}/token", server.url()));
    fixture.write_token(json!({
        "access_token": "stale",
        "refresh_token": "long-lived",
        "expiry_date": unix_now() - 10,
    }));

    let session = fixture.store().get_session().await.unwrap();
    assert_eq!(session.access_token(), "via-keys-file");
    assert_eq!(fixture.read_token().client_id.as_deref(), Some("client-123"));
}

#[tokio::test]
async fn test_rejected_refresh_fails_once_then_reauthorizes() {
    let mut server = mockito::Server::new_async().await;
    let token_endpoint = server
        .mock("POST", "/token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#)
        .expect(1)
        .create_async()
        .await;

    let fixture = Fixture::new();
    fixture.write_credentials_file(&format!("{}/token", server.url()));
    fixture.write_token(json!({
        "access_token": "stale",
        "refresh_token": "revoked",
        "expiry_date": unix_now() - 10,
        "scopes": SCOPES,
        "client_id": "client-123",
        "client_secret": "secret-456",
        "token_uri": format!("{}/token", server.url()),
    }));

    let store = fixture.store();

    // The rejecting call fails without starting consent
    let err = store.get_session().await.unwrap_err();
    assert!(matches!(err, GmailMcpError::Auth(AuthError::RefreshRejected { .. })));
    assert!(err.to_string().contains("invalid_grant"));
    assert_eq!(fixture.authorizer_calls(), 0);
    assert_eq!(fixture.read_token().refresh_token, None);

    // The revoked refresh token is not retried
    let session = store.get_session().await.unwrap();
    assert_eq!(session.access_token(), "fresh-from-consent");
    assert_eq!(fixture.authorizer_calls(), 1);
    token_endpoint.assert_async().await;
}

#[tokio::test]
async fn test_legacy_token_file_with_rfc3339_expiry_is_refreshed() {
    let mut server = mockito::Server::new_async().await;
    let token_endpoint = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"refreshed","expires_in":3599}"#)
        .expect(1)
        .create_async()
        .await;

    let fixture = Fixture::new();
    fixture.write_token(json!({
        "token": "stale-since-2020",
        "refresh_token": "long-lived",
        "token_uri": format!("{}/token", server.url()),
        "client_id": "client-123",
        "client_secret": "secret-456",
        "scopes": SCOPES,
        "expiry": "2020-01-01T00:00:00.000000Z",
    }));

    let session = fixture.store().get_session().await.unwrap();
    assert_eq!(session.access_token(), "refreshed");
    token_endpoint.assert_async().await;

    let persisted = fixture.read_token();
    assert_eq!(persisted.refresh_token.as_deref(), Some("long-lived"));
    assert!(persisted.expiry_date.unwrap() > unix_now());
    assert_eq!(fixture.authorizer_calls(), 0);
}

#[tokio::test]
async fn test_first_run_authorizes_and_persists() {
    let fixture = Fixture::new();
    fixture.write_credentials_file("https://oauth2.googleapis.com/token");

    let store = fixture.store();
    let session = store.get_session().await.unwrap();

    assert_eq!(session.access_token(), "fresh-from-consent");
    assert_eq!(fixture.authorizer_calls(), 1);

    let persisted = fixture.read_token();
    assert_eq!(persisted.access_token, "fresh-from-consent");
    assert_eq!(persisted.client_id.as_deref(), Some("client-123"));

    // The persisted token is reused on the next call
    store.get_session().await.unwrap();
    assert_eq!(fixture.authorizer_calls(), 1);
}

#[tokio::test]
async fn test_malformed_token_file_treated_as_absent() {
    let fixture = Fixture::new();
    fixture.write_credentials_file("https://oauth2.googleapis.com/token");
    std::fs::write(fixture.config().token_path, "{ this is not json").unwrap();

    let session = fixture.store().get_session().await.unwrap();
    assert_eq!(session.access_token(), "fresh-from-consent");
    assert_eq!(fixture.authorizer_calls(), 1);
}

#[tokio::test]
async fn test_scope_change_forces_reauthorization() {
    let fixture = Fixture::new();
    fixture.write_credentials_file("https://oauth2.googleapis.com/token");
    fixture.write_token(json!({
        "access_token": "narrow",
        "expiry_date": unix_now() + 3600,
        "scopes": ["https://www.googleapis.com/auth/gmail.readonly"],
    }));

    let session = fixture.store().get_session().await.unwrap();
    assert_eq!(session.access_token(), "fresh-from-consent");
    assert_eq!(fixture.authorizer_calls(), 1);
    assert_eq!(fixture.read_token().scopes.len(), 3);
}

#[tokio::test]
async fn test_expired_without_refresh_token_reauthorizes() {
    let fixture = Fixture::new();
    fixture.write_credentials_file("https://oauth2.googleapis.com/token");
    fixture.write_token(json!({
        "access_token": "stale",
        "expiry_date": unix_now() - 10,
    }));

    let session = fixture.store().get_session().await.unwrap();
    assert_eq!(session.access_token(), "fresh-from-consent");
    assert_eq!(fixture.authorizer_calls(), 1);
}
