// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn token_config_parses() {
    let config: AuthConfig =
        serde_json::from_str(r#"{"type": "Token", "token": "ghp_abc123"}"#).unwrap();
    assert!(matches!(config, AuthConfig::Token { ref token } if token.as_str() == "ghp_abc123"));
}

#[test]
fn app_config_parses() {
    let config: AuthConfig = serde_json::from_str(
        r#"{
            "type": "App",
            "app": {
                "appId": 12345,
                "installationId": 67890,
                "privateKeyPath": "/etc/corral/key.pem"
            }
        }"#,
    )
    .unwrap();

    let AuthConfig::App { app } = config else {
        panic!("expected App variant");
    };
    assert_eq!(app.app_id, 12345);
    assert_eq!(app.installation_id, 67890);
    assert_eq!(app.private_key_path.to_str(), Some("/etc/corral/key.pem"));
}

#[test]
fn unknown_auth_type_is_rejected() {
    let result = serde_json::from_str::<AuthConfig>(r#"{"type": "Password", "token": "x"}"#);
    assert!(result.is_err());
}

#[tokio::test]
async fn token_auth_builds_client() {
    let config = AuthConfig::Token {
        token: "ghp_abc123".to_string(),
    };
    assert!(config.create_client().is_ok());
}

#[test]
fn app_auth_with_missing_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = AuthConfig::App {
        app: AppAuthConfig {
            app_id: 1,
            installation_id: 2,
            private_key_path: dir.path().join("missing.pem"),
        },
    };
    assert!(matches!(
        config.create_client(),
        Err(AuthError::PrivateKey { .. })
    ));
}

#[test]
fn app_auth_with_garbage_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("key.pem");
    std::fs::write(&key_path, "not a pem").unwrap();

    let config = AuthConfig::App {
        app: AppAuthConfig {
            app_id: 1,
            installation_id: 2,
            private_key_path: key_path,
        },
    };
    assert!(matches!(
        config.create_client(),
        Err(AuthError::InvalidKey(_))
    ));
}
