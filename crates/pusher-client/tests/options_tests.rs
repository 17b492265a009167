//! Tests for loading options from TOML.

use std::time::Duration;

use pusher_client::{PusherAuth, PusherError, PusherOptions, ReconnectConfig};

#[test]
fn test_empty_document_gives_defaults() {
    let options = PusherOptions::from_toml_str("").unwrap();
    assert_eq!(options, PusherOptions::default());
    assert_eq!(options.cluster, "mt1");
    assert_eq!(options.port, 443);
    assert!(options.encrypted);
    assert!(options.auth.is_none());
}

#[test]
fn test_full_document() {
    let options = PusherOptions::from_toml_str(
        r#"
        cluster = "ap2"
        host = "socket.example.com"
        port = 6001
        encrypted = false

        [auth]
        endpoint = "https://example.com/broadcasting/auth"

        [auth.headers]
        Authorization = "Bearer token"
        X-Tenant = "acme"
        "#,
    )
    .unwrap();

    let expected = PusherOptions::new()
        .cluster("ap2")
        .host("socket.example.com")
        .port(6001)
        .encrypted(false)
        .auth(
            PusherAuth::new("https://example.com/broadcasting/auth")
                .header("Authorization", "Bearer token")
                .header("X-Tenant", "acme"),
        );
    assert_eq!(options, expected);

    let url = options.endpoint("key").unwrap();
    assert!(url.as_str().starts_with("ws://socket.example.com:6001/app/key?protocol=5"));
}

#[test]
fn test_tuning_is_not_loaded_from_file() {
    let options = PusherOptions::from_toml_str("cluster = \"eu\"").unwrap();
    assert_eq!(options.connect_timeout, Duration::from_secs(10));
    assert_eq!(options.reconnect, ReconnectConfig::default());
}

#[test]
fn test_invalid_document() {
    let result = PusherOptions::from_toml_str("port = \"not a number\"");
    assert!(matches!(result, Err(PusherError::Config(_))));
}
