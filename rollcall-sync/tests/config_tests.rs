use pretty_assertions::assert_eq;
use rollcall_sync::{ListenerConfig, SubscribeOptions, SyncConfig};
use std::time::Duration;

#[test]
fn defaults() {
    let config = SyncConfig::default();
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.default_ttl(), Duration::from_secs(60));
    assert!(config.collection_ttls_ms.is_empty());
    assert_eq!(config.listener, ListenerConfig::default());
    assert_eq!(config.listener.throttle_ms, 250);
    assert_eq!(config.listener.max_retries, 5);
}

#[test]
fn partial_json_keeps_defaults() {
    let config = SyncConfig::from_json(
        r#"{
            "default_ttl_ms": 5000,
            "collection_ttls_ms": { "notices": 1000 },
            "listener": { "max_retries": 2 }
        }"#,
    )
    .unwrap();

    assert_eq!(config.default_ttl(), Duration::from_secs(5));
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.listener.max_retries, 2);
    assert_eq!(config.listener.throttle_ms, 250);
    assert_eq!(config.ttl_for("notices"), Duration::from_secs(1));
    assert_eq!(config.ttl_for("classes"), Duration::from_secs(5));
}

#[test]
fn empty_json_is_default() {
    assert_eq!(SyncConfig::from_json("{}").unwrap(), SyncConfig::default());
}

#[test]
fn malformed_json_is_rejected() {
    assert!(SyncConfig::from_json(r#"{"default_ttl_ms": "soon"}"#).is_err());
}

#[test]
fn collection_override_builder() {
    let config = SyncConfig::default().with_collection_ttl("students", Duration::from_secs(600));
    assert_eq!(config.ttl_for("students"), Duration::from_secs(600));
    assert_eq!(config.ttl_for("classes"), config.default_ttl());
}

#[test]
fn oversized_ttl_saturates() {
    let config = SyncConfig::default().with_collection_ttl("notices", Duration::MAX);
    assert_eq!(config.ttl_for("notices"), Duration::from_millis(u64::MAX));
}

#[test]
fn subscribe_options_follow_listener_config() {
    let listener = ListenerConfig {
        throttle_ms: 0,
        max_retries: 1,
        retry_delay_ms: 20,
        max_retry_delay_ms: 40,
    };
    let options = SubscribeOptions::from(&listener);
    assert!(options.throttle.is_zero());
    assert_eq!(options.max_retries, 1);
    assert_eq!(options.retry_delay, Duration::from_millis(20));
    assert_eq!(options.max_retry_delay, Duration::from_millis(40));
}
