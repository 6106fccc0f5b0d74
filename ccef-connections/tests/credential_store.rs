//! Integration tests for credential resolution against the process
//! environment: cache idempotence across env changes, and the optional
//! lookup path.
//!
//! Each test uses a uniquely named variable so tests stay independent
//! under the parallel test runner.

use ccef_connections::{CredentialStore, Error};

#[test]
fn resolution_is_cached_across_env_changes() {
    std::env::set_var("CREDSTORE_IDEMPOTENT_PASSWORD", "first");
    let store = CredentialStore::new();

    assert_eq!(store.get("CREDSTORE_IDEMPOTENT").unwrap().expose(), "first");

    // Neither a changed nor a removed variable affects the cached value.
    std::env::set_var("CREDSTORE_IDEMPOTENT_PASSWORD", "second");
    assert_eq!(store.get("CREDSTORE_IDEMPOTENT").unwrap().expose(), "first");

    std::env::remove_var("CREDSTORE_IDEMPOTENT_PASSWORD");
    assert_eq!(store.get("CREDSTORE_IDEMPOTENT").unwrap().expose(), "first");
}

#[test]
fn clear_cache_then_missing_optional_is_none() {
    std::env::set_var("CREDSTORE_ROTATED_PASSWORD", "bar");
    let store = CredentialStore::new();

    assert_eq!(store.get("CREDSTORE_ROTATED").unwrap().expose(), "bar");

    store.clear_cache();
    std::env::remove_var("CREDSTORE_ROTATED_PASSWORD");

    assert!(store.get_optional("CREDSTORE_ROTATED").is_none());
    let err = store.get("CREDSTORE_ROTATED").unwrap_err();
    assert!(matches!(err, Error::MissingCredential { .. }));
}

#[test]
fn clear_cache_picks_up_rotated_value() {
    std::env::set_var("CREDSTORE_FRESH_PASSWORD", "old");
    let store = CredentialStore::new();
    assert_eq!(store.get("CREDSTORE_FRESH").unwrap().expose(), "old");

    std::env::set_var("CREDSTORE_FRESH_PASSWORD", "new");
    store.clear_cache();
    assert_eq!(store.get("CREDSTORE_FRESH").unwrap().expose(), "new");

    std::env::remove_var("CREDSTORE_FRESH_PASSWORD");
}
