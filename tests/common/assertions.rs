//! Assertions shared by the kennelsync integration tests
//!
//! `assert_ok!` hands back the value of a sync call, `assert_err!` matches a
//! `SyncError` variant, and the helpers below compare the local cache with
//! the in-memory remote store.

use kennelsync::remote::InMemoryRemoteStore;
use kennelsync::sync::SyncEngine;
use pretty_assertions::assert_eq;
use uuid::Uuid;

/// Unwrap the `Ok` value of an engine call, printing the `SyncError` otherwise
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert a call failed, optionally with a specific error variant
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        assert!($result.is_err(), "Expected Err, got Ok");
    };
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => panic!("Expected a different error variant, got: {:?}", e),
        }
    };
}

/// Assert a user-facing message mentions `needle`
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        assert!(
            $haystack.contains($needle),
            "Expected '{}' to contain '{}'",
            $haystack,
            $needle
        );
    };
}

/// The cached profile is exactly what the remote store holds.
pub fn assert_profile_synced(engine: &SyncEngine, remote: &InMemoryRemoteStore, id: Uuid) {
    let local = engine.get_profile(id).expect("profile missing from cache");
    let stored = remote.profile(id).expect("profile missing from remote");
    assert_eq!(*local, stored);
}
