//! Integration tests against the in-memory remote store

pub mod integrity_test;
pub mod sync_test;
pub mod transaction_test;
