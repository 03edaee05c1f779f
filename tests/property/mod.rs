//! Property-based tests

pub mod merge_proptest;
