//! Shared storage integration tests.
//!
//! Tests the MessageLogStore interface against all implementations.
//! Each implementation module imports these test functions and runs them.

pub mod message_log_store_tests;
