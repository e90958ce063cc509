//! Herald - sharded message log storage
//!
//! Persistence layer for the message log of a multi-tenant messaging
//! platform. Every send attempt is one record, isolated by tenant namespace
//! and partitioned by time:
//!
//! - SQL backends (SQLite, PostgreSQL): one table per namespace per ISO week
//! - Flat-file backend: one JSON-lines file per day
//!
//! Both sit behind [`storage::MessageLogStore`], selected at startup by
//! [`storage::init_storage`].

pub mod codec;
pub mod config;
pub mod model;
pub mod shard;
pub mod storage;
pub mod uid;
pub mod utils;
