//! Subset of the Kafka wire protocol needed for cluster administration.
//!
//! Only the non-flexible (pre tagged-field) versions of each message are
//! implemented; every broker since 0.11 still accepts them.
//!
//! # References
//! - <https://kafka.apache.org/protocol>

pub mod api_key;
pub mod api_version;
pub mod error;
pub mod messages;
pub mod primitives;
pub mod traits;
mod vec_builder;
