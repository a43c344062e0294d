#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

//! Control panel service for Apache Kafka compatible clusters.
//!
//! The crate bundles a small admin client speaking the Kafka wire protocol,
//! a service layer that owns the cluster connection and aggregates metadata
//! for display, a JSON API on top of it, and the client side pieces a console
//! needs to drive that API.

pub mod admin;
pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod console;
pub mod http;
pub mod messenger;
pub mod protocol;
pub mod service;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod topic;
