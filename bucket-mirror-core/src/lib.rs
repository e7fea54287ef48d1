#![doc = "bucket-mirror-core: reconciliation engine for mirroring a directory tree and an object bucket."]

//! This crate holds all logic of bucket-mirror: listing both storage sides,
//! computing the transfer/delete plan, executing it with bounded concurrency,
//! publishing the manifest and keeping the ingestion ledger.
//! The CLI crate only loads configuration and wires the concrete stores.
//!
//! # Usage
//! Build a [`config::MirrorConfig`], construct the two [`contract::ObjectStore`]
//! bindings and call [`synchronise::synchronise`].

pub mod config;
pub mod contract;
pub mod error;
pub mod executor;
pub mod ignore;
pub mod key;
pub mod ledger;
pub mod manifest;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod synchronise;

#[cfg(any(test, feature = "test-export-mocks"))]
pub mod testing;
