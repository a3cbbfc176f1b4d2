//! A typed client for the Cloud Spanner database admin API.
//!
//! * [`name`] - hierarchical resource names
//! * [`types`] - databases, backups and request shapes
//! * [`operation`] - the long-running operation envelope
//! * [`client`] - the [`DatabaseAdmin`](client::DatabaseAdmin) surface and its REST implementation
//! * [`poller`] - waiting on operations
//! * [`iam`] - access policies
//! * [`logger`] - per-database diagnostics
//! * [`app`] - the sample commands behind the `spanner-admin` binary

pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod iam;
pub mod logger;
pub mod name;
pub mod operation;
pub mod poller;
pub mod types;

pub use error::{Error, Result};
