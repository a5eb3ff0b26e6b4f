//! Core types and trait definitions for the annograph annotation graph.
//!
//! This crate holds the data model, the typed search predicate, and the
//! pure decision logic (schema validation, confirm/correct reconciliation,
//! statistics). It has no database or I/O dependency; backends implement
//! [`store::AnnotationStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod agent;
pub mod annotation;
pub mod assignment;
pub mod error;
pub mod label;
pub mod project;
pub mod query;
pub mod record;
pub mod schema;
pub mod stats;
pub mod store;
pub mod verification;
pub mod view;

pub use error::{Classify, Error, ErrorKind, FieldErrors, Result};
