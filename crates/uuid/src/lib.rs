//! Identifier utilities for stored bundles and the resources inside them.
//!
//! Two kinds of identifier live here:
//!
//! - [`ResourceId`]: a random v4 UUID in hyphenated form, used as a FHIR resource `id` and, as
//!   `urn:uuid:<id>`, as an entry `fullUrl` or reference target.
//! - [`BundleId`]: a time-prefixed identifier addressing one stored bundle inside a collection.
//!
//! ## Bundle identifier format
//! `YYYYMMDDTHHMMSS.mmmZ-<32 lowercase hex>`
//!
//! Example:
//! `20260111T143522.045Z-550e8400e29b41d4a716446655440000`
//!
//! The timestamp prefix makes lexical order equal to creation order, so a directory listing of
//! bundle files sorted by name is also insertion order. [`BundleIdGenerator`] keeps that order
//! strict even when two bundles are created inside the same millisecond.

mod service;

pub use service::{BundleId, BundleIdGenerator, ResourceId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

