//! # relman-core
//!
//! Release artifact management for auto-updating applications.
//!
//! This crate handles:
//! - Parsing version, build time and commit out of artifact file names
//! - Building a time-ordered catalog of the builds in a bucket
//! - Encoding and decoding the update manifests clients poll
//! - Promoting builds between channels without ever regressing
//! - Parking broken releases and maintaining "latest" pointers
//!
//! ## Storage
//!
//! All bucket access goes through [`ObjectStore`]. A filesystem directory
//! and an in-memory map are provided; the in-memory store counts writes
//! and can inject failures for tests.
//!
//! ## Safety
//!
//! Promotion only ever copies a per-version manifest over the channel
//! manifest, after checking that the candidate is strictly newer than what
//! is live. Re-running a promotion is always safe.

pub mod catalog;
pub mod channel;
pub mod config;
pub mod error;
pub mod manifest;
pub mod platform;
pub mod promotion;
#[cfg(test)]
mod proptests;
pub mod report;
pub mod storage;
pub mod version;

// Re-export main types for convenience
pub use catalog::{OrderingViolation, Release, ReleaseCatalog, ReleaseSelector, REFERENCE_TZ};
pub use channel::Channel;
pub use config::{MalformedManifestPolicy, ReleaseConfig};
pub use error::{ReleaseError, Result};
pub use manifest::{Asset, EncodeRequest, UpdateManifest};
pub use platform::{Platform, PromotionPolicy, TestPromotion};
pub use promotion::{BrokenOutcome, LatestCopy, PlatformOutcome, Promoter, PromotionOutcome};
pub use report::{build_report, ReportRow, ReportStatus};
pub use storage::{Acl, CopyOptions, FilesystemStore, MemoryStore, ObjectStore, StorageError};
pub use version::ParsedVersion;
