//! Core types for foldersize.
//!
//! This crate provides the data model shared by the scanner and its hosts:
//! listing records, subtree aggregates, the entry classifier, errors and
//! configuration. It performs no I/O.

mod aggregate;
mod analysis;
pub mod classify;
mod config;
mod error;
mod record;

pub use aggregate::AggregateResult;
pub use analysis::FolderAnalysis;
pub use classify::{CATEGORY_TABLE, Classification, FileType, classify};
pub use config::{CacheConfig, CacheConfigBuilder, ScanConfig, ScanConfigBuilder};
pub use error::{AggregateError, AggregateIssue, IssueKind, ScanError};
pub use record::{ChildRecord, InodeInfo};
