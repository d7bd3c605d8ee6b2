//! # Core Module
//!
//! The ingest engine.
//!
//! ## Modules
//! - `scanner` - Walks the source tree and applies skip rules
//! - `hasher` - SHA-256 content digests
//! - `index` - Persistent digest index for deduplication
//! - `classifier` - Media class and flags from extension, magic bytes and name
//! - `metadata` - EXIF and video probe metadata
//! - `router` - Destination paths and collision suffixes
//! - `exporter` - Downscaled JPEG exports
//! - `progress` - Counters and progress snapshots
//! - `reporter` - End-of-run JSON and text reports
//! - `pipeline` - Orchestrates a run

pub mod classifier;
pub mod exporter;
pub mod hasher;
pub mod index;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod reporter;
pub mod router;
pub mod scanner;

pub use classifier::{Classification, MediaClass};
pub use hasher::ContentDigest;
pub use metadata::ImageMetadata;
pub use scanner::WorkItem;
