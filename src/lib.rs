//! Upscale detector - flag audio files whose real quality is below what they claim
//!
//! Finished downloads are queued and checked one at a time on a background
//! worker. Each check shells out to an external analyzer, judges the result,
//! caches it per file path and reports it on the console and in sidecar logs
//! next to the music.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use upscale_detector::{Pipeline, PipelineContext, ResultCache, Settings, Timings, ToolPaths};
//!
//! let ctx = PipelineContext::new(
//!     Settings::default(),
//!     &ToolPaths::default(),
//!     Timings::default(),
//!     ResultCache::in_memory(),
//! );
//! let pipeline = Pipeline::new(ctx);
//! pipeline.on_download_finished(Path::new("/music/Album/01 - Track.mp3"));
//! pipeline.wait_idle(std::time::Duration::from_secs(60));
//! pipeline.shutdown();
//! ```
//!
//! # Modules
//!
//! - [`analyzer`]: the three external-tool strategies and their output parsers
//! - [`comparator`]: declared vs. measured bitrate decision
//! - [`cache`]: persistent per-path result cache
//! - [`logger`]: console line and sidecar log fan-out
//! - [`queue`] / [`pipeline`]: the deduplicating queue and its single worker

pub mod analyzer;
pub mod cache;
pub mod comparator;
pub mod config;
pub mod error;
pub mod format;
pub mod logger;
pub mod models;
pub mod pipeline;
pub mod process;
pub mod queue;

pub use cache::ResultCache;
pub use config::{AnalysisStrategy, Settings, Timings, ToolPaths};
pub use error::CheckError;
pub use models::{CheckEvent, CheckResult, CheckStatus};
pub use pipeline::{Pipeline, PipelineContext, WorkerState};
