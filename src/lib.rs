//! jmcosmos - Comic image-set packaging for chat bots
//!
//! This crate finds the directory a crawler downloaded a comic into, orders its
//! chapter images into one reading sequence and packages them into a single
//! document (PDF or CBZ) small enough to send through a chat platform. It also
//! explains, without assembling anything, what it would find for a given id.
//!
//! # Getting Started
//!
//! Configure a [`CosmosConfig`] via its builder, then call one entry point per
//! host command with the numeric content id.
//!
//! ```rust,no_run
//! use jmcosmos::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> jmcosmos::error::Result<()> {
//!     let config = CosmosConfig::builder()
//!         .download_root(PathBuf::from("./downloads"))
//!         .output_root(PathBuf::from("./documents"))
//!         .size_limit_bytes(50u64 * 1024 * 1024)
//!         .output_format(OutputFormat::Pdf)
//!         .build()?;
//!
//!     config.preflight_check()?;
//!
//!     let id: ContentId = "123456".parse()?;
//!     println!("{}", config.diagnose(id).await);
//!
//!     let result = config.assemble(id).await?;
//!     println!(
//!         "Wrote {} pages ({} bytes) to {:?}",
//!         result.page_count, result.byte_size, result.output_path
//!     );
//!
//!     Ok(())
//! }
//! ```
//!
//! The building blocks ([`locator::Locator`], [`aggregator::Aggregator`],
//! [`assembler::Assembler`] and [`diagnostics::diagnose`]) can be used directly
//! when a host keeps its own configuration.

pub mod aggregator;
pub mod assembler;
pub mod cosmos;
pub mod diagnostics;
pub mod error;
pub mod generator;
pub mod locator;
pub mod path_utils;
pub mod storage;
pub mod types;

// Publicly expose the main `CosmosConfig` struct and its builder
pub use cosmos::CosmosConfig;
pub use cosmos::CosmosConfigBuilder;

// Re-export error and core types for direct access
pub use error::{Error, Result};
pub use types::{
    AssemblyResult, CandidateDirectory, Chapter, ChapterBreakdown, ContentId, DiagnosticReport,
    ImageSet, NamingPattern, OutputFormat, OutputInfo, SizeLevel, StorageUsage,
};

/// Prelude module for convenient imports.
///
/// Re-exports the most commonly used types so a host can write
/// `use jmcosmos::prelude::*;`.
pub mod prelude {
    pub use super::{
        AssemblyResult, CandidateDirectory, Chapter, ChapterBreakdown, ContentId, CosmosConfig,
        CosmosConfigBuilder, DiagnosticReport, ImageSet, NamingPattern, OutputFormat, OutputInfo,
        SizeLevel, StorageUsage, error, types,
    };
    pub use crate::aggregator::Aggregator;
    pub use crate::assembler::Assembler;
    pub use crate::locator::Locator;
    pub use std::path::{Path, PathBuf};
}
