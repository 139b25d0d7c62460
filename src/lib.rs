//! tgw-importer - Transit Gateway topology to partitioned Terraform
//!
//! Brings an existing, hand-built AWS Transit Gateway topology under
//! declarative management without touching the live network.
//!
//! ## Pipeline
//! Collector -> Snapshot -> Key Deriver -> Partitioner -> Synthesizer + Plan
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tgw_importer::config::ImporterConfig;
//! use tgw_importer::pipeline;
//!
//! # async fn run() -> tgw_importer::Result<()> {
//! let config = ImporterConfig::default();
//! let snapshot = pipeline::load_input(&config.input_dir, &config).await?;
//! let summary = pipeline::process(&snapshot, &config, true, true).await?;
//! println!("{} partitions, {} directives", summary.partitions, summary.directives);
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Snapshot data model and declared addresses
pub mod address;
pub mod model;

// Discovery against the cloud API or saved describe output
pub mod collector;

// Keys and state boundaries
pub mod keys;
pub mod partition;

// Terraform output
pub mod hcl;
pub mod reconcile;
pub mod synth;

// Configuration, file output and stage orchestration
pub mod config;
pub mod output;
pub mod pipeline;

pub use error::{ImportError, KeyKind, Result, UnsupportedReconciliation};
pub use model::{ResourceSnapshot, Scope};
pub use partition::{HubSelector, PartitionedTopology};
