//! # datamedic - dataset health diagnostics and validated preprocessing
//!
//! datamedic judges whether a tabular dataset is fit for a declared modeling
//! purpose, and applies preprocessing plans proposed by an untrusted generator
//! only after checking them against a closed operation vocabulary.
//!
//! ## Quick Start
//!
//! ```no_run
//! use datamedic::config::EngineConfig;
//! use datamedic::dataset::Dataset;
//! use datamedic::purpose::{Purpose, TaskType};
//! use datamedic::session::Session;
//! use std::sync::Arc;
//!
//! let data = Dataset::from_csv_path("churn.csv".as_ref())?;
//! let purpose = Purpose::new(TaskType::Classification, Some("churned".to_owned()));
//! let mut session = Session::new(data, purpose, Arc::new(EngineConfig::default()))?;
//!
//! let report = session.health_report()?;
//! println!("{} ({}): {:?}", report.overall_score, report.grade, report.verdict);
//! for risk in &report.top_risks {
//!     println!("- {}: {}", risk.title, risk.detail);
//! }
//! # Ok::<(), datamedic::error::EngineError>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`dataset`]: owned polars frame with typed column access
//! - [`profiler`]: per-column statistics and semantic types
//! - [`analyser`]: the seven health analyzers and their threaded runner
//! - [`scoring`]: composite score, grade, verdict and top risks
//! - [`pipeline`]: plan contract, validator, operation table and executor
//! - [`session`]: ties the above together for one dataset and one caller
//! - [`config`]: every threshold, weight and timeout, loaded from JSON
//! - [`error`]: the engine error taxonomy and structured error reports
//!
//! ## Flow
//!
//! ```text
//! Dataset ─> Profiler ─> Analyzers (fan-out, deadline) ─> Scorer ─> HealthReport
//!                                                                      │
//!                      generator text <─ PlanRequest <─────────────────┘
//!                            │
//!                            └─> PlanContract ─> Validator ─> Executor ─> ExecutionLog
//! ```
//!
//! An analyzer whose preconditions are unmet returns
//! [`analyser::AnalyzerOutcome::NotApplicable`] and drops out of the score. A
//! plan with any validation error never reaches the executor.

#![warn(clippy::all, rust_2018_idioms)]

pub mod analyser;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod profiler;
pub mod purpose;
pub mod scoring;
pub mod session;
pub mod stats;
