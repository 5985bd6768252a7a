//! Helix Core
//!
//! Shared domain types for the Helix run orchestration system.
//!
//! This crate contains:
//! - Domain types: PipelineRun, Sample, and the status transition rules
//! - Sample sheet parsing shared by the enrollment and driver sides
//!
//! Note: persistence lives in helix-driver, job submission in helix-submit.

pub mod domain;
pub mod sample_sheet;
