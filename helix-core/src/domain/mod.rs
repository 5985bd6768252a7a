//! Core domain types
//!
//! These types represent the fundamental business entities and are shared
//! between the submit side (enrollment, job submission) and the driver
//! (lifecycle transitions, persistence).

pub mod run;
pub mod sample;
