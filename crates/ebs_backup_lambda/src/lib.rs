//! AWS-oriented adapters and handlers for scheduled EBS backup runs.
//!
//! This crate owns runtime integration details (the Lambda entry point and
//! the EC2-backed resource repository) and drives the deterministic policy
//! and retention primitives from `ebs_backup_core`.

pub mod adapters;
pub mod handlers;
