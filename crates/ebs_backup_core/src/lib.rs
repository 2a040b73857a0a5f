//! Shared EBS backup domain primitives.
//!
//! This crate owns deterministic backup-policy and retention behavior and the
//! provider-neutral records exchanged with the EC2 adapter. It intentionally
//! excludes AWS SDK and Lambda runtime concerns.

pub mod policy;
pub mod retention;
