//! approver-policy - readiness controller for CertificateRequestPolicy
//!
//! A CertificateRequestPolicy names the approvers that must sign off on
//! matching certificate requests. Before the policy can be used, every one of
//! those approvers has to report that it is able to evaluate it. This crate
//! keeps the policy's `Ready` condition in step with those reports.
//!
//! # Modules
//!
//! - [`approver`] - Approver contract and built-in approvers
//! - [`registry`] - Name-keyed table of approvers, populated at startup
//! - [`controller`] - Selection, aggregation, scheduling and condition writes
//! - [`crd`] - CertificateRequestPolicy resource types
//! - [`config`] - Controller tunables
//! - [`telemetry`] - Logging setup
//! - [`retry`] - Backoff for startup steps
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod approver;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod registry;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on status writes
pub const FIELD_MANAGER: &str = "approver-policy";
