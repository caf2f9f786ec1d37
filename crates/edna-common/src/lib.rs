//! eDNA Common Library
//!
//! Shared types and utilities for the eDNA survey platform.
//!
//! # Overview
//!
//! This crate provides functionality used across the workspace members:
//!
//! - **Logging**: tracing-based logging setup driven by environment config
//! - **Checksums**: integrity hashes for archived survey uploads
//! - **Covariates**: loosely-typed environmental covariate values

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod covariates;
pub mod logging;
