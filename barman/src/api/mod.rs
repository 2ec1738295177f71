//! Public API module.
//!
//! This module contains the high-level user-facing API for the `barman` crate.

pub mod barman;
pub mod config;
pub mod models;
