//! Core directory logic.
//!
//! This module contains the local mirror of the manager: the directory
//! itself, its service and technology entries, property values and the
//! immutable IP configuration types. Nothing in here performs I/O.

pub(crate) mod directory;
pub(crate) mod ip_config;
pub(crate) mod service;
pub(crate) mod technology;
pub(crate) mod value;
