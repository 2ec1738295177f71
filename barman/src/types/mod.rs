//! Type definitions and constants.
//!
//! This module contains barman D-Bus names and default values.

pub(crate) mod constants;
