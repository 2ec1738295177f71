//! Keeping the directory in sync with the daemon.
//!
//! This module contains the transport seam to the bus and the background
//! driver that feeds bus events into the directory.

pub(crate) mod driver;
pub mod transport;
