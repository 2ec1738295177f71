//! D-Bus proxy interfaces for barman.
//!
//! This module contains low-level D-Bus proxy definitions for communicating
//! with the barman daemon over the system bus.

mod manager;
mod service;
mod technology;

pub(crate) use manager::BarmanManagerProxy;
pub(crate) use service::BarmanServiceProxy;
pub(crate) use technology::BarmanTechnologyProxy;
