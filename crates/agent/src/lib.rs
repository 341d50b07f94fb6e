//! Pod sleuth agent
//!
//! Hosts the periodic pod scan, configuration loading and the HTTP status API.

pub mod api;
pub mod config;
pub mod scan;
