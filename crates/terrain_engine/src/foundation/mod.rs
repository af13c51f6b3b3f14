//! Foundation module - Core utilities and types
//!
//! - Math types used by the camera and vertex formats
//! - Logging initialisation

pub mod math;
pub mod logging;
