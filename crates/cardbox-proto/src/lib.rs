//! Types and configuration shared by every part of the cardbox appliance.

pub mod config;
pub mod platform;
pub mod protocol;
