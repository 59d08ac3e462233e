//! CloudTable adapters

pub mod cluster;
