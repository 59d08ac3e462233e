//! MRS (MapReduce Service) adapters

pub mod clusters;
