//! CCM (Cloud Certificate Manager) adapters

pub mod private_ca;
