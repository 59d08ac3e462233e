//! IMS (Image Management Service) adapters

pub mod image_registration;
