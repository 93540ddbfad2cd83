pub mod transfer;

pub use uplift_core::models::settings;
