//! Application layer: entity stores, the store scheduler and seeding.

pub mod core;
pub mod error;
pub mod seed;
pub mod stores;
