// src/harvest/providers/mod.rs
pub mod forex_factory;

pub use forex_factory::ForexFactorySource;
