//! Command handlers

pub mod campaign;
pub mod registry;
