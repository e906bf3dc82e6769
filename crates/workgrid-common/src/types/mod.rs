//! Core data types for Workgrid

pub mod address;
pub mod encoding;
pub mod ids;
pub mod strategy;
pub mod task;
pub mod worker;
