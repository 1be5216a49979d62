//! Audit services.

pub mod audit;
pub mod evaluation;
pub mod report;
pub mod runner;
