//! Domain models and DTOs: engines, requests, checks and audit runs.

pub mod audit;
pub mod check;
pub mod engine;
pub mod request;
