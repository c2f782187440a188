//! Mirror integrity: SHA-256 baselines and drift detection.

pub mod baseline;
pub mod hasher;
pub mod manifest;
pub mod scanner;
pub mod verify;
