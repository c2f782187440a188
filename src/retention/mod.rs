//! Version retention: keep the newest N release artifacts per package group.

pub mod artifacts;
pub mod engine;
pub mod version;
