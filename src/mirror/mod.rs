//! Mirror population and requirement-list tooling.

pub mod client;
pub mod download;
pub mod requirements;
