//! Local filesystem helpers

pub mod dir;
pub mod file;
