//! Submission, status and live log API

pub mod handlers;
pub mod serve;
pub mod state;
