//! Application services behind the HTTP API

pub mod deployments;
