//! Settings and local storage layout

pub mod layout;
pub mod settings;
