pub mod analytics;
pub mod attempts;
pub mod core;
pub mod evaluation;
pub mod questions;
pub mod users;
