//! Request handling behind the HTTP routes.

pub mod health;
pub mod relay;
pub mod status;
