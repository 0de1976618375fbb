pub mod auth;
pub mod clean;
pub mod error;
pub mod health;
pub mod metrics;
pub mod tasks;
