pub mod message;
pub mod restoration;
pub mod task;
