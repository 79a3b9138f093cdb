pub mod distribution;
pub mod duration;
pub mod error;
pub mod job;
pub mod reminder;

pub use chrono;
