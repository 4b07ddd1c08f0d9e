pub mod auth;
pub mod core;
pub mod enrollments;
pub mod grades;
pub mod messages;
pub mod records;
pub mod schedule;
pub mod setup;
