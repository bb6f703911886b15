pub mod backup;
pub mod core;
pub mod courses;
pub mod curriculum;
pub mod setup;
