pub mod assignment;
pub mod attendance;
pub mod employee;
pub mod issue;
pub mod location_log;
pub mod notification;
pub mod progress;
pub mod project;
pub mod role;
pub mod task;
