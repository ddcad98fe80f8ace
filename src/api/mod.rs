pub mod attendance;
pub mod geofence;
pub mod response;
pub mod tasks;
