pub mod clock;
pub mod geofence;
pub mod text;
