pub mod attendance;
pub mod core;
