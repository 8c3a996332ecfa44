pub mod config;
pub mod control_plane;
