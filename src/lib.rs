pub mod constants;
pub mod mathutils;
pub mod coordinate;
pub mod stars;
pub mod status;
pub mod errgraph;
pub mod controls;
pub mod net;
pub mod config;
