pub mod config;
pub mod direction;
pub mod frame;
pub mod geometry;
pub mod report;
pub mod vision;
