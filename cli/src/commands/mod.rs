pub mod calibrate;
pub mod config;
pub mod daemon;
pub mod debug;
pub mod history;
