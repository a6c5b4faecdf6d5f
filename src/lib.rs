pub mod cli;
pub mod config;
pub mod console;
pub mod kuma;
pub mod logging;
pub mod preflight;
pub mod probe;
pub mod recorder;
pub mod report;
pub mod socketio;
