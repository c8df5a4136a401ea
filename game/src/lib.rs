pub mod advisory;
pub mod config;
pub mod console;
pub mod http;
pub mod interaction;
pub mod orchestrator;
pub mod participant;
pub mod ports;
pub mod round;
pub mod settings;
pub mod sfx;
pub mod telemetry;
