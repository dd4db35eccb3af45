pub mod config;
pub mod dto;
pub mod engine;
pub mod scenario;
pub mod scheduler;
