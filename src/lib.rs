//! panel-flow library: provider/consumer data-flow graph between UI panels.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod domain;
