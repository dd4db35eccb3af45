pub mod catalog;
pub mod definition;
pub mod discovery;
pub mod edge;
pub mod error;
pub mod events;
pub mod graph;
pub mod manager;
pub mod registry;
pub mod types;
