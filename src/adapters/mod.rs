//! Component-facing capability handles.
//!
//! Panels never touch the registry or manager directly. A provider registers a
//! [`provider::ProviderHandle`] to push values, and a consumer registers a
//! [`consumer::ConsumerHandle`] to read them. Both handles unsubscribe their
//! engine listeners when dropped.

pub mod consumer;
pub mod provider;

pub use consumer::{ConsumerHandle, register_consumer_capability};
pub use provider::{DependentChange, ProviderCallbacks, ProviderHandle, register_provider_capability};
