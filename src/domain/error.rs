use thiserror::Error;

use crate::domain::types::{ConnectionStatus, DataType, DependencyId, InstanceId};

/// Failure taxonomy of the data-flow engine.
///
/// None of these are fatal: callers get a value back and the engine keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("no compatible provider/consumer definition for data type '{0}'")]
    MissingDefinition(DataType),

    #[error("unknown dependency {0}")]
    UnknownEdge(DependencyId),

    #[error("no dependency {provider} -> {consumer} for data type '{data_type}'")]
    MissingEdge {
        provider: InstanceId,
        consumer: InstanceId,
        data_type: DataType,
    },

    #[error("unknown component instance '{0}'")]
    UnknownInstance(InstanceId),

    #[error("subscriber failed while handling {event}: {message}")]
    SubscriberFault { event: String, message: String },

    #[error("connecting {provider} -> {consumer} would close a cycle")]
    CycleDetected {
        provider: InstanceId,
        consumer: InstanceId,
    },

    #[error("multiplicity violated for {provider} -> {consumer} on '{data_type}': {reason}")]
    MultiplicityViolation {
        provider: InstanceId,
        consumer: InstanceId,
        data_type: DataType,
        reason: &'static str,
    },

    #[error("payload rejected by definition '{definition}' on {dependency}")]
    ValidationFailed {
        dependency: DependencyId,
        definition: String,
    },

    #[error("illegal status transition {from} -> {to} on {dependency}")]
    IllegalTransition {
        dependency: DependencyId,
        from: ConnectionStatus,
        to: ConnectionStatus,
    },
}

pub type FlowResult<T> = Result<T, FlowError>;
