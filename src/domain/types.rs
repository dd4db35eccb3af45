//! Identifiers and closed enumerations shared by every engine component.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque unique identifier of a mounted component instance
    InstanceId
);
string_id!(
    /// Identifier of the panel (tab container) hosting instances
    PanelId
);
string_id!(
    /// Identifier of a data channel, e.g. `email`
    DataType
);
string_id!(
    /// Identifier of a registered [`DependencyDefinition`](super::definition::DependencyDefinition)
    DefinitionId
);
string_id!(
    /// Component type name, e.g. `EmailList`
    ComponentType
);

impl ComponentType {
    pub const WILDCARD: &'static str = "*";

    pub fn wildcard() -> Self {
        Self(Self::WILDCARD.to_string())
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    /// A wildcard owner matches any concrete component type, in either direction.
    pub fn matches(&self, other: &ComponentType) -> bool {
        self.is_wildcard() || other.is_wildcard() || self == other
    }
}

/// Edge identifier. Allocated monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyId(pub u64);

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dep-{}", self.0)
    }
}

/// Role a definition declares for its owning component type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Provider,
    Consumer,
    Both,
}

impl Role {
    pub fn provides(self) -> bool {
        matches!(self, Role::Provider | Role::Both)
    }

    pub fn consumes(self) -> bool {
        matches!(self, Role::Consumer | Role::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    Push,
    Pull,
    #[default]
    Both,
}

impl SyncStrategy {
    pub fn allows_push(self) -> bool {
        matches!(self, SyncStrategy::Push | SyncStrategy::Both)
    }

    pub fn allows_pull(self) -> bool {
        matches!(self, SyncStrategy::Pull | SyncStrategy::Both)
    }

    /// Strategy supported by both sides, `None` for push-only against pull-only.
    pub fn intersect(self, other: SyncStrategy) -> Option<SyncStrategy> {
        let push = self.allows_push() && other.allows_push();
        let pull = self.allows_pull() && other.allows_pull();
        match (push, pull) {
            (true, true) => Some(SyncStrategy::Both),
            (true, false) => Some(SyncStrategy::Push),
            (false, true) => Some(SyncStrategy::Pull),
            (false, false) => None,
        }
    }
}

/// Edge connection status.
///
/// ```text
/// DISCONNECTED -> CONNECTING -> READY | ERROR
/// DISCONNECTED -> READY (pushed value arrives first)
/// READY <-> SUSPENDED
/// any -> DISCONNECTED (removal)
/// CYCLE_DETECTED: sink, only left through removal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Ready,
    Error,
    Suspended,
    CycleDetected,
}

impl ConnectionStatus {
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (_, Disconnected) => true,
            (CycleDetected, _) => false,
            (Disconnected, Connecting | CycleDetected) => true,
            // push delivery onto a fresh edge
            (Disconnected, Ready) => true,
            (Connecting, Ready | Error) => true,
            (Ready, Suspended | Error) => true,
            (Suspended, Ready | Connecting) => true,
            // an edge in ERROR recovers through a fresh connect attempt or a good delivery
            (Error, Connecting | Ready) => true,
            _ => false,
        }
    }

    /// Whether `update_data` may deliver a value on an edge in this status.
    pub fn accepts_data(self) -> bool {
        !matches!(
            self,
            ConnectionStatus::Suspended | ConnectionStatus::CycleDetected
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Ready => "READY",
            ConnectionStatus::Error => "ERROR",
            ConnectionStatus::Suspended => "SUSPENDED",
            ConnectionStatus::CycleDetected => "CYCLE_DETECTED",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a tracked component instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Registered,
    Active,
    Inactive,
    Unregistered,
}
