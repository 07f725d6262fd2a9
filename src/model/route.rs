//! Route and automation entities.

use crate::config::{name_string, NameString};

/// Kind of server-side script.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RouteKind {
    /// One-shot route.
    Route,
    /// Runs until stopped; can accept a locomotive hand-off.
    Automation,
    /// Kind not yet received.
    Unknown,
}

/// A route or automation.
#[derive(Debug)]
pub struct Route {
    id: i32,
    kind: RouteKind,
    description: Option<NameString>,
}

impl Route {
    /// Create a shell route.
    pub fn new(id: i32) -> Self {
        Self {
            id,
            kind: RouteKind::Unknown,
            description: None,
        }
    }

    /// Route id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Route or automation.
    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    /// Set the kind from a detail response.
    pub fn set_kind(&mut self, kind: RouteKind) {
        self.kind = kind;
    }

    /// Description, if received.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Set the description.
    pub fn set_description(&mut self, description: &str) {
        self.description = Some(name_string(description));
    }

    /// Whether the detail response for this route has arrived.
    pub fn has_detail(&self) -> bool {
        self.description.is_some()
    }
}
