//! Turnout entity.

use crate::config::{name_string, NameString};

/// A controllable track switch with two states: closed and thrown.
#[derive(Debug)]
pub struct Turnout {
    id: i32,
    thrown: bool,
    description: Option<NameString>,
}

impl Turnout {
    /// Create a shell turnout; state and description arrive with detail
    /// responses and broadcasts.
    pub fn new(id: i32) -> Self {
        Self {
            id,
            thrown: false,
            description: None,
        }
    }

    /// Turnout id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Whether the turnout is thrown (`true`) or closed (`false`).
    pub fn thrown(&self) -> bool {
        self.thrown
    }

    /// Record a thrown-state change.
    pub fn set_thrown(&mut self, thrown: bool) {
        self.thrown = thrown;
    }

    /// Description, if the detail response carried one.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Set the description.
    pub fn set_description(&mut self, description: &str) {
        self.description = Some(name_string(description));
    }

    /// Whether the detail response for this turnout has arrived.
    pub fn has_detail(&self) -> bool {
        self.description.is_some()
    }
}
