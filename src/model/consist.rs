//! Application-side consist: a local convenience grouping of locomotives.
//!
//! Unlike a [`CsConsist`](super::CsConsist), the command station knows nothing
//! about this grouping; throttle commands fan out to every member locally,
//! flipping direction per each member's facing.

use crate::config::{name_string, NameString};

use alloc::vec::Vec;

/// Which way a member faces within the consist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Facing {
    /// Same direction as the consist.
    Forward,
    /// Opposite direction; throttle direction is flipped for this member.
    Reversed,
}

/// One member of an application-side consist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsistMember {
    /// DCC address of the member.
    pub address: u16,
    /// Facing relative to the consist.
    pub facing: Facing,
}

/// A locally managed group of locomotives driven as one.
#[derive(Debug, Default)]
pub struct Consist {
    name: Option<NameString>,
    members: Vec<ConsistMember>,
}

impl Consist {
    /// Create an empty consist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty, named consist.
    pub fn with_name(name: &str) -> Self {
        Self {
            name: Some(name_string(name)),
            members: Vec::new(),
        }
    }

    /// Consist name, if set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the consist name.
    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name_string(name));
    }

    /// Members in insertion order.
    pub fn members(&self) -> &[ConsistMember] {
        &self.members
    }

    /// Add a member; returns `false` if the address is already present.
    pub fn add_member(&mut self, address: u16, facing: Facing) -> bool {
        if self.contains(address) {
            return false;
        }
        self.members.push(ConsistMember { address, facing });
        true
    }

    /// Remove a member; returns `false` if the address was not present.
    pub fn remove_member(&mut self, address: u16) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.address != address);
        self.members.len() != before
    }

    /// Whether an address is a member.
    pub fn contains(&self, address: u16) -> bool {
        self.members.iter().any(|m| m.address == address)
    }
}
