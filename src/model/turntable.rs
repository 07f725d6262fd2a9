//! Turntable entity and its index table.

use crate::config::{name_string, NameString};

use alloc::vec::Vec;

/// Turntable drive type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TurntableType {
    /// DCC-accessory driven.
    Dcc,
    /// EX-Turntable controller.
    Extt,
    /// Type not yet received.
    Unknown,
}

impl TurntableType {
    /// Map the wire discriminant (0 = DCC, 1 = EX-Turntable).
    pub fn from_wire(value: i32) -> Self {
        match value {
            0 => TurntableType::Dcc,
            1 => TurntableType::Extt,
            _ => TurntableType::Unknown,
        }
    }
}

/// A named angular position on a turntable.
#[derive(Debug)]
pub struct TurntableIndex {
    id: i32,
    angle: i32,
    name: NameString,
}

impl TurntableIndex {
    /// Create an index entry.
    ///
    /// Index 0 is the home position by convention; an empty wire name is
    /// replaced with "Home".
    pub fn new(id: i32, angle: i32, name: &str) -> Self {
        let name = if id == 0 && name.is_empty() {
            name_string("Home")
        } else {
            name_string(name)
        };
        Self { id, angle, name }
    }

    /// Index id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Angle in tenths of a degree.
    pub fn angle(&self) -> i32 {
        self.angle
    }

    /// Position name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A turntable with its index table.
#[derive(Debug)]
pub struct Turntable {
    id: i32,
    ttype: TurntableType,
    current_index: i32,
    declared_index_count: usize,
    moving: bool,
    description: Option<NameString>,
    indexes: Vec<TurntableIndex>,
}

impl Turntable {
    /// Create a shell turntable from an id-list entry.
    pub fn new(id: i32) -> Self {
        Self {
            id,
            ttype: TurntableType::Unknown,
            current_index: 0,
            declared_index_count: 0,
            moving: false,
            description: None,
            indexes: Vec::new(),
        }
    }

    /// Turntable id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Drive type.
    pub fn turntable_type(&self) -> TurntableType {
        self.ttype
    }

    /// Populate from a descriptor response.
    pub fn set_descriptor(
        &mut self,
        ttype: TurntableType,
        current_index: i32,
        declared_index_count: usize,
        description: &str,
    ) {
        self.ttype = ttype;
        self.current_index = current_index;
        self.declared_index_count = declared_index_count;
        self.description = Some(name_string(description));
    }

    /// Index the table currently points at.
    pub fn current_index(&self) -> i32 {
        self.current_index
    }

    /// Record a position broadcast.
    pub fn set_position(&mut self, index: i32, moving: bool) {
        self.current_index = index;
        self.moving = moving;
    }

    /// Whether the table is rotating.
    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Number of indexes the descriptor declared.
    pub fn declared_index_count(&self) -> usize {
        self.declared_index_count
    }

    /// Description, if the descriptor has arrived.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Received index entries, in wire order.
    pub fn indexes(&self) -> &[TurntableIndex] {
        &self.indexes
    }

    /// Find an index entry by id.
    pub fn index(&self, id: i32) -> Option<&TurntableIndex> {
        self.indexes.iter().find(|i| i.id() == id)
    }

    /// Append an index entry from the index-list response.
    pub fn add_index(&mut self, entry: TurntableIndex) {
        self.indexes.push(entry);
    }

    /// Drop all index entries (before a refresh).
    pub fn clear_indexes(&mut self) {
        self.indexes.clear();
    }

    /// Whether both detail phases have completed: descriptor received and
    /// the index table is full.
    pub fn is_fully_received(&self) -> bool {
        self.description.is_some() && self.indexes.len() == self.declared_index_count
    }
}
