//! In-memory model of server-provided entities.
//!
//! All collections are owned by the engine instance (no process-wide state),
//! iterated in insertion order, and searched linearly; inventories are tens
//! of entities at most.

mod consist;
mod cs_consist;
mod loco;
mod route;
mod turnout;
mod turntable;

pub use consist::{Consist, ConsistMember, Facing};
pub use cs_consist::{CsConsist, CsConsistMember, CsConsistRegistry};
pub use loco::{Direction, Loco, LocoSource};
pub use route::{Route, RouteKind};
pub use turnout::Turnout;
pub use turntable::{Turntable, TurntableIndex, TurntableType};

use alloc::vec::Vec;

/// The complete local model hydrated from the command station.
#[derive(Debug, Default)]
pub struct Model {
    /// Locomotives known from the server roster.
    pub roster: Vec<Loco>,
    /// Locomotives entered locally by address.
    pub local_locos: Vec<Loco>,
    /// Turnouts.
    pub turnouts: Vec<Turnout>,
    /// Routes and automations.
    pub routes: Vec<Route>,
    /// Turntables with their index tables.
    pub turntables: Vec<Turntable>,
    /// Command-station consists.
    pub consists: CsConsistRegistry,
}

impl Model {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a locomotive by address, searching roster then local list.
    pub fn loco(&self, address: u16) -> Option<&Loco> {
        self.roster
            .iter()
            .chain(self.local_locos.iter())
            .find(|l| l.address() == address)
    }

    /// Mutable lookup across both locomotive lists.
    pub fn loco_mut(&mut self, address: u16) -> Option<&mut Loco> {
        self.roster
            .iter_mut()
            .chain(self.local_locos.iter_mut())
            .find(|l| l.address() == address)
    }

    /// Find a roster locomotive by address.
    pub fn roster_loco(&self, address: u16) -> Option<&Loco> {
        self.roster.iter().find(|l| l.address() == address)
    }

    /// Find a turnout by id.
    pub fn turnout(&self, id: i32) -> Option<&Turnout> {
        self.turnouts.iter().find(|t| t.id() == id)
    }

    /// Mutable turnout lookup.
    pub fn turnout_mut(&mut self, id: i32) -> Option<&mut Turnout> {
        self.turnouts.iter_mut().find(|t| t.id() == id)
    }

    /// Find a route by id.
    pub fn route(&self, id: i32) -> Option<&Route> {
        self.routes.iter().find(|r| r.id() == id)
    }

    /// Mutable route lookup.
    pub fn route_mut(&mut self, id: i32) -> Option<&mut Route> {
        self.routes.iter_mut().find(|r| r.id() == id)
    }

    /// Find a turntable by id.
    pub fn turntable(&self, id: i32) -> Option<&Turntable> {
        self.turntables.iter().find(|t| t.id() == id)
    }

    /// Mutable turntable lookup.
    pub fn turntable_mut(&mut self, id: i32) -> Option<&mut Turntable> {
        self.turntables.iter_mut().find(|t| t.id() == id)
    }

    /// Drop all roster locomotives.
    pub fn clear_roster(&mut self) {
        self.roster.clear();
    }

    /// Drop all turnouts.
    pub fn clear_turnouts(&mut self) {
        self.turnouts.clear();
    }

    /// Drop all routes.
    pub fn clear_routes(&mut self) {
        self.routes.clear();
    }

    /// Drop all turntables.
    pub fn clear_turntables(&mut self) {
        self.turntables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loco_lookup_spans_both_lists() {
        let mut model = Model::new();
        model.roster.push(Loco::new(42, LocoSource::Roster).unwrap());
        model
            .local_locos
            .push(Loco::new(100, LocoSource::Local).unwrap());

        assert!(model.loco(42).is_some());
        assert!(model.loco(100).is_some());
        assert!(model.loco(7).is_none());
    }

    #[test]
    fn roster_loco_ignores_local_list() {
        let mut model = Model::new();
        model
            .local_locos
            .push(Loco::new(100, LocoSource::Local).unwrap());
        assert!(model.roster_loco(100).is_none());
    }

    #[test]
    fn turnout_lookup() {
        let mut model = Model::new();
        model.turnouts.push(Turnout::new(100));
        model.turnouts.push(Turnout::new(200));
        assert_eq!(model.turnout(200).map(Turnout::id), Some(200));
        model.turnout_mut(100).unwrap().set_thrown(true);
        assert!(model.turnout(100).unwrap().thrown());
    }

    #[test]
    fn clear_is_per_collection() {
        let mut model = Model::new();
        model.roster.push(Loco::new(42, LocoSource::Roster).unwrap());
        model.turnouts.push(Turnout::new(1));
        model.clear_roster();
        assert!(model.roster.is_empty());
        assert_eq!(model.turnouts.len(), 1);
    }
}
