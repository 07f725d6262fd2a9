//! Sequenced inventory acquisition.
//!
//! Lists are fetched strictly in order (roster, turnouts, routes,
//! turntables), and within a list details are requested one at a time in
//! list order, so at most one request is ever in flight. The machine is
//! idempotent: the engine calls [`Inventory::advance`] every tick and each
//! call performs at most one step.
//!
//! Turntable details are two-phase: the descriptor first, then the index
//! list; a turntable counts as complete only when its description is present
//! and its observed index count matches the declared count.

use crate::model::Model;

/// The four fetchable inventory lists, in fetch order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListKind {
    /// The locomotive roster.
    Roster,
    /// Turnouts.
    Turnouts,
    /// Routes and automations.
    Routes,
    /// Turntables, including their index tables.
    Turntables,
}

impl ListKind {
    const ORDER: [ListKind; 4] = [
        ListKind::Roster,
        ListKind::Turnouts,
        ListKind::Routes,
        ListKind::Turntables,
    ];
}

/// An outbound fetch the machine wants issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Request {
    RosterList,
    RosterDetail(u16),
    TurnoutList,
    TurnoutDetail(i32),
    RouteList,
    RouteDetail(i32),
    TurntableList,
    TurntableDetail(i32),
    TurntableIndexes(i32),
}

/// One step of progress from [`Inventory::advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Issue this fetch.
    Send(Request),
    /// A list and all its details are complete.
    ListComplete(ListKind),
    /// Every requested list is complete.
    AllComplete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubState {
    NotRequested,
    ListPending,
    DetailsPending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Fetching(ListKind),
    Ready,
}

/// The acquisition state machine.
#[derive(Debug)]
pub(crate) struct Inventory {
    phase: Phase,
    sub: SubState,
    in_flight: Option<Request>,
    want: [bool; 4],
    announced_all: bool,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            sub: SubState::NotRequested,
            in_flight: None,
            want: [false; 4],
            announced_all: false,
        }
    }
}

impl Inventory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) fetching the selected lists.
    pub(crate) fn request_lists(
        &mut self,
        roster: bool,
        turnouts: bool,
        routes: bool,
        turntables: bool,
    ) {
        self.want = [roster, turnouts, routes, turntables];
        self.in_flight = None;
        self.announced_all = false;
        self.sub = SubState::NotRequested;
        self.phase = match self.first_wanted(0) {
            Some(kind) => Phase::Fetching(kind),
            None => Phase::Ready,
        };
    }

    /// Whether every requested list has been fetched.
    pub(crate) fn received_lists(&self) -> bool {
        matches!(self.phase, Phase::Ready)
    }

    /// The id-list response for `kind` arrived; shells are in the model.
    pub(crate) fn list_received(&mut self, kind: ListKind) {
        if self.phase == Phase::Fetching(kind) && self.sub == SubState::ListPending {
            self.sub = SubState::DetailsPending;
            self.in_flight = None;
        }
    }

    /// Re-examine the in-flight fetch after the model was updated; clears it
    /// once its target entity is complete, which lets the next advance issue
    /// the next detail.
    pub(crate) fn note_progress(&mut self, model: &Model) {
        let complete = match self.in_flight {
            Some(Request::RosterDetail(address)) => model
                .roster_loco(address)
                .map_or(true, |l| l.name().is_some()),
            Some(Request::TurnoutDetail(id)) => {
                model.turnout(id).map_or(true, |t| t.has_detail())
            }
            Some(Request::RouteDetail(id)) => model.route(id).map_or(true, |r| r.has_detail()),
            Some(Request::TurntableDetail(id)) => model
                .turntable(id)
                .map_or(true, |t| t.description().is_some()),
            Some(Request::TurntableIndexes(id)) => model
                .turntable(id)
                .map_or(true, |t| t.is_fully_received()),
            _ => return,
        };
        if complete {
            self.in_flight = None;
        }
    }

    /// Perform at most one step: issue a fetch, complete a list, or finish.
    pub(crate) fn advance(&mut self, model: &Model) -> Option<Step> {
        let kind = match self.phase {
            Phase::Fetching(kind) => kind,
            Phase::Ready if !self.announced_all => {
                self.announced_all = true;
                return Some(Step::AllComplete);
            }
            _ => return None,
        };

        match self.sub {
            SubState::NotRequested => {
                self.sub = SubState::ListPending;
                Some(Step::Send(Self::list_request(kind)))
            }
            SubState::ListPending => None,
            SubState::DetailsPending => {
                if self.in_flight.is_some() {
                    return None;
                }
                match Self::next_detail(kind, model) {
                    Some(request) => {
                        self.in_flight = Some(request);
                        Some(Step::Send(request))
                    }
                    None => {
                        self.advance_phase(kind);
                        Some(Step::ListComplete(kind))
                    }
                }
            }
        }
    }

    fn list_request(kind: ListKind) -> Request {
        match kind {
            ListKind::Roster => Request::RosterList,
            ListKind::Turnouts => Request::TurnoutList,
            ListKind::Routes => Request::RouteList,
            ListKind::Turntables => Request::TurntableList,
        }
    }

    /// The detail fetch for the first incomplete entity, in list order.
    fn next_detail(kind: ListKind, model: &Model) -> Option<Request> {
        match kind {
            ListKind::Roster => model
                .roster
                .iter()
                .find(|l| l.name().is_none())
                .map(|l| Request::RosterDetail(l.address())),
            ListKind::Turnouts => model
                .turnouts
                .iter()
                .find(|t| !t.has_detail())
                .map(|t| Request::TurnoutDetail(t.id())),
            ListKind::Routes => model
                .routes
                .iter()
                .find(|r| !r.has_detail())
                .map(|r| Request::RouteDetail(r.id())),
            ListKind::Turntables => {
                let tt = model.turntables.iter().find(|t| !t.is_fully_received())?;
                if tt.description().is_none() {
                    Some(Request::TurntableDetail(tt.id()))
                } else {
                    Some(Request::TurntableIndexes(tt.id()))
                }
            }
        }
    }

    fn advance_phase(&mut self, done: ListKind) {
        let next_slot = ListKind::ORDER.iter().position(|k| *k == done).map(|i| i + 1);
        self.sub = SubState::NotRequested;
        self.in_flight = None;
        self.phase = match next_slot.and_then(|i| self.first_wanted(i)) {
            Some(kind) => Phase::Fetching(kind),
            None => Phase::Ready,
        };
    }

    fn first_wanted(&self, from: usize) -> Option<ListKind> {
        ListKind::ORDER
            .iter()
            .enumerate()
            .skip(from)
            .find(|(i, _)| self.want[*i])
            .map(|(_, k)| *k)
    }
}
