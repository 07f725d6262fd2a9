//! Command-station consists.
//!
//! A CS-consist is a group the command station itself knows about: motion
//! and functions are driven through the lead member and the server fans them
//! out. The registry enforces the membership invariant that an address
//! belongs to at most one CS-consist at a time.

use crate::config::{MAX_LOCO_ADDRESS, MIN_LOCO_ADDRESS};

use alloc::vec::Vec;

/// One member of a CS-consist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CsConsistMember {
    /// DCC address of the member.
    pub address: u16,
    /// Whether the member runs reversed relative to the lead.
    pub reversed: bool,
}

impl CsConsistMember {
    /// Signed wire encoding: negative means reversed.
    pub fn signed_address(&self) -> i32 {
        if self.reversed {
            -(self.address as i32)
        } else {
            self.address as i32
        }
    }

    /// Decode from the signed wire encoding; `None` for out-of-range.
    pub fn from_signed(signed: i32) -> Option<Self> {
        let address = signed.unsigned_abs();
        if !(MIN_LOCO_ADDRESS as u32..=MAX_LOCO_ADDRESS as u32).contains(&address) {
            return None;
        }
        Some(Self {
            address: address as u16,
            reversed: signed < 0,
        })
    }
}

/// A consist defined at the command station.
#[derive(Debug)]
pub struct CsConsist {
    members: Vec<CsConsistMember>,
    created_on_server: bool,
    pending_deletion: bool,
    replicate_functions: bool,
}

impl CsConsist {
    fn new(replicate_functions: bool) -> Self {
        Self {
            members: Vec::new(),
            created_on_server: false,
            pending_deletion: false,
            replicate_functions,
        }
    }

    /// Lead address: the first member.
    pub fn lead(&self) -> Option<u16> {
        self.members.first().map(|m| m.address)
    }

    /// Members in order; the first is the lead.
    pub fn members(&self) -> &[CsConsistMember] {
        &self.members
    }

    /// A consist is valid once it has at least two members.
    pub fn is_valid(&self) -> bool {
        self.members.len() >= 2
    }

    /// Whether an address is a member.
    pub fn contains(&self, address: u16) -> bool {
        self.members.iter().any(|m| m.address == address)
    }

    /// Add a member; rejects duplicates and out-of-range addresses.
    pub fn add_member(&mut self, address: u16, reversed: bool) -> bool {
        if self.contains(address)
            || !(MIN_LOCO_ADDRESS..=MAX_LOCO_ADDRESS).contains(&address)
        {
            return false;
        }
        self.members.push(CsConsistMember { address, reversed });
        true
    }

    /// Remove a member; returns `false` if the address was not present.
    pub fn remove_member(&mut self, address: u16) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.address != address);
        self.members.len() != before
    }

    /// Whether the server has acknowledged (or announced) this consist.
    pub fn created_on_server(&self) -> bool {
        self.created_on_server
    }

    pub(crate) fn set_created_on_server(&mut self, created: bool) {
        self.created_on_server = created;
    }

    /// Whether a deletion frame has been sent but not yet confirmed.
    pub fn pending_deletion(&self) -> bool {
        self.pending_deletion
    }

    pub(crate) fn set_pending_deletion(&mut self, pending: bool) {
        self.pending_deletion = pending;
    }

    /// Whether function commands on the lead are re-sent to every member.
    pub fn replicate_functions(&self) -> bool {
        self.replicate_functions
    }

    /// Override the function-replication flag for this consist.
    pub fn set_replicate_functions(&mut self, replicate: bool) {
        self.replicate_functions = replicate;
    }
}

/// All known CS-consists, with the membership invariant enforced centrally.
#[derive(Debug, Default)]
pub struct CsConsistRegistry {
    consists: Vec<CsConsist>,
    default_replicate_functions: bool,
}

impl CsConsistRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default function-replication flag inherited by new consists.
    pub fn default_replicate_functions(&self) -> bool {
        self.default_replicate_functions
    }

    /// Set the inherited function-replication default.
    pub fn set_default_replicate_functions(&mut self, replicate: bool) {
        self.default_replicate_functions = replicate;
    }

    /// All consists, in creation order.
    pub fn consists(&self) -> &[CsConsist] {
        &self.consists
    }

    /// Find a consist by its lead address.
    pub fn by_lead(&self, lead: u16) -> Option<&CsConsist> {
        self.consists.iter().find(|c| c.lead() == Some(lead))
    }

    /// Mutable lookup by lead address.
    pub fn by_lead_mut(&mut self, lead: u16) -> Option<&mut CsConsist> {
        self.consists.iter_mut().find(|c| c.lead() == Some(lead))
    }

    /// The consist an address belongs to, if any.
    pub fn consist_containing(&self, address: u16) -> Option<&CsConsist> {
        self.consists.iter().find(|c| c.contains(address))
    }

    /// Start a consist with the given lead.
    ///
    /// Returns the lead address on success (also when a consist with this
    /// lead already exists), or `None` if the address is already a member of
    /// a different consist or out of range.
    pub fn create(&mut self, lead: u16, reversed: bool) -> Option<u16> {
        if self.by_lead(lead).is_some() {
            return Some(lead);
        }
        if self.consist_containing(lead).is_some() {
            return None;
        }
        let mut consist = CsConsist::new(self.default_replicate_functions);
        if !consist.add_member(lead, reversed) {
            return None;
        }
        self.consists.push(consist);
        Some(lead)
    }

    /// Remove an address from every consist; empty consists are dropped.
    pub fn revoke_membership(&mut self, address: u16) {
        for consist in &mut self.consists {
            consist.remove_member(address);
        }
        self.consists.retain(|c| !c.members().is_empty());
    }

    /// Destroy the consist with the given lead; returns whether one existed.
    pub fn remove_by_lead(&mut self, lead: u16) -> bool {
        let before = self.consists.len();
        self.consists.retain(|c| c.lead() != Some(lead));
        self.consists.len() != before
    }

    /// Rebuild from a server definition broadcast.
    ///
    /// `signed_addresses` is the wire member list; the first entry is the
    /// lead, negatives run reversed. Any prior membership of a listed
    /// address is revoked first. Returns the lead address, or `None` when
    /// fewer than two in-range members survive filtering; a one-loco
    /// broadcast is not a consist and mutates nothing.
    pub fn receive_definition(&mut self, signed_addresses: &[i32]) -> Option<u16> {
        let mut members: Vec<CsConsistMember> = Vec::new();
        for &signed in signed_addresses {
            if let Some(member) = CsConsistMember::from_signed(signed) {
                if !members.iter().any(|m| m.address == member.address) {
                    members.push(member);
                }
            }
        }
        if members.len() < 2 {
            return None;
        }
        let lead = members[0].address;

        for member in &members {
            if self
                .consist_containing(member.address)
                .and_then(CsConsist::lead)
                != Some(lead)
            {
                self.revoke_membership(member.address);
            }
        }

        // Revocation may have dissolved an old consist with the same lead.
        let slot = match self.consists.iter().position(|c| c.lead() == Some(lead)) {
            Some(i) => i,
            None => {
                let replicate = self.default_replicate_functions;
                self.consists.push(CsConsist::new(replicate));
                self.consists.len() - 1
            }
        };
        let consist = &mut self.consists[slot];
        consist.members = members;
        consist.created_on_server = true;
        consist.pending_deletion = false;
        Some(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Signed wire encoding
    // =========================================================================

    #[test]
    fn signed_address_round_trip() {
        let member = CsConsistMember::from_signed(-5).unwrap();
        assert_eq!(member.address, 5);
        assert!(member.reversed);
        assert_eq!(member.signed_address(), -5);

        let member = CsConsistMember::from_signed(42).unwrap();
        assert!(!member.reversed);
        assert_eq!(member.signed_address(), 42);
    }

    #[test]
    fn signed_address_rejects_out_of_range() {
        assert!(CsConsistMember::from_signed(0).is_none());
        assert!(CsConsistMember::from_signed(10240).is_none());
        assert!(CsConsistMember::from_signed(-10240).is_none());
        assert!(CsConsistMember::from_signed(10239).is_some());
    }

    // =========================================================================
    // Consist validity and membership
    // =========================================================================

    #[test]
    fn valid_needs_two_members() {
        let mut registry = CsConsistRegistry::new();
        registry.create(42, false).unwrap();
        assert!(!registry.by_lead(42).unwrap().is_valid());
        registry.by_lead_mut(42).unwrap().add_member(5, true);
        assert!(registry.by_lead(42).unwrap().is_valid());
    }

    #[test]
    fn add_member_rejects_duplicates_and_bad_addresses() {
        let mut registry = CsConsistRegistry::new();
        registry.create(42, false).unwrap();
        let consist = registry.by_lead_mut(42).unwrap();
        assert!(!consist.add_member(42, false));
        assert!(!consist.add_member(0, false));
        assert!(consist.add_member(5, false));
    }

    #[test]
    fn create_fails_when_lead_is_a_member_elsewhere() {
        let mut registry = CsConsistRegistry::new();
        registry.create(42, false).unwrap();
        registry.by_lead_mut(42).unwrap().add_member(5, false);
        assert!(registry.create(5, false).is_none());
        // An existing lead is returned, not duplicated
        assert_eq!(registry.create(42, false), Some(42));
        assert_eq!(registry.consists().len(), 1);
    }

    #[test]
    fn replicate_default_is_inherited() {
        let mut registry = CsConsistRegistry::new();
        registry.set_default_replicate_functions(true);
        registry.create(42, false).unwrap();
        assert!(registry.by_lead(42).unwrap().replicate_functions());
    }

    // =========================================================================
    // Definition broadcasts
    // =========================================================================

    #[test]
    fn broadcast_reassigns_memberships() {
        // Scenario: addresses 5 and 25 already live in other consists.
        let mut registry = CsConsistRegistry::new();
        registry.create(5, false).unwrap();
        registry.by_lead_mut(5).unwrap().add_member(6, false);
        registry.create(25, false).unwrap();
        registry.by_lead_mut(25).unwrap().add_member(26, false);

        let lead = registry.receive_definition(&[42, -5, 25]).unwrap();
        assert_eq!(lead, 42);

        let consist = registry.by_lead(42).unwrap();
        assert_eq!(
            consist.members(),
            &[
                CsConsistMember { address: 42, reversed: false },
                CsConsistMember { address: 5, reversed: true },
                CsConsistMember { address: 25, reversed: false },
            ]
        );
        assert!(consist.created_on_server());

        // 5 and 25 are gone from their former consists
        assert!(registry.by_lead(5).is_none() || !registry.by_lead(5).unwrap().contains(5));
        assert_eq!(registry.consist_containing(5).unwrap().lead(), Some(42));
        assert_eq!(registry.consist_containing(25).unwrap().lead(), Some(42));
    }

    #[test]
    fn broadcast_rebuilds_existing_lead() {
        let mut registry = CsConsistRegistry::new();
        registry.receive_definition(&[42, 5]).unwrap();
        registry.receive_definition(&[42, 25, -9]).unwrap();
        assert_eq!(registry.consists().len(), 1);
        let consist = registry.by_lead(42).unwrap();
        assert_eq!(consist.members().len(), 3);
        assert!(!consist.contains(5));
        assert!(consist.contains(9));
    }

    #[test]
    fn broadcast_with_no_valid_members_is_ignored() {
        let mut registry = CsConsistRegistry::new();
        assert!(registry.receive_definition(&[]).is_none());
        assert!(registry.receive_definition(&[0]).is_none());
        assert!(registry.consists().is_empty());
    }

    #[test]
    fn single_member_broadcast_creates_nothing() {
        let mut registry = CsConsistRegistry::new();
        assert!(registry.receive_definition(&[42]).is_none());
        assert!(registry.receive_definition(&[42, 0]).is_none());
        assert!(registry.consists().is_empty());
    }

    #[test]
    fn single_member_broadcast_leaves_memberships_intact() {
        let mut registry = CsConsistRegistry::new();
        registry.receive_definition(&[7, 42]).unwrap();
        assert!(registry.receive_definition(&[42]).is_none());
        assert!(registry.by_lead(7).unwrap().contains(42));
        assert_eq!(registry.consists().len(), 1);
    }

    #[test]
    fn revoke_drops_emptied_consists() {
        let mut registry = CsConsistRegistry::new();
        registry.create(42, false).unwrap();
        registry.revoke_membership(42);
        assert!(registry.consists().is_empty());
    }
}
