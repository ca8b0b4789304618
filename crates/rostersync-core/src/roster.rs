// Identity-unique, ordered member collection and the per-kind policy trait.

use std::fmt;
use std::marker::PhantomData;

use crate::member::{Member, MemberId};

/// Policy for one kind of roster (lobby, champ select, pre-game).
///
/// The engine is generic over this trait instead of carrying one copy of the
/// reconciliation logic per view.
pub trait RosterKind: Send + Sync + 'static {
    /// The volatile per-member record delivered by every poll.
    type Fields: Clone + fmt::Debug + Send + Sync + 'static;

    /// Short name used in logs, events and errors.
    const LABEL: &'static str;

    /// Identity extractor.
    fn member_id(fields: &Self::Fields) -> MemberId;

    /// Whether an observed record counts as an update of the stored one.
    /// Each kind names the fields it cares about; differences elsewhere are
    /// still copied into the roster but do not produce an `Updated` outcome.
    /// A change of [`RosterKind::slot`] always counts, whatever this returns.
    fn is_updated(stored: &Self::Fields, observed: &Self::Fields) -> bool;

    /// Positional slot used by [`Roster::slots`]. `None` means unassigned.
    fn slot(fields: &Self::Fields) -> Option<usize>;
}

/// Ordered collection of members, unique by [`MemberId`].
pub struct Roster<K: RosterKind> {
    members: Vec<Member<K::Fields>>,
    _kind: PhantomData<K>,
}

impl<K: RosterKind> Roster<K> {
    pub fn new() -> Self {
        Roster {
            members: Vec::new(),
            _kind: PhantomData,
        }
    }

    /// Build a roster from existing members. Later duplicates of an id are
    /// dropped.
    pub fn from_members(members: Vec<Member<K::Fields>>) -> Self {
        let mut roster = Self::new();
        for member in members {
            if !roster.contains(member.id) {
                roster.members.push(member);
            }
        }
        roster
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[Member<K::Fields>] {
        &self.members
    }

    pub fn ids(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.members.iter().map(|m| m.id)
    }

    pub fn contains(&self, id: MemberId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub fn get(&self, id: MemberId) -> Option<&Member<K::Fields>> {
        self.members.iter().find(|m| m.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: MemberId) -> Option<&mut Member<K::Fields>> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    /// Append a member. Returns `false` (and leaves the roster untouched) if
    /// the id is already present.
    pub(crate) fn insert(&mut self, member: Member<K::Fields>) -> bool {
        if self.contains(member.id) {
            return false;
        }
        self.members.push(member);
        true
    }

    pub(crate) fn remove(&mut self, id: MemberId) -> Option<Member<K::Fields>> {
        let idx = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.remove(idx))
    }

    pub(crate) fn clear(&mut self) {
        self.members.clear();
    }

    /// Fixed-size positional projection for grid views.
    ///
    /// Members land in the slot reported by [`RosterKind::slot`]. Unassigned
    /// members, slots beyond `fixed_size` and second claimants of an already
    /// filled slot are left out of the projection; they remain in the roster.
    pub fn slots(&self, fixed_size: usize) -> Vec<Option<Member<K::Fields>>> {
        let mut slots: Vec<Option<Member<K::Fields>>> = vec![None; fixed_size];
        for member in &self.members {
            let Some(idx) = K::slot(&member.fields) else {
                continue;
            };
            if let Some(slot) = slots.get_mut(idx) {
                if slot.is_none() {
                    *slot = Some(member.clone());
                }
            }
        }
        slots
    }
}

impl<K: RosterKind> Default for Roster<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RosterKind> Clone for Roster<K> {
    fn clone(&self) -> Self {
        Roster {
            members: self.members.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: RosterKind> fmt::Debug for Roster<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Roster")
            .field("kind", &K::LABEL)
            .field("members", &self.members)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_kind {
    //! Minimal roster kind shared by the unit tests of several modules.

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Seat {
        pub id: MemberId,
        pub slot: Option<usize>,
        pub ready: bool,
        pub nickname: String,
    }

    pub fn seat(id: MemberId, slot: usize) -> Seat {
        Seat {
            id,
            slot: Some(slot),
            ready: false,
            nickname: format!("player-{id}"),
        }
    }

    pub struct Seats;

    impl RosterKind for Seats {
        type Fields = Seat;
        const LABEL: &'static str = "seats";

        fn member_id(fields: &Seat) -> MemberId {
            fields.id
        }

        fn is_updated(stored: &Seat, observed: &Seat) -> bool {
            stored.slot != observed.slot || stored.ready != observed.ready
        }

        fn slot(fields: &Seat) -> Option<usize> {
            fields.slot
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_kind::{seat, Seats};
    use super::*;

    fn member(id: MemberId, slot: usize) -> Member<test_kind::Seat> {
        Member::joined(id, seat(id, slot), 1)
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let mut roster = Roster::<Seats>::new();
        assert!(roster.insert(member(1, 0)));
        assert!(!roster.insert(member(1, 3)));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get(1).unwrap().fields.slot, Some(0));
    }

    #[test]
    fn from_members_keeps_first_occurrence() {
        let roster = Roster::<Seats>::from_members(vec![member(1, 0), member(2, 1), member(1, 4)]);
        assert_eq!(roster.ids().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(roster.get(1).unwrap().fields.slot, Some(0));
    }

    #[test]
    fn remove_preserves_order_of_the_rest() {
        let mut roster =
            Roster::<Seats>::from_members(vec![member(1, 0), member(2, 1), member(3, 2)]);
        let removed = roster.remove(2).unwrap();
        assert_eq!(removed.id, 2);
        assert_eq!(roster.ids().collect::<Vec<_>>(), vec![1, 3]);
        assert!(roster.remove(2).is_none());
    }

    #[test]
    fn slots_place_members_by_position() {
        let roster = Roster::<Seats>::from_members(vec![member(7, 3), member(8, 0)]);
        let slots = roster.slots(5);
        assert_eq!(slots.len(), 5);
        assert_eq!(slots[0].as_ref().map(|m| m.id), Some(8));
        assert_eq!(slots[3].as_ref().map(|m| m.id), Some(7));
        assert!(slots[1].is_none() && slots[2].is_none() && slots[4].is_none());
    }

    #[test]
    fn slots_drop_unassigned_and_overflow_members() {
        let mut unassigned = member(3, 0);
        unassigned.fields.slot = None;
        let roster = Roster::<Seats>::from_members(vec![
            member(1, 1),
            member(2, 9),
            unassigned,
            member(4, 1),
        ]);

        let slots = roster.slots(5);
        let placed: Vec<MemberId> = slots.iter().flatten().map(|m| m.id).collect();
        assert_eq!(placed, vec![1]);
        // Still tracked, just not projected.
        assert_eq!(roster.len(), 4);
    }
}
