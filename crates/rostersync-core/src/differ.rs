// Pure roster diff: joined / left / retained.

use std::collections::HashSet;

use tracing::warn;

use crate::member::{Member, MemberId};
use crate::roster::{Roster, RosterKind};

/// Result of comparing the known roster against a fresh observation.
///
/// Ordering is deterministic: `joined` follows the observed list, `left` and
/// `retained` follow the previous roster.
#[derive(Debug)]
pub struct RosterDiff<'a, F> {
    /// Observed records whose id is not in the previous roster.
    pub joined: Vec<F>,
    /// Ids in the previous roster that were not observed.
    pub left: Vec<MemberId>,
    /// Members present on both sides, paired with their observed record.
    /// Retained does not mean unchanged; it means the member keeps its
    /// enrichment.
    pub retained: Vec<(&'a Member<F>, F)>,
}

impl<F> RosterDiff<'_, F> {
    /// Whether membership changed at all.
    pub fn has_membership_changes(&self) -> bool {
        !self.joined.is_empty() || !self.left.is_empty()
    }
}

/// Compare `previous` with `observed`.
///
/// Observed records that repeat an id already seen earlier in the same list
/// are ignored (first occurrence wins) so the roster stays identity-unique.
/// No I/O, no side effects beyond a log line for duplicates.
pub fn diff<'a, K: RosterKind>(
    previous: &'a Roster<K>,
    observed: &[K::Fields],
) -> RosterDiff<'a, K::Fields> {
    let mut joined = Vec::new();
    let mut observed_ids: HashSet<MemberId> = HashSet::with_capacity(observed.len());
    let mut updates: Vec<(MemberId, &K::Fields)> = Vec::new();

    for fields in observed {
        let id = K::member_id(fields);
        if !observed_ids.insert(id) {
            warn!(roster = K::LABEL, member_id = id, "duplicate member in observed roster, ignoring");
            continue;
        }
        if previous.contains(id) {
            updates.push((id, fields));
        } else {
            joined.push(fields.clone());
        }
    }

    let mut left = Vec::new();
    let mut retained = Vec::with_capacity(updates.len());
    for member in previous.members() {
        if !observed_ids.contains(&member.id) {
            left.push(member.id);
            continue;
        }
        if let Some((_, fields)) = updates.iter().find(|(id, _)| *id == member.id) {
            retained.push((member, (*fields).clone()));
        }
    }

    RosterDiff {
        joined,
        left,
        retained,
    }
}
