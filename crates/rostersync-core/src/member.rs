// Roster members and their enrichment state.

use serde::{Deserialize, Serialize};

use crate::error::EnrichmentError;

/// Stable identity of a member within a roster (the game client's summoner id).
pub type MemberId = u64;

/// Lifecycle of one enrichment field for one membership.
///
/// `Absent -> Loading -> {Loaded, Failed}`. `Loaded` and `Failed` are terminal
/// for the membership; a member is only enriched again after it leaves and
/// rejoins.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Enrichment<T> {
    #[default]
    Absent,
    Loading,
    Loaded(T),
    Failed(EnrichmentError),
}

impl<T> Enrichment<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Enrichment::Loading)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Enrichment::Loaded(_) | Enrichment::Failed(_))
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Enrichment::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&EnrichmentError> {
        match self {
            Enrichment::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Player profile returned by the profile provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Opaque player identifier used to key the stats and history lookups.
    /// Related to, but distinct from, the numeric member id.
    pub player_key: String,
    pub display_name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub profile_icon_id: u32,
}

/// Ranked standing in the player's primary queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStats {
    pub tier: String,
    #[serde(default)]
    pub division: String,
    #[serde(default)]
    pub league_points: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
}

impl RankedStats {
    /// Win rate in percent, or `None` before any ranked game was played.
    pub fn win_rate(&self) -> Option<f64> {
        let games = self.wins + self.losses;
        if games == 0 {
            return None;
        }
        Some(self.wins as f64 * 100.0 / games as f64)
    }
}

/// One finished game in a player's recent history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub champion_id: u32,
    pub win: bool,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub assists: u32,
}

/// Recent games, newest first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchHistory {
    pub games: Vec<MatchSummary>,
}

/// All enrichment held for one membership.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemberEnrichment {
    pub profile: Enrichment<Profile>,
    pub ranked_stats: Enrichment<RankedStats>,
    pub match_history: Enrichment<MatchHistory>,
}

impl MemberEnrichment {
    /// Enrichment for a member whose fetch has been dispatched. Match history
    /// stays `Absent` when the roster does not request it.
    pub fn loading(with_history: bool) -> Self {
        MemberEnrichment {
            profile: Enrichment::Loading,
            ranked_stats: Enrichment::Loading,
            match_history: if with_history {
                Enrichment::Loading
            } else {
                Enrichment::Absent
            },
        }
    }

    pub fn is_loading(&self) -> bool {
        self.profile.is_loading() || self.ranked_stats.is_loading() || self.match_history.is_loading()
    }
}

/// One participant in a tracked roster.
///
/// `fields` holds the volatile data replaced on every poll; `enrichment` is
/// owned by the membership and survives volatile updates.
#[derive(Debug, Clone, PartialEq)]
pub struct Member<F> {
    pub id: MemberId,
    pub fields: F,
    pub enrichment: MemberEnrichment,
    /// Identifies this membership. A member that leaves and rejoins gets a
    /// new epoch, so enrichment dispatched for the old membership is dropped.
    pub(crate) epoch: u64,
}

impl<F> Member<F> {
    pub(crate) fn joined(id: MemberId, fields: F, epoch: u64) -> Self {
        Member {
            id,
            fields,
            enrichment: MemberEnrichment::default(),
            epoch,
        }
    }

    /// Build a member with enrichment already in place (restored state, tests).
    pub fn with_enrichment(id: MemberId, fields: F, enrichment: MemberEnrichment) -> Self {
        Member {
            id,
            fields,
            enrichment,
            epoch: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
