// Error taxonomy for the synchronization engine.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::member::MemberId;

/// Errors surfaced to callers of the engine and to event observers.
///
/// Every variant is `Clone` so a single failure can be fanned out to all
/// registered observers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// The game client stopped answering liveness probes.
    #[error("connection to the game client was lost")]
    ConnectionLost,

    /// The roster query itself failed while the client was live.
    #[error("failed to fetch {roster} roster: {source}")]
    RosterFetchFailed {
        roster: &'static str,
        source: SourceError,
    },

    /// One member's enrichment failed. Recovered locally by the engine.
    #[error(transparent)]
    MemberEnrichmentFailed(#[from] EnrichmentError),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Which enrichment call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichmentStage {
    Profile,
    RankedStats,
    MatchHistory,
}

impl fmt::Display for EnrichmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnrichmentStage::Profile => "profile",
            EnrichmentStage::RankedStats => "ranked-stats",
            EnrichmentStage::MatchHistory => "match-history",
        };
        f.write_str(name)
    }
}

/// Failure of a single enrichment stage for a single member.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("enrichment of member {member_id} failed at {stage} stage: {source}")]
pub struct EnrichmentError {
    pub member_id: MemberId,
    pub stage: EnrichmentStage,
    pub source: SourceError,
}

/// Failures reported by the external collaborators (game client, profile and
/// stats providers).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("game client unreachable: {0}")]
    Unreachable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}
