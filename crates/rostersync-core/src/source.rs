// External collaborators consumed by the engine.
//
// The engine never talks to the game client directly; the binary plugs in an
// HTTP adapter and the tests plug in fakes.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::member::{MatchHistory, MemberId, Profile, RankedStats};

/// Liveness of the game client.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn check_live(&self) -> Result<bool, SourceError>;
}

/// Roster query for one view. An ended session is reported as an empty list,
/// not as an error.
#[async_trait]
pub trait RosterSource<F>: Send + Sync {
    async fn fetch_roster(&self) -> Result<Vec<F>, SourceError>;
}

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, member_id: MemberId) -> Result<Profile, SourceError>;
}

/// Stats lookups are keyed by the opaque player key from [`Profile`], never by
/// the numeric member id.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_stats(&self, player_key: &str) -> Result<RankedStats, SourceError>;
}

#[async_trait]
pub trait MatchHistorySource: Send + Sync {
    async fn fetch_history(&self, player_key: &str) -> Result<MatchHistory, SourceError>;
}
