// Per-member enrichment: profile, then ranked stats (and optionally match
// history) keyed by the profile's player key.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{EnrichmentError, EnrichmentStage, SourceError};
use crate::member::{Enrichment, MemberEnrichment, MemberId};
use crate::source::{MatchHistorySource, ProfileSource, StatsSource};

/// Which optional stages a roster wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrichmentPlan {
    pub match_history: bool,
}

/// Loads enrichment for one member at a time. Cheap to share behind an `Arc`;
/// the engine runs one `enrich` call per joined member concurrently.
pub struct Enricher {
    profiles: Arc<dyn ProfileSource>,
    stats: Arc<dyn StatsSource>,
    history: Option<Arc<dyn MatchHistorySource>>,
    timeout: Duration,
}

impl Enricher {
    /// `timeout` bounds each individual fetch; an elapsed timeout is recorded
    /// as a normal stage failure.
    pub fn new(
        profiles: Arc<dyn ProfileSource>,
        stats: Arc<dyn StatsSource>,
        timeout: Duration,
    ) -> Self {
        Enricher {
            profiles,
            stats,
            history: None,
            timeout,
        }
    }

    pub fn with_match_history(mut self, history: Arc<dyn MatchHistorySource>) -> Self {
        self.history = Some(history);
        self
    }

    /// Fetch everything `plan` asks for.
    ///
    /// A profile failure fails every requested field and skips the dependent
    /// fetches. Stats and history failures after a good profile only fail
    /// their own field.
    pub async fn enrich(&self, member_id: MemberId, plan: EnrichmentPlan) -> MemberEnrichment {
        let want_history = plan.match_history && self.history.is_some();
        if plan.match_history && self.history.is_none() {
            debug!(member_id, "match history requested but no source configured");
        }

        let profile = match self.bounded(self.profiles.fetch_profile(member_id)).await {
            Ok(profile) => profile,
            Err(source) => {
                let err = EnrichmentError {
                    member_id,
                    stage: EnrichmentStage::Profile,
                    source,
                };
                warn!(error = %err, "profile fetch failed");
                return MemberEnrichment {
                    profile: Enrichment::Failed(err.clone()),
                    ranked_stats: Enrichment::Failed(err.clone()),
                    match_history: if want_history {
                        Enrichment::Failed(err)
                    } else {
                        Enrichment::Absent
                    },
                };
            }
        };

        let key = profile.player_key.as_str();
        let stats_fut = self.bounded(self.stats.fetch_stats(key));
        let history_fut = async {
            match &self.history {
                Some(history) if want_history => {
                    Some(self.bounded(history.fetch_history(key)).await)
                }
                _ => None,
            }
        };
        let (stats, history) = tokio::join!(stats_fut, history_fut);

        let ranked_stats = settle(member_id, EnrichmentStage::RankedStats, stats);
        let match_history = match history {
            Some(result) => settle(member_id, EnrichmentStage::MatchHistory, result),
            None => Enrichment::Absent,
        };

        MemberEnrichment {
            profile: Enrichment::Loaded(profile),
            ranked_stats,
            match_history,
        }
    }

    async fn bounded<T>(
        &self,
        fetch: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, SourceError> {
        tokio::time::timeout(self.timeout, fetch)
            .await
            .unwrap_or(Err(SourceError::Timeout(self.timeout)))
    }
}

fn settle<T>(
    member_id: MemberId,
    stage: EnrichmentStage,
    result: Result<T, SourceError>,
) -> Enrichment<T> {
    match result {
        Ok(value) => Enrichment::Loaded(value),
        Err(source) => {
            let err = EnrichmentError {
                member_id,
                stage,
                source,
            };
            warn!(error = %err, "enrichment stage failed");
            Enrichment::Failed(err)
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::fakes::FakeProviders;
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn enricher(providers: &Arc<FakeProviders>) -> Enricher {
        Enricher::new(providers.clone(), providers.clone(), TIMEOUT)
            .with_match_history(providers.clone())
    }

    #[tokio::test]
    async fn loads_profile_then_stats_by_player_key() {
        let providers = Arc::new(FakeProviders::default());
        let result = enricher(&providers)
            .enrich(42, EnrichmentPlan::default())
            .await;

        assert_eq!(result.profile, Enrichment::Loaded(FakeProviders::profile(42)));
        assert_eq!(result.ranked_stats, Enrichment::Loaded(FakeProviders::stats()));
        assert_eq!(result.match_history, Enrichment::Absent);
        // Keyed by the profile's player key, not the member id.
        assert_eq!(*providers.stats_calls.lock().unwrap(), vec!["puuid-42".to_string()]);
        assert!(providers.history_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn match_history_fetched_when_planned() {
        let providers = Arc::new(FakeProviders::default());
        let result = enricher(&providers)
            .enrich(3, EnrichmentPlan { match_history: true })
            .await;

        let history = result.match_history.loaded().expect("history loaded");
        assert_eq!(history.games.len(), 1);
        assert_eq!(*providers.history_calls.lock().unwrap(), vec!["puuid-3".to_string()]);
    }

    #[tokio::test]
    async fn match_history_without_source_stays_absent() {
        let providers = Arc::new(FakeProviders::default());
        let enricher = Enricher::new(providers.clone(), providers.clone(), TIMEOUT);
        let result = enricher.enrich(3, EnrichmentPlan { match_history: true }).await;
        assert_eq!(result.match_history, Enrichment::Absent);
        assert!(result.ranked_stats.loaded().is_some());
    }

    #[tokio::test]
    async fn profile_failure_fails_everything_and_skips_stats() {
        let providers = Arc::new(FakeProviders::default());
        providers.fail_profile(9);

        let result = enricher(&providers)
            .enrich(9, EnrichmentPlan { match_history: true })
            .await;

        match &result.profile {
            Enrichment::Failed(err) => {
                assert_eq!(err.member_id, 9);
                assert_eq!(err.stage, EnrichmentStage::Profile);
            }
            other => panic!("expected failed profile, got {other:?}"),
        }
        assert!(matches!(result.ranked_stats, Enrichment::Failed(_)));
        assert!(matches!(result.match_history, Enrichment::Failed(_)));
        assert!(providers.stats_calls.lock().unwrap().is_empty());
        assert!(providers.history_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_failure_keeps_profile() {
        let providers = Arc::new(FakeProviders::default());
        providers.fail_stats(5);

        let result = enricher(&providers)
            .enrich(5, EnrichmentPlan::default())
            .await;

        assert_eq!(result.profile, Enrichment::Loaded(FakeProviders::profile(5)));
        match &result.ranked_stats {
            Enrichment::Failed(err) => assert_eq!(err.stage, EnrichmentStage::RankedStats),
            other => panic!("expected failed stats, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hanging_stats_fetch_times_out() {
        tokio::time::pause();
        let providers = Arc::new(FakeProviders::default());
        providers.hang_stats.store(true, Ordering::SeqCst);

        let result = enricher(&providers)
            .enrich(1, EnrichmentPlan::default())
            .await;

        assert!(result.profile.loaded().is_some());
        match &result.ranked_stats {
            Enrichment::Failed(err) => assert_eq!(err.source, SourceError::Timeout(TIMEOUT)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
