// Reconciliation engine: owns one roster and keeps it in step with the game
// client.
//
// A refresh probes the connection gate, fetches the observed roster, diffs it
// against the held roster and applies the result in one critical section:
// departures are removed, retained members get their volatile fields
// replaced, and joined members are inserted with enrichment `Loading`. The
// enrichment fetches for joined members then run in a background task and are
// merged one member at a time, each merge guarded by the membership epoch so
// results for members that left (or left and rejoined) are dropped.
//
// Publishing contract: `RosterEvent::Changed` fires once per refresh that
// joined, removed or updated members, before enrichment resolves.
// `RosterEvent::Enriched` fires once per member as its enrichment lands,
// followed by one `MemberEnrichmentFailed` error per failed stage. Those
// failures never invalidate the roster.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::differ;
use crate::enrich::{Enricher, EnrichmentPlan};
use crate::error::{EnrichmentError, SourceError, SyncError};
use crate::events::{ErrorEvent, Observers, RosterEvent, RosterSnapshot, Subscription};
use crate::gate::ConnectionGate;
use crate::member::{Member, MemberEnrichment, MemberId};
use crate::roster::{Roster, RosterKind};
use crate::source::RosterSource;

/// Per-roster engine settings.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub plan: EnrichmentPlan,
    /// Upper bound on one roster fetch.
    pub fetch_timeout: Duration,
}

/// What a refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Same members, same tracked fields.
    NoChange,
    /// Same members, but tracked volatile fields changed for `updated` of them.
    Updated { updated: usize },
    /// Members joined and/or left.
    RosterChanged {
        joined: usize,
        left: usize,
        updated: usize,
    },
    /// The gate reported the client as unreachable; the roster was cleared.
    ConnectionLost,
    /// The roster query failed; the roster was left as it was.
    FetchFailed,
    /// The refresh was cancelled before it touched the roster.
    Cancelled,
}

impl RefreshOutcome {
    /// Whether observers were sent a `Changed` event for this refresh.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            RefreshOutcome::Updated { .. } | RefreshOutcome::RosterChanged { .. }
        )
    }
}

/// The operations the monitor controller and the poll scheduler need from an
/// engine, independent of its roster kind.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    fn label(&self) -> &'static str;

    async fn refresh(&self, cancel: &CancellationToken) -> RefreshOutcome;

    fn is_empty(&self) -> bool;

    /// The environment reported the client gone: clear and notify now.
    fn handle_connection_lost(&self);

    /// The environment reported the client back.
    fn handle_connection_restored(&self);

    /// Stop merging in-flight enrichment. Called on teardown.
    fn shutdown(&self);
}

struct Inner<K: RosterKind> {
    gate: Arc<ConnectionGate>,
    source: Arc<dyn RosterSource<K::Fields>>,
    enricher: Arc<Enricher>,
    settings: EngineSettings,
    roster: RwLock<Roster<K>>,
    next_epoch: AtomicU64,
    connection_lost: AtomicBool,
    enrichments_in_flight: AtomicUsize,
    enrichment_idle: Notify,
    shutdown: CancellationToken,
    observers: Observers<RosterEvent<K::Fields>>,
}

/// Reconciliation engine for one roster kind. Cloning shares the engine.
pub struct Reconciler<K: RosterKind> {
    inner: Arc<Inner<K>>,
}

impl<K: RosterKind> Clone for Reconciler<K> {
    fn clone(&self) -> Self {
        Reconciler {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: RosterKind> Reconciler<K> {
    pub fn new(
        gate: Arc<ConnectionGate>,
        source: Arc<dyn RosterSource<K::Fields>>,
        enricher: Arc<Enricher>,
        settings: EngineSettings,
    ) -> Self {
        Self::with_roster(gate, source, enricher, settings, Roster::new())
    }

    /// Start from an already-known roster (restored state, tests).
    pub fn with_roster(
        gate: Arc<ConnectionGate>,
        source: Arc<dyn RosterSource<K::Fields>>,
        enricher: Arc<Enricher>,
        settings: EngineSettings,
        roster: Roster<K>,
    ) -> Self {
        Reconciler {
            inner: Arc::new(Inner {
                gate,
                source,
                enricher,
                settings,
                roster: RwLock::new(roster),
                next_epoch: AtomicU64::new(1),
                connection_lost: AtomicBool::new(false),
                enrichments_in_flight: AtomicUsize::new(0),
                enrichment_idle: Notify::new(),
                shutdown: CancellationToken::new(),
                observers: Observers::new(),
            }),
        }
    }

    pub fn subscribe(
        &self,
    ) -> (
        Subscription<RosterEvent<K::Fields>>,
        tokio::sync::mpsc::UnboundedReceiver<RosterEvent<K::Fields>>,
    ) {
        self.inner.observers.subscribe()
    }

    /// Copy of the current roster.
    pub fn roster(&self) -> Roster<K> {
        self.read().clone()
    }

    pub fn snapshot(&self) -> RosterSnapshot<K::Fields> {
        snapshot_of::<K>(&self.read())
    }

    pub fn member(&self, id: MemberId) -> Option<Member<K::Fields>> {
        self.read().get(id).cloned()
    }

    /// Fixed-size positional projection of the roster for grid views.
    pub fn roster_slots(&self, fixed_size: usize) -> Vec<Option<Member<K::Fields>>> {
        self.read().slots(fixed_size)
    }

    /// Probe, fetch and reconcile.
    pub async fn refresh(&self, cancel: &CancellationToken) -> RefreshOutcome {
        if cancel.is_cancelled() {
            return RefreshOutcome::Cancelled;
        }

        if !self.inner.gate.is_live().await {
            if cancel.is_cancelled() {
                return RefreshOutcome::Cancelled;
            }
            self.enter_connection_lost();
            return RefreshOutcome::ConnectionLost;
        }
        if self.inner.connection_lost.swap(false, Ordering::AcqRel) {
            info!(roster = K::LABEL, "game client reachable again");
        }

        let fetch = tokio::time::timeout(
            self.inner.settings.fetch_timeout,
            self.inner.source.fetch_roster(),
        )
        .await
        .unwrap_or(Err(SourceError::Timeout(self.inner.settings.fetch_timeout)));

        let observed = match fetch {
            Ok(observed) => observed,
            Err(source) => {
                if cancel.is_cancelled() {
                    return RefreshOutcome::Cancelled;
                }
                warn!(roster = K::LABEL, error = %source, "roster fetch failed");
                self.emit_error(SyncError::RosterFetchFailed {
                    roster: K::LABEL,
                    source,
                });
                return RefreshOutcome::FetchFailed;
            }
        };

        self.reconcile(observed, cancel)
    }

    /// Apply an observed roster. Runs the diff and every volatile mutation in
    /// one critical section; readers never see a half-applied refresh.
    /// Enrichment for joined members is dispatched in the background.
    pub fn reconcile(
        &self,
        observed: Vec<K::Fields>,
        cancel: &CancellationToken,
    ) -> RefreshOutcome {
        let plan = self.inner.settings.plan;

        let (joined, left, updated, snapshot) = {
            let mut roster = self.write();
            if cancel.is_cancelled() {
                return RefreshOutcome::Cancelled;
            }

            let differ::RosterDiff {
                joined,
                left,
                retained,
            } = differ::diff::<K>(&roster, &observed);
            let retained: Vec<(MemberId, bool, K::Fields)> = retained
                .into_iter()
                .map(|(member, fields)| {
                    let changed = K::is_updated(&member.fields, &fields)
                        || K::slot(&member.fields) != K::slot(&fields);
                    (member.id, changed, fields)
                })
                .collect();

            for id in &left {
                roster.remove(*id);
            }

            let mut updated = 0;
            for (id, changed, fields) in retained {
                if let Some(member) = roster.get_mut(id) {
                    member.fields = fields;
                }
                if changed {
                    updated += 1;
                }
            }

            let mut pending = Vec::with_capacity(joined.len());
            for fields in joined {
                let id = K::member_id(&fields);
                let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
                let mut member = Member::joined(id, fields, epoch);
                member.enrichment = MemberEnrichment::loading(plan.match_history);
                if roster.insert(member) {
                    pending.push((id, epoch));
                }
            }

            let changed = !pending.is_empty() || !left.is_empty() || updated > 0;
            let snapshot = changed.then(|| snapshot_of::<K>(&roster));
            (pending, left, updated, snapshot)
        };

        let outcome = if !joined.is_empty() || !left.is_empty() {
            info!(
                roster = K::LABEL,
                joined = joined.len(),
                left = left.len(),
                updated,
                "roster changed"
            );
            RefreshOutcome::RosterChanged {
                joined: joined.len(),
                left: left.len(),
                updated,
            }
        } else if updated > 0 {
            debug!(roster = K::LABEL, updated, "members updated");
            RefreshOutcome::Updated { updated }
        } else {
            RefreshOutcome::NoChange
        };

        if let Some(snapshot) = snapshot {
            self.inner.observers.emit(RosterEvent::Changed(snapshot));
        }

        if !joined.is_empty() {
            self.spawn_enrichment(joined, plan);
        }

        outcome
    }

    /// Wait until every dispatched enrichment has been merged or discarded.
    pub async fn enrichment_settled(&self) {
        loop {
            let notified = self.inner.enrichment_idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.enrichments_in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn spawn_enrichment(&self, pending: Vec<(MemberId, u64)>, plan: EnrichmentPlan) {
        self.inner
            .enrichments_in_flight
            .fetch_add(pending.len(), Ordering::AcqRel);

        let engine = self.clone();
        tokio::spawn(async move {
            let enricher = Arc::clone(&engine.inner.enricher);
            let mut fetches: FuturesUnordered<_> = pending
                .into_iter()
                .map(|(id, epoch)| {
                    let enricher = &enricher;
                    async move { (id, epoch, enricher.enrich(id, plan).await) }
                })
                .collect();
            let mut remaining = fetches.len();

            loop {
                tokio::select! {
                    biased;
                    _ = engine.inner.shutdown.cancelled() => {
                        debug!(roster = K::LABEL, remaining, "engine shut down, dropping enrichment");
                        break;
                    }
                    next = fetches.next() => {
                        let Some((id, epoch, result)) = next else { break };
                        engine.merge_enrichment(id, epoch, result);
                        remaining -= 1;
                        engine.finish_enrichments(1);
                    }
                }
            }

            if remaining > 0 {
                engine.finish_enrichments(remaining);
            }
        });
    }

    fn finish_enrichments(&self, count: usize) {
        let before = self
            .inner
            .enrichments_in_flight
            .fetch_sub(count, Ordering::AcqRel);
        if before == count {
            self.inner.enrichment_idle.notify_waiters();
        }
    }

    /// Store an enrichment result if the membership it was fetched for still
    /// exists. Late results for departed members are dropped silently.
    fn merge_enrichment(&self, id: MemberId, epoch: u64, result: MemberEnrichment) {
        let mut failures: Vec<EnrichmentError> = Vec::new();
        for err in [
            result.profile.error(),
            result.ranked_stats.error(),
            result.match_history.error(),
        ]
        .into_iter()
        .flatten()
        {
            if !failures.contains(err) {
                failures.push(err.clone());
            }
        }

        let snapshot = {
            let mut roster = self.write();
            match roster.get_mut(id) {
                Some(member) if member.epoch == epoch => {
                    member.enrichment = result;
                    Some(snapshot_of::<K>(&roster))
                }
                _ => None,
            }
        };

        match snapshot {
            Some(snapshot) => {
                debug!(roster = K::LABEL, member_id = id, "enrichment merged");
                self.inner.observers.emit(RosterEvent::Enriched {
                    member_id: id,
                    snapshot,
                });
                for failure in failures {
                    self.emit_error(SyncError::MemberEnrichmentFailed(failure));
                }
            }
            None => {
                debug!(roster = K::LABEL, member_id = id, "member gone, discarding enrichment");
            }
        }
    }

    /// Clear the roster and raise `ConnectionLost` on the first transition
    /// only, so a persistent outage yields a single standing notification.
    fn enter_connection_lost(&self) {
        let already_lost = self.inner.connection_lost.swap(true, Ordering::AcqRel);

        let cleared = {
            let mut roster = self.write();
            let had_members = !roster.is_empty();
            roster.clear();
            had_members.then(|| snapshot_of::<K>(&roster))
        };
        if let Some(snapshot) = cleared {
            self.inner.observers.emit(RosterEvent::Changed(snapshot));
        }

        if !already_lost {
            warn!(roster = K::LABEL, "connection to game client lost, roster cleared");
            self.emit_error(SyncError::ConnectionLost);
        }
    }

    fn emit_error(&self, error: SyncError) {
        self.inner.observers.emit(RosterEvent::Error(ErrorEvent {
            roster: K::LABEL,
            error,
            at: Utc::now(),
        }));
    }

    fn read(&self) -> RwLockReadGuard<'_, Roster<K>> {
        self.inner.roster.read().expect("roster lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Roster<K>> {
        self.inner.roster.write().expect("roster lock poisoned")
    }
}

#[async_trait]
impl<K: RosterKind> SyncTarget for Reconciler<K> {
    fn label(&self) -> &'static str {
        K::LABEL
    }

    async fn refresh(&self, cancel: &CancellationToken) -> RefreshOutcome {
        Reconciler::refresh(self, cancel).await
    }

    fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn handle_connection_lost(&self) {
        // The cached "live" answer predates the report; the next refresh
        // must probe before it may fetch again.
        self.inner.gate.invalidate();
        self.enter_connection_lost();
    }

    fn handle_connection_restored(&self) {
        self.inner.connection_lost.store(false, Ordering::Release);
        self.inner.gate.invalidate();
    }

    fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

fn snapshot_of<K: RosterKind>(roster: &Roster<K>) -> RosterSnapshot<K::Fields> {
    RosterSnapshot {
        roster: K::LABEL,
        members: roster.members().to_vec(),
        taken_at: Utc::now(),
    }
}
