// Application wiring: one connection gate, three roster engines, one monitor
// controller per engine, and the input loop that feeds them signals.

use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use rostersync_core::config::{Config, RosterConfig};
use rostersync_core::enrich::Enricher;
use rostersync_core::kinds::{ChampSelect, ChampSelectMember, Lobby, LobbyMember, PreGame, PreGameMember};
use rostersync_core::source::{
    MatchHistorySource, ProfileSource, RosterSource, SessionSource, StatsSource,
};
use rostersync_core::{
    ConnectionGate, Enrichment, Member, MonitorController, Reconciler, Roster, RosterEvent,
    RosterKind, Signal,
};

use crate::signals::{parse_line, Command};

/// How long shutdown waits for the controllers to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything the app needs from the game client.
pub trait GameApi:
    SessionSource
    + RosterSource<LobbyMember>
    + RosterSource<ChampSelectMember>
    + RosterSource<PreGameMember>
    + ProfileSource
    + StatsSource
    + MatchHistorySource
    + 'static
{
}

impl<T> GameApi for T where
    T: SessionSource
        + RosterSource<LobbyMember>
        + RosterSource<ChampSelectMember>
        + RosterSource<PreGameMember>
        + ProfileSource
        + StatsSource
        + MatchHistorySource
        + 'static
{
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// One roster with its controller input and background tasks.
struct Tracked<K: RosterKind> {
    engine: Reconciler<K>,
    slots: usize,
    /// `None` when the roster has no tracked page and is never polled.
    signals: Option<mpsc::UnboundedSender<Signal>>,
    monitor: Option<JoinHandle<()>>,
    event_log: JoinHandle<()>,
}

impl<K: RosterKind> Tracked<K> {
    fn start<S>(
        config: &Config,
        roster: &RosterConfig,
        gate: &Arc<ConnectionGate>,
        client: &Arc<S>,
        enricher: &Arc<Enricher>,
    ) -> Self
    where
        S: RosterSource<K::Fields> + 'static,
    {
        let engine = Reconciler::<K>::new(
            Arc::clone(gate),
            client.clone(),
            Arc::clone(enricher),
            config.engine_settings(roster),
        );
        let event_log = spawn_event_log(&engine, roster.slots);

        let (signals, monitor) = match MonitorController::new(
            config.monitor_settings(roster),
            Arc::new(engine.clone()),
        ) {
            Ok(controller) => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(tx), Some(tokio::spawn(controller.run(rx))))
            }
            Err(e) => {
                error!(roster = K::LABEL, error = %e, "roster will not be monitored");
                (None, None)
            }
        };

        Tracked {
            engine,
            slots: roster.slots,
            signals,
            monitor,
            event_log,
        }
    }

    fn send(&self, signal: &Signal) {
        if let Some(tx) = &self.signals {
            if tx.send(signal.clone()).is_err() {
                warn!(roster = K::LABEL, "monitor stopped, dropping signal");
            }
        }
    }

    fn log_status(&self) {
        let snapshot = self.engine.snapshot();
        info!(
            roster = K::LABEL,
            members = snapshot.members.len(),
            "status: {}",
            render_slots(&self.engine.roster_slots(self.slots))
        );
    }

    async fn shutdown(self) {
        if let Some(tx) = &self.signals {
            let _ = tx.send(Signal::Shutdown);
        }
        if let Some(monitor) = self.monitor {
            if tokio::time::timeout(SHUTDOWN_GRACE, monitor).await.is_err() {
                warn!(roster = K::LABEL, "monitor did not stop in time");
            }
        }
        self.event_log.abort();
    }
}

pub struct App {
    gate: Arc<ConnectionGate>,
    lobby: Tracked<Lobby>,
    champ_select: Tracked<ChampSelect>,
    pre_game: Tracked<PreGame>,
}

impl App {
    /// Build the engines and start one controller per roster with a tracked
    /// page. Must be called inside a tokio runtime.
    pub fn start<S: GameApi>(config: &Config, client: Arc<S>) -> Self {
        let timeout = config.request_timeout();
        let gate = Arc::new(ConnectionGate::new(
            client.clone(),
            config.connection.ttl(),
            timeout,
        ));
        let enricher = Arc::new(
            Enricher::new(client.clone(), client.clone(), timeout).with_match_history(client.clone()),
        );

        let rosters = &config.rosters;
        let app = App {
            lobby: Tracked::start(config, &rosters.lobby, &gate, &client, &enricher),
            champ_select: Tracked::start(config, &rosters.champ_select, &gate, &client, &enricher),
            pre_game: Tracked::start(config, &rosters.pre_game, &gate, &client, &enricher),
            gate,
        };
        info!("roster engines started");
        app
    }

    pub fn lobby(&self) -> &Reconciler<Lobby> {
        &self.lobby.engine
    }

    pub fn champ_select(&self) -> &Reconciler<ChampSelect> {
        &self.champ_select.engine
    }

    pub fn pre_game(&self) -> &Reconciler<PreGame> {
        &self.pre_game.engine
    }

    /// Forward an environment signal to every monitor controller.
    pub fn broadcast(&self, signal: Signal) {
        debug!(?signal, "broadcasting signal");
        self.lobby.send(&signal);
        self.champ_select.send(&signal);
        self.pre_game.send(&signal);
    }

    pub fn log_status(&self) {
        info!(connected = self.gate.is_connected(), "connection status");
        self.lobby.log_status();
        self.champ_select.log_status();
        self.pre_game.log_status();
    }

    /// Stop every controller and wait for them to finish.
    pub async fn shutdown(self) {
        self.lobby.shutdown().await;
        self.champ_select.shutdown().await;
        self.pre_game.shutdown().await;
        info!("roster engines stopped");
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the input loop until `quit` or until the input channel closes.
pub async fn run(app: App, mut input: mpsc::UnboundedReceiver<String>) -> anyhow::Result<()> {
    info!("Application event loop started");

    while let Some(line) = input.recv().await {
        match parse_line(&line) {
            Ok(Some(Command::Signal(signal))) => app.broadcast(signal),
            Ok(Some(Command::Status)) => app.log_status(),
            Ok(Some(Command::Quit)) => {
                info!("Quit command received, shutting down");
                break;
            }
            Ok(None) => {}
            Err(e) => warn!("{e}"),
        }
    }

    app.shutdown().await;
    info!("Application event loop exiting");
    Ok(())
}

// ---------------------------------------------------------------------------
// Event logging
// ---------------------------------------------------------------------------

fn spawn_event_log<K: RosterKind>(engine: &Reconciler<K>, slots: usize) -> JoinHandle<()> {
    let (subscription, mut events) = engine.subscribe();
    tokio::spawn(async move {
        let _subscription = subscription;
        while let Some(event) = events.recv().await {
            match event {
                RosterEvent::Changed(snapshot) => {
                    let grid = Roster::<K>::from_members(snapshot.members).slots(slots);
                    info!(
                        roster = snapshot.roster,
                        taken_at = %snapshot.taken_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                        "roster changed: {}",
                        render_slots(&grid)
                    );
                }
                RosterEvent::Enriched { member_id, snapshot } => {
                    let member = snapshot.members.iter().find(|m| m.id == member_id);
                    debug!(
                        roster = snapshot.roster,
                        member_id,
                        "enriched: {}",
                        member.map(describe).unwrap_or_default()
                    );
                }
                RosterEvent::Error(e) => {
                    warn!(
                        roster = e.roster,
                        at = %e.at.to_rfc3339_opts(SecondsFormat::Millis, true),
                        "sync error: {}",
                        e.error
                    );
                }
            }
        }
    })
}

/// One-line slot grid, e.g. `[Faker (GOLD II) | - | #42 (loading) | ...]`.
pub fn render_slots<F>(slots: &[Option<Member<F>>]) -> String {
    let cells: Vec<String> = slots
        .iter()
        .map(|slot| match slot {
            Some(member) => describe(member),
            None => "-".to_string(),
        })
        .collect();
    format!("[{}]", cells.join(" | "))
}

fn describe<F>(member: &Member<F>) -> String {
    let name = match &member.enrichment.profile {
        Enrichment::Loaded(profile) => profile.display_name.clone(),
        _ => format!("#{}", member.id),
    };
    let detail = match &member.enrichment.ranked_stats {
        Enrichment::Loaded(stats) if stats.division.is_empty() => stats.tier.clone(),
        Enrichment::Loaded(stats) => format!("{} {}", stats.tier, stats.division),
        Enrichment::Loading => "loading".to_string(),
        Enrichment::Failed(_) => "unavailable".to_string(),
        Enrichment::Absent => return name,
    };
    format!("{name} ({detail})")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
