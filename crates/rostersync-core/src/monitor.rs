// Focus/page-aware controller deciding when a roster is polled.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::engine::SyncTarget;
use crate::error::SyncError;
use crate::scheduler::PollScheduler;

/// Identity of a view in the host application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId(String);

impl PageId {
    pub fn new(id: impl Into<String>) -> Self {
        PageId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PageId {
    fn from(id: &str) -> Self {
        PageId::new(id)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

/// Environment notification delivered to [`MonitorController::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Focus(bool),
    Page(PageId),
    Connection(ConnectionEvent),
    Shutdown,
}

/// Point-in-time view of a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorState {
    pub has_focus: bool,
    pub active_page: Option<PageId>,
    pub is_polling: bool,
    pub last_check_at: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// The page whose visibility enables polling.
    pub tracked_page: Option<PageId>,
    pub poll_interval: Duration,
    /// Debounce floor between two executed checks.
    pub min_check_interval: Duration,
}

/// Turns focus, page and connection signals into start/stop decisions for
/// one engine's scheduler.
///
/// Polling runs while the application has focus and the active page is the
/// tracked one. Entering that state starts the scheduler and requests a
/// check; staying in it (focus regained while already monitoring) only
/// requests a check; leaving it stops the scheduler.
pub struct MonitorController {
    tracked_page: PageId,
    poll_interval: Duration,
    target: Arc<dyn SyncTarget>,
    scheduler: PollScheduler,
    has_focus: bool,
    active_page: Option<PageId>,
    monitoring: bool,
    disposed: bool,
}

impl MonitorController {
    /// The application is assumed focused and on no page until told
    /// otherwise.
    pub fn new(settings: MonitorSettings, target: Arc<dyn SyncTarget>) -> Result<Self, SyncError> {
        let tracked_page = settings.tracked_page.ok_or_else(|| {
            SyncError::InvalidConfiguration(format!(
                "no tracked page set for the {} roster",
                target.label()
            ))
        })?;
        if settings.poll_interval.is_zero() {
            return Err(SyncError::InvalidConfiguration(format!(
                "poll interval for the {} roster must be non-zero",
                target.label()
            )));
        }

        Ok(MonitorController {
            tracked_page,
            poll_interval: settings.poll_interval,
            scheduler: PollScheduler::new(Arc::clone(&target), settings.min_check_interval),
            target,
            has_focus: true,
            active_page: None,
            monitoring: false,
            disposed: false,
        })
    }

    pub fn should_monitor(&self) -> bool {
        self.has_focus && self.active_page.as_ref() == Some(&self.tracked_page)
    }

    pub fn tracked_page(&self) -> &PageId {
        &self.tracked_page
    }

    pub fn set_focus(&mut self, has_focus: bool) {
        if self.disposed {
            return;
        }
        self.has_focus = has_focus;
        self.apply();
    }

    pub fn set_active_page(&mut self, page: PageId) {
        if self.disposed {
            return;
        }
        self.active_page = Some(page);
        self.apply();
    }

    /// React to the environment reporting a connection change.
    ///
    /// A disconnect clears a non-empty roster at once, whether or not this
    /// controller is monitoring. A reconnect re-arms the engine and, when
    /// monitoring an empty roster, requests a check.
    pub fn on_connection_state_change(&mut self, event: ConnectionEvent) {
        if self.disposed {
            return;
        }
        match event {
            ConnectionEvent::Disconnected => {
                if !self.target.is_empty() {
                    self.target.handle_connection_lost();
                } else {
                    debug!(roster = self.target.label(), "disconnected with empty roster");
                }
            }
            ConnectionEvent::Connected => {
                self.target.handle_connection_restored();
                if self.monitoring && self.target.is_empty() {
                    self.scheduler.request_immediate_check();
                }
            }
        }
    }

    pub fn state(&self) -> MonitorState {
        MonitorState {
            has_focus: self.has_focus,
            active_page: self.active_page.clone(),
            is_polling: self.scheduler.is_running(),
            last_check_at: self.scheduler.last_check_at(),
        }
    }

    /// Consume signals until `Shutdown` or the channel closes, then tear
    /// down.
    pub async fn run(mut self, mut signals: mpsc::UnboundedReceiver<Signal>) {
        while let Some(signal) = signals.recv().await {
            match signal {
                Signal::Focus(has_focus) => self.set_focus(has_focus),
                Signal::Page(page) => self.set_active_page(page),
                Signal::Connection(event) => self.on_connection_state_change(event),
                Signal::Shutdown => break,
            }
        }
        self.dispose();
    }

    /// Stop polling and drop any in-flight enrichment. Further signals are
    /// ignored.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.monitoring = false;
        self.scheduler.stop();
        self.target.shutdown();
        info!(roster = self.target.label(), "monitor disposed");
    }

    fn apply(&mut self) {
        let should = self.should_monitor();
        match (self.monitoring, should) {
            (false, true) => {
                info!(roster = self.target.label(), page = %self.tracked_page, "monitoring started");
                self.monitoring = true;
                self.scheduler.start(self.poll_interval);
                self.scheduler.request_immediate_check();
            }
            (true, false) => {
                info!(roster = self.target.label(), "monitoring paused");
                self.monitoring = false;
                self.scheduler.stop();
            }
            (true, true) => self.scheduler.request_immediate_check(),
            (false, false) => {}
        }
    }
}

impl Drop for MonitorController {
    fn drop(&mut self) {
        self.dispose();
    }
}
