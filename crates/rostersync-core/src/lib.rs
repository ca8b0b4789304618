// Adaptive roster synchronization against a local game client.

pub mod config;
pub mod differ;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod events;
pub mod gate;
pub mod kinds;
pub mod member;
pub mod monitor;
pub mod roster;
pub mod scheduler;
pub mod source;

pub use engine::{EngineSettings, Reconciler, RefreshOutcome, SyncTarget};
pub use error::{EnrichmentError, EnrichmentStage, SourceError, SyncError};
pub use events::{RosterEvent, RosterSnapshot, Subscription};
pub use gate::ConnectionGate;
pub use member::{Enrichment, Member, MemberEnrichment, MemberId};
pub use monitor::{ConnectionEvent, MonitorController, MonitorSettings, MonitorState, PageId, Signal};
pub use roster::{Roster, RosterKind};
pub use scheduler::PollScheduler;
