//! Battle orchestration
//!
//! The [`BattleService`] ties the combat math, status effects and the state
//! machine together and guarantees at most one live battle per participant.

pub mod metrics;
pub mod outcome;
pub mod registry;
pub mod resources;
pub mod service;

pub use metrics::{BattleMetrics, MetricsSnapshot};
pub use outcome::{ActionOutcome, AppliedEffect};
pub use registry::{BattleSlot, Combatant, Registry};
pub use resources::{SlotPool, SpellResources};
pub use service::{BattleService, RecoveryReport};
