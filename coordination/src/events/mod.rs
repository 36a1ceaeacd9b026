//! Observer sink for debate progress
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): one variant per observable state
//!    transition, tagged with the debate id.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast pub/sub plus the
//!    per-debate [`EventEmitter`] agents report through.
//!
//! 3. **Callbacks** (`callback.rs`): the [`DebateCallback`] notification
//!    trait and its dispatcher task.
//!
//! 4. **Event History** (`history.rs`): caller-owned transcript with
//!    queries and statistics.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │    Agents    │────▶│  Event Bus   │────▶│  Callbacks   │
//! │  (emitter)   │     │  (broadcast) │     │ (dispatcher) │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Publishing never blocks the agents and never fails.

pub mod bus;
pub mod callback;
pub mod history;
pub mod types;

pub use bus::{EventBus, EventBusExt, EventEmitter, EventFilter, FilteredReceiver, SharedEventBus};
pub use callback::{spawn_callback, DebateCallback, LoggingCallback};
pub use history::{EventHistory, EventStats};
pub use types::{DebateEvent, DebateId};
