//! stacks-core: the local-first data layer of the Stacks task manager.
//!
//! A durable append-only event log, a projector that derives current
//! entity state from that log, and a sync reconciler that merges remote
//! state across devices:
//!
//! - [`recorder::EventRecorder`] — write side: append an event and mutate
//!   the entity store in one transaction
//! - [`projector::Projector`] — replay side: deterministic, idempotent
//!   reconstruction of entity rows from events
//! - [`sync`] — LWW-by-revision merge with persisted [`sync::SyncConflict`]s
//! - [`history::HistoryService`] — read-only timeline composition
//! - [`service`] — feature services (stack/task/reminder/arc/attachment)
//! - [`grace`] — the cancellable delayed-completion timer
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` with `.context(...)` on fallible paths;
//!   typed errors at leaves; stable [`error::ErrorCode`]s in messages.
//! - **Logging**: `tracing` macros with structured fields.
//! - **Timestamps**: i64 microseconds since the Unix epoch.

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod grace;
pub mod history;
pub mod lock;
pub mod model;
pub mod projector;
pub mod reconcile;
pub mod recorder;
pub mod service;
pub mod store;
pub mod sync;
