//! Grace-period (delayed) completion.
//!
//! The only scheduled operation in the core: a cancellable timer that,
//! absent an undo within the window, records a completion mutation
//! exactly once. The race between `undo` and the timer is settled by a
//! single atomic state word — cancellation wins if and only if it
//! happens-before the completion callback starts.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::model::{Actor, EntityId};
use crate::service::TaskService;

/// Store handle shared with the timer worker. The mutex preserves the
/// single-writer discipline when the timer fires from its own thread.
pub type SharedStore = Arc<Mutex<Connection>>;

const STATE_PENDING: u8 = 0;
const STATE_CANCELLED: u8 = 1;
const STATE_FIRED: u8 = 2;

/// Handle to one pending delayed completion.
///
/// Dropping the handle does **not** cancel: the window still elapses and
/// the completion fires. Only [`DelayedCompletion::undo`] cancels.
#[derive(Debug)]
pub struct DelayedCompletion {
    state: Arc<AtomicU8>,
    cancel: Option<mpsc::Sender<()>>,
}

impl DelayedCompletion {
    /// Start the timer. `on_fire` runs on a worker thread after `window`
    /// elapses, unless [`Self::undo`] wins the race first.
    pub fn schedule<F>(window: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(STATE_PENDING));
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        let worker_state = Arc::clone(&state);
        thread::spawn(move || {
            let deadline = Instant::now() + window;
            let fire = match cancel_rx.recv_timeout(window) {
                // A cancel message arrived inside the window.
                Ok(()) => false,
                Err(RecvTimeoutError::Timeout) => true,
                // Handle dropped without undo: wait out the rest of the
                // window, then fire as if nothing happened.
                Err(RecvTimeoutError::Disconnected) => {
                    let now = Instant::now();
                    if now < deadline {
                        thread::sleep(deadline - now);
                    }
                    true
                }
            };

            if fire
                && worker_state
                    .compare_exchange(
                        STATE_PENDING,
                        STATE_FIRED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            {
                on_fire();
            }
        });

        Self {
            state,
            cancel: Some(cancel_tx),
        }
    }

    /// Cancel the pending completion. Returns `true` when this call won
    /// the race (the completion will never fire); `false` when the timer
    /// already fired or the completion was cancelled earlier. Idempotent:
    /// safe to call any number of times, including when nothing is
    /// pending.
    pub fn undo(&mut self) -> bool {
        let won = self
            .state
            .compare_exchange(
                STATE_PENDING,
                STATE_CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        // Wake the worker so it exits promptly rather than waiting out
        // the window.
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        won
    }

    /// True while neither undo nor the timer has resolved the completion.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_PENDING
    }
}

/// Schedule a grace-period completion for a task: after `window`, the
/// task is completed through the normal recorder path (actor unchanged),
/// unless undone first.
///
/// Errors inside the fired callback cannot surface to a caller (there is
/// none); they are logged and the task stays incomplete, which the next
/// explicit completion can repair.
#[must_use]
pub fn schedule_task_completion(
    store: SharedStore,
    task_id: EntityId,
    actor: Actor,
    window: Duration,
) -> DelayedCompletion {
    DelayedCompletion::schedule(window, move || {
        let conn = match store.lock() {
            Ok(conn) => conn,
            Err(poisoned) => {
                tracing::error!(task_id = %task_id, "store mutex poisoned; skipping completion");
                drop(poisoned);
                return;
            }
        };
        let service = TaskService::new(&conn);
        if let Err(error) = service.complete(&task_id, &actor) {
            tracing::error!(task_id = %task_id, error = %error, "grace-period completion failed");
        }
    })
}
