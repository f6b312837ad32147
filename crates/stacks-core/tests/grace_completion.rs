//! Integration tests: grace-period (delayed) task completion against a
//! real store.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use stacks_core::config::StoreConfig;
use stacks_core::grace::{SharedStore, schedule_task_completion};
use stacks_core::model::{Actor, ActorType, EntityId, TaskStatus};
use stacks_core::service::{NewStack, NewTask, StackService, TaskService};
use stacks_core::store::{open_in_memory, queries};

fn actor() -> Actor {
    Actor::human("user-1", "device-a", "app.stacks.ios")
}

fn setup_task(store: &SharedStore) -> EntityId {
    let conn = store.lock().expect("lock");
    let stack = StackService::new(&conn)
        .create(
            NewStack {
                title: "Today".into(),
                ..NewStack::default()
            },
            &actor(),
        )
        .expect("stack");
    TaskService::new(&conn)
        .create(
            &stack.id,
            NewTask {
                title: "Stretch".into(),
                ..NewTask::default()
            },
            &actor(),
        )
        .expect("task")
        .id
}

fn shared_store() -> SharedStore {
    Arc::new(Mutex::new(open_in_memory().expect("open")))
}

fn task_status(store: &SharedStore, id: &EntityId) -> TaskStatus {
    let conn = store.lock().expect("lock");
    queries::get_task(&conn, id, false)
        .expect("get")
        .expect("present")
        .status
}

fn completion_events(conn: &Connection, id: &EntityId) -> usize {
    queries::events_for_entity(conn, id)
        .expect("history")
        .iter()
        .filter(|e| e.event_type == stacks_core::event::EventType::TaskCompleted)
        .count()
}

/// Poll until the task completes or the deadline passes.
fn wait_for_completion(store: &SharedStore, id: &EntityId, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if task_status(store, id) == TaskStatus::Completed {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn elapsed_window_completes_the_task_exactly_once() {
    let store = shared_store();
    let task_id = setup_task(&store);

    let handle = schedule_task_completion(
        Arc::clone(&store),
        task_id.clone(),
        Actor::system("grace-timer", "device-a", "app.stacks.ios"),
        Duration::from_millis(40),
    );

    assert!(
        wait_for_completion(&store, &task_id, Duration::from_secs(3)),
        "window elapsed without completion"
    );
    assert!(!handle.is_pending());

    // Give any hypothetical double-fire a chance, then assert exactly one
    // completion event with system provenance.
    thread::sleep(Duration::from_millis(100));
    let conn = store.lock().expect("lock");
    assert_eq!(completion_events(&conn, &task_id), 1);
    let history = queries::events_for_entity(&conn, &task_id).expect("history");
    let completion = history
        .iter()
        .find(|e| e.event_type == stacks_core::event::EventType::TaskCompleted)
        .expect("completion event");
    assert_eq!(completion.actor.actor_type, ActorType::System);
}

#[test]
fn undo_before_the_window_leaves_status_unchanged() {
    let store = shared_store();
    let task_id = setup_task(&store);

    // The configured default window (seconds) is comfortably longer than
    // this test, so the timer cannot win the race.
    let mut handle = schedule_task_completion(
        Arc::clone(&store),
        task_id.clone(),
        actor(),
        StoreConfig::default().grace_window(),
    );

    assert!(handle.undo(), "undo strictly before the window wins");
    thread::sleep(Duration::from_millis(120));

    assert_eq!(task_status(&store, &task_id), TaskStatus::Pending);
    let conn = store.lock().expect("lock");
    assert_eq!(completion_events(&conn, &task_id), 0);
}

#[test]
fn undo_after_completion_reports_loss_and_changes_nothing() {
    let store = shared_store();
    let task_id = setup_task(&store);

    let mut handle = schedule_task_completion(
        Arc::clone(&store),
        task_id.clone(),
        actor(),
        Duration::from_millis(30),
    );

    assert!(wait_for_completion(&store, &task_id, Duration::from_secs(3)));
    assert!(!handle.undo(), "the timer already fired");
    assert_eq!(task_status(&store, &task_id), TaskStatus::Completed);
}
