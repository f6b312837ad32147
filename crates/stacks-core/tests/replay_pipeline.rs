//! Integration tests: event replay pipeline (events → projector → SQLite).
//!
//! Covers the replay-correctness properties:
//!   - idempotent replay (same sequence twice ⇒ byte-identical rows)
//!   - single-active invariant after arbitrary activation sequences
//!   - status/active orthogonality
//!   - batch reconcile ≡ per-event reconcile (property test)
//!   - failure containment for corrupt payloads

use proptest::prelude::*;
use rusqlite::Connection;
use std::collections::BTreeMap;

use stacks_core::event::payload::{ActivationData, EventPayload, StackSnapshot, TombstoneData};
use stacks_core::event::Event;
use stacks_core::model::{Actor, EntityId, EventId, Stack, StackStatus};
use stacks_core::projector::Projector;
use stacks_core::store::{open_in_memory, queries};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn actor() -> Actor {
    Actor::human("user-1", "device-a", "app.stacks.ios")
}

/// Stable entity id for index `i` so runs are reproducible.
fn stack_id(i: usize) -> EntityId {
    EntityId::new_unchecked(format!("00000000-0000-7000-8000-00000000000{i}"))
}

/// Deterministic event id derived from a sequence number.
fn event_id(seq: usize) -> EventId {
    EventId::new_unchecked(format!("00000000-0000-7000-8000-0000000{seq:05}"))
}

fn make_event(seq: usize, entity: &EntityId, payload: &EventPayload, ts: i64) -> Event {
    let mut event = Event::from_payload(entity.clone(), payload, ts, actor()).expect("event");
    event.id = event_id(seq);
    event
}

fn stack_created(seq: usize, entity: &EntityId, title: &str, active: bool, ts: i64) -> Event {
    make_event(
        seq,
        entity,
        &EventPayload::StackCreated(StackSnapshot {
            title: title.into(),
            note: None,
            status: StackStatus::Planned,
            is_active: active,
            arc_id: None,
            position: 0,
            extra: BTreeMap::new(),
        }),
        ts,
    )
}

fn stack_activated(seq: usize, entity: &EntityId, ts: i64) -> Event {
    make_event(
        seq,
        entity,
        &EventPayload::StackActivated(ActivationData::default()),
        ts,
    )
}

fn stack_deactivated(seq: usize, entity: &EntityId, ts: i64) -> Event {
    make_event(
        seq,
        entity,
        &EventPayload::StackDeactivated(ActivationData::default()),
        ts,
    )
}

/// Full dump of the stacks table, ordered by id, for byte-level
/// comparison between stores.
fn dump_stacks(conn: &Connection) -> Vec<Stack> {
    all_stack_ids(conn)
        .into_iter()
        .filter_map(|id| queries::get_stack(conn, &id, true).expect("get"))
        .collect()
}

fn all_stack_ids(conn: &Connection) -> Vec<EntityId> {
    let mut stmt = conn
        .prepare("SELECT id FROM stacks ORDER BY id ASC")
        .expect("prepare");
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            Ok(EntityId::new_unchecked(id))
        })
        .expect("query");
    rows.collect::<rusqlite::Result<Vec<_>>>().expect("collect")
}

// ---------------------------------------------------------------------------
// Idempotent replay
// ---------------------------------------------------------------------------

#[test]
fn two_fresh_replays_are_byte_identical() {
    let events = vec![
        stack_created(1, &stack_id(0), "Deep work", false, 1000),
        stack_created(2, &stack_id(1), "Errands", true, 2000),
        stack_activated(3, &stack_id(0), 3000),
        stack_deactivated(4, &stack_id(0), 4000),
        stack_activated(5, &stack_id(1), 5000),
    ];

    let conn_a = open_in_memory().expect("open a");
    let conn_b = open_in_memory().expect("open b");
    let report_a = Projector::new(&conn_a).apply_events(&events).expect("a");
    let report_b = Projector::new(&conn_b).apply_events(&events).expect("b");

    assert!(report_a.is_clean());
    assert_eq!(report_a, report_b);
    assert_eq!(dump_stacks(&conn_a), dump_stacks(&conn_b));
}

#[test]
fn reapplying_the_same_sequence_changes_nothing() {
    let events = vec![
        stack_created(1, &stack_id(0), "Deep work", true, 1000),
        stack_created(2, &stack_id(1), "Errands", true, 2000),
        stack_activated(3, &stack_id(0), 3000),
    ];

    let conn = open_in_memory().expect("open");
    let projector = Projector::new(&conn);

    let first = projector.apply_events(&events).expect("first pass");
    assert_eq!(first.applied, 3);
    let snapshot = dump_stacks(&conn);

    let second = projector.apply_events(&events).expect("second pass");
    assert_eq!(second.applied, 0);
    assert_eq!(second.duplicates, 3);
    assert_eq!(dump_stacks(&conn), snapshot, "replay must be idempotent");
}

#[test]
fn shuffled_input_order_projects_the_same_state() {
    let in_order = vec![
        stack_created(1, &stack_id(0), "A", false, 1000),
        stack_activated(2, &stack_id(0), 2000),
        stack_created(3, &stack_id(1), "B", false, 3000),
        stack_activated(4, &stack_id(1), 4000),
    ];
    let mut shuffled = in_order.clone();
    shuffled.reverse();

    let conn_a = open_in_memory().expect("open a");
    let conn_b = open_in_memory().expect("open b");
    Projector::new(&conn_a).apply_events(&in_order).expect("a");
    Projector::new(&conn_b).apply_events(&shuffled).expect("b");

    // The projector sorts by (ts, id), so input order is irrelevant.
    assert_eq!(dump_stacks(&conn_a), dump_stacks(&conn_b));
}

// ---------------------------------------------------------------------------
// Single-active invariant
// ---------------------------------------------------------------------------

#[test]
fn replay_never_leaves_two_stacks_active() {
    let events = vec![
        stack_created(1, &stack_id(0), "A", true, 1000),
        stack_created(2, &stack_id(1), "B", true, 2000),
        stack_created(3, &stack_id(2), "C", true, 3000),
        stack_activated(4, &stack_id(0), 4000),
    ];

    let conn = open_in_memory().expect("open");
    Projector::new(&conn).apply_events(&events).expect("apply");

    let active = queries::active_stacks(&conn).expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].0, stack_id(0), "latest activation wins");
}

#[test]
fn replay_can_end_with_zero_active_stacks() {
    let events = vec![
        stack_created(1, &stack_id(0), "A", true, 1000),
        stack_deactivated(2, &stack_id(0), 2000),
    ];

    let conn = open_in_memory().expect("open");
    Projector::new(&conn).apply_events(&events).expect("apply");
    assert!(queries::active_stacks(&conn).expect("active").is_empty());
}

// ---------------------------------------------------------------------------
// Status/active orthogonality
// ---------------------------------------------------------------------------

#[test]
fn activation_events_never_touch_workflow_status() {
    let conn = open_in_memory().expect("open");
    let projector = Projector::new(&conn);

    let mut created = stack_created(1, &stack_id(0), "A", false, 1000);
    // Give the stack a non-default status in its snapshot.
    created.payload["status"] = serde_json::json!("in_progress");
    projector
        .apply_events(&[
            created,
            stack_activated(2, &stack_id(0), 2000),
            stack_deactivated(3, &stack_id(0), 3000),
        ])
        .expect("apply");

    let stack = queries::get_stack(&conn, &stack_id(0), false)
        .expect("get")
        .expect("present");
    assert_eq!(stack.status, StackStatus::InProgress);
    assert!(!stack.is_active);
}

#[test]
fn updated_snapshot_fully_restores_is_active() {
    let conn = open_in_memory().expect("open");
    let projector = Projector::new(&conn);

    projector
        .apply_events(&[
            stack_created(1, &stack_id(0), "A", false, 1000),
            stack_deactivated(2, &stack_id(0), 2000),
        ])
        .expect("setup");

    // An update snapshot captured while the stack was active restores
    // the flag on replay.
    let update = make_event(
        3,
        &stack_id(0),
        &EventPayload::StackUpdated(StackSnapshot {
            title: "A (renamed)".into(),
            note: None,
            status: StackStatus::Planned,
            is_active: true,
            arc_id: None,
            position: 0,
            extra: BTreeMap::new(),
        }),
        3000,
    );
    projector.apply_events(&[update]).expect("update");

    let stack = queries::get_stack(&conn, &stack_id(0), false)
        .expect("get")
        .expect("present");
    assert!(stack.is_active);
    assert_eq!(stack.title, "A (renamed)");
}

// ---------------------------------------------------------------------------
// Tombstones survive replay
// ---------------------------------------------------------------------------

#[test]
fn deleted_entities_stay_tombstoned_through_replay() {
    let events = vec![
        stack_created(1, &stack_id(0), "Old", false, 1000),
        make_event(
            2,
            &stack_id(0),
            &EventPayload::StackDeleted(TombstoneData::default()),
            2000,
        ),
    ];

    let conn = open_in_memory().expect("open");
    Projector::new(&conn).apply_events(&events).expect("apply");

    assert!(queries::get_stack(&conn, &stack_id(0), false)
        .expect("get")
        .is_none());
    assert!(queries::get_stack(&conn, &stack_id(0), true)
        .expect("get")
        .is_some());
}

// ---------------------------------------------------------------------------
// Property: batch reconcile ≡ per-event reconcile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Op {
    CreateInactive,
    CreateActive,
    Activate,
    Deactivate,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::CreateInactive),
        Just(Op::CreateActive),
        Just(Op::Activate),
        Just(Op::Deactivate),
    ]
}

fn build_events(script: &[(usize, Op)]) -> Vec<Event> {
    script
        .iter()
        .enumerate()
        .map(|(seq, (idx, op))| {
            let ts = 1000 * (i64::try_from(seq).expect("small seq") + 1);
            let entity = stack_id(*idx);
            match op {
                Op::CreateInactive => {
                    stack_created(seq, &entity, &format!("stack-{idx}"), false, ts)
                }
                Op::CreateActive => stack_created(seq, &entity, &format!("stack-{idx}"), true, ts),
                Op::Activate => stack_activated(seq, &entity, ts),
                Op::Deactivate => stack_deactivated(seq, &entity, ts),
            }
        })
        .collect()
}

/// Activation state only: `(id, is_active, activated_at_us)` for every
/// stack row. Revisions may differ between reconcile cadences (a loser is
/// demoted once per pass), so the property compares the invariant's
/// domain, not the bookkeeping counters.
fn activation_state(conn: &Connection) -> Vec<(String, bool, Option<i64>)> {
    let mut stmt = conn
        .prepare("SELECT id, is_active, activated_at_us FROM stacks ORDER BY id ASC")
        .expect("prepare");
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .expect("query");
    rows.collect::<rusqlite::Result<Vec<_>>>().expect("collect")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn batch_pass_matches_per_event_pass(
        script in proptest::collection::vec((0usize..4, op_strategy()), 0..24)
    ) {
        let events = build_events(&script);

        // Batch: one apply_events call, reconcile runs once at the end.
        let conn_batch = open_in_memory().expect("open");
        Projector::new(&conn_batch).apply_events(&events).expect("batch");

        // Per-event: reconcile runs after every activation-affecting event.
        let conn_inc = open_in_memory().expect("open");
        let inc = Projector::new(&conn_inc);
        for event in &events {
            inc.apply_event(event).expect("incremental");
        }

        let batch_state = activation_state(&conn_batch);
        let inc_state = activation_state(&conn_inc);
        prop_assert_eq!(&batch_state, &inc_state);

        let active_count = batch_state.iter().filter(|(_, active, _)| *active).count();
        prop_assert!(active_count <= 1, "invariant violated: {active_count} active");
    }
}

// ---------------------------------------------------------------------------
// Full rehydration from the persisted log
// ---------------------------------------------------------------------------

#[test]
fn rehydration_from_the_log_matches_the_live_store() {
    use stacks_core::event::payload::TaskSnapshot;
    use stacks_core::model::TaskStatus;
    use stacks_core::recorder::EventRecorder;
    use stacks_core::store::queries::all_events_for_replay;

    // Build a live store incrementally through the recorder.
    let live = open_in_memory().expect("open live");
    let recorder = EventRecorder::new(&live);
    let stack_a = stack_id(0);
    let stack_b = stack_id(1);
    let task = stack_id(2);

    recorder
        .record_at(
            stacks_core::event::EventType::StackCreated,
            &stack_a,
            &EventPayload::StackCreated(StackSnapshot {
                title: "A".into(),
                note: None,
                status: StackStatus::Planned,
                is_active: false,
                arc_id: None,
                position: 0,
                extra: BTreeMap::new(),
            }),
            &actor(),
            1_000,
        )
        .expect("create a");
    recorder
        .record_at(
            stacks_core::event::EventType::StackCreated,
            &stack_b,
            &EventPayload::StackCreated(StackSnapshot {
                title: "B".into(),
                note: None,
                status: StackStatus::Planned,
                is_active: true,
                arc_id: None,
                position: 1,
                extra: BTreeMap::new(),
            }),
            &actor(),
            2_000,
        )
        .expect("create b");
    recorder
        .record_at(
            stacks_core::event::EventType::TaskCreated,
            &task,
            &EventPayload::TaskCreated(TaskSnapshot {
                stack_id: stack_a.clone(),
                title: "T".into(),
                note: None,
                status: TaskStatus::Pending,
                completed_at_us: None,
                position: 0,
                extra: BTreeMap::new(),
            }),
            &actor(),
            3_000,
        )
        .expect("create t");
    recorder
        .record_at(
            stacks_core::event::EventType::StackActivated,
            &stack_a,
            &EventPayload::StackActivated(ActivationData::default()),
            &actor(),
            4_000,
        )
        .expect("activate a");

    // Rehydrate a fresh store from the persisted log.
    let events = all_events_for_replay(&live).expect("read log");
    assert_eq!(events.len(), 4);

    let fresh = open_in_memory().expect("open fresh");
    let report = Projector::new(&fresh).apply_events(&events).expect("replay");
    assert!(report.is_clean());
    assert_eq!(report.applied, 4);

    assert_eq!(dump_stacks(&live), dump_stacks(&fresh));
    let live_task = queries::get_task(&live, &task, false).expect("get").expect("t");
    let fresh_task = queries::get_task(&fresh, &task, false).expect("get").expect("t");
    assert_eq!(live_task, fresh_task);
}
