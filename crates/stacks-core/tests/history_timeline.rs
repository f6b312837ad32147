//! Integration tests: history composition over the event log.

use rusqlite::Connection;
use std::collections::BTreeMap;

use stacks_core::event::payload::{
    AttachmentSnapshot, EventPayload, StackSnapshot, TaskSnapshot, TombstoneData,
};
use stacks_core::event::{Event, EventType};
use stacks_core::history::HistoryService;
use stacks_core::model::{Actor, EntityId, EventId, StackStatus, TaskStatus};
use stacks_core::recorder::EventRecorder;
use stacks_core::store::open_in_memory;

fn actor() -> Actor {
    Actor::human("user-1", "device-a", "app.stacks.ios")
}

struct Fixture {
    stack: EntityId,
    task: EntityId,
    attachment: EntityId,
}

/// Stack with one task, and an attachment hanging off the task.
fn build_fixture(conn: &Connection) -> Fixture {
    let recorder = EventRecorder::new(conn);
    let stack = EntityId::generate();
    let task = EntityId::generate();
    let attachment = EntityId::generate();

    recorder
        .record_at(
            EventType::StackCreated,
            &stack,
            &EventPayload::StackCreated(StackSnapshot {
                title: "Trip planning".into(),
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
        .expect("stack.created");

    recorder
        .record_at(
            EventType::TaskCreated,
            &task,
            &EventPayload::TaskCreated(TaskSnapshot {
                stack_id: stack.clone(),
                title: "Book flights".into(),
                note: None,
                status: TaskStatus::Pending,
                completed_at_us: None,
                position: 0,
                extra: BTreeMap::new(),
            }),
            &actor(),
            2_000,
        )
        .expect("task.created");

    recorder
        .record_at(
            EventType::AttachmentAdded,
            &attachment,
            &EventPayload::AttachmentAdded(AttachmentSnapshot {
                parent_id: task.clone(),
                file_name: "itinerary.pdf".into(),
                content_type: "application/pdf".into(),
                byte_size: 4096,
                extra: BTreeMap::new(),
            }),
            &actor(),
            3_000,
        )
        .expect("attachment.added");

    Fixture {
        stack,
        task,
        attachment,
    }
}

fn types_of(events: &[Event]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type).collect()
}

#[test]
fn stack_history_includes_tasks_and_their_attachments() {
    let conn = open_in_memory().expect("open");
    let fx = build_fixture(&conn);

    let history = HistoryService::new(&conn)
        .fetch_stack_history_with_related(&fx.stack)
        .expect("stack history");

    // All three events, newest first.
    assert_eq!(
        types_of(&history),
        vec![
            EventType::AttachmentAdded,
            EventType::TaskCreated,
            EventType::StackCreated,
        ]
    );
    assert_eq!(history[0].entity_id, fx.attachment);
    assert_eq!(history[1].entity_id, fx.task);
    assert_eq!(history[2].entity_id, fx.stack);
}

#[test]
fn task_history_excludes_the_parent_stack() {
    let conn = open_in_memory().expect("open");
    let fx = build_fixture(&conn);

    let history = HistoryService::new(&conn)
        .fetch_task_history_with_related(&fx.task)
        .expect("task history");

    assert_eq!(
        types_of(&history),
        vec![EventType::AttachmentAdded, EventType::TaskCreated]
    );
    assert!(
        history.iter().all(|e| e.entity_id != fx.stack),
        "a task's timeline never includes its parent stack's events"
    );
}

#[test]
fn attachments_on_the_stack_itself_are_included() {
    let conn = open_in_memory().expect("open");
    let fx = build_fixture(&conn);

    let stack_attachment = EntityId::generate();
    EventRecorder::new(&conn)
        .record_at(
            EventType::AttachmentAdded,
            &stack_attachment,
            &EventPayload::AttachmentAdded(AttachmentSnapshot {
                parent_id: fx.stack.clone(),
                file_name: "checklist.md".into(),
                content_type: "text/markdown".into(),
                byte_size: 512,
                extra: BTreeMap::new(),
            }),
            &actor(),
            4_000,
        )
        .expect("attachment.added");

    let stack_history = HistoryService::new(&conn)
        .fetch_stack_history_with_related(&fx.stack)
        .expect("stack history");
    assert_eq!(stack_history.len(), 4);
    assert_eq!(stack_history[0].entity_id, stack_attachment);

    // The stack-level attachment does not leak into the task's timeline.
    let task_history = HistoryService::new(&conn)
        .fetch_task_history_with_related(&fx.task)
        .expect("task history");
    assert_eq!(task_history.len(), 2);
}

#[test]
fn deleted_tasks_still_contribute_history() {
    let conn = open_in_memory().expect("open");
    let fx = build_fixture(&conn);

    EventRecorder::new(&conn)
        .record_at(
            EventType::TaskDeleted,
            &fx.task,
            &EventPayload::TaskDeleted(TombstoneData::default()),
            &actor(),
            5_000,
        )
        .expect("task.deleted");

    let history = HistoryService::new(&conn)
        .fetch_stack_history_with_related(&fx.stack)
        .expect("stack history");

    // The tombstoned task's events (including the deletion itself and its
    // attachment's) remain part of the stack timeline.
    assert_eq!(
        types_of(&history),
        vec![
            EventType::TaskDeleted,
            EventType::AttachmentAdded,
            EventType::TaskCreated,
            EventType::StackCreated,
        ]
    );
}

#[test]
fn fetch_history_returns_direct_events_only() {
    let conn = open_in_memory().expect("open");
    let fx = build_fixture(&conn);

    let direct = HistoryService::new(&conn)
        .fetch_history(&fx.stack)
        .expect("direct history");
    assert_eq!(types_of(&direct), vec![EventType::StackCreated]);
}

#[test]
fn fetch_events_by_ids_skips_unknown_ids() {
    let conn = open_in_memory().expect("open");
    let fx = build_fixture(&conn);
    let service = HistoryService::new(&conn);

    let all = service
        .fetch_stack_history_with_related(&fx.stack)
        .expect("history");
    let known: Vec<EventId> = all.iter().map(|e| e.id.clone()).collect();

    let mut requested = known.clone();
    requested.push(EventId::new_unchecked("ffffffff-ffff-7fff-8fff-ffffffffffff"));

    let fetched = service.fetch_events_by_ids(&requested).expect("by ids");
    assert_eq!(fetched.len(), known.len());
    assert_eq!(types_of(&fetched), types_of(&all), "newest-first order");
}
