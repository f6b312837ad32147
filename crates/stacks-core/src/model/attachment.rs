//! Attachment aggregate: a file linked to a stack or a task.

use serde::{Deserialize, Serialize};

use super::ids::EntityId;
use super::sync::SyncMeta;

/// An attachment row in the entity store.
///
/// `parent_id` references either a stack or a task; history composition
/// resolves attachments through this field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: EntityId,
    pub parent_id: EntityId,
    pub file_name: String,
    pub content_type: String,
    pub byte_size: i64,
    pub created_at_us: i64,
    pub updated_at_us: i64,
    #[serde(flatten)]
    pub sync: SyncMeta,
}
