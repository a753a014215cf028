//! Tag vocabulary and the polymorphic assignment index.
//!
//! Tags are deduplicated (key, value) pairs. An assignment links a tag to any
//! `(target_type, target_id)` pair; the target is a weak reference that the
//! store never checks against the entity tables.

use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};
use workflow_catalog_schemas::{AssignmentId, Tag, TagAssignment, TagId};

use crate::database::{now_timestamp, Database};
use crate::error::{Result, StoreError};

fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: TagId(row.get(0)?),
        key: row.get(1)?,
        value: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_assignment(row: &Row) -> rusqlite::Result<TagAssignment> {
    Ok(TagAssignment {
        id: AssignmentId(row.get(0)?),
        tag_id: TagId(row.get(1)?),
        target_type: row.get(2)?,
        target_id: row.get(3)?,
    })
}

impl Database {
    // ========== VOCABULARY ==========

    /// Return the tag for `(key, value)`, creating it if needed.
    ///
    /// The insert is a no-op on conflict with the `UNIQUE (key, value)`
    /// constraint, so concurrent callers (even on other connections) end up
    /// with the same row.
    pub fn ensure_tag(&self, key: &str, value: &str) -> Result<Tag> {
        let inserted = self
            .conn
            .query_row(
                "INSERT INTO tags (key, value, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key, value) DO NOTHING
                 RETURNING id, key, value, created_at",
                params![key, value, now_timestamp()],
                row_to_tag,
            )
            .optional()?;

        if let Some(tag) = inserted {
            info!("Created tag: {}={} ({})", tag.key, tag.value, tag.id);
            return Ok(tag);
        }

        let existing = self.conn.query_row(
            "SELECT id, key, value, created_at FROM tags WHERE key = ?1 AND value = ?2",
            params![key, value],
            row_to_tag,
        )?;

        debug!("Reused tag: {}={} ({})", key, value, existing.id);
        Ok(existing)
    }

    pub fn get_tag(&self, id: TagId) -> Result<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, key, value, created_at FROM tags WHERE id = ?1",
                params![id.0],
                row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, key, value, created_at FROM tags ORDER BY key, value",
        )?;
        let tags = stmt
            .query_map([], row_to_tag)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    // ========== ASSIGNMENT INDEX ==========

    /// Attach a tag to a target. Always inserts a new row.
    ///
    /// `target_type` is stored as given; neither the label nor `target_id`
    /// is checked against the entity tables. An unknown `tag_id` fails with
    /// [`StoreError::Reference`].
    pub fn assign_tag(
        &self,
        tag_id: TagId,
        target_type: &str,
        target_id: i64,
    ) -> Result<TagAssignment> {
        let assignment = self
            .conn
            .query_row(
                "INSERT INTO tag_assignments (tag_id, target_type, target_id)
                 VALUES (?1, ?2, ?3)
                 RETURNING id, tag_id, target_type, target_id",
                params![tag_id.0, target_type, target_id],
                row_to_assignment,
            )
            .map_err(|e| match StoreError::from(e) {
                StoreError::Reference(_) => {
                    StoreError::Reference(format!("tag {} does not exist", tag_id))
                }
                other => other,
            })?;

        info!(
            "Assigned tag {} to {} {} ({})",
            tag_id, target_type, target_id, assignment.id
        );
        Ok(assignment)
    }

    /// Tags assigned to a target, in assignment order.
    ///
    /// Duplicate assignments yield duplicate entries. Empty when the target
    /// has no assignments or does not exist.
    pub fn tags_for(&self, target_type: &str, target_id: i64) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.key, t.value, t.created_at
             FROM tag_assignments ta
             JOIN tags t ON t.id = ta.tag_id
             WHERE ta.target_type = ?1 AND ta.target_id = ?2
             ORDER BY ta.id",
        )?;
        let tags = stmt
            .query_map(params![target_type, target_id], row_to_tag)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(
            "Found {} tags for {} {}",
            tags.len(),
            target_type,
            target_id
        );
        Ok(tags)
    }

    /// Raw assignment rows for a target, in assignment order
    pub fn assignments_for(&self, target_type: &str, target_id: i64) -> Result<Vec<TagAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tag_id, target_type, target_id
             FROM tag_assignments
             WHERE target_type = ?1 AND target_id = ?2
             ORDER BY id",
        )?;
        let assignments = stmt
            .query_map(params![target_type, target_id], row_to_assignment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(assignments)
    }
}
