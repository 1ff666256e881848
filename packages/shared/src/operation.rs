//! Document operations.
//!
//! An operation is a single edit declared against a document version. The
//! document version is a strictly increasing integer; an operation applies
//! only when its `base_version` is the document's current version, and
//! applying it produces `target_version == base_version + 1`.

use serde::{Deserialize, Serialize};

/// Kind of edit carried by an [`Operation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Delete,
    Retain,
}

/// A single document change (`DocumentChange` on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    pub user_id: String,
    pub base_version: u64,
    pub target_version: u64,
    /// Unix timestamp in milliseconds, as stamped by the author
    pub timestamp: i64,
}

impl Operation {
    pub fn insert(
        position: usize,
        text: impl Into<String>,
        user_id: impl Into<String>,
        base_version: u64,
        timestamp: i64,
    ) -> Self {
        let text = text.into();
        Self {
            kind: OperationKind::Insert,
            position,
            length: Some(text.chars().count()),
            text: Some(text),
            user_id: user_id.into(),
            base_version,
            target_version: base_version + 1,
            timestamp,
        }
    }

    pub fn delete(
        position: usize,
        length: usize,
        user_id: impl Into<String>,
        base_version: u64,
        timestamp: i64,
    ) -> Self {
        Self {
            kind: OperationKind::Delete,
            position,
            text: None,
            length: Some(length),
            user_id: user_id.into(),
            base_version,
            target_version: base_version + 1,
            timestamp,
        }
    }

    pub fn retain(
        position: usize,
        length: usize,
        user_id: impl Into<String>,
        base_version: u64,
        timestamp: i64,
    ) -> Self {
        Self {
            kind: OperationKind::Retain,
            position,
            text: None,
            length: Some(length),
            user_id: user_id.into(),
            base_version,
            target_version: base_version + 1,
            timestamp,
        }
    }

    /// `target_version == base_version + 1`
    pub fn has_consistent_versions(&self) -> bool {
        self.base_version.checked_add(1) == Some(self.target_version)
    }

    /// Re-declare this operation against `version`
    pub fn rebased(&self, version: u64) -> Self {
        Self {
            base_version: version,
            target_version: version + 1,
            ..self.clone()
        }
    }
}
