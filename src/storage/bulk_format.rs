//! Newline-delimited bulk payload parsing
//!
//! A raw bulk payload is a sequence of line pairs: an action line naming the
//! target collection, document kind and optional id, followed by the
//! document body.
//!
//! ```text
//! {"index":{"_index":"results-job-1","_type":"modelState","_id":"job-1_model_state_1"}}
//! {"state":"..."}
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use super::traits::{BulkItem, BulkItemOutcome};
use crate::core::StoreError;

#[derive(Debug, Deserialize)]
struct ActionMeta {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_type")]
    kind: String,
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_parent", default)]
    parent: Option<String>,
}

/// One parsed action: either a document to write into a collection, or an
/// action this store does not execute.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBulkAction {
    Write {
        collection: String,
        item: BulkItem,
    },
    Skipped {
        kind: String,
        id: Option<String>,
        reason: String,
    },
}

impl RawBulkAction {
    /// Per-item failure reported for a skipped action.
    pub fn skipped_outcome(&self) -> Option<BulkItemOutcome> {
        match self {
            RawBulkAction::Skipped { kind, id, reason } => Some(BulkItemOutcome::Failed {
                kind: kind.clone(),
                id: id.clone(),
                reason: reason.clone(),
            }),
            RawBulkAction::Write { .. } => None,
        }
    }
}

/// Parse a bulk payload. Unsupported actions and actions with unusable
/// metadata become [`RawBulkAction::Skipped`]; only text that is not UTF-8
/// or not JSON fails the whole payload.
pub fn parse_bulk_payload(payload: &[u8]) -> Result<Vec<RawBulkAction>, StoreError> {
    let text = std::str::from_utf8(payload).map_err(|e| StoreError::MalformedBulk {
        line: 0,
        reason: format!("payload is not UTF-8: {}", e),
    })?;

    let mut actions = Vec::new();
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    while let Some((line_no, action_line)) = lines.next() {
        let action: Map<String, Value> =
            serde_json::from_str(action_line).map_err(|e| StoreError::MalformedBulk {
                line: line_no + 1,
                reason: e.to_string(),
            })?;
        let (name, meta) = match action.into_iter().next() {
            Some((name, meta)) => (name, meta),
            None => (String::new(), Value::Null),
        };

        // delete is the only action without a body line
        if name == "delete" {
            actions.push(skipped(&meta, format!("unsupported bulk action [{}]", name)));
            continue;
        }

        let (body_no, body_line) = lines.next().ok_or_else(|| StoreError::MalformedBulk {
            line: line_no + 1,
            reason: "action line without a document body".to_string(),
        })?;
        let body: Value =
            serde_json::from_str(body_line).map_err(|e| StoreError::MalformedBulk {
                line: body_no + 1,
                reason: e.to_string(),
            })?;

        if name != "index" && name != "create" {
            actions.push(skipped(&meta, format!("unsupported bulk action [{}]", name)));
            continue;
        }
        match ActionMeta::deserialize(&meta) {
            Ok(meta) => {
                let mut item = BulkItem::new(meta.kind, meta.id, body);
                item.parent = meta.parent;
                actions.push(RawBulkAction::Write {
                    collection: meta.index,
                    item,
                });
            }
            Err(e) => actions.push(skipped(
                &meta,
                format!("invalid [{}] metadata on line {}: {}", name, line_no + 1, e),
            )),
        }
    }

    Ok(actions)
}

fn skipped(meta: &Value, reason: String) -> RawBulkAction {
    let field = |name: &str| meta.get(name).and_then(Value::as_str).map(str::to_string);
    RawBulkAction::Skipped {
        kind: field("_type").unwrap_or_default(),
        id: field("_id"),
        reason,
    }
}
