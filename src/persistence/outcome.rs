//! Write outcomes
//!
//! Persistence never propagates errors to its caller. What went wrong is
//! reported as warnings embedded in the outcome of each operation instead.

use super::identity::DocumentKind;

#[derive(Debug, Clone, PartialEq)]
pub struct PersistWarning {
    pub kind: DocumentKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    /// Documents the store acknowledged
    pub documents_written: usize,
    /// Documents that were attempted but not stored
    pub documents_failed: usize,
    pub warnings: Vec<PersistWarning>,
}

impl WriteOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(count: usize) -> Self {
        Self {
            documents_written: count,
            ..Self::default()
        }
    }

    pub fn failed(kind: DocumentKind, count: usize, message: impl Into<String>) -> Self {
        Self {
            documents_written: 0,
            documents_failed: count,
            warnings: vec![PersistWarning {
                kind,
                message: message.into(),
            }],
        }
    }

    /// Nothing was attempted; the caller passed no object.
    pub fn nothing_to_persist(kind: DocumentKind, job_id: &str) -> Self {
        Self {
            warnings: vec![PersistWarning {
                kind,
                message: format!("No {} to persist for job {}", kind, job_id),
            }],
            ..Self::default()
        }
    }

    pub fn warn(&mut self, kind: DocumentKind, message: impl Into<String>) {
        self.warnings.push(PersistWarning {
            kind,
            message: message.into(),
        });
    }

    pub fn merge(&mut self, other: WriteOutcome) {
        self.documents_written += other.documents_written;
        self.documents_failed += other.documents_failed;
        self.warnings.extend(other.warnings);
    }

    /// At least one document was written and none failed.
    pub fn is_success(&self) -> bool {
        self.documents_written > 0 && self.documents_failed == 0
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn warnings_for(&self, kind: DocumentKind) -> impl Iterator<Item = &PersistWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}
