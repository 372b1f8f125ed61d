//! Generated artifacts and their guarded status transitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::ArtifactId;

/// Where an artifact is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// Created, not yet handed to the generation service.
    Pending,
    /// A generation job is in flight.
    Generating,
    /// Content is available.
    Ready,
    /// Generation failed. Terminal until reset.
    Error,
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Generating => write!(f, "generating"),
            Self::Ready => write!(f, "ready"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A piece of derived work produced by the generation service.
///
/// `content` is present only when ready; `error_detail` only on error.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub kind: String,
    pub status: ArtifactStatus,
    pub content: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub generation_duration_ms: Option<u64>,
}

impl Artifact {
    pub(crate) fn pending(kind: impl Into<String>) -> Self {
        Self {
            id: ArtifactId::new(),
            kind: kind.into(),
            status: ArtifactStatus::Pending,
            content: None,
            error_detail: None,
            created_at: Utc::now(),
            generation_duration_ms: None,
        }
    }

    fn transition(&mut self, from: ArtifactStatus, to: ArtifactStatus) -> Result<(), ValidationError> {
        if self.status != from {
            return Err(ValidationError::InvalidTransition {
                entity: "artifact",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// `pending -> generating`.
    pub(crate) fn start_generation(&mut self) -> Result<(), ValidationError> {
        self.transition(ArtifactStatus::Pending, ArtifactStatus::Generating)
    }

    /// `generating -> pending`, used when the job could not be queued.
    pub(crate) fn abandon_generation(&mut self) -> Result<(), ValidationError> {
        self.transition(ArtifactStatus::Generating, ArtifactStatus::Pending)
    }

    /// `generating -> ready`.
    pub(crate) fn complete(&mut self, content: String, duration_ms: u64) -> Result<(), ValidationError> {
        self.transition(ArtifactStatus::Generating, ArtifactStatus::Ready)?;
        self.content = Some(content);
        self.error_detail = None;
        self.generation_duration_ms = Some(duration_ms);
        Ok(())
    }

    /// `generating -> error`.
    pub(crate) fn fail(&mut self, detail: String, duration_ms: u64) -> Result<(), ValidationError> {
        self.transition(ArtifactStatus::Generating, ArtifactStatus::Error)?;
        self.content = None;
        self.error_detail = Some(detail);
        self.generation_duration_ms = Some(duration_ms);
        Ok(())
    }

    /// `error -> pending`. Administrative only.
    pub(crate) fn reset(&mut self) -> Result<(), ValidationError> {
        self.transition(ArtifactStatus::Error, ArtifactStatus::Pending)?;
        self.error_detail = None;
        self.generation_duration_ms = None;
        Ok(())
    }

    /// True once generation produced content.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == ArtifactStatus::Ready
    }
}
