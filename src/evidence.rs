//! Evidence: immutable, timestamped observations about a subject.
//!
//! Evidence is the raw input to belief formation. Once built it is never
//! edited; the builder is the only place its invariants are checked.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::{EvidenceId, SubjectId};

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// Extracted from a conversational turn.
    ConversationalTurn,
    /// Produced by analysing uploaded media.
    MediaAnalysis,
    /// Pushed by an external system or caregiver update.
    ExternalUpdate,
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConversationalTurn => write!(f, "conversational_turn"),
            Self::MediaAnalysis => write!(f, "media_analysis"),
            Self::ExternalUpdate => write!(f, "external_update"),
        }
    }
}

/// An immutable observation.
///
/// # Examples
///
/// ```
/// use understanding::{Evidence, EvidenceSource};
/// use chrono::Utc;
///
/// let evidence = Evidence::builder()
///     .subject("child-1")
///     .observed_at(Utc::now())
///     .source(EvidenceSource::ConversationalTurn)
///     .content("Points at the dog when asked where it is")
///     .domain("language")
///     .build()
///     .unwrap();
///
/// assert_eq!(evidence.domain, "language");
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub subject_id: SubjectId,
    pub observed_at: DateTime<Utc>,
    pub source: EvidenceSource,
    pub content: String,
    /// Free-form category tag.
    pub domain: String,
}

impl Evidence {
    /// Starts building a new piece of evidence.
    #[must_use]
    pub fn builder() -> EvidenceBuilder {
        EvidenceBuilder::default()
    }
}

/// Builder for [`Evidence`].
///
/// `subject`, `observed_at` and a non-blank `content` are required.
#[derive(Debug, Default)]
pub struct EvidenceBuilder {
    id: Option<EvidenceId>,
    subject: Option<SubjectId>,
    observed_at: Option<DateTime<Utc>>,
    source: Option<EvidenceSource>,
    content: Option<String>,
    domain: Option<String>,
}

impl EvidenceBuilder {
    /// Sets the id (generated if not set).
    #[must_use]
    pub fn id(mut self, id: EvidenceId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the subject the observation is about.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<SubjectId>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the observation instant.
    #[must_use]
    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = Some(at);
        self
    }

    /// Sets the source (defaults to a conversational turn).
    #[must_use]
    pub fn source(mut self, source: EvidenceSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the observed content.
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the domain tag (defaults to `general`).
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Builds the evidence.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a required field is missing or blank.
    pub fn build(self) -> Result<Evidence, ValidationError> {
        let subject_id = self.subject.ok_or_else(|| missing("subject_id"))?;
        if subject_id.as_str().trim().is_empty() {
            return Err(empty("subject_id"));
        }
        let observed_at = self.observed_at.ok_or_else(|| missing("observed_at"))?;
        let content = self.content.ok_or_else(|| missing("content"))?;
        if content.trim().is_empty() {
            return Err(empty("content"));
        }

        Ok(Evidence {
            id: self.id.unwrap_or_default(),
            subject_id,
            observed_at,
            source: self.source.unwrap_or(EvidenceSource::ConversationalTurn),
            content,
            domain: self.domain.unwrap_or_else(|| "general".to_string()),
        })
    }
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MissingField {
        field: field.to_string(),
    }
}

fn empty(field: &str) -> ValidationError {
    ValidationError::EmptyField {
        field: field.to_string(),
    }
}
