//! The context a cycle evaluates moments against.
//!
//! Layout (external fields are merged at the root first and may be shadowed
//! by the engine-owned paths below):
//!
//! ```text
//! subject.id
//! understanding.hypotheses.{total,forming,active,weakening,evolving,resolved}
//! understanding.domains.<domain>.{hypotheses,max_confidence,evidence}
//! understanding.patterns.total
//! understanding.insights.undisclosed
//! evidence.total
//! artifacts.<kind>.{exists,ready,failed,status}
//! capabilities.<name>        = true
//! affordances.<id>           = true
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::belief::{HypothesisStatus, Understanding};
use crate::id::SubjectId;
use crate::prerequisite::Context;
use crate::value::Value;

use super::artifact::{Artifact, ArtifactStatus};

#[derive(Debug, Clone, Default, PartialEq)]
struct DomainSummary {
    hypotheses: usize,
    max_confidence: f32,
    evidence: usize,
}

/// Counts read from a subject's understanding.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct BeliefSummary {
    by_status: BTreeMap<&'static str, usize>,
    total: usize,
    domains: BTreeMap<String, DomainSummary>,
    patterns: usize,
    undisclosed: usize,
}

const STATUSES: [(HypothesisStatus, &str); 5] = [
    (HypothesisStatus::Forming, "forming"),
    (HypothesisStatus::Active, "active"),
    (HypothesisStatus::Weakening, "weakening"),
    (HypothesisStatus::Evolving, "evolving"),
    (HypothesisStatus::Resolved, "resolved"),
];

impl BeliefSummary {
    pub(crate) fn of(understanding: &Understanding) -> Self {
        let mut summary = Self {
            by_status: STATUSES.iter().map(|(_, name)| (*name, 0)).collect(),
            total: understanding.hypotheses().len(),
            patterns: understanding.patterns().len(),
            undisclosed: understanding.undisclosed_insights().count(),
            ..Self::default()
        };
        for h in understanding.hypotheses() {
            if let Some((_, name)) = STATUSES.iter().find(|(s, _)| *s == h.status) {
                *summary.by_status.entry(*name).or_default() += 1;
            }
            let domain = summary.domains.entry(h.domain.clone()).or_default();
            domain.hypotheses += 1;
            domain.max_confidence = domain.max_confidence.max(h.confidence.value());
            domain.evidence += h.evidence.len();
        }
        summary
    }
}

/// Lifecycle state that feeds the context.
pub(crate) struct LifecycleFacts<'a> {
    pub artifacts: &'a BTreeMap<String, Artifact>,
    pub capabilities: &'a BTreeSet<String>,
    pub affordances: &'a BTreeMap<String, BTreeSet<String>>,
    pub external: &'a Context,
}

fn put(ctx: &mut Context, path: &str, value: impl Into<Value>) {
    if let Err(err) = ctx.set(path, value) {
        debug!(path, error = %err, "skipping unaddressable context path");
    }
}

pub(crate) fn build(
    subject: &SubjectId,
    beliefs: &BeliefSummary,
    evidence_total: usize,
    facts: &LifecycleFacts<'_>,
) -> Context {
    let mut ctx = facts.external.clone();

    put(&mut ctx, "subject.id", subject.as_str());

    put(&mut ctx, "understanding.hypotheses.total", beliefs.total);
    for (name, count) in &beliefs.by_status {
        put(&mut ctx, &format!("understanding.hypotheses.{name}"), *count);
    }
    for (domain, d) in &beliefs.domains {
        let prefix = format!("understanding.domains.{domain}");
        put(&mut ctx, &format!("{prefix}.hypotheses"), d.hypotheses);
        put(&mut ctx, &format!("{prefix}.max_confidence"), d.max_confidence);
        put(&mut ctx, &format!("{prefix}.evidence"), d.evidence);
    }
    put(&mut ctx, "understanding.patterns.total", beliefs.patterns);
    put(&mut ctx, "understanding.insights.undisclosed", beliefs.undisclosed);

    put(&mut ctx, "evidence.total", evidence_total);

    for (kind, artifact) in facts.artifacts {
        let prefix = format!("artifacts.{kind}");
        put(&mut ctx, &format!("{prefix}.exists"), true);
        put(&mut ctx, &format!("{prefix}.ready"), artifact.status == ArtifactStatus::Ready);
        put(&mut ctx, &format!("{prefix}.failed"), artifact.status == ArtifactStatus::Error);
        put(&mut ctx, &format!("{prefix}.status"), artifact.status.to_string());
    }
    for name in facts.capabilities {
        put(&mut ctx, &format!("capabilities.{name}"), true);
    }
    for id in facts.affordances.keys() {
        put(&mut ctx, &format!("affordances.{id}"), true);
    }

    ctx
}
