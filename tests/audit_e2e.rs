use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::process::Command;
use std::sync::Arc;

use chrono::{Duration, Utc};
use understanding::storage::jsonl::{read_events, write_events};
use understanding::{
    Engine, EngineConfig, Evidence, EvidenceEffect, EventLog, GenerationError, GenerationRequest,
    Hypothesis, InMemoryEventLog, MomentCatalog, PendingInsight, Provenance, ResolutionKind,
    StorageError, SubjectId, Understanding,
};

fn populated_engine(subject: &SubjectId) -> Engine {
    let engine = Engine::new(
        EngineConfig::default(),
        MomentCatalog::default(),
        Arc::new(|_: &GenerationRequest| -> Result<String, GenerationError> { Ok(String::new()) }),
    )
    .unwrap();
    let prov = Provenance::new("session-7", "weekly check-in");
    let start = Utc::now();

    let early = engine
        .form_hypothesis(subject, Hypothesis::draft("points to request", "communication"), &prov)
        .unwrap();
    let later = engine
        .form_hypothesis(subject, Hypothesis::draft("uses words to request", "communication"), &prov)
        .unwrap();
    for minutes in 0..3 {
        let evidence = Evidence::builder()
            .subject(subject.clone())
            .observed_at(start + Duration::minutes(minutes))
            .content(format!("asked for milk ({minutes})"))
            .domain("communication")
            .build()
            .unwrap();
        engine
            .apply_evidence(subject, later.id, evidence, EvidenceEffect::Supports, &prov)
            .unwrap();
    }
    engine
        .resolve(subject, early.id, ResolutionKind::Evolved, None, Some(later.id), &prov)
        .unwrap();
    engine
        .add_insight(subject, PendingInsight::draft("words replacing gestures").related(later.id), &prov)
        .unwrap();
    engine
}

#[test]
fn exported_log_replays_to_live_state() {
    let subject = SubjectId::from("child-audit");
    let engine = populated_engine(&subject);
    let events = engine.event_log().replay(&subject).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let written = write_events(BufWriter::new(File::create(&path).unwrap()), &events).unwrap();
    assert_eq!(written, events.len());

    let imported = read_events(BufReader::new(File::open(&path).unwrap())).unwrap();
    assert_eq!(imported, events);

    let log = InMemoryEventLog::from_events(imported).unwrap();
    let replayed = Understanding::replay(subject.clone(), &log.replay(&subject).unwrap()).unwrap();
    assert_eq!(replayed, engine.beliefs().understanding(&subject).unwrap());
}

#[test]
fn truncated_export_fails_integrity_checks() {
    let subject = SubjectId::from("child-audit");
    let engine = populated_engine(&subject);
    // Dropping the first creation event orphans everything that refers to it.
    let events: Vec<_> = engine.event_log().replay(&subject).unwrap().into_iter().skip(1).collect();

    let err = InMemoryEventLog::from_events(events).unwrap_err();
    assert!(matches!(err, StorageError::Integrity(_)));
}

#[test]
fn audit_binary_replays_and_explains() {
    let subject = SubjectId::from("child-cli");
    let engine = populated_engine(&subject);
    let events = engine.event_log().replay(&subject).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    write_events(BufWriter::new(File::create(&path).unwrap()), &events).unwrap();

    let bin = env!("CARGO_BIN_EXE_understanding-audit");

    let out = Command::new(bin)
        .args(["subjects", "--events"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout.trim(), format!("child-cli\t{}", events.len()));

    let out = Command::new(bin)
        .args(["replay", "--subject", "child-cli", "--events"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let understanding: Understanding = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(understanding, engine.beliefs().understanding(&subject).unwrap());

    let resolution = events
        .iter()
        .find(|e| e.triggered_by.is_some())
        .unwrap();
    let out = Command::new(bin)
        .args(["chain", "--event", &resolution.id.to_string(), "--events"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(&resolution.triggered_by.unwrap().to_string()));
    assert!(lines[1].trim_start().contains(&resolution.id.to_string()));

    let out = Command::new(bin)
        .args(["chain", "--event", &uuid::Uuid::new_v4().to_string(), "--events"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!out.status.success());
}
