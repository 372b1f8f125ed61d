use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver};
use understanding::{
    evaluate, ArtifactStatus, Condition, Context, Effect, Engine, EngineConfig, Evidence,
    EvidenceEffect, FiringState, GenerationError, GenerationRequest, GenerationService, Hypothesis,
    Moment, MomentCatalog, MomentId, Provenance, SubjectId,
};

const WAIT: Duration = Duration::from_secs(10);

fn engine_with(moments: Vec<Moment>, generator: Arc<dyn GenerationService>) -> Engine {
    Engine::new(EngineConfig::default(), MomentCatalog::new(moments).unwrap(), generator).unwrap()
}

fn counting_generator(calls: &Arc<AtomicUsize>) -> Arc<dyn GenerationService> {
    let calls = Arc::clone(calls);
    Arc::new(move |req: &GenerationRequest| -> Result<String, GenerationError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} content", req.kind))
    })
}

fn report_moment() -> Moment {
    Moment::new(
        "first_report",
        Condition::all(vec![
            Condition::greater_or_equal("evidence.total", 1),
            Condition::equals("artifacts.report.exists", false),
        ]),
        Effect::ProduceArtifact {
            kind: "report".to_string(),
        },
    )
}

fn evidence(subject: &str, content: &str) -> Evidence {
    Evidence::builder()
        .subject(subject)
        .observed_at(Utc::now())
        .content(content)
        .domain("general")
        .build()
        .unwrap()
}

#[test]
fn absent_artifact_path_compares_as_false() {
    let ctx = Context::new();
    assert!(evaluate(&Condition::equals("artifacts.report.exists", false), &ctx));
    assert!(!evaluate(&Condition::equals("artifacts.report.exists", true), &ctx));
    assert!(!evaluate(&Condition::exists("artifacts.report.exists"), &ctx));
}

#[test]
fn missing_artifact_gates_generation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine_with(vec![report_moment()], counting_generator(&calls));
    let child = SubjectId::from("child-1");

    // No evidence yet: the moment is not satisfied.
    assert!(engine.evaluate(&child).unwrap().fired.is_empty());

    engine.observe(evidence("child-1", "first visit")).unwrap();
    assert!(engine.orchestrator().wait_idle(WAIT));

    let artifact = engine.orchestrator().artifact(&child, "report").unwrap().unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Ready);
    assert_eq!(artifact.content.as_deref(), Some("report content"));
    assert!(artifact.generation_duration_ms.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        engine.orchestrator().moment_state(&child, &MomentId::from("first_report")).unwrap(),
        FiringState::Fired
    );

    // Later evidence does not regenerate.
    engine.observe(evidence("child-1", "second visit")).unwrap();
    assert!(engine.orchestrator().wait_idle(WAIT));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn racing_cycles_dispatch_once() {
    const CYCLES: usize = 16;

    let calls = Arc::new(AtomicUsize::new(0));
    let moment = Moment::new(
        "summary",
        Condition::equals("artifacts.summary.exists", false),
        Effect::ProduceArtifact {
            kind: "summary".to_string(),
        },
    );
    let engine = engine_with(vec![moment], counting_generator(&calls));
    let child = SubjectId::from("child-d");
    let barrier = Arc::new(Barrier::new(CYCLES));

    let handles: Vec<_> = (0..CYCLES)
        .map(|_| {
            let engine = engine.clone();
            let child = child.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.evaluate(&child).unwrap()
            })
        })
        .collect();
    let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(engine.orchestrator().wait_idle(WAIT));
    let dispatched: usize = reports.iter().map(|r| r.dispatched.len()).sum();
    assert_eq!(dispatched, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        engine.orchestrator().artifact_status(&child, "summary").unwrap(),
        Some(ArtifactStatus::Ready)
    );
}

#[test]
fn in_flight_generation_blocks_refire() {
    let (release_tx, release_rx) = bounded::<()>(0);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let release: Receiver<()> = release_rx;
    let generator: Arc<dyn GenerationService> =
        Arc::new(move |_: &GenerationRequest| -> Result<String, GenerationError> {
            seen.fetch_add(1, Ordering::SeqCst);
            let _ = release.recv();
            Ok("done".to_string())
        });
    let moment = Moment::new(
        "summary",
        Condition::greater_or_equal("evidence.total", 1),
        Effect::ProduceArtifact {
            kind: "summary".to_string(),
        },
    );
    let engine = engine_with(vec![moment], generator);
    let child = SubjectId::from("child-slow");

    engine.observe(evidence("child-slow", "a")).unwrap();
    assert_eq!(
        engine.orchestrator().artifact_status(&child, "summary").unwrap(),
        Some(ArtifactStatus::Generating)
    );
    assert_eq!(
        engine.orchestrator().moment_state(&child, &MomentId::from("summary")).unwrap(),
        FiringState::Firing
    );
    for _ in 0..5 {
        assert!(engine.evaluate(&child).unwrap().fired.is_empty());
    }

    drop(release_tx);
    assert!(engine.orchestrator().wait_idle(WAIT));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        engine.orchestrator().artifact_status(&child, "summary").unwrap(),
        Some(ArtifactStatus::Ready)
    );
}

#[test]
fn failed_generation_reverts_until_reset() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let generator: Arc<dyn GenerationService> =
        Arc::new(move |_: &GenerationRequest| -> Result<String, GenerationError> {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(GenerationError::service("model offline"))
            } else {
                Ok("recovered".to_string())
            }
        });
    let moment = Moment::new(
        "summary",
        Condition::greater_or_equal("evidence.total", 1),
        Effect::ProduceArtifact {
            kind: "summary".to_string(),
        },
    );
    let engine = engine_with(vec![moment], generator);
    let child = SubjectId::from("child-f");
    let summary = MomentId::from("summary");

    engine.observe(evidence("child-f", "a")).unwrap();
    assert!(engine.orchestrator().wait_idle(WAIT));

    let failed = engine.orchestrator().artifact(&child, "summary").unwrap().unwrap();
    assert_eq!(failed.status, ArtifactStatus::Error);
    assert!(failed.error_detail.as_deref().unwrap_or_default().contains("model offline"));
    assert!(failed.content.is_none());
    assert_eq!(
        engine.orchestrator().moment_state(&child, &summary).unwrap(),
        FiringState::NotFired
    );

    // The failed artifact is not regenerated by ordinary cycles.
    engine.observe(evidence("child-f", "b")).unwrap();
    assert!(engine.orchestrator().wait_idle(WAIT));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    engine.orchestrator().reset_artifact(&child, "summary").unwrap();
    assert_eq!(
        engine.orchestrator().artifact_status(&child, "summary").unwrap(),
        Some(ArtifactStatus::Pending)
    );
    let report = engine.evaluate(&child).unwrap();
    assert_eq!(report.dispatched, vec![summary.clone()]);
    assert!(engine.orchestrator().wait_idle(WAIT));

    let ready = engine.orchestrator().artifact(&child, "summary").unwrap().unwrap();
    assert_eq!(ready.status, ArtifactStatus::Ready);
    assert_eq!(ready.content.as_deref(), Some("recovered"));
    assert!(ready.error_detail.is_none());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(engine.orchestrator().moment_state(&child, &summary).unwrap(), FiringState::Fired);
}

#[test]
fn reset_rejects_healthy_artifacts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine_with(vec![report_moment()], counting_generator(&calls));
    let child = SubjectId::from("child-1");
    engine.observe(evidence("child-1", "visit")).unwrap();
    assert!(engine.orchestrator().wait_idle(WAIT));

    let err = engine.orchestrator().reset_artifact(&child, "report").unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn panicking_generator_is_recorded_as_error() {
    let generator: Arc<dyn GenerationService> =
        Arc::new(|_: &GenerationRequest| -> Result<String, GenerationError> { panic!("boom") });
    let engine = engine_with(vec![report_moment()], generator);
    let child = SubjectId::from("child-p");

    engine.observe(evidence("child-p", "visit")).unwrap();
    assert!(engine.orchestrator().wait_idle(WAIT));
    let artifact = engine.orchestrator().artifact(&child, "report").unwrap().unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Error);
    assert!(artifact.error_detail.unwrap().contains("boom"));
}

#[test]
fn capability_and_affordance_effects_are_idempotent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let moments = vec![
        Moment::new(
            "unlock_video",
            Condition::greater_or_equal("evidence.total", 1),
            Effect::UnlockCapability {
                name: "video_analysis".to_string(),
            },
        ),
        Moment::new(
            "show_card",
            Condition::equals("capabilities.video_analysis", true),
            Effect::ExposeAffordance {
                id: "video_card".to_string(),
                reveals: BTreeSet::from(["video_detail".to_string(), "video_share".to_string()]),
            },
        ),
    ];
    let engine = engine_with(moments, counting_generator(&calls));
    let child = SubjectId::from("child-v");

    assert!(engine.orchestrator().available_affordances(&child).unwrap().is_empty());

    // One cycle unlocks the capability; the next sees it and exposes the card.
    engine.observe(evidence("child-v", "uploaded a clip")).unwrap();
    engine.evaluate(&child).unwrap();
    engine.evaluate(&child).unwrap();

    assert_eq!(
        engine.orchestrator().capabilities(&child).unwrap(),
        BTreeSet::from(["video_analysis".to_string()])
    );
    assert_eq!(
        engine.orchestrator().available_affordances(&child).unwrap(),
        BTreeSet::from([
            "video_card".to_string(),
            "video_detail".to_string(),
            "video_share".to_string(),
        ])
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn belief_summaries_drive_moments() {
    let calls = Arc::new(AtomicUsize::new(0));
    let moment = Moment::new(
        "language_summary",
        Condition::all(vec![
            Condition::greater_than("understanding.domains.language.max_confidence", 0.6),
            Condition::greater_or_equal("understanding.hypotheses.active", 1),
        ]),
        Effect::ProduceArtifact {
            kind: "language_summary".to_string(),
        },
    );
    let engine = engine_with(vec![moment], counting_generator(&calls));
    let child = SubjectId::from("child-l");
    let prov = Provenance::new("session-1", "parent described new words");

    let h = engine
        .form_hypothesis(&child, Hypothesis::draft("vocabulary burst", "language"), &prov)
        .unwrap();
    assert!(engine.orchestrator().wait_idle(WAIT));
    assert_eq!(engine.orchestrator().artifact_status(&child, "language_summary").unwrap(), None);

    engine
        .apply_evidence(&child, h.id, evidence("child-l", "said 'excavator'"), EvidenceEffect::Supports, &prov)
        .unwrap();
    assert!(engine.orchestrator().wait_idle(WAIT));
    assert_eq!(
        engine.orchestrator().artifact_status(&child, "language_summary").unwrap(),
        Some(ArtifactStatus::Ready)
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn external_context_triggers_and_is_visible_to_generator() {
    let (tx, rx) = bounded::<GenerationRequest>(1);
    let generator: Arc<dyn GenerationService> =
        Arc::new(move |req: &GenerationRequest| -> Result<String, GenerationError> {
            let _ = tx.send(req.clone());
            Ok("welcome".to_string())
        });
    let moment = Moment::new(
        "welcome",
        Condition::equals("profile.onboarded", true),
        Effect::ProduceArtifact {
            kind: "welcome".to_string(),
        },
    );
    let engine = engine_with(vec![moment], generator);
    let child = SubjectId::from("child-x");

    assert!(engine.orchestrator().set_external(&child, "profile.onboarded", false).unwrap().fired.is_empty());
    let report = engine.orchestrator().set_external(&child, "profile.onboarded", true).unwrap();
    assert_eq!(report.dispatched, vec![MomentId::from("welcome")]);

    let request = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(request.subject_id, child);
    assert_eq!(request.kind, "welcome");
    assert!(evaluate(&Condition::equals("profile.onboarded", true), &request.context));
    assert!(engine.orchestrator().wait_idle(WAIT));
}

#[test]
fn subjects_fire_independently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine_with(vec![report_moment()], counting_generator(&calls));

    for name in ["a", "b", "c"] {
        engine.observe(evidence(name, "visit")).unwrap();
    }
    assert!(engine.orchestrator().wait_idle(WAIT));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    for name in ["a", "b", "c"] {
        assert_eq!(
            engine.orchestrator().artifact_status(&SubjectId::from(name), "report").unwrap(),
            Some(ArtifactStatus::Ready)
        );
    }
}
