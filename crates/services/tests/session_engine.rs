use std::sync::Arc;

use async_trait::async_trait;
use exam_core::model::{
    Difficulty, ModeParams, ProgressRecord, Question, QuestionId, QuestionTags, QuestionType,
    SimulationDescriptor, SimulationId, TopicId,
};
use exam_core::route::{LaunchRequest, RouteTarget};
use exam_core::session::{SessionError, Transition};
use exam_core::time::{fixed_clock, fixed_now};
use services::{
    AppServices, ControllerError, EngineConfig, Notice, RecordingTelemetry, ResumeDecision,
    SaveOutcome, SaveReport, SessionController, SessionPhase,
};
use storage::repository::{
    InMemoryProgressRepository, InMemoryQuestionBank, ProgressRepository, QuestionCatalog,
    Storage, StorageError,
};

const CORRECT: usize = 0;
const WRONG: usize = 1;

struct QuotaExceeded;

#[async_trait]
impl ProgressRepository for QuotaExceeded {
    async fn read(&self, _id: &SimulationId) -> Result<Option<ProgressRecord>, StorageError> {
        Ok(None)
    }
    async fn write(&self, _record: &ProgressRecord) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("quota exceeded".into()))
    }
    async fn clear(&self, _id: &SimulationId) -> Result<(), StorageError> {
        Ok(())
    }
    async fn list_ids(&self) -> Result<Vec<SimulationId>, StorageError> {
        Ok(Vec::new())
    }
}

fn question(id: u64, level: Difficulty, kind: QuestionType, topic: u64) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Question {id}"),
        vec!["right".into(), "wrong".into(), "also wrong".into()],
        CORRECT,
        Some("The first option is always right here.".into()),
        QuestionTags {
            kind,
            difficulty: level,
            topic_id: Some(TopicId::new(topic)),
            story_id: None,
        },
    )
    .unwrap()
}

struct Fixture {
    services: AppServices,
    local: Arc<InMemoryProgressRepository>,
    telemetry: RecordingTelemetry,
}

async fn fixture(config: EngineConfig) -> Fixture {
    let bank = InMemoryQuestionBank::new();
    let mut id = 1;
    for (level, kind, topic, count) in [
        (Difficulty::Medium, QuestionType::SentenceCompletion, 1, 15),
        (Difficulty::Easy, QuestionType::Restatement, 2, 10),
        (Difficulty::Hard, QuestionType::Restatement, 3, 3),
    ] {
        for _ in 0..count {
            bank.upsert_question(&question(id, level, kind, topic))
                .await
                .unwrap();
            id += 1;
        }
    }
    fixture_with(bank, Arc::new(InMemoryProgressRepository::new()), config)
}

fn fixture_with(
    bank: InMemoryQuestionBank,
    local: Arc<InMemoryProgressRepository>,
    config: EngineConfig,
) -> Fixture {
    let telemetry = RecordingTelemetry::new();
    let storage = Storage {
        progress: local.clone(),
        questions: Arc::new(bank),
    };
    let services = AppServices::new(storage, None, fixed_clock(), config)
        .with_telemetry(Arc::new(telemetry.clone()), false);
    Fixture {
        services,
        local,
        telemetry,
    }
}

fn request(params: ModeParams) -> LaunchRequest {
    LaunchRequest {
        target: RouteTarget::Descriptor(SimulationDescriptor::new(params).unwrap()),
        reset_requested: false,
        continue_requested: false,
        force_exam: false,
    }
}

fn medium_sentences() -> ModeParams {
    ModeParams::Difficulty {
        level: Difficulty::Medium,
        kind: QuestionType::SentenceCompletion,
    }
}

fn topic(id: u64) -> ModeParams {
    ModeParams::Topic {
        topic_id: TopicId::new(id),
    }
}

async fn answer(controller: &SessionController, option: usize) -> Transition {
    controller.select_answer(option).await.unwrap();
    controller.submit_answer().await.unwrap();
    controller.next_question().await.unwrap()
}

#[tokio::test]
async fn difficulty_session_resumes_and_completes_once() {
    let fx = fixture(EngineConfig::default()).await;
    let launch = fx
        .services
        .launcher()
        .start(SimulationDescriptor::new(medium_sentences()).unwrap(), false)
        .await
        .unwrap();
    let mut url = launch.url;
    let launch_request = fx.services.parse_launch(&mut url).unwrap();

    let controller = fx.services.controller();
    let report = controller.mount(&launch_request).await.unwrap();
    assert_eq!(report.decision, ResumeDecision::Fresh);
    assert_eq!(
        report.simulation_id.as_str(),
        "difficulty_medium_sentence-completion"
    );
    for _ in 0..5 {
        answer(&controller, CORRECT).await;
    }
    controller.unmount().await;

    // reload
    let reloaded = fx.services.controller();
    let report = reloaded
        .mount(&fx.services.parse_launch(&mut url).unwrap())
        .await
        .unwrap();
    assert_eq!(report.decision, ResumeDecision::Resumed);
    let view = reloaded.view().await.unwrap();
    assert_eq!(view.current_index, 5);
    assert_eq!(view.breakdown.correct, 5);

    let mut last = Transition::Unchanged;
    for option in [CORRECT, WRONG, CORRECT, CORRECT, WRONG, CORRECT, WRONG, CORRECT, WRONG, CORRECT]
    {
        last = answer(&reloaded, option).await;
    }
    assert_eq!(last, Transition::Completed);
    assert_eq!(reloaded.phase().await, SessionPhase::Complete);

    let view = reloaded.view().await.unwrap();
    assert_eq!(view.breakdown.correct, 11);
    assert_eq!(view.display_score(), 73);
    assert_eq!(fx.telemetry.count("simulation_complete"), 1);
    assert_eq!(fx.telemetry.count("simulation_start"), 1);

    let stored = fx
        .local
        .read(&report.simulation_id)
        .await
        .unwrap()
        .expect("final state persisted");
    assert!(stored.simulation_complete());
    assert_eq!(stored.correct_answers(), 11);
}

#[tokio::test]
async fn reload_restores_index_answers_and_score() {
    let fx = fixture(EngineConfig::default()).await;
    let controller = fx.services.controller();
    controller.mount(&request(topic(2))).await.unwrap();
    for option in [CORRECT, WRONG, CORRECT, CORRECT] {
        answer(&controller, option).await;
    }
    controller.select_answer(WRONG).await.unwrap();
    controller.submit_answer().await.unwrap();
    controller.toggle_flag().await.unwrap();
    let before = controller.view().await.unwrap();
    controller.unmount().await;

    let reloaded = fx.services.controller();
    reloaded.mount(&request(topic(2))).await.unwrap();
    let after = reloaded.view().await.unwrap();

    assert_eq!(after.current_index, before.current_index);
    assert_eq!(after.breakdown, before.breakdown);
    assert_eq!(after.submitted, Some(WRONG));
    assert_eq!(after.flags, vec![4]);
}

#[tokio::test]
async fn score_is_identical_fresh_and_after_resume() {
    let fx = fixture(EngineConfig::default()).await;
    let controller = fx.services.controller();
    controller.mount(&request(topic(2))).await.unwrap();
    for option in [CORRECT, CORRECT, WRONG, CORRECT, CORRECT, WRONG, CORRECT, CORRECT, WRONG] {
        answer(&controller, option).await;
    }
    controller.select_answer(CORRECT).await.unwrap();
    controller.submit_answer().await.unwrap();
    let fresh = controller.view().await.unwrap().breakdown;
    assert_eq!(fresh.total, 10);
    assert_eq!(fresh.correct, 7);
    assert_eq!(fresh.display_score(), 70);
    assert!((fresh.score - 70.0).abs() < 1e-9);
    controller.unmount().await;

    let reloaded = fx.services.controller();
    reloaded.mount(&request(topic(2))).await.unwrap();
    assert_eq!(reloaded.view().await.unwrap().breakdown, fresh);
}

#[tokio::test]
async fn restart_clears_progress_until_next_answer() {
    let fx = fixture(EngineConfig::default()).await;
    let controller = fx.services.controller();
    let report = controller.mount(&request(topic(3))).await.unwrap();
    for _ in 0..3 {
        answer(&controller, CORRECT).await;
    }
    assert_eq!(controller.phase().await, SessionPhase::Complete);

    let restarted = controller.restart().await.unwrap();
    assert_eq!(restarted.decision, ResumeDecision::Fresh);
    assert_eq!(controller.phase().await, SessionPhase::Active);
    assert!(!fx.services.resumable(&report.simulation_id).await);

    controller.save_now().await;
    assert!(!fx.services.resumable(&report.simulation_id).await);

    answer(&controller, CORRECT).await;
    controller.save_now().await;
    assert!(fx.services.resumable(&report.simulation_id).await);
    // markers are per tab: a restart does not re-announce the start
    assert_eq!(fx.telemetry.count("simulation_start"), 1);
}

#[tokio::test]
async fn restart_requires_a_finished_attempt() {
    let fx = fixture(EngineConfig::default()).await;
    let controller = fx.services.controller();
    controller.mount(&request(topic(3))).await.unwrap();
    assert!(matches!(
        controller.restart().await,
        Err(ControllerError::NotComplete)
    ));
}

#[tokio::test]
async fn only_an_explicit_start_invalidates_other_simulations() {
    let fx = fixture(EngineConfig::default()).await;
    let topic_a = fx.services.controller();
    let a = topic_a.mount(&request(topic(2))).await.unwrap().simulation_id;
    answer(&topic_a, CORRECT).await;
    answer(&topic_a, CORRECT).await;
    topic_a.unmount().await;
    assert!(fx.services.resumable(&a).await);

    // opening B directly (resume path) leaves A alone
    let topic_b = fx.services.controller();
    topic_b.mount(&request(topic(3))).await.unwrap();
    topic_b.unmount().await;
    assert!(fx.services.resumable(&a).await);

    // an explicit start of B clears A
    let launch = fx
        .services
        .launcher()
        .start(SimulationDescriptor::new(topic(3)).unwrap(), false)
        .await
        .unwrap();
    assert_eq!(launch.reset.cleared, vec![a.clone()]);
    assert!(!fx.services.resumable(&a).await);
}

#[tokio::test]
async fn exam_timer_expiry_forces_completion() {
    let config = EngineConfig {
        exam_duration_secs: 1,
        ..EngineConfig::default()
    };
    let fx = fixture(config).await;
    let controller = fx.services.controller();
    let mut exam = request(topic(2));
    exam.force_exam = true;
    controller.mount(&exam).await.unwrap();
    answer(&controller, CORRECT).await;

    let view = controller.view().await.unwrap();
    assert!(view.exam_mode);
    assert_eq!(view.remaining_time, Some(1));

    assert_eq!(controller.tick().await.unwrap(), Transition::Completed);
    assert_eq!(controller.phase().await, SessionPhase::Complete);
    let breakdown = controller.view().await.unwrap().breakdown;
    assert_eq!(breakdown.answered, 1);
    assert_eq!(breakdown.correct, 1);
    assert_eq!(breakdown.display_score(), 10);
    assert!(matches!(
        controller.next_question().await,
        Err(ControllerError::NotActive)
    ));
}

#[tokio::test]
async fn exam_rules_lock_submitted_questions() {
    let fx = fixture(EngineConfig::default()).await;
    let controller = fx.services.controller();
    let mut exam = request(topic(2));
    exam.force_exam = true;
    controller.mount(&exam).await.unwrap();

    controller.select_answer(WRONG).await.unwrap();
    controller.submit_answer().await.unwrap();
    assert_eq!(
        controller.select_answer(CORRECT).await.unwrap(),
        Transition::Unchanged
    );
    assert!(controller.view().await.unwrap().question.unwrap().explanation.is_none());
    controller.next_question().await.unwrap();

    assert!(matches!(
        controller.previous_question().await,
        Err(ControllerError::Session(SessionError::RevisitLocked { index: 0 }))
    ));
}

#[tokio::test]
async fn practice_answers_stay_editable_until_navigation() {
    let fx = fixture(EngineConfig::default()).await;
    let controller = fx.services.controller();
    controller.mount(&request(topic(2))).await.unwrap();

    controller.select_answer(WRONG).await.unwrap();
    controller.submit_answer().await.unwrap();
    let view = controller.view().await.unwrap();
    assert_eq!(view.question.unwrap().correct_option, Some(CORRECT));
    controller.select_answer(CORRECT).await.unwrap();
    controller.submit_answer().await.unwrap();
    assert_eq!(controller.view().await.unwrap().breakdown.correct, 1);

    controller.next_question().await.unwrap();
    controller.previous_question().await.unwrap();
    let back = controller.view().await.unwrap();
    assert!(back.locked);
    assert_eq!(
        controller.select_answer(WRONG).await.unwrap(),
        Transition::Unchanged
    );
}

#[tokio::test]
async fn save_during_loading_never_touches_stored_progress() {
    let fx = fixture(EngineConfig::default()).await;
    let first = fx.services.controller();
    let id = first.mount(&request(topic(2))).await.unwrap().simulation_id;
    for _ in 0..3 {
        answer(&first, CORRECT).await;
    }
    first.unmount().await;
    let stored = fx.local.read(&id).await.unwrap().unwrap();

    let reloaded = fx.services.controller();
    assert!(!reloaded.is_progress_loaded().await);
    assert_eq!(reloaded.save_now().await, SaveOutcome::Skipped);
    assert_eq!(fx.local.read(&id).await.unwrap().unwrap(), stored);

    reloaded.mount(&request(topic(2))).await.unwrap();
    assert!(reloaded.is_progress_loaded().await);
    assert_eq!(reloaded.view().await.unwrap().current_index, 3);
}

#[tokio::test]
async fn reset_marker_applies_once_and_notifies_once() {
    let fx = fixture(EngineConfig::default()).await;
    let first = fx.services.controller();
    first.mount(&request(topic(2))).await.unwrap();
    answer(&first, CORRECT).await;
    answer(&first, CORRECT).await;
    first.unmount().await;

    let launch = fx
        .services
        .launcher()
        .start(SimulationDescriptor::new(topic(2)).unwrap(), true)
        .await
        .unwrap();
    let mut url = launch.url;
    let with_reset = fx.services.parse_launch(&mut url).unwrap();
    assert!(with_reset.reset_requested);
    let replayed = fx.services.parse_launch(&mut url).unwrap();
    assert!(!replayed.reset_requested);

    let controller = fx.services.controller();
    let report = controller.mount(&with_reset).await.unwrap();
    assert_eq!(report.decision, ResumeDecision::Reset);
    assert_eq!(controller.view().await.unwrap().current_index, 0);
    assert_eq!(controller.take_notice().await, Some(Notice::ProgressReset));
    assert_eq!(controller.take_notice().await, None);

    // the stripped URL resumes instead of resetting again
    answer(&controller, CORRECT).await;
    controller.unmount().await;
    let again = fx.services.controller();
    assert_eq!(
        again.mount(&replayed).await.unwrap().decision,
        ResumeDecision::Resumed
    );
    assert_eq!(again.take_notice().await, None);
}

#[tokio::test]
async fn question_count_change_discards_stale_progress() {
    let bank = InMemoryQuestionBank::new();
    for id in 1..=4 {
        bank.upsert_question(&question(id, Difficulty::Easy, QuestionType::Restatement, 9))
            .await
            .unwrap();
    }
    let local = Arc::new(InMemoryProgressRepository::new());
    let fx = fixture_with(bank.clone(), local.clone(), EngineConfig::default());
    let controller = fx.services.controller();
    controller.mount(&request(topic(9))).await.unwrap();
    answer(&controller, CORRECT).await;
    answer(&controller, CORRECT).await;
    controller.unmount().await;

    bank.upsert_question(&question(5, Difficulty::Easy, QuestionType::Restatement, 9))
        .await
        .unwrap();
    let reloaded = fx.services.controller();
    let report = reloaded.mount(&request(topic(9))).await.unwrap();
    assert_eq!(report.decision, ResumeDecision::Fresh);
    assert_eq!(reloaded.view().await.unwrap().total, 5);
    assert!(local.read(&report.simulation_id).await.unwrap().is_none());
}

#[tokio::test]
async fn local_write_failure_keeps_session_running() {
    let bank = InMemoryQuestionBank::new();
    bank.upsert_question(&question(1, Difficulty::Easy, QuestionType::Restatement, 1))
        .await
        .unwrap();
    bank.upsert_question(&question(2, Difficulty::Easy, QuestionType::Restatement, 1))
        .await
        .unwrap();
    let storage = Storage {
        progress: Arc::new(QuotaExceeded),
        questions: Arc::new(bank),
    };
    let services = AppServices::new(storage, None, fixed_clock(), EngineConfig::default());
    let controller = services.controller();
    controller.mount(&request(topic(1))).await.unwrap();

    answer(&controller, CORRECT).await;
    assert_eq!(
        controller.save_now().await,
        SaveOutcome::Saved(SaveReport {
            local: false,
            remote: None
        })
    );
    assert_eq!(answer(&controller, CORRECT).await, Transition::Completed);
    assert_eq!(controller.view().await.unwrap().display_score(), 100);
}

#[tokio::test]
async fn remote_tier_mirrors_writes_when_online() {
    let bank = InMemoryQuestionBank::new();
    bank.upsert_question(&question(1, Difficulty::Easy, QuestionType::Restatement, 1))
        .await
        .unwrap();
    bank.upsert_question(&question(2, Difficulty::Easy, QuestionType::Restatement, 1))
        .await
        .unwrap();
    let remote = Arc::new(InMemoryProgressRepository::new());
    let storage = Storage {
        progress: Arc::new(InMemoryProgressRepository::new()),
        questions: Arc::new(bank),
    };
    let services = AppServices::new(
        storage,
        Some(remote.clone()),
        fixed_clock(),
        EngineConfig::default(),
    );
    let controller = services.controller();
    controller.mount(&request(topic(1))).await.unwrap();
    answer(&controller, CORRECT).await;

    services.progress_store().set_online(false);
    controller.save_now().await;
    assert!(remote.is_empty().unwrap());

    services.progress_store().set_online(true);
    controller.save_now().await;
    let id = SimulationId::from_persisted("topic_1");
    let mirrored = remote.read(&id).await.unwrap().unwrap();
    assert_eq!(mirrored.current_question_index(), 1);
    assert_eq!(mirrored.updated_at(), fixed_now());
}

#[tokio::test]
async fn restart_while_offline_is_not_undone_by_the_remote_copy() {
    let bank = InMemoryQuestionBank::new();
    for id in 1..=2 {
        bank.upsert_question(&question(id, Difficulty::Easy, QuestionType::Restatement, 1))
            .await
            .unwrap();
    }
    let remote = Arc::new(InMemoryProgressRepository::new());
    let storage = Storage {
        progress: Arc::new(InMemoryProgressRepository::new()),
        questions: Arc::new(bank),
    };
    let services = AppServices::new(
        storage,
        Some(remote.clone()),
        fixed_clock(),
        EngineConfig::default(),
    );
    let controller = services.controller();
    controller.mount(&request(topic(1))).await.unwrap();
    answer(&controller, CORRECT).await;
    assert_eq!(answer(&controller, CORRECT).await, Transition::Completed);
    assert_eq!(remote.len().unwrap(), 1);

    let store = services.progress_store();
    store.set_online(false);
    controller.restart().await.unwrap();
    store.set_online(true);

    let id = SimulationId::from_persisted("topic_1");
    assert!(store.read(&id).await.unwrap().is_none());
    assert!(remote.is_empty().unwrap());
    assert!(store.pending_clears().is_empty());
}
