//! End-to-end commit scenarios against scripted participants.

use std::sync::Arc;
use std::time::{Duration, Instant};
use twopc_core::{
    CoordinatorConfig, Decision, FailurePhase, Outcome, Participant, ParticipantFault,
    ParticipantId, RecordKind, RetryConfig, StorageDecisionLog, TransactionId, TransactionState,
};
use twopc_core::{Coordinator, DecisionLog};
use twopc_storage::{InMemoryBackend, StorageBackend};
use twopc_testkit::prelude::*;

#[tokio::test]
async fn all_yes_votes_commit_everyone_once() {
    let coordinator = memory_coordinator();
    let participants = [
        ScriptedParticipant::yes("inventory"),
        ScriptedParticipant::yes("payment"),
        ScriptedParticipant::yes("shipping"),
    ];
    let txid = begin_with(&coordinator, &participants);

    let report = coordinator.commit_transaction(txid).await.unwrap();

    assert_eq!(report.outcome, Outcome::Committed);
    assert!(report.is_complete());
    for p in &participants {
        assert_eq!(p.prepare_count(txid), 1);
        assert_eq!(p.commit_count(txid), 1);
        assert_eq!(p.rollback_count(txid), 0);
    }
}

#[tokio::test]
async fn one_no_vote_rolls_back_the_others() {
    let coordinator = memory_coordinator();
    let first = ScriptedParticipant::yes("first");
    let second = ScriptedParticipant::no("second");
    let third = ScriptedParticipant::yes("third");
    let txid = begin_with(&coordinator, &[first.clone(), second.clone(), third.clone()]);

    let report = coordinator.commit_transaction(txid).await.unwrap();

    assert_eq!(report.outcome, Outcome::Aborted);
    assert!(first.has_rolled_back(txid));
    assert!(third.has_rolled_back(txid));
    assert_eq!(second.commit_count(txid), 0);
    assert_eq!(first.commit_count(txid) + third.commit_count(txid), 0);
    assert_eq!(coordinator.state(txid).unwrap(), TransactionState::Aborted);
}

#[tokio::test]
async fn silent_participant_aborts_within_the_timeout() {
    let config = fast_config().prepare_timeout(Duration::from_millis(100));
    let coordinator = Coordinator::in_memory(config).unwrap();
    let quick = ScriptedParticipant::yes("quick");
    let silent = ScriptedParticipant::slow("silent", Duration::from_secs(30));
    let txid = begin_with(&coordinator, &[quick.clone(), silent.clone()]);

    let started = Instant::now();
    let report = coordinator.commit_transaction(txid).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.outcome, Outcome::Aborted);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    assert_eq!(quick.commit_count(txid), 0);
    assert!(quick.has_rolled_back(txid));
    assert_eq!(coordinator.stats().snapshot().prepare_timeouts, 1);
}

#[tokio::test]
async fn transient_commit_faults_are_retried_to_completion() {
    let coordinator = memory_coordinator();
    let steady = ScriptedParticipant::yes("steady");
    let shaky = Arc::new(ScriptedParticipant::new("shaky").failing_commits(2));
    let txid = begin_with(&coordinator, &[steady.clone(), shaky.clone()]);

    let report = coordinator.commit_transaction(txid).await.unwrap();

    assert_eq!(report.outcome, Outcome::Committed);
    assert!(report.is_complete());
    assert_eq!(shaky.commit_count(txid), 3);
    assert!(shaky.has_committed(txid));
    assert_eq!(steady.rollback_count(txid) + shaky.rollback_count(txid), 0);
    assert_eq!(coordinator.stats().snapshot().phase_two_retries, 2);
}

#[tokio::test]
async fn restart_with_recorded_commit_commits_everyone() {
    let log = Arc::new(StorageDecisionLog::in_memory());
    let tx7 = TransactionId::new();
    let ids = [
        ParticipantId::new("alpha").unwrap(),
        ParticipantId::new("beta").unwrap(),
    ];
    log.record(tx7, Decision::Commit, &ids).unwrap();

    let alpha = ScriptedParticipant::yes("alpha");
    let beta = ScriptedParticipant::yes("beta");
    let alpha_dyn: Arc<dyn Participant> = alpha.clone();
    let beta_dyn: Arc<dyn Participant> = beta.clone();
    let directory = MapDirectory::from_participants([alpha_dyn, beta_dyn]);

    let coordinator = Coordinator::new(fast_config(), log.clone()).unwrap();
    let report = coordinator.recover(&directory).await.unwrap();

    assert_eq!(report.resumed, vec![tx7]);
    assert_eq!(report.completed, vec![tx7]);
    for p in [&alpha, &beta] {
        assert!(p.has_committed(tx7));
        assert_eq!(p.prepare_count(tx7), 0);
        assert_eq!(p.rollback_count(tx7), 0);
    }
}

#[tokio::test]
async fn restart_with_bare_commit_line_asks_the_directory() {
    let tx7 = TransactionId::new();
    let mut storage = InMemoryBackend::new();
    storage
        .append(format!("{},COMMIT,1700000000000\n", tx7.to_log_string()).as_bytes())
        .unwrap();

    let alpha = ScriptedParticipant::yes("alpha");
    let beta = ScriptedParticipant::yes("beta");
    let alpha_dyn: Arc<dyn Participant> = alpha.clone();
    let beta_dyn: Arc<dyn Participant> = beta.clone();
    let directory = MapDirectory::from_participants([alpha_dyn, beta_dyn]);

    let log = StorageDecisionLog::new(Box::new(storage.clone()), false).unwrap();
    let coordinator = Coordinator::new(fast_config(), Arc::new(log)).unwrap();

    let first = coordinator.recover(&directory).await.unwrap();
    assert!(first.completed.is_empty());
    assert_eq!(first.unresolved.len(), 1);
    assert!(!alpha.has_committed(tx7) && !beta.has_committed(tx7));
    assert!(!storage.data().is_empty());

    directory.assign(
        tx7,
        &[ParticipantId::new("alpha").unwrap(), ParticipantId::new("beta").unwrap()],
    );
    let second = coordinator.recover(&directory).await.unwrap();
    assert_eq!(second.completed, vec![tx7]);
    for p in [&alpha, &beta] {
        assert!(p.has_committed(tx7));
        assert_eq!(p.prepare_count(tx7), 0);
    }
}

#[tokio::test]
async fn exhausted_retries_keep_the_decision() {
    let coordinator = memory_coordinator();
    let ok = ScriptedParticipant::yes("ok");
    let down = Arc::new(ScriptedParticipant::new("down").failing_commits(100));
    let txid = begin_with(&coordinator, &[ok.clone(), down.clone()]);

    let report = coordinator.commit_transaction(txid).await.unwrap();

    assert_eq!(report.outcome, Outcome::Committed);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.participant.as_str(), "down");
    assert_eq!(failure.phase, FailurePhase::Commit);
    assert_eq!(failure.attempts, 3);
    assert!(ok.has_committed(txid));
    assert_eq!(ok.rollback_count(txid), 0);
    assert_eq!(coordinator.state(txid).unwrap(), TransactionState::Committing);

    down.heal();
    let retried = coordinator.retry_pending().await.unwrap();
    assert_eq!(retried.len(), 1);
    assert!(retried[0].is_complete());
    assert_eq!(coordinator.state(txid).unwrap(), TransactionState::Committed);
    assert_eq!(down.prepare_count(txid), 1);
}

#[tokio::test]
async fn permanent_fault_stops_retrying_early() {
    let coordinator = memory_coordinator();
    let broken = Arc::new(ScriptedParticipant::new("broken").permanently_failing());
    let txid = begin_with(&coordinator, &[broken.clone()]);

    let report = coordinator.commit_transaction(txid).await.unwrap();

    assert_eq!(report.outcome, Outcome::Committed);
    assert_eq!(report.failures[0].attempts, 1);
    assert_eq!(broken.commit_count(txid), 1);
}

#[tokio::test]
async fn prepare_fault_counts_as_no() {
    let coordinator = memory_coordinator();
    let faulty = Arc::new(
        ScriptedParticipant::new("faulty")
            .with_prepare(PrepareScript::Fault(ParticipantFault::transient("disk full"))),
    );
    let healthy = ScriptedParticipant::yes("healthy");
    let txid = begin_with(&coordinator, &[faulty.clone(), healthy.clone()]);

    let report = coordinator.commit_transaction(txid).await.unwrap();

    assert_eq!(report.outcome, Outcome::Aborted);
    assert!(healthy.has_rolled_back(txid));
    assert_eq!(coordinator.stats().snapshot().prepare_faults, 1);
}

#[tokio::test]
async fn explicit_rollback_never_prepares() {
    let coordinator = memory_coordinator();
    let a = ScriptedParticipant::yes("a");
    let txid = begin_with(&coordinator, &[a.clone()]);

    let report = coordinator.rollback_transaction(txid).await.unwrap();

    assert_eq!(report.outcome, Outcome::Aborted);
    assert_eq!(a.calls(), vec![Call::Rollback(txid)]);
    let again = coordinator.commit_transaction(txid).await.unwrap();
    assert_eq!(again.outcome, Outcome::Aborted);
}

#[tokio::test]
async fn single_attempt_policy_reports_first_failure() {
    let config = fast_config().retry(RetryConfig::no_retry());
    let coordinator = Coordinator::in_memory(config).unwrap();
    let shaky = Arc::new(ScriptedParticipant::new("shaky").failing_commits(1));
    let txid = begin_with(&coordinator, &[shaky.clone()]);

    let report = coordinator.commit_transaction(txid).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(shaky.commit_count(txid), 1);
}

#[tokio::test]
async fn decision_log_lists_participants() {
    let log = Arc::new(StorageDecisionLog::in_memory());
    let coordinator = Coordinator::new(CoordinatorConfig::new(), log.clone()).unwrap();
    let txid = begin_with(
        &coordinator,
        &[ScriptedParticipant::yes("a"), ScriptedParticipant::yes("b")],
    );
    coordinator.commit_transaction(txid).await.unwrap();

    let records = log.read_all().unwrap();
    let commit = records
        .iter()
        .find(|r| r.kind == RecordKind::Commit)
        .unwrap();
    let names: Vec<&str> = commit.participants.iter().flatten().map(|p| p.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}
