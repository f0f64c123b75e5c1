// tests/reconcile_fake_probe.rs
//
// Reconciliation, timeout enforcement and kill decisions driven by a
// scripted process probe.

mod common;
use crate::common::{
    FakeProbe, TaskRecordBuilder, fake_supervisor, find, init_tracing, seed, write_sentinel,
};

use std::error::Error;

use tempfile::TempDir;

use ralph::errors::RalphError;
use ralph::process::StopSignal;
use ralph::store::UNKNOWN_EXIT_CODE;
use ralph::types::TaskStatus;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn live_process_with_matching_start_time_stays_running() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());

    let rec = TaskRecordBuilder::new(1)
        .pid(500)
        .start_ticks(Some(1_000))
        .logs_in(&sup.store().logs_dir())
        .build();
    seed(sup.store(), vec![rec.clone()]);
    probe.alive(500, 1_000);

    let status = sup.status().await?;
    assert_eq!(find(&status.records, &rec.id).status, TaskStatus::Running);
    assert!(status.report.transitions.is_empty());
    assert!(probe.signals().is_empty());
    Ok(())
}

#[tokio::test]
async fn recycled_pid_is_not_mistaken_for_the_task() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());

    let rec = TaskRecordBuilder::new(1)
        .pid(500)
        .start_ticks(Some(1_000))
        .timeout(1)
        .started_secs_ago(30)
        .logs_in(&sup.store().logs_dir())
        .build();
    seed(sup.store(), vec![rec.clone()]);
    // Same pid, different process.
    probe.alive(500, 9_999);

    let status = sup.status().await?;
    let after = find(&status.records, &rec.id);
    assert_eq!(after.status, TaskStatus::Killed);
    assert_eq!(after.exit_code, Some(UNKNOWN_EXIT_CODE));
    assert!(
        probe.signals().is_empty(),
        "signalled an unrelated process: {:?}",
        probe.signals()
    );
    Ok(())
}

#[tokio::test]
async fn sentinel_decides_completed_or_failed() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());
    let logs = sup.store().logs_dir();

    let ok = TaskRecordBuilder::new(1).pid(501).logs_in(&logs).build();
    let bad = TaskRecordBuilder::new(2).pid(502).logs_in(&logs).build();
    seed(sup.store(), vec![ok.clone(), bad.clone()]);
    write_sentinel(&ok, 0);
    write_sentinel(&bad, 7);
    probe.zombie(501);
    probe.gone(502);

    let status = sup.status().await?;
    let ok_after = find(&status.records, &ok.id);
    let bad_after = find(&status.records, &bad.id);
    assert_eq!((ok_after.status, ok_after.exit_code), (TaskStatus::Completed, Some(0)));
    assert_eq!((bad_after.status, bad_after.exit_code), (TaskStatus::Failed, Some(7)));
    assert_eq!(status.report.transitions.len(), 2);
    Ok(())
}

#[tokio::test]
async fn probe_failure_is_isolated_to_its_record() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());
    let logs = sup.store().logs_dir();

    let flaky = TaskRecordBuilder::new(1).pid(600).logs_in(&logs).build();
    let fine = TaskRecordBuilder::new(2).pid(601).logs_in(&logs).build();
    seed(sup.store(), vec![flaky.clone(), fine.clone()]);
    probe.fail_inspect(600, "I/O error reading /proc");
    probe.gone(601);
    write_sentinel(&fine, 0);

    let status = sup.status().await?;

    let flaky_after = find(&status.records, &flaky.id);
    assert_eq!(flaky_after.status, TaskStatus::Running);
    assert!(flaky_after.probe_error.as_deref().is_some_and(|e| e.contains("I/O error")));
    assert_eq!(find(&status.records, &fine.id).status, TaskStatus::Completed);

    assert_eq!(status.report.warnings.len(), 1);
    match &status.report.warnings[0] {
        RalphError::Probe { id, .. } => assert_eq!(id, &flaky.id),
        other => panic!("Expected Probe warning, got: {other:?}"),
    }

    // The flag is persisted, and cleared once the probe recovers.
    let stored = sup.store().load()?;
    assert!(find(&stored, &flaky.id).probe_error.is_some());

    probe.alive(600, 1_000);
    let (recovered, report) = sup.check(&flaky.id).await?;
    assert!(report.warnings.is_empty());
    assert_eq!(recovered.status, TaskStatus::Running);
    assert!(recovered.probe_error.is_none());
    Ok(())
}

#[tokio::test]
async fn overdue_task_gets_sigkill_when_sigterm_is_ignored() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());

    let rec = TaskRecordBuilder::new(1)
        .pid(700)
        .timeout(5)
        .started_secs_ago(10)
        .logs_in(&sup.store().logs_dir())
        .build();
    seed(sup.store(), vec![rec.clone()]);
    probe.alive(700, 1_000);
    probe.ignore_term(700);

    let status = sup.status().await?;
    let after = find(&status.records, &rec.id);
    assert_eq!(after.status, TaskStatus::TimedOut);
    assert_eq!(after.exit_code, Some(137));
    assert_eq!(
        probe.signals(),
        vec![(700, StopSignal::Term), (700, StopSignal::Kill)]
    );
    assert!(status.report.warnings.is_empty());
    Ok(())
}

#[tokio::test]
async fn survivor_of_sigkill_is_timed_out_with_a_warning() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());

    let rec = TaskRecordBuilder::new(1)
        .pid(701)
        .timeout(1)
        .started_secs_ago(10)
        .logs_in(&sup.store().logs_dir())
        .build();
    seed(sup.store(), vec![rec.clone()]);
    probe.alive(701, 1_000);
    probe.unkillable(701);

    let status = sup.status().await?;
    assert_eq!(find(&status.records, &rec.id).status, TaskStatus::TimedOut);
    assert!(matches!(
        status.report.warnings.as_slice(),
        [RalphError::TimeoutKill { pid: 701, .. }]
    ));
    Ok(())
}

#[tokio::test]
async fn task_that_finished_on_its_own_is_not_timed_out() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());

    let rec = TaskRecordBuilder::new(1)
        .pid(702)
        .timeout(1)
        .started_secs_ago(10)
        .logs_in(&sup.store().logs_dir())
        .build();
    seed(sup.store(), vec![rec.clone()]);
    probe.zombie(702);
    write_sentinel(&rec, 0);

    let status = sup.status().await?;
    assert_eq!(find(&status.records, &rec.id).status, TaskStatus::Completed);
    assert!(probe.signals().is_empty());
    Ok(())
}

#[tokio::test]
async fn kill_marks_killed_and_refuses_terminal_tasks() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());
    let logs = sup.store().logs_dir();

    let live = TaskRecordBuilder::new(1).pid(800).logs_in(&logs).build();
    let done = TaskRecordBuilder::new(2)
        .pid(801)
        .logs_in(&logs)
        .finished(TaskStatus::Completed, 0, 5)
        .build();
    seed(sup.store(), vec![live.clone(), done.clone()]);
    probe.alive(800, 1_000);

    let (killed, report) = sup.kill(&live.id).await?;
    assert_eq!(killed.status, TaskStatus::Killed);
    assert_eq!(killed.exit_code, Some(143));
    assert!(report.warnings.is_empty());
    assert_eq!(probe.signals(), vec![(800, StopSignal::Term)]);

    assert!(matches!(sup.kill(&done.id).await, Err(RalphError::NotRunning(_))));

    let stored = sup.store().load()?;
    assert_eq!(find(&stored, &live.id).status, TaskStatus::Killed);
    assert_eq!(find(&stored, &done.id).status, TaskStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn kill_surfaces_probe_failure_without_signalling() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());

    let rec = TaskRecordBuilder::new(1)
        .pid(900)
        .logs_in(&sup.store().logs_dir())
        .build();
    seed(sup.store(), vec![rec.clone()]);
    probe.fail_inspect(900, "permission denied");

    assert!(matches!(sup.kill(&rec.id).await, Err(RalphError::Probe { .. })));
    assert!(probe.signals().is_empty());
    assert_eq!(find(&sup.store().load()?, &rec.id).status, TaskStatus::Running);
    Ok(())
}

#[tokio::test]
async fn group_members_outliving_the_leader_get_sigkill() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());

    let rec = TaskRecordBuilder::new(1)
        .pid(703)
        .timeout(1)
        .started_secs_ago(10)
        .logs_in(&sup.store().logs_dir())
        .build();
    seed(sup.store(), vec![rec.clone()]);
    probe.alive(703, 1_000);
    probe.stragglers_ignore_term(703);

    let status = sup.status().await?;
    let after = find(&status.records, &rec.id);
    assert_eq!(after.status, TaskStatus::TimedOut);
    assert_eq!(after.exit_code, Some(137));
    assert_eq!(
        probe.signals(),
        vec![(703, StopSignal::Term), (703, StopSignal::Kill)]
    );
    assert!(status.report.warnings.is_empty());
    Ok(())
}

#[tokio::test]
async fn overdue_task_is_not_signalled_when_inspection_fails() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());

    let rec = TaskRecordBuilder::new(1)
        .pid(704)
        .timeout(1)
        .started_secs_ago(10)
        .logs_in(&sup.store().logs_dir())
        .build();
    seed(sup.store(), vec![rec.clone()]);
    // Still signallable, but its identity cannot be checked.
    probe.alive(704, 1_000);
    probe.fail_inspect(704, "I/O error reading /proc");

    let status = sup.status().await?;
    let after = find(&status.records, &rec.id);
    assert_eq!(after.status, TaskStatus::Running);
    assert!(after.probe_error.is_some());
    assert!(matches!(
        status.report.warnings.as_slice(),
        [RalphError::Probe { .. }]
    ));
    assert!(probe.signals().is_empty());

    let (checked, report) = sup.check(&rec.id).await?;
    assert_eq!(checked.status, TaskStatus::Running);
    assert_eq!(report.warnings.len(), 1);
    assert!(probe.signals().is_empty());
    Ok(())
}

#[tokio::test]
async fn group_gone_before_sigterm_is_recorded_as_vanished() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());

    let rec = TaskRecordBuilder::new(1)
        .pid(705)
        .timeout(1)
        .started_secs_ago(10)
        .logs_in(&sup.store().logs_dir())
        .build();
    seed(sup.store(), vec![rec.clone()]);
    probe.alive(705, 1_000);
    probe.vanishes_before_signal(705);

    let status = sup.status().await?;
    let after = find(&status.records, &rec.id);
    assert_eq!(after.status, TaskStatus::Killed);
    assert_eq!(after.exit_code, Some(UNKNOWN_EXIT_CODE));
    assert!(after.end_time.is_some());
    assert!(probe.signals().is_empty());
    assert!(status.report.warnings.is_empty());
    Ok(())
}

#[tokio::test]
async fn unrepresentable_timeout_never_fires() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let probe = FakeProbe::new();
    let sup = fake_supervisor(dir.path(), probe.clone());

    let rec = TaskRecordBuilder::new(1)
        .pid(706)
        .timeout(u64::MAX)
        .started_secs_ago(10)
        .logs_in(&sup.store().logs_dir())
        .build();
    seed(sup.store(), vec![rec.clone()]);
    probe.alive(706, 1_000);

    let status = sup.status().await?;
    assert_eq!(find(&status.records, &rec.id).status, TaskStatus::Running);
    assert!(probe.signals().is_empty());
    Ok(())
}
