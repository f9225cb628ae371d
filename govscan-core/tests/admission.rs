mod support;

use std::time::Duration;

use futures::future::join_all;
use govscan_core::{
    AdmissionConfig, AdmissionPolicy, EngineConfig, PageSpec, ScanEvent,
    StaticCredentialProvider, StaticInventory,
};
use govscan_model::{
    Account, AccountId, JobStatus, RejectReason, ResourceKind, SubmitResponse,
    TaskErrorKind,
};
use support::{Harness, account_id, compliant_endpoint, region, test_config};

/// Every job scans one slow (account, region) so admitted jobs stay running.
fn slow_harness(max_concurrent_scans: usize, admission: AdmissionConfig) -> (Harness, AccountId) {
    let a = account_id("111111111111");
    let east = region("us-east-1");
    let inventory = StaticInventory::new().with_pages(
        a.clone(),
        east.clone(),
        ResourceKind::SageMakerEndpoint,
        vec![
            PageSpec::ok(vec![compliant_endpoint(&a, &east, "ep")])
                .delayed(Duration::from_secs(5)),
        ],
    );
    let config = EngineConfig {
        max_concurrent_scans,
        admission,
        request_timeout_ms: 10_000,
        ..test_config()
    };
    let harness = Harness::new(
        config,
        vec![Account::new(a.clone()).with_regions([east])],
        inventory,
        StaticCredentialProvider::new(),
    );
    (harness, a)
}

#[tokio::test(start_paused = true)]
async fn cap_plus_one_submissions_queue_the_overflow() {
    let (harness, a) = slow_harness(2, AdmissionConfig::default());
    let mut events = harness.engine.subscribe();

    let accounts = [a.clone()];
    let responses = join_all((0..3).map(|_| harness.submit(&accounts, &[]))).await;

    let (queued, started): (Vec<_>, Vec<_>) =
        responses.iter().partition(|response| match response {
            SubmitResponse::Accepted { queued, .. } => *queued,
            SubmitResponse::Rejected { reason } => panic!("unexpected rejection: {reason}"),
        });
    assert_eq!(started.len(), 2);
    assert_eq!(queued.len(), 1);
    assert_eq!(harness.engine.running_jobs(), 2);
    assert_eq!(harness.engine.queued_jobs(), 1);

    let overflow = queued[0].job_id().expect("accepted");
    assert_eq!(
        harness.engine.job_status(overflow).map(|view| view.overall_status),
        Some(JobStatus::Queued)
    );

    for response in &responses {
        let job_id = response.job_id().expect("accepted");
        let result = harness.engine.wait(job_id).await.expect("job settles");
        assert_eq!(result.overall_status, JobStatus::Completed);
    }
    assert_eq!(harness.engine.running_jobs(), 0);

    let mut queued_events = 0;
    while let Ok(event) = events.try_recv() {
        if let ScanEvent::JobQueued { job_id, position } = event {
            assert_eq!(job_id, overflow);
            assert_eq!(position, 1);
            queued_events += 1;
        }
    }
    assert_eq!(queued_events, 1);
}

#[tokio::test(start_paused = true)]
async fn slot_is_released_before_the_result_is_persisted() {
    let a = account_id("111111111111");
    let config = EngineConfig {
        max_concurrent_scans: 1,
        request_timeout_ms: 10_000,
        ..test_config()
    };
    let harness = Harness::new(
        config,
        vec![Account::new(a.clone())],
        StaticInventory::new(),
        StaticCredentialProvider::new(),
    );
    harness.store.set_persist_delay(Duration::from_secs(5));

    let first = harness.submit_accepted(&[a.clone()], &[]).await;
    let second = harness.submit(&[a.clone()], &[]).await;
    assert_eq!(
        second,
        SubmitResponse::Accepted {
            job_id: second.job_id().expect("accepted"),
            queued: true
        }
    );
    let second = second.job_id().expect("accepted");

    tokio::time::sleep(Duration::from_secs(1)).await;

    let status = |job_id| {
        harness
            .engine
            .job_status(job_id)
            .map(|view| view.overall_status)
    };
    assert_eq!(status(first), Some(JobStatus::Completed));
    assert_eq!(status(second), Some(JobStatus::Completed));
    assert_eq!(harness.engine.running_jobs(), 0);
    assert!(harness.store.persisted(&first).is_none(), "persist still in flight");

    for job_id in [first, second] {
        harness.engine.wait(job_id).await.expect("job settles");
        assert!(harness.store.persisted(&job_id).is_some());
    }
}

#[tokio::test(start_paused = true)]
async fn reject_policy_refuses_when_all_slots_are_busy() {
    let (harness, a) = slow_harness(
        1,
        AdmissionConfig {
            policy: AdmissionPolicy::Reject,
            max_queued_scans: 20,
        },
    );

    assert!(harness.submit(&[a.clone()], &[]).await.is_accepted());
    assert_eq!(
        harness.submit(&[a.clone()], &[]).await,
        SubmitResponse::Rejected {
            reason: RejectReason::QueueFull
        }
    );
    assert_eq!(harness.engine.running_jobs(), 1);
    assert_eq!(harness.engine.queued_jobs(), 0);
}

#[tokio::test(start_paused = true)]
async fn bounded_queue_rejects_past_its_depth() {
    let (harness, a) = slow_harness(
        1,
        AdmissionConfig {
            policy: AdmissionPolicy::Queue,
            max_queued_scans: 1,
        },
    );

    assert!(harness.submit(&[a.clone()], &[]).await.is_accepted());
    assert!(harness.submit(&[a.clone()], &[]).await.is_accepted());
    assert_eq!(
        harness.submit(&[a.clone()], &[]).await,
        SubmitResponse::Rejected {
            reason: RejectReason::QueueFull
        }
    );
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_queued_job_settles_it_immediately() {
    let (harness, a) = slow_harness(1, AdmissionConfig::default());

    let running = harness.submit_accepted(&[a.clone()], &[]).await;
    let queued = harness.submit_accepted(&[a.clone()], &[]).await;
    assert!(harness.engine.cancel(queued).await);

    let result = harness.engine.result(queued).expect("queued job settled on cancel");
    assert_eq!(result.overall_status, JobStatus::Failed);
    assert_eq!(
        result.task_summaries[0].error.as_ref().map(|error| error.kind),
        Some(TaskErrorKind::Cancelled)
    );
    assert_eq!(harness.engine.queued_jobs(), 0);

    let first = harness.engine.wait(running).await.expect("running job settles");
    assert_eq!(first.overall_status, JobStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn shutdown_settles_everything_and_stops_admission() {
    let (harness, a) = slow_harness(1, AdmissionConfig::default());

    let running = harness.submit_accepted(&[a.clone()], &[]).await;
    let queued = harness.submit_accepted(&[a.clone()], &[]).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    harness.engine.shutdown().await;

    for job_id in [running, queued] {
        let status = harness
            .engine
            .job_status(job_id)
            .map(|view| view.overall_status)
            .expect("job is registered");
        assert!(status.is_terminal(), "{job_id} ended as {status}");
    }
    assert_eq!(
        harness.submit(&[a], &[]).await,
        SubmitResponse::Rejected {
            reason: RejectReason::ShuttingDown
        }
    );
}

#[tokio::test(start_paused = true)]
async fn finished_jobs_are_evicted_past_retention() {
    let a = account_id("111111111111");
    let config = EngineConfig {
        retain_finished_jobs: 2,
        ..test_config()
    };
    let harness = Harness::new(
        config,
        vec![Account::new(a.clone())],
        StaticInventory::new(),
        StaticCredentialProvider::new(),
    );

    let mut finished = Vec::new();
    for _ in 0..3 {
        let job_id = harness.submit_accepted(&[a.clone()], &[]).await;
        harness.engine.wait(job_id).await.expect("job settles");
        finished.push(job_id);
    }
    let latest = harness.submit_accepted(&[a.clone()], &[]).await;

    assert!(harness.engine.job_status(finished[0]).is_none());
    assert!(harness.engine.job_status(finished[1]).is_some());
    assert!(harness.engine.job_status(finished[2]).is_some());
    assert!(harness.engine.job_status(latest).is_some());
}
