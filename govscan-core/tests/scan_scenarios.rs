mod support;

use std::time::Duration;

use govscan_core::{
    AuthError, CollectorError, DeadlinePolicy, EngineConfig, PageSpec, ScanEvent,
    StaticCredentialProvider, StaticInventory,
};
use govscan_model::{
    Account, JobStatus, RejectReason, ResourceKind, SubmitResponse, TaskErrorKind,
    TaskStatus,
};
use support::{
    Harness, account_id, compliant_endpoint, noncompliant_endpoint, region, test_config,
};

#[tokio::test(start_paused = true)]
async fn one_denied_account_yields_partial_completion() {
    let a = account_id("111111111111");
    let b = account_id("222222222222");
    let east = region("us-east-1");

    let inventory = StaticInventory::new()
        .with_resources(
            a.clone(),
            east.clone(),
            ResourceKind::SageMakerEndpoint,
            vec![compliant_endpoint(&a, &east, "fraud-model")],
            10,
        )
        .with_resources(
            b.clone(),
            east.clone(),
            ResourceKind::SageMakerEndpoint,
            vec![noncompliant_endpoint(&b, &east, "never-seen")],
            10,
        );
    let credentials = StaticCredentialProvider::new().deny(
        b.clone(),
        AuthError::AccessDenied {
            account_id: b.clone(),
            role: "GRCGovernanceScanner".into(),
        },
    );
    let harness = Harness::new(
        test_config(),
        vec![Account::new(a.clone()), Account::new(b.clone())],
        inventory,
        credentials,
    );

    let result = harness.run(&[a.clone(), b.clone()], &[]).await;

    assert_eq!(result.overall_status, JobStatus::PartiallyCompleted);
    assert!(result.findings.is_empty(), "compliant endpoint has no findings");
    assert_eq!(result.findings_for(&b).count(), 0);

    let task_b = result
        .task_summaries
        .iter()
        .find(|task| task.account_id == b)
        .expect("task for account B");
    assert_eq!(task_b.status, TaskStatus::Failed);
    assert_eq!(
        task_b.error.as_ref().map(|error| error.kind),
        Some(TaskErrorKind::Auth)
    );

    let task_a = &result.task_summaries[0];
    assert_eq!(task_a.account_id, a);
    assert_eq!(task_a.status, TaskStatus::Succeeded);
    assert_eq!(task_a.resources_scanned, 1);
}

#[tokio::test(start_paused = true)]
async fn permanent_error_keeps_findings_from_earlier_pages() {
    let a = account_id("111111111111");
    let east = region("us-east-1");
    let page = |start: usize| {
        PageSpec::ok(
            (start..start + 2)
                .map(|i| noncompliant_endpoint(&a, &east, &format!("ep-{i}")))
                .collect(),
        )
    };
    let inventory = StaticInventory::new().with_pages(
        a.clone(),
        east.clone(),
        ResourceKind::SageMakerEndpoint,
        vec![
            page(0),
            page(2),
            page(4),
            PageSpec::fail(CollectorError::access_denied("sagemaker:ListEndpoints denied")),
        ],
    );
    let harness = Harness::new(
        test_config(),
        vec![Account::new(a.clone())],
        inventory,
        StaticCredentialProvider::new(),
    );

    let result = harness.run(&[a.clone()], &[east.clone()]).await;

    assert_eq!(result.overall_status, JobStatus::Failed);
    let task = &result.task_summaries[0];
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        task.error.as_ref().map(|error| error.kind),
        Some(TaskErrorKind::Collector)
    );
    assert_eq!(task.resources_scanned, 6);
    // Two baseline violations per endpoint.
    assert_eq!(result.findings.len(), 12);
    assert_eq!(task.finding_count, 12);
    // Permanent failures are not retried.
    assert_eq!(harness.inventory.calls(), 4);
}

/// Five regions; the last two listed answer their first page only after
/// ten minutes.
fn five_region_deadline_setup(policy: DeadlinePolicy) -> Harness {
    let a = account_id("111111111111");
    let regions: Vec<_> = ["us-east-1", "us-east-2", "us-west-1", "us-west-2", "eu-west-1"]
        .into_iter()
        .map(region)
        .collect();

    let mut inventory = StaticInventory::new();
    for (index, region) in regions.iter().enumerate() {
        let mut page = PageSpec::ok(vec![compliant_endpoint(&a, region, "ep")]);
        if index >= 3 {
            page = page.delayed(Duration::from_secs(600));
        }
        inventory = inventory.with_pages(
            a.clone(),
            region.clone(),
            ResourceKind::SageMakerEndpoint,
            vec![page],
        );
    }

    let config = EngineConfig {
        scan_timeout_ms: 2_000,
        request_timeout_ms: 10_000,
        task_parallelism: 5,
        deadline_policy: policy,
        ..test_config()
    };
    Harness::new(
        config,
        vec![Account::new(a).with_regions(regions)],
        inventory,
        StaticCredentialProvider::new(),
    )
}

#[tokio::test(start_paused = true)]
async fn deadline_times_out_only_running_tasks() {
    let harness = five_region_deadline_setup(DeadlinePolicy::Drain);
    let a = account_id("111111111111");

    let started = tokio::time::Instant::now();
    let result = harness.run(&[a], &[]).await;
    let elapsed = started.elapsed();

    assert_eq!(result.overall_status, JobStatus::TimedOut);
    let timed_out: Vec<_> = result
        .task_summaries
        .iter()
        .filter(|task| task.status == TaskStatus::TimedOut)
        .map(|task| task.region.to_string())
        .collect();
    assert_eq!(timed_out.len(), 2);
    assert!(timed_out.contains(&"us-west-2".to_string()));
    assert!(timed_out.contains(&"eu-west-1".to_string()));
    assert_eq!(
        result
            .task_summaries
            .iter()
            .filter(|task| task.status == TaskStatus::Succeeded)
            .count(),
        3
    );
    // Reaped tasks commit nothing.
    assert!(result.task_summaries.iter().all(|task| task.finding_count == 0));
    assert!(elapsed <= Duration::from_millis(2_000 + 10_000), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn detach_policy_reports_at_the_deadline() {
    let harness = five_region_deadline_setup(DeadlinePolicy::Detach);
    let a = account_id("111111111111");

    let started = tokio::time::Instant::now();
    let result = harness.run(&[a], &[]).await;
    let elapsed = started.elapsed();

    assert_eq!(result.overall_status, JobStatus::TimedOut);
    assert!(elapsed < Duration::from_millis(2_500), "took {elapsed:?}");
    assert_eq!(
        result
            .task_summaries
            .iter()
            .filter(|task| task.status == TaskStatus::TimedOut)
            .count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn regions_fall_back_to_account_then_default() {
    let a = account_id("111111111111");
    let b = account_id("222222222222");
    let harness = Harness::new(
        test_config(),
        vec![
            Account::new(a.clone()).with_regions([region("eu-central-1"), region("eu-west-1")]),
            Account::new(b.clone()),
        ],
        StaticInventory::new(),
        StaticCredentialProvider::new(),
    );

    let result = harness.run(&[a.clone(), b.clone()], &[]).await;
    let pairs: Vec<_> = result
        .task_summaries
        .iter()
        .map(|task| (task.account_id.to_string(), task.region.to_string()))
        .collect();
    assert_eq!(
        pairs,
        [
            ("111111111111".to_string(), "eu-central-1".to_string()),
            ("111111111111".to_string(), "eu-west-1".to_string()),
            ("222222222222".to_string(), "us-east-1".to_string()),
        ]
    );
    assert_eq!(result.overall_status, JobStatus::Completed);

    let explicit = harness.run(&[a], &[region("ap-south-1")]).await;
    assert_eq!(explicit.task_summaries.len(), 1);
    assert_eq!(explicit.task_summaries[0].region.as_str(), "ap-south-1");
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_admission() {
    let a = account_id("111111111111");
    let harness = Harness::new(
        test_config(),
        vec![Account::new(a.clone())],
        StaticInventory::new(),
        StaticCredentialProvider::new(),
    );

    assert_eq!(
        harness.submit(&[], &[]).await,
        SubmitResponse::Rejected {
            reason: RejectReason::EmptyRequest
        }
    );

    let stranger = account_id("999999999999");
    assert_eq!(
        harness.submit(&[a, stranger.clone()], &[]).await,
        SubmitResponse::Rejected {
            reason: RejectReason::UnknownAccount(stranger)
        }
    );
    assert_eq!(harness.engine.running_jobs(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_running_job_fails_remaining_tasks() {
    let a = account_id("111111111111");
    let east = region("us-east-1");
    let inventory = StaticInventory::new().with_pages(
        a.clone(),
        east.clone(),
        ResourceKind::SageMakerEndpoint,
        vec![
            PageSpec::ok(vec![compliant_endpoint(&a, &east, "ep")])
                .delayed(Duration::from_millis(500)),
        ],
    );
    let harness = Harness::new(
        test_config(),
        vec![Account::new(a.clone())],
        inventory,
        StaticCredentialProvider::new(),
    );

    let job_id = harness.submit_accepted(&[a], &[east]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.engine.cancel(job_id).await);

    let result = harness.engine.wait(job_id).await.expect("cancelled job settles");
    assert_eq!(result.overall_status, JobStatus::Failed);
    let task = &result.task_summaries[0];
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        task.error.as_ref().map(|error| error.kind),
        Some(TaskErrorKind::Cancelled)
    );
    assert!(!harness.engine.cancel(job_id).await, "finished jobs cannot be cancelled");
}

#[tokio::test(start_paused = true)]
async fn storage_failure_is_surfaced_without_changing_status() {
    let a = account_id("111111111111");
    let harness = Harness::new(
        test_config(),
        vec![Account::new(a.clone())],
        StaticInventory::new(),
        StaticCredentialProvider::new(),
    );
    harness.store.set_unavailable(true);
    let mut events = harness.engine.subscribe();

    let job_id = harness.submit_accepted(&[a], &[]).await;
    let result = harness.engine.wait(job_id).await.expect("job settles");

    assert_eq!(result.overall_status, JobStatus::Completed);
    assert!(harness.engine.persist_error(job_id).is_some());
    assert_eq!(harness.store.persist_attempts(), 1);
    assert!(harness.store.persisted(&job_id).is_none());

    let mut saw_persist_failure = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ScanEvent::PersistFailed { .. }) {
            saw_persist_failure = true;
        }
    }
    assert!(saw_persist_failure);
}

#[tokio::test(start_paused = true)]
async fn aggregation_is_idempotent() {
    let a = account_id("111111111111");
    let east = region("us-east-1");
    let inventory = StaticInventory::new().with_resources(
        a.clone(),
        east.clone(),
        ResourceKind::SageMakerEndpoint,
        (0..5)
            .map(|i| noncompliant_endpoint(&a, &east, &format!("ep-{i}")))
            .collect(),
        2,
    );
    let harness = Harness::new(
        test_config(),
        vec![Account::new(a.clone())],
        inventory,
        StaticCredentialProvider::new(),
    );

    let job_id = harness.submit_accepted(&[a], &[east]).await;
    let result = harness.engine.wait(job_id).await.expect("job settles");
    let again = harness.engine.snapshot(job_id).expect("job is registered");
    let third = harness.engine.snapshot(job_id).expect("job is registered");

    assert!(result.same_content(&again));
    assert!(again.same_content(&third));
    assert_eq!(
        harness.store.persisted(&job_id).map(|stored| stored.same_content(&result)),
        Some(true)
    );
}

#[tokio::test(start_paused = true)]
async fn lifecycle_events_are_published() {
    let a = account_id("111111111111");
    let harness = Harness::new(
        test_config(),
        vec![Account::new(a.clone())],
        StaticInventory::new(),
        StaticCredentialProvider::new(),
    );
    let mut events = harness.engine.subscribe();

    let job_id = harness.submit_accepted(&[a], &[]).await;
    harness.engine.wait(job_id).await.expect("job settles");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.job_id(), job_id);
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(ScanEvent::JobStarted { task_count: 1, .. })));
    assert!(seen.iter().any(|event| matches!(
        event,
        ScanEvent::TaskFinished {
            status: TaskStatus::Succeeded,
            ..
        }
    )));
    assert!(matches!(
        seen.last(),
        Some(ScanEvent::JobFinished {
            status: JobStatus::Completed,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn snapshot_of_a_running_job_reports_running() {
    let a = account_id("111111111111");
    let east = region("us-east-1");
    let inventory = StaticInventory::new().with_pages(
        a.clone(),
        east.clone(),
        ResourceKind::SageMakerEndpoint,
        vec![
            PageSpec::ok(vec![noncompliant_endpoint(&a, &east, "ep")])
                .delayed(Duration::from_millis(500)),
        ],
    );
    let harness = Harness::new(
        test_config(),
        vec![Account::new(a.clone())],
        inventory,
        StaticCredentialProvider::new(),
    );

    let job_id = harness.submit_accepted(&[a], &[east]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let partial = harness.engine.snapshot(job_id).expect("job is registered");
    assert_eq!(partial.overall_status, JobStatus::Running);
    assert_eq!(partial.task_summaries[0].status, TaskStatus::Running);
    assert!(partial.findings.is_empty());
    assert!(harness.engine.result(job_id).is_none());

    let result = harness.engine.wait(job_id).await.expect("job settles");
    assert_eq!(result.overall_status, JobStatus::Completed);
    let settled = harness.engine.snapshot(job_id).expect("job is registered");
    assert!(settled.same_content(&result));
}

#[tokio::test(start_paused = true)]
async fn fan_out_never_exceeds_task_parallelism() {
    let a = account_id("111111111111");
    let regions: Vec<_> = [
        "us-east-1",
        "us-east-2",
        "us-west-1",
        "us-west-2",
        "eu-west-1",
        "eu-central-1",
    ]
    .into_iter()
    .map(region)
    .collect();

    let mut inventory = StaticInventory::new();
    for region in &regions {
        inventory = inventory.with_pages(
            a.clone(),
            region.clone(),
            ResourceKind::SageMakerEndpoint,
            vec![
                PageSpec::ok(vec![compliant_endpoint(&a, region, "ep")])
                    .delayed(Duration::from_secs(1)),
            ],
        );
    }
    let config = EngineConfig {
        task_parallelism: 2,
        request_timeout_ms: 10_000,
        ..test_config()
    };
    let harness = Harness::new(
        config,
        vec![Account::new(a.clone()).with_regions(regions)],
        inventory,
        StaticCredentialProvider::new(),
    );

    let job_id = harness.submit_accepted(&[a], &[]).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let view = harness.engine.job_status(job_id).expect("job is registered");
    let count = |status: TaskStatus| {
        view.per_task_status
            .iter()
            .filter(|task| task.status == status)
            .count()
    };
    assert_eq!(count(TaskStatus::Running), 2);
    assert_eq!(count(TaskStatus::Pending), 4);

    let mut peak = 0;
    loop {
        let view = harness.engine.job_status(job_id).expect("job is registered");
        let running = view
            .per_task_status
            .iter()
            .filter(|task| task.status == TaskStatus::Running)
            .count();
        assert!(running <= 2, "{running} tasks running at once");
        peak = peak.max(running);
        if view.overall_status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(peak, 2);

    let result = harness.engine.wait(job_id).await.expect("job settles");
    assert_eq!(result.overall_status, JobStatus::Completed);
}
