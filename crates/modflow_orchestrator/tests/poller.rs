//! Status poller behavior against the scripted service, on tokio's paused clock

mod common;

use common::{idle, orchestrator, MockApi, Reply, TIMEOUT};
use modflow_orchestrator::jobs::JobId;
use modflow_orchestrator::{AnalysisRequest, CanonicalStatus, JobOutcome};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn fast_request() -> AnalysisRequest {
    AnalysisRequest::new("refactor", "apollo")
        .with_repo("org/legacy")
        .report_only(true)
}

#[tokio::test(start_paused = true)]
async fn test_approved_job_completes_with_last_report() {
    let api = MockApi::new();
    api.script_status(
        "job-1",
        [
            json!({"status": "pending_approval"}),
            json!({"status": "approved", "progress": 30}),
            json!({"status": "processing", "progress": 60}),
            json!({"status": "completed", "analysis_report": "# Final report"}),
        ],
    );
    let orchestrator = orchestrator(&api);

    let job_id = orchestrator
        .submit(AnalysisRequest::new("refactor", "apollo"))
        .await
        .unwrap();
    assert_eq!(
        orchestrator.job(&job_id).unwrap().status,
        CanonicalStatus::PendingApproval
    );
    assert!(orchestrator.is_polling(&job_id));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = orchestrator
        .subscribe(&job_id, move |record| {
            sink.lock().unwrap().push((record.status, record.progress));
        })
        .unwrap();

    orchestrator.approve(&job_id, None).await.unwrap();
    let record = orchestrator
        .wait_until(&job_id, |r| r.is_terminal())
        .await
        .unwrap();

    assert_eq!(record.status, CanonicalStatus::Completed);
    assert_eq!(record.report.as_deref(), Some("# Final report"));
    assert_eq!(record.progress, 100);

    let seen = seen.lock().unwrap().clone();
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1), "{:?}", seen);
    // The lagging pending_approval never puts the job back at the gate
    assert!(seen
        .iter()
        .skip(1)
        .all(|(status, _)| *status != CanonicalStatus::PendingApproval));

    // Inline report: no report endpoint call
    assert!(api
        .calls_for(&job_id)
        .iter()
        .all(|call| !matches!(call, common::Call::Report(_))));

    let polls = api.status_calls(&job_id);
    idle(Duration::from_secs(60)).await;
    assert_eq!(api.status_calls(&job_id), polls);
    assert!(!orchestrator.is_polling(&job_id));
}

#[tokio::test(start_paused = true)]
async fn test_completion_fetches_report_endpoint() {
    let api = MockApi::new();
    api.script_status("job-1", [json!({"status": "done", "progress": 100})]);
    api.script_report("job-1", json!({"data": {"markdown": "# From report endpoint"}}));
    let orchestrator = orchestrator(&api);

    let job_id = orchestrator.submit(fast_request()).await.unwrap();
    assert_eq!(
        orchestrator.job(&job_id).unwrap().status,
        CanonicalStatus::GeneratingReport
    );
    assert!(orchestrator.is_polling(&job_id));

    let record = orchestrator
        .wait_until(&job_id, |r| r.is_terminal())
        .await
        .unwrap();
    assert_eq!(
        record.outcome(),
        JobOutcome::Succeeded {
            report: Some("# From report endpoint".to_string())
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_report_falls_back_to_status_requery() {
    let api = MockApi::new();
    api.script_status(
        "job-1",
        [
            json!({"status": "completed"}),
            json!({"status": "completed", "result": "# From status"}),
        ],
    );
    let orchestrator = orchestrator(&api);

    let job_id = orchestrator.submit(fast_request()).await.unwrap();
    let record = orchestrator
        .wait_until(&job_id, |r| r.is_terminal())
        .await
        .unwrap();

    assert_eq!(record.report.as_deref(), Some("# From status"));
    let calls = api.calls_for(&job_id);
    assert!(matches!(calls[0], common::Call::Status(_)));
    assert!(matches!(calls[1], common::Call::Report(_)));
    assert!(matches!(calls[2], common::Call::Status(_)));
}

#[tokio::test(start_paused = true)]
async fn test_missing_report_can_be_retried() {
    let api = MockApi::new();
    api.script_status("job-1", [json!({"status": "completed"})]);
    let orchestrator = orchestrator(&api);

    let job_id = orchestrator.submit(fast_request()).await.unwrap();
    let record = orchestrator
        .wait_until(&job_id, |r| r.is_terminal())
        .await
        .unwrap();
    assert_eq!(record.status, CanonicalStatus::Completed);
    assert!(record.is_missing_report());
    assert_eq!(record.outcome(), JobOutcome::Succeeded { report: None });

    api.script_report("job-1", json!({"report": "# Late report"}));
    let record = orchestrator.retry_report(&job_id).await.unwrap();
    assert_eq!(record.report.as_deref(), Some("# Late report"));

    // Nothing left to fetch
    let calls = api.call_count();
    orchestrator.retry_report(&job_id).await.unwrap();
    assert_eq!(api.call_count(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_marks_job_and_stops_polling() {
    let api = MockApi::new();
    api.script_status("job-1", [json!({"status": "analyzing_code", "progress": 40})]);
    let orchestrator = orchestrator(&api);

    let job_id = orchestrator.submit(fast_request()).await.unwrap();
    let record = orchestrator
        .wait_until(&job_id, |r| r.is_terminal())
        .await
        .unwrap();

    assert_eq!(record.status, CanonicalStatus::TimedOut);
    assert!(matches!(record.outcome(), JobOutcome::TimedOut { .. }));
    assert_eq!(record.progress, 80);

    let polls = api.status_calls(&job_id);
    idle(Duration::from_secs(600)).await;
    assert_eq!(api.status_calls(&job_id), polls);
    assert_eq!(orchestrator.active_pollers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_call_is_cut_at_deadline() {
    let api = MockApi::new();
    api.script_status("job-1", [Reply::Hang]);
    let orchestrator = orchestrator(&api);

    let started = tokio::time::Instant::now();
    let job_id = orchestrator.submit(fast_request()).await.unwrap();
    let record = orchestrator
        .wait_until(&job_id, |r| r.is_terminal())
        .await
        .unwrap();

    assert_eq!(record.status, CanonicalStatus::TimedOut);
    assert!(started.elapsed() <= TIMEOUT + Duration::from_secs(1));
    assert_eq!(api.status_calls(&job_id), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_keep_polling() {
    let api = MockApi::new();
    api.script_status(
        "job-1",
        [
            Reply::Status(502),
            Reply::Network,
            Reply::NotFound,
            Reply::Json(json!({"progress": 15})),
            Reply::Json(json!({"status": "completed", "report": "ok"})),
        ],
    );
    let orchestrator = orchestrator(&api);

    let job_id = orchestrator.submit(fast_request()).await.unwrap();
    let record = orchestrator
        .wait_until(&job_id, |r| r.is_terminal())
        .await
        .unwrap();

    assert_eq!(record.status, CanonicalStatus::Completed);
    assert_eq!(record.report.as_deref(), Some("ok"));
    assert_eq!(api.status_calls(&job_id), 5);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_status_maps_to_processing() {
    let api = MockApi::new();
    api.script_status(
        "job-1",
        [
            json!({"status": "grouping_commits_weird_v2"}),
            json!({"status": "grouping_commits_weird_v2"}),
            json!({"status": "completed", "report": "x"}),
        ],
    );
    let orchestrator = orchestrator(&api);

    let job_id = orchestrator
        .submit(AnalysisRequest::new("refactor", "apollo").report_only(true))
        .await
        .unwrap();
    let record = orchestrator
        .wait_until(&job_id, |r| {
            r.last_raw_status.as_deref() == Some("grouping_commits_weird_v2")
        })
        .await
        .unwrap();

    assert_eq!(record.status, CanonicalStatus::Processing);
    // Seeded at 80; the fallback bucket never pulls it back
    assert_eq!(record.progress, 80);

    let record = orchestrator
        .wait_until(&job_id, |r| r.is_terminal())
        .await
        .unwrap();
    assert_eq!(record.status, CanonicalStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_is_terminal() {
    let api = MockApi::new();
    api.script_status(
        "job-1",
        [json!({"status": "error", "message": "repository not found"})],
    );
    let orchestrator = orchestrator(&api);

    let job_id = orchestrator.submit(fast_request()).await.unwrap();
    let record = orchestrator
        .wait_until(&job_id, |r| r.is_terminal())
        .await
        .unwrap();

    assert_eq!(
        record.outcome(),
        JobOutcome::Failed {
            error: "repository not found".to_string()
        }
    );
    assert!(record.report.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_disarms_poller() {
    let api = MockApi::new();
    api.script_status("job-1", [json!({"status": "processing"})]);
    let orchestrator = orchestrator(&api);

    let job_id = orchestrator.submit(fast_request()).await.unwrap();
    assert!(orchestrator.stop(&job_id));
    assert!(!orchestrator.stop(&job_id));

    idle(Duration::from_secs(30)).await;
    assert_eq!(api.status_calls(&job_id), 0);
    assert_eq!(
        orchestrator.job(&job_id).unwrap().status,
        CanonicalStatus::GeneratingReport
    );
}

#[tokio::test(start_paused = true)]
async fn test_attach_adopts_remote_job() {
    let api = MockApi::new();
    api.script_status(
        "remote-7",
        [
            json!({"status": "refactoring", "progress": 65}),
            json!({"status": "completed", "report": "# Adopted"}),
        ],
    );
    let orchestrator = orchestrator(&api);
    let job_id = JobId::from_string("remote-7");

    let record = orchestrator.attach(job_id.clone(), None).await.unwrap();
    assert_eq!(record.status, CanonicalStatus::Processing);
    assert_eq!(record.progress, 65);
    assert!(orchestrator.is_polling(&job_id));

    let record = orchestrator
        .wait_until(&job_id, |r| r.is_terminal())
        .await
        .unwrap();
    assert_eq!(record.report.as_deref(), Some("# Adopted"));

    // Attaching again returns the tracked record without new calls
    let calls = api.call_count();
    orchestrator.attach(job_id.clone(), None).await.unwrap();
    assert_eq!(api.call_count(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_attach_rejects_placeholder() {
    let api = MockApi::new();
    let orchestrator = orchestrator(&api);
    let err = orchestrator
        .attach(JobId::placeholder(), None)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(api.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_history_keeps_running_jobs() {
    let api = MockApi::new();
    api.script_start(json!({"job_id": "done-1", "report": "# Inline"}));
    api.script_status("job-1", [json!({"status": "processing"})]);
    let orchestrator = orchestrator(&api);

    let done = orchestrator.submit(fast_request()).await.unwrap();
    let running = orchestrator.submit(fast_request()).await.unwrap();
    assert_eq!(orchestrator.jobs().len(), 2);

    assert_eq!(orchestrator.clear_history(), 1);
    assert!(orchestrator.job(&done).is_none());
    assert!(orchestrator.job(&running).is_some());
}
