//! Integration tests for HttpRemoteApi using wiremock

use modflow_orchestrator::jobs::JobId;
use modflow_orchestrator::protocol::{StartAnalysisRequest, UpdateJobStatusRequest};
use modflow_orchestrator::{
    AnalysisRequest, CanonicalStatus, HttpRemoteApi, Orchestrator, OrchestratorConfig,
    OrchestratorError, RemoteApi, TransportError,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(mock_server: &MockServer) -> OrchestratorConfig {
    OrchestratorConfig {
        base_url: mock_server.uri(),
        poll_interval_secs: 1,
        timeout_secs: 30,
        request_timeout_secs: 5,
        api_key: None,
    }
}

fn create_api(mock_server: &MockServer) -> HttpRemoteApi {
    HttpRemoteApi::new(&config_for(mock_server)).unwrap()
}

fn create_test_request() -> AnalysisRequest {
    AnalysisRequest::new("refactor", "apollo")
        .with_repo("org/legacy")
        .with_branch("main")
        .report_only(true)
}

#[tokio::test]
async fn test_start_analysis_posts_wire_body() {
    let mock_server = MockServer::start().await;
    let request = create_test_request();
    let body = StartAnalysisRequest::from(&request);

    Mock::given(method("POST"))
        .and(path("/start-analysis"))
        .and(body_json(json!({
            "repo_name_modernizado": "org/legacy",
            "branch_name_modernizado": "main",
            "repository_type": null,
            "projeto": "apollo",
            "analysis_type": "refactor",
            "instrucoes_extras": null,
            "usar_rag": false,
            "gerar_relatorio_apenas": true,
            "retornar_lista_arquivos": false,
            "model_name": null,
            "arquivos_especificos": []
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "abc"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = create_api(&mock_server);
    let response = api.start_analysis(&body).await.unwrap();
    assert_eq!(response["job_id"], "abc");
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status/abc"))
        .and(header("authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "processing"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = OrchestratorConfig {
        api_key: Some("test-api-key".to_string()),
        ..config_for(&mock_server)
    };
    let api = HttpRemoteApi::new(&config).unwrap();
    let body = api.job_status(&JobId::from_string("abc")).await.unwrap();
    assert_eq!(body.unwrap()["status"], "processing");
}

#[tokio::test]
async fn test_status_not_found_is_not_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let api = create_api(&mock_server);
    let body = api
        .job_status(&JobId::from_string("missing"))
        .await
        .unwrap();
    assert!(body.is_none());
}

#[tokio::test]
async fn test_server_error_carries_status_and_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status/abc"))
        .respond_with(ResponseTemplate::new(500).set_body_string("worker crashed"))
        .mount(&mock_server)
        .await;

    let api = create_api(&mock_server);
    let err = api
        .job_status(&JobId::from_string("abc"))
        .await
        .unwrap_err();
    match err {
        TransportError::Status { code, body } => {
            assert_eq!(code, 500);
            assert_eq!(body, "worker crashed");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_non_json_body_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/abc/report"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let api = create_api(&mock_server);
    let err = api
        .job_report(&JobId::from_string("abc"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Decode(_)));
}

#[tokio::test]
async fn test_report_and_update_endpoints() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/abc/report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"report": "# Report"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/update-job-status"))
        .and(body_json(json!({
            "job_id": "abc",
            "action": "approve",
            "instrucoes_extras": "keep the public API"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "approved"})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/update-job-status"))
        .and(body_json(json!({"job_id": "abc", "action": "reject"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "rejected"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = create_api(&mock_server);
    let job_id = JobId::from_string("abc");

    let report = api.job_report(&job_id).await.unwrap().unwrap();
    assert_eq!(report["report"], "# Report");

    let approved = api
        .update_job_status(&UpdateJobStatusRequest::approve(
            &job_id,
            Some("keep the public API".to_string()),
        ))
        .await
        .unwrap();
    assert_eq!(approved["status"], "approved");

    let rejected = api
        .update_job_status(&UpdateJobStatusRequest::reject(&job_id))
        .await
        .unwrap();
    assert_eq!(rejected["status"], "rejected");
}

#[tokio::test]
async fn test_project_artifacts_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/projects/apollo/artifacts"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let api = create_api(&mock_server);
    assert!(api.project_artifacts("apollo").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unreachable_service_is_network_error() {
    let config = OrchestratorConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        request_timeout_secs: 2,
        ..Default::default()
    };
    let api = HttpRemoteApi::new(&config).unwrap();
    let err = api
        .job_status(&JobId::from_string("abc"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Network(_)));
}

#[tokio::test]
async fn test_orchestrator_end_to_end() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/start-analysis"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"job_id": "e2e-1", "message": "accepted"})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/e2e-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "refactoring", "progress": 40})),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/e2e-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "completed"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/e2e-1/report"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"content": "# End to end"})),
        )
        .mount(&mock_server)
        .await;

    let orchestrator = Orchestrator::new(config_for(&mock_server)).unwrap();
    let job_id = orchestrator.submit(create_test_request()).await.unwrap();
    assert_eq!(job_id.as_str(), "e2e-1");

    let record = tokio::time::timeout(
        Duration::from_secs(15),
        orchestrator.wait_until(&job_id, |r| r.is_terminal()),
    )
    .await
    .expect("job should settle")
    .unwrap();

    assert_eq!(record.status, CanonicalStatus::Completed);
    assert_eq!(record.report.as_deref(), Some("# End to end"));
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_any_call() {
    let config = OrchestratorConfig {
        poll_interval_secs: 0,
        ..Default::default()
    };
    assert!(matches!(
        Orchestrator::new(config),
        Err(OrchestratorError::Config(_))
    ));
}
