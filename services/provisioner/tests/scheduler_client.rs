//! Scheduler client behaviour against a mock scheduler.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use ci_nomad_provisioner::client::TOKEN_HEADER;
use ci_nomad_provisioner::{ClientSettings, SchedulerClient, SchedulerError, TlsConfig, WorkerTemplate};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> SchedulerClient {
    SchedulerClient::new(ClientSettings::new(server.uri()))
}

fn template(job: &str) -> WorkerTemplate {
    WorkerTemplate::new("jenkins", "linux", 1, job)
        .unwrap()
        .with_remote_fs("/home/ci")
}

#[tokio::test]
async fn test_check_connection_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/self"))
        .and(header(TOKEN_HEADER, "secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"member": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = SchedulerClient::new(
        ClientSettings::new(server.uri()).with_token(Some("secret-token".to_string())),
    );

    client.check_connection().await.unwrap();
    assert!(client.has_transport());
}

#[tokio::test]
async fn test_transport_with_client_identity_and_ca() {
    let fixtures = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"member": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = SchedulerClient::new(ClientSettings::new(server.uri()).with_tls(Some(TlsConfig {
        client_certificate: Some(fixtures.join("client.pem")),
        client_password: None,
        server_certificate: Some(fixtures.join("ca.pem")),
        server_password: None,
    })));

    client.check_connection().await.unwrap();
    assert_eq!(client.transport_builds(), 1);
}

#[tokio::test]
async fn test_auth_and_server_errors_invalidate_transport() {
    for status in [401u16, 403, 500] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/agent/self"))
            .respond_with(ResponseTemplate::new(status).set_body_string("ACL token not found"))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client.check_connection().await.unwrap_err();

        assert_eq!(err.to_string(), "ACL token not found");
        assert_eq!(err.status(), Some(status));
        assert!(err.invalidates_transport());
        assert!(!client.has_transport(), "status {status} kept the transport");

        // next call builds a fresh transport
        let _ = client.check_connection().await;
        assert_eq!(client.transport_builds(), 2);
    }
}

#[tokio::test]
async fn test_client_errors_keep_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/self"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client.check_connection().await.unwrap_err();

    assert!(matches!(err, SchedulerError::Client { status: 404, .. }));
    assert_eq!(err.to_string(), "HTTP 404 Not Found");
    assert!(client.has_transport());
    assert_eq!(client.transport_builds(), 1);
}

#[tokio::test]
async fn test_unreachable_host() {
    let client = SchedulerClient::new(ClientSettings::new("http://127.0.0.1:1"));

    let err = client.check_connection().await.unwrap_err();

    assert!(matches!(err, SchedulerError::Transport(_)));
    assert!(!err.to_string().is_empty());
    assert!(!client.has_transport());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_callers_share_one_transport() {
    let client = Arc::new(SchedulerClient::new(ClientSettings::new("http://127.0.0.1:4646")));

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { Arc::as_ptr(&client.transport()) as usize })
        })
        .collect();

    let mut instances = HashSet::new();
    for handle in handles {
        instances.insert(handle.await.unwrap());
    }

    assert_eq!(instances.len(), 1);
    assert_eq!(client.transport_builds(), 1);
}

#[tokio::test]
async fn test_list_jobs_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/jobs"))
        .and(query_param("prefix", "jenkins"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let jobs = client(&server).list_jobs("jenkins").await;
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn test_list_jobs_failure_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/jobs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(client(&server).list_jobs("jenkins").await.is_empty());

    let garbage = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&garbage)
        .await;
    assert!(client(&garbage).list_jobs("jenkins").await.is_empty());

    let unreachable = SchedulerClient::new(ClientSettings::new("http://127.0.0.1:1"));
    assert!(unreachable.list_jobs("jenkins").await.is_empty());
}

#[tokio::test]
async fn test_list_jobs_decodes_summaries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "ID": "jenkins-1",
                "Name": "jenkins-1",
                "Type": "batch",
                "Status": "running",
                "Priority": 50,
                "JobSummary": {"JobID": "jenkins-1", "Namespace": "ci"}
            }
        ])))
        .mount(&server)
        .await;

    let jobs = client(&server).list_jobs("jenkins").await;
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].is_running());
    assert_eq!(jobs[0].namespace(), Some("ci"));
}

#[tokio::test]
async fn test_submit_structured_template() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"EvalID": "e1"})))
        .expect(1)
        .mount(&server)
        .await;

    let job = r#"{"Job":{"ID":"%WORKER_NAME%","Namespace":"ci","Args":["%WORKER_SECRET%","%WORKER_DIR%"]}}"#;
    let client = client(&server);
    let submitted = client.submit_job("w1", "s1", &template(job)).await;

    assert_eq!(
        submitted,
        r#"{"Job":{"ID":"w1","Namespace":"ci","Args":["s1","/home/ci"]}}"#
    );

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(String::from_utf8_lossy(&requests[0].body), submitted);

    // rendering is deterministic
    assert_eq!(client.submit_job("w1", "s1", &template(job)).await, submitted);
}

#[tokio::test]
async fn test_submit_failure_still_returns_document() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/jobs"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad job"))
        .mount(&server)
        .await;

    let submitted = client(&server)
        .submit_job("w1", "s1", &template(r#"{"Job":{"ID":"%WORKER_NAME%"}}"#))
        .await;
    assert_eq!(submitted, r#"{"Job":{"ID":"w1"}}"#);
}

#[tokio::test]
async fn test_alternate_format_goes_through_parse_endpoint() {
    let server = MockServer::start().await;
    let hcl = "job \"%WORKER_NAME%\" { namespace = \"ci\" }";
    Mock::given(method("POST"))
        .and(path("/v1/jobs/parse"))
        .and(body_json(json!({ "JobHCL": hcl })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ID": "%WORKER_NAME%", "Namespace": "ci"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/jobs"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let submitted = client(&server).submit_job("w1", "s1", &template(hcl)).await;
    let document: Value = serde_json::from_str(&submitted).unwrap();

    assert_eq!(document, json!({"Job": {"ID": "w1", "Namespace": "ci"}}));
}

#[tokio::test]
async fn test_parse_failure_submits_raw_template() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/jobs/parse"))
        .respond_with(ResponseTemplate::new(400).set_body_string("syntax error"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/jobs"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let submitted = client(&server)
        .submit_job("w1", "s1", &template("job \"%WORKER_NAME%\" {"))
        .await;
    assert_eq!(submitted, "job \"w1\" {");
}

#[tokio::test]
async fn test_stop_job_passes_placement() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/job/w1"))
        .and(query_param("namespace", "ci"))
        .and(query_param("region", "eu"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).stop_job("w1", Some("ci"), Some("eu")).await;
}

#[tokio::test]
async fn test_job_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/job/w1"))
        .and(query_param("namespace", "ci"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "w1",
            "Namespace": "ci",
            "Region": "eu",
            "SubmitTime": 1_700_000_000_000_000_000i64
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let detail = client.job_detail("w1", Some("ci")).await.unwrap();
    assert_eq!(detail.region.as_deref(), Some("eu"));
    assert_eq!(detail.submit_time, 1_700_000_000_000_000_000);

    let missing = client.job_detail("w2", None).await.unwrap_err();
    assert_eq!(missing.status(), Some(404));
}

#[tokio::test]
async fn test_validate_job_plans_random_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/job/[0-9a-f-]{36}/plan$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Diff": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let template = template(r#"{"Job":{"ID":"%WORKER_NAME%","Secret":"%WORKER_SECRET%"}}"#);
    client(&server).validate_job(&template).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let id = body["Job"]["ID"].as_str().unwrap();
    assert!(requests[0].url.path().contains(id));
    assert_eq!(body["Job"]["Secret"], "");
}

#[tokio::test]
async fn test_validate_job_surfaces_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/job/.+/plan$"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid driver"))
        .mount(&server)
        .await;

    let err = client(&server)
        .validate_job(&template(r#"{"Job":{}}"#))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid driver");
}
