use acctest::probe::cloud9::Cloud9Probe;
use acctest::probe::{ExistenceProbe, ProbeError};
use aws_sdk_cloud9::config::Credentials;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TARGET: &str = "AWSCloud9WorkspaceManagementService.DescribeEnvironments";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

fn probe_for(server: &MockServer) -> Cloud9Probe {
    Cloud9Probe::with_endpoint_url(
        "us-west-2",
        server.uri(),
        Credentials::new("AKIDTEST", "secret", None, None, "test"),
    )
}

fn json_response(status: u16, body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_raw(body.to_string(), CONTENT_TYPE)
}

async fn mount(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("x-amz-target", TARGET))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_probe_returns_environment_attributes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("x-amz-target", TARGET))
        .and(body_partial_json(json!({ "environmentIds": ["a1b2c3"] })))
        .respond_with(json_response(
            200,
            json!({
                "environments": [{
                    "id": "a1b2c3",
                    "name": "tf_acc_env_basic_abcdefgh",
                    "description": "Tf Acc Test abcdefgh",
                    "type": "ec2",
                    "connectionType": "CONNECT_SSH",
                    "arn": "arn:aws:cloud9:us-west-2:123456789012:environment:a1b2c3",
                    "ownerArn": "arn:aws:iam::123456789012:user/ci",
                    "lifecycle": { "status": "CREATED" }
                }]
            }),
        ))
        .mount(&mock_server)
        .await;

    let probe = probe_for(&mock_server);
    let attrs = probe.probe("a1b2c3").await.unwrap();
    let again = probe.probe("a1b2c3").await.unwrap();
    assert_eq!(attrs, again);

    assert_eq!(attrs["name"], "tf_acc_env_basic_abcdefgh");
    assert_eq!(attrs["description"], "Tf Acc Test abcdefgh");
    assert_eq!(attrs["type"], "ec2");
    assert_eq!(attrs["owner_arn"], "arn:aws:iam::123456789012:user/ci");
    assert_eq!(attrs["connection_type"], "CONNECT_SSH");
    assert_eq!(attrs["lifecycle_status"], "CREATED");
}

#[tokio::test]
async fn test_empty_result_is_absent() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, json_response(200, json!({ "environments": [] }))).await;

    let err = probe_for(&mock_server).probe("a1b2c3").await.unwrap_err();
    assert!(err.is_absent());
}

#[tokio::test]
async fn test_not_found_exception_is_absent() {
    let mock_server = MockServer::start().await;
    mount(
        &mock_server,
        json_response(
            400,
            json!({
                "__type": "NotFoundException",
                "message": "Environment a1b2c3 was not found"
            }),
        ),
    )
    .await;

    let err = probe_for(&mock_server).probe("a1b2c3").await.unwrap_err();
    assert!(matches!(err, ProbeError::Absent { ref id } if id == "a1b2c3"));
}

#[tokio::test]
async fn test_revoked_role_is_access_revoked() {
    let mock_server = MockServer::start().await;
    mount(
        &mock_server,
        json_response(
            400,
            json!({
                "__type": "AccessDeniedException",
                "message": "User: arn:aws:sts::123456789012:assumed-role/ci/session is not authorized to access this resource"
            }),
        ),
    )
    .await;

    let err = probe_for(&mock_server).probe("a1b2c3").await.unwrap_err();
    match err {
        ProbeError::AccessRevoked { id, message } => {
            assert_eq!(id, "a1b2c3");
            assert!(message.contains("is not authorized to access this resource"));
        }
        other => panic!("expected AccessRevoked, got {other:?}"),
    }
}

#[tokio::test]
async fn test_other_access_denied_is_service_error() {
    let mock_server = MockServer::start().await;
    mount(
        &mock_server,
        json_response(
            400,
            json!({
                "__type": "AccessDeniedException",
                "message": "User is not authorized to perform: cloud9:DescribeEnvironments"
            }),
        ),
    )
    .await;

    let err = probe_for(&mock_server).probe("a1b2c3").await.unwrap_err();
    assert!(matches!(err, ProbeError::Service { .. }));
    assert!(!err.is_absent());
}

#[tokio::test]
async fn test_bad_request_is_service_error() {
    let mock_server = MockServer::start().await;
    mount(
        &mock_server,
        json_response(
            400,
            json!({
                "__type": "BadRequestException",
                "message": "1 validation error detected"
            }),
        ),
    )
    .await;

    let err = probe_for(&mock_server).probe("a1b2c3").await.unwrap_err();
    match err {
        ProbeError::Service { id, message } => {
            assert_eq!(id, "a1b2c3");
            assert!(message.contains("BadRequestException"));
        }
        other => panic!("expected Service error, got {other:?}"),
    }
}
