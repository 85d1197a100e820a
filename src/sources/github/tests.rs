use super::*;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn issue_json(number: u64, is_pr: bool) -> serde_json::Value {
    let mut issue = json!({
        "html_url": format!("https://github.com/PyPSA/pypsa/issues/{number}"),
        "number": number,
        "title": format!("Issue {number}"),
        "state": "open",
        "body": "Line flows look wrong after clustering.",
        "user": { "login": "fneum" },
        "created_at": "2024-01-01T00:00:00Z",
        "labels": [{ "name": "bug" }],
        "comments": 2
    });
    if is_pr {
        issue["pull_request"] = json!({ "url": "https://api.github.com/pulls/1" });
    }
    issue
}

async fn fetch(server: &MockServer, token: Option<String>) -> Result<Vec<Document>> {
    let base = server.uri();
    tokio::task::spawn_blocking(move || {
        IssueClient::with_api_base(&base, token)?.list_issues("pypsa", "PyPSA/pypsa")
    })
    .await
    .expect("blocking task should not panic")
}

#[tokio::test]
async fn issues_become_documents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/PyPSA/pypsa/issues"))
        .and(query_param("state", "all"))
        .and(query_param("page", "1"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([issue_json(1, false), issue_json(2, true)])),
        )
        .mount(&server)
        .await;

    let docs = fetch(&server, Some("secret".to_string()))
        .await
        .expect("should fetch issues");

    assert_eq!(docs.len(), 2);
    assert_eq!(
        docs[0].source(),
        Some("https://github.com/PyPSA/pypsa/issues/1")
    );
    assert_eq!(docs[0].repository(), Some("pypsa"));
    assert!(docs[0].content.starts_with("Issue 1\n\n"));
    assert_eq!(docs[0].metadata.get("is_pull_request").map(String::as_str), Some("false"));
    assert_eq!(docs[1].metadata.get("is_pull_request").map(String::as_str), Some("true"));
    assert_eq!(docs[0].metadata.get("creator").map(String::as_str), Some("fneum"));
    assert_eq!(docs[0].metadata.get("labels").map(String::as_str), Some("bug"));
}

#[tokio::test]
async fn full_pages_trigger_next_page() {
    let server = MockServer::start().await;
    let first_page: Vec<_> = (1..=100).map(|n| issue_json(n, false)).collect();
    Mock::given(method("GET"))
        .and(path("/repos/PyPSA/pypsa/issues"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/PyPSA/pypsa/issues"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([issue_json(101, true)])))
        .mount(&server)
        .await;

    let docs = fetch(&server, None).await.expect("should fetch all pages");
    assert_eq!(docs.len(), 101);
}

#[tokio::test]
async fn empty_body_uses_title() {
    let server = MockServer::start().await;
    let mut issue = issue_json(7, false);
    issue["body"] = serde_json::Value::Null;
    Mock::given(method("GET"))
        .and(path("/repos/PyPSA/pypsa/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([issue])))
        .mount(&server)
        .await;

    let docs = fetch(&server, None).await.expect("should fetch issues");
    assert_eq!(docs[0].content, "Issue 7");
}

#[tokio::test]
async fn api_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/PyPSA/pypsa/issues"))
        .respond_with(ResponseTemplate::new(403).set_body_string("rate limit exceeded"))
        .mount(&server)
        .await;

    let err = fetch(&server, None).await.expect_err("should fail");
    assert!(matches!(
        err.downcast_ref::<HelperError>(),
        Some(HelperError::Network(_))
    ));
}

#[tokio::test]
async fn api_base_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/repos/PyPSA/pypsa/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([issue_json(7, false)])))
        .expect(1)
        .mount(&server)
        .await;

    let base = format!("{}/api/v3", server.uri());
    let documents = tokio::task::spawn_blocking(move || {
        IssueClient::with_api_base(&base, None)?.list_issues("pypsa", "PyPSA/pypsa")
    })
    .await
    .expect("blocking task should not panic")
    .expect("should fetch issues");
    assert_eq!(documents.len(), 1);
}

#[test]
fn token_is_redacted_in_debug() {
    let client = IssueClient::new(Some("super-secret".to_string())).expect("should build client");
    assert!(!format!("{:?}", client).contains("super-secret"));
}
