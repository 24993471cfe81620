// ABOUTME: ContentStore backed by a GitHub-compatible repository contents API.
// ABOUTME: Maps blob SHAs to version tokens and HTTP statuses to NotFound, Conflict, and Transport.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::{GithubConfig, TOKEN_ENV};
use crate::store::{ContentStore, Snapshot, StoreError, VersionToken};

const USER_AGENT: &str = "phoenix-ledger";
const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Reads and writes one branch of one repository through the contents API.
/// The blob SHA returned by the host serves as the version token.
pub struct GithubStore {
    client: reqwest::Client,
    config: GithubConfig,
}

impl GithubStore {
    /// Create a store whose every request is bounded by `timeout`.
    pub fn new(config: GithubConfig, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StoreError::Transport {
                path: config.base_url.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, self.contents_url(path))
            .header("accept", ACCEPT)
            .header("x-github-api-version", API_VERSION);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ContentStore for GithubStore {
    async fn fetch(&self, path: &str) -> Result<Option<Snapshot>, StoreError> {
        tracing::debug!(path, branch = %self.config.branch, "fetching document");

        let response = self
            .request(reqwest::Method::GET, path)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(error_from_response(path, response).await);
        }

        let body: ContentResponse = response
            .json()
            .await
            .map_err(|e| transport_error(path, e))?;
        let content = decode_content(path, &body)?;

        Ok(Some(Snapshot {
            content,
            token: VersionToken::new(body.sha),
        }))
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        token: Option<&VersionToken>,
        message: &str,
    ) -> Result<VersionToken, StoreError> {
        if self.config.token.is_none() {
            return Err(StoreError::NotConfigured(TOKEN_ENV.to_string()));
        }

        tracing::debug!(
            path,
            branch = %self.config.branch,
            create = token.is_none(),
            "writing document"
        );

        let body = PutRequest {
            message,
            content: STANDARD.encode(content.as_bytes()),
            branch: &self.config.branch,
            sha: token.map(VersionToken::as_str),
        };

        let response = self
            .request(reqwest::Method::PUT, path)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let body: PutResponse = response
                    .json()
                    .await
                    .map_err(|e| transport_error(path, e))?;
                Ok(VersionToken::new(body.content.sha))
            }
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => Err(StoreError::Conflict {
                path: path.to_string(),
            }),
            // The host answers 422 when a create omits the sha of an existing file.
            StatusCode::UNPROCESSABLE_ENTITY if token.is_none() => Err(StoreError::Conflict {
                path: path.to_string(),
            }),
            _ => Err(error_from_response(path, response).await),
        }
    }
}

fn decode_content(path: &str, body: &ContentResponse) -> Result<String, StoreError> {
    match body.encoding.as_deref() {
        None => return Ok(body.content.clone()),
        Some("base64") => {}
        // Files over 1 MB come back as `"encoding": "none"` with empty content.
        Some(other) => {
            return Err(StoreError::Transport {
                path: path.to_string(),
                message: format!(
                    "document content not returned inline (encoding '{}'); it may exceed the host's size limit",
                    other
                ),
            });
        }
    }

    let compact: String = body
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| StoreError::Transport {
            path: path.to_string(),
            message: format!("invalid base64 content: {}", e),
        })?;
    String::from_utf8(bytes).map_err(|e| StoreError::Transport {
        path: path.to_string(),
        message: format!("content is not valid UTF-8: {}", e),
    })
}

fn transport_error(path: &str, err: reqwest::Error) -> StoreError {
    let message = if err.is_timeout() {
        format!("request timed out: {}", err)
    } else {
        err.to_string()
    };
    StoreError::Transport {
        path: path.to_string(),
        message,
    }
}

async fn error_from_response(path: &str, response: reqwest::Response) -> StoreError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.message)
        .unwrap_or(text);

    let message = if detail.trim().is_empty() {
        format!("host returned {}", status)
    } else {
        format!("host returned {}: {}", status, detail.trim())
    };
    StoreError::Transport {
        path: path.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AlertLedger, LedgerErrorKind};
    use phoenix_core::record::{Record, Severity};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_PATH: &str = "/repos/relief/alerts/contents/data/alerts.csv";

    fn config(base_url: &str, token: Option<&str>) -> GithubConfig {
        GithubConfig {
            base_url: base_url.to_string(),
            owner: "relief".to_string(),
            repo: "alerts".to_string(),
            branch: "main".to_string(),
            token: token.map(String::from),
        }
    }

    fn store(server: &MockServer, token: Option<&str>) -> GithubStore {
        GithubStore::new(config(&server.uri(), token), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetch_decodes_wrapped_base64_content() {
        let server = MockServer::start().await;
        let text = "location,severity\n\"Town\",\"high\"\n";
        let encoded = STANDARD.encode(text);
        // The host wraps base64 payloads at 60 columns.
        let wrapped = format!("{}\n{}\n", &encoded[..10], &encoded[10..]);

        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .and(query_param("ref", "main"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": wrapped,
                "encoding": "base64",
                "sha": "abc123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = store(&server, Some("secret"))
            .fetch("data/alerts.csv")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(snapshot.content, text);
        assert_eq!(snapshot.token, VersionToken::new("abc123"));
    }

    #[tokio::test]
    async fn fetch_accepts_plain_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": "location\n",
                "sha": "plain1"
            })))
            .mount(&server)
            .await;

        let snapshot = store(&server, None)
            .fetch("data/alerts.csv")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.content, "location\n");
    }

    #[tokio::test]
    async fn fetch_refuses_content_that_is_not_inlined() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": "",
                "encoding": "none",
                "sha": "big"
            })))
            .mount(&server)
            .await;

        let err = store(&server, None)
            .fetch("data/alerts.csv")
            .await
            .unwrap_err();

        match err {
            StoreError::Transport { message, .. } => {
                assert!(message.contains("encoding 'none'"), "message: {}", message)
            }
            other => panic!("expected Transport, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn append_never_writes_over_a_document_it_could_not_read() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": "",
                "encoding": "none",
                "sha": "big"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(DOC_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"content": {"sha": "after"}})),
            )
            .expect(0)
            .mount(&server)
            .await;

        let ledger = AlertLedger::new(Arc::new(store(&server, Some("secret"))), "data/alerts.csv");
        let record = Record::new("Town".to_string(), Severity::High, "Smoke".to_string());

        let err = ledger.append(record).await.unwrap_err();

        assert_eq!(err.kind(), LedgerErrorKind::Transport);
        let requests = server.received_requests().await.unwrap();
        assert!(
            requests.iter().all(|r| r.method.as_str() != "PUT"),
            "no write may follow an unreadable fetch"
        );
    }

    #[tokio::test]
    async fn fetch_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})),
            )
            .mount(&server)
            .await;

        let result = store(&server, None).fetch("data/alerts.csv").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn fetch_server_error_carries_host_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"message": "Service Unavailable"})),
            )
            .mount(&server)
            .await;

        let err = store(&server, None)
            .fetch("data/alerts.csv")
            .await
            .unwrap_err();

        match err {
            StoreError::Transport { path, message } => {
                assert_eq!(path, "data/alerts.csv");
                assert!(message.contains("Service Unavailable"), "message: {}", message);
            }
            other => panic!("expected Transport, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn write_without_credential_makes_no_request() {
        let server = MockServer::start().await;

        let err = store(&server, None)
            .write("data/alerts.csv", "x", None, "create")
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::NotConfigured(TOKEN_ENV.to_string()));
        let requests = server.received_requests().await.unwrap();
        assert!(requests.is_empty(), "no request should reach the host");
    }

    #[tokio::test]
    async fn write_sends_sha_and_returns_new_token() {
        let server = MockServer::start().await;
        let text = "location\n\"Town\"\n";

        Mock::given(method("PUT"))
            .and(path(DOC_PATH))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "message": "Add alert",
                "content": STANDARD.encode(text),
                "branch": "main",
                "sha": "old-sha"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": {"sha": "new-sha"},
                "commit": {"sha": "commit-sha"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = store(&server, Some("secret"))
            .write(
                "data/alerts.csv",
                text,
                Some(&VersionToken::new("old-sha")),
                "Add alert",
            )
            .await
            .unwrap();

        assert_eq!(token, VersionToken::new("new-sha"));
    }

    #[tokio::test]
    async fn create_omits_sha() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(DOC_PATH))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"content": {"sha": "first"}})),
            )
            .mount(&server)
            .await;

        let token = store(&server, Some("secret"))
            .write("data/alerts.csv", "location\n", None, "Create ledger")
            .await
            .unwrap();
        assert_eq!(token.as_str(), "first");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("sha").is_none(), "create must not send a sha: {}", body);
    }

    #[tokio::test]
    async fn stale_sha_is_a_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "message": "data/alerts.csv does not match old-sha"
            })))
            .mount(&server)
            .await;

        let err = store(&server, Some("secret"))
            .write(
                "data/alerts.csv",
                "x",
                Some(&VersionToken::new("old-sha")),
                "Add alert",
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            StoreError::Conflict {
                path: "data/alerts.csv".to_string()
            }
        );
    }

    #[tokio::test]
    async fn create_over_existing_document_is_a_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Invalid request.\n\n\"sha\" wasn't supplied."
            })))
            .mount(&server)
            .await;

        let client = store(&server, Some("secret"));
        let err = client
            .write("data/alerts.csv", "x", None, "Create ledger")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        // With a sha supplied, 422 is an ordinary host error.
        let err = client
            .write(
                "data/alerts.csv",
                "x",
                Some(&VersionToken::new("s")),
                "Add alert",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transport { .. }));
    }

    #[tokio::test]
    async fn slow_host_times_out_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"content": "", "sha": "s"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            GithubStore::new(config(&server.uri(), None), Duration::from_millis(50)).unwrap();
        let err = client.fetch("data/alerts.csv").await.unwrap_err();

        match err {
            StoreError::Transport { message, .. } => {
                assert!(message.contains("timed out"), "message: {}", message)
            }
            other => panic!("expected Transport, got {:?}", other),
        }
    }
}
