//! GitHub Git Data API binding for the remote ledger

use super::{CommitInfo, LedgerResult, ObjectId, RemoteLedger, TreeEntry};
use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default public API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub asks clients without explicit rate-limit headers to wait at least a minute
const FALLBACK_RATE_LIMIT_WAIT_SECS: i64 = 60;

/// Shortest wait after any throttled response, covering clock skew against `x-ratelimit-reset`
const MIN_RATE_LIMIT_WAIT_SECS: i64 = 1;

/// Configuration for the GitHub ledger
#[derive(Debug, Clone)]
pub struct GitHubLedgerConfig {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Access token (GITHUB_TOKEN / GH_TOKEN)
    pub token: String,
    /// API base URL, overridable for GitHub Enterprise and tests
    pub api_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for GitHubLedgerConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            token: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Remote ledger backed by a GitHub repository
pub struct GitHubLedger {
    client: reqwest::Client,
    config: GitHubLedgerConfig,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaRef,
}

#[derive(Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    tree: ShaRef,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    sha: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize)]
struct CreateBlob<'a> {
    content: &'a str,
    encoding: &'static str,
}

#[derive(Serialize)]
struct CreateTree<'a> {
    base_tree: &'a str,
    tree: Vec<CreateTreeEntry<'a>>,
}

#[derive(Serialize)]
struct CreateTreeEntry<'a> {
    path: &'a str,
    mode: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: &'a str,
}

#[derive(Serialize)]
struct CreateCommit<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Serialize)]
struct UpdateRef<'a> {
    sha: &'a str,
    force: bool,
}

impl GitHubLedger {
    /// Create a new ledger client for `owner/repo`
    pub fn new(config: GitHubLedgerConfig) -> LedgerResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("kodegen_push_stress/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Repository coordinates as `owner/repo`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.config.owner, self.config.repo)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            path
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> LedgerResult<T> {
        log::debug!("GitHub {}", operation);

        let response = request.bearer_auth(&self.config.token).send().await?;
        let status = response.status();

        if status.is_success() {
            return response.json::<T>().await.map_err(|e| LedgerError::Decode {
                operation: operation.to_string(),
                reason: e.to_string(),
            });
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(operation, status, &headers, &body, Utc::now()))
    }
}

/// Map a non-success response onto the ledger error taxonomy
fn classify_failure(
    operation: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> LedgerError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string());

    if (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS)
        && let Some(resume_at) = rate_limit_resume(status, headers, &message, now)
    {
        return LedgerError::RateLimited { resume_at };
    }

    match status {
        StatusCode::UNAUTHORIZED => LedgerError::Unauthorized { reason: message },
        StatusCode::NOT_FOUND => LedgerError::NotFound {
            what: operation.to_string(),
        },
        _ => LedgerError::Api {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        },
    }
}

/// Work out when a throttled client may resume
///
/// `retry-after` (seconds) wins over the primary-limit pair
/// `x-ratelimit-remaining: 0` plus epoch-seconds `x-ratelimit-reset`. The
/// result is never earlier than `MIN_RATE_LIMIT_WAIT_SECS` after `now`.
fn rate_limit_resume(
    status: StatusCode,
    headers: &HeaderMap,
    message: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let earliest = now + ChronoDuration::seconds(MIN_RATE_LIMIT_WAIT_SECS);
    advertised_resume(status, headers, message, now).map(|resume_at| resume_at.max(earliest))
}

fn advertised_resume(
    status: StatusCode,
    headers: &HeaderMap,
    message: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };

    if let Some(secs) = header("retry-after").and_then(|v| v.parse::<i64>().ok()) {
        return Some(now + ChronoDuration::seconds(secs));
    }

    if header("x-ratelimit-remaining") == Some("0") {
        let reset = header("x-ratelimit-reset")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        return Some(reset.unwrap_or(now + ChronoDuration::seconds(FALLBACK_RATE_LIMIT_WAIT_SECS)));
    }

    if status == StatusCode::TOO_MANY_REQUESTS || message.to_lowercase().contains("rate limit") {
        return Some(now + ChronoDuration::seconds(FALLBACK_RATE_LIMIT_WAIT_SECS));
    }

    None
}

#[async_trait]
impl RemoteLedger for GitHubLedger {
    async fn read_tip(&self, branch: &str) -> LedgerResult<ObjectId> {
        let url = self.url(&format!("git/ref/heads/{}", branch));
        let reference: RefResponse = self.send("get_ref", self.client.get(url)).await?;
        Ok(ObjectId::new(reference.object.sha))
    }

    async fn read_commit(&self, commit: &ObjectId) -> LedgerResult<CommitInfo> {
        let url = self.url(&format!("git/commits/{}", commit));
        let response: CommitResponse = self.send("get_commit", self.client.get(url)).await?;
        Ok(CommitInfo {
            id: ObjectId::new(response.sha),
            tree: ObjectId::new(response.tree.sha),
        })
    }

    async fn read_tree_entry(&self, tree: &ObjectId, path: &str) -> LedgerResult<Option<ObjectId>> {
        let url = self.url(&format!("git/trees/{}", tree));
        let response: TreeResponse = self.send("get_tree", self.client.get(url)).await?;
        Ok(response
            .tree
            .into_iter()
            .find(|item| item.path == path)
            .map(|item| ObjectId::new(item.sha)))
    }

    async fn create_blob(&self, content: &str) -> LedgerResult<ObjectId> {
        let payload = CreateBlob {
            content,
            encoding: "utf-8",
        };
        let blob: ShaRef = self
            .send("create_blob", self.client.post(self.url("git/blobs")).json(&payload))
            .await?;
        Ok(ObjectId::new(blob.sha))
    }

    async fn create_tree(
        &self,
        base_tree: &ObjectId,
        entries: &[TreeEntry],
    ) -> LedgerResult<ObjectId> {
        let payload = CreateTree {
            base_tree: base_tree.as_str(),
            tree: entries
                .iter()
                .map(|entry| CreateTreeEntry {
                    path: &entry.path,
                    mode: &entry.mode,
                    kind: "blob",
                    sha: entry.blob.as_str(),
                })
                .collect(),
        };
        let tree: ShaRef = self
            .send("create_tree", self.client.post(self.url("git/trees")).json(&payload))
            .await?;
        Ok(ObjectId::new(tree.sha))
    }

    async fn create_commit(
        &self,
        message: &str,
        tree: &ObjectId,
        parents: &[ObjectId],
    ) -> LedgerResult<ObjectId> {
        let payload = CreateCommit {
            message,
            tree: tree.as_str(),
            parents: parents.iter().map(ObjectId::as_str).collect(),
        };
        let commit: ShaRef = self
            .send(
                "create_commit",
                self.client.post(self.url("git/commits")).json(&payload),
            )
            .await?;
        Ok(ObjectId::new(commit.sha))
    }

    /// Non-forced ref update
    ///
    /// `new` always has `expected` as its only parent, so GitHub accepts the
    /// update only while the tip still equals `expected`. Anything else is
    /// rejected with 422 "Update is not a fast forward".
    async fn compare_and_swap_tip(
        &self,
        branch: &str,
        expected: &ObjectId,
        new: &ObjectId,
    ) -> LedgerResult<()> {
        let url = self.url(&format!("git/refs/heads/{}", branch));
        let payload = UpdateRef {
            sha: new.as_str(),
            force: false,
        };

        match self
            .send::<serde_json::Value>("update_ref", self.client.patch(url).json(&payload))
            .await
        {
            Ok(_) => Ok(()),
            Err(LedgerError::Api { status: 409 | 422, .. }) => Err(LedgerError::Conflict {
                branch: branch.to_string(),
                expected: expected.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}
