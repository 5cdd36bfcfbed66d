use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{ACCEPT, HeaderMap, LINK, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::stats::RepositoryRecord;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: u32 = 100;

/// Everything that can go wrong while talking to the GitHub REST API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The supplied token was rejected. Callers should drop it and ask again.
    #[error("GitHub rejected the access token")]
    Auth,

    #[error("GitHub user `{0}` not found")]
    NotFound(String),

    #[error("GitHub API rate limit exceeded (resets at {reset_at})")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("network error talking to GitHub")]
    Network(#[source] reqwest::Error),

    #[error("GitHub API returned HTTP {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("failed to decode GitHub response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Milestones reported while a fetch is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchProgress {
    UserResolved {
        login: String,
        public_repos: Option<u64>,
    },
    Page {
        page: u32,
        fetched: usize,
    },
    Topics {
        done: usize,
        total: usize,
    },
}

#[derive(Deserialize)]
struct UserResponse {
    login: String,
    public_repos: Option<u64>,
}

#[derive(Deserialize)]
struct RepoItem {
    name: String,
    language: Option<String>,
    // Absent on some API versions and GitHub Enterprise installs.
    topics: Option<Vec<String>>,
    created_at: DateTime<Utc>,
    fork: bool,
    owner: RepoOwner,
}

#[derive(Deserialize)]
struct RepoOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct TopicsResponse {
    names: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

struct Page<T> {
    items: T,
    next: Option<String>,
}

#[derive(Clone)]
pub struct GithubClient {
    token: Option<Arc<String>>,
    base_url: Arc<Url>,
    http: Arc<Client>,
}

impl GithubClient {
    /// Create a REST client. Without a token every call is anonymous
    /// (60 requests/hour).
    pub fn new(base_url: &str, token: Option<String>, user_agent: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API URL `{base_url}`"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Invalid API URL `{base_url}`");
        }
        Ok(Self {
            token: token.filter(|t| !t.is_empty()).map(Arc::new),
            base_url: Arc::new(base_url),
            http: Arc::new(http),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// API URL with `segments` appended as percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = (*self.base_url).clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Check the token by asking who it belongs to. Returns the login.
    pub async fn validate_token(&self) -> Result<String, FetchError> {
        let url = self.endpoint(&["user"]);
        let user: UserResponse = self.get_json(url.as_str()).await?;
        debug!(login = %user.login, "token accepted");
        Ok(user.login)
    }

    /// Fetch every repository owned by `username`, following all pages.
    ///
    /// Nothing is returned unless every page (and every topic lookup)
    /// succeeded.
    pub async fn fetch_repositories(
        &self,
        username: &str,
        progress: Option<&UnboundedSender<FetchProgress>>,
    ) -> Result<Vec<RepositoryRecord>, FetchError> {
        let report = |event: FetchProgress| {
            if let Some(tx) = progress {
                // The receiver going away just means nobody is watching.
                let _ = tx.send(event);
            }
        };

        if !is_valid_login(username) {
            return Err(FetchError::NotFound(username.to_string()));
        }

        let url = self.endpoint(&["users", username]);
        let user: UserResponse = match self.get_json(url.as_str()).await {
            Err(FetchError::UnexpectedStatus { status: 404, .. }) => {
                return Err(FetchError::NotFound(username.to_string()));
            }
            other => other?,
        };
        info!(login = %user.login, public_repos = ?user.public_repos, "resolved GitHub user");
        report(FetchProgress::UserResolved {
            login: user.login.clone(),
            public_repos: user.public_repos,
        });

        let mut items: Vec<RepoItem> = Vec::new();
        let mut first = self.endpoint(&["users", &user.login, "repos"]);
        first
            .query_pairs_mut()
            .append_pair("per_page", &PER_PAGE.to_string())
            .append_pair("type", "owner");
        let mut next = Some(first.to_string());
        let mut page_no = 0u32;

        while let Some(url) = next {
            page_no += 1;
            let page: Page<Vec<RepoItem>> = match self.get_page(&url).await {
                Err(FetchError::UnexpectedStatus { status: 404, .. }) => {
                    return Err(FetchError::NotFound(username.to_string()));
                }
                other => other?,
            };
            items.extend(page.items);
            debug!(page = page_no, fetched = items.len(), "fetched repository page");
            report(FetchProgress::Page {
                page: page_no,
                fetched: items.len(),
            });
            next = page.next;
        }

        // Forks never reach the statistics, so their topics are not looked up.
        let missing = items
            .iter()
            .filter(|r| r.topics.is_none() && !r.fork)
            .count();
        let mut done = 0usize;
        let mut records = Vec::with_capacity(items.len());

        for item in items {
            let topics = match item.topics {
                Some(t) => t,
                None if item.fork => Vec::new(),
                None => {
                    let t = self.repo_topics(&item.owner.login, &item.name).await?;
                    done += 1;
                    report(FetchProgress::Topics {
                        done,
                        total: missing,
                    });
                    t
                }
            };
            records.push(RepositoryRecord {
                name: item.name,
                primary_language: item.language,
                topics,
                created_at: item.created_at,
                is_fork: item.fork,
            });
        }

        info!(count = records.len(), "fetched repositories");
        Ok(records)
    }

    /// Topic tags for one repository (secondary lookup).
    pub async fn repo_topics(&self, owner: &str, repo: &str) -> Result<Vec<String>, FetchError> {
        let url = self.endpoint(&["repos", owner, repo, "topics"]);
        let topics: TopicsResponse = self.get_json(url.as_str()).await?;
        Ok(topics.names)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        self.get_page(url).await.map(|p| p.items)
    }

    /// One GET with status translation. No retries: failures go straight
    /// back to the caller.
    async fn get_page<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>, FetchError> {
        let mut req = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.bearer_auth(&**token);
        }

        let resp = req.send().await.map_err(FetchError::Network)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(FetchError::Network)?;
        // Invalid UTF-8 gets replacement characters instead of failing the run.
        let body = String::from_utf8_lossy(&body);

        if !status.is_success() {
            return Err(classify_failure(status, &headers, &body, Utc::now()));
        }

        let items = serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok(Page {
            items,
            next: next_link(&headers),
        })
    }
}

/// Map a non-2xx response onto the error taxonomy.
fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> FetchError {
    if status == StatusCode::UNAUTHORIZED {
        return FetchError::Auth;
    }
    if let Some(reset_at) = rate_limit_reset(status, headers, body, now) {
        return FetchError::RateLimited { reset_at };
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().to_string());
    FetchError::UnexpectedStatus {
        status: status.as_u16(),
        message,
    }
}

/// When the response is a rate-limit rejection, work out when it lifts.
///
/// GitHub signals the primary limit with `x-ratelimit-remaining: 0` plus an
/// epoch `x-ratelimit-reset`, and secondary limits with `retry-after`.
fn rate_limit_reset(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let exhausted = header("x-ratelimit-remaining") == Some("0");
    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok());
    let mentions_limit = body.to_ascii_lowercase().contains("rate limit");

    if !(exhausted || retry_after.is_some() || mentions_limit) {
        return None;
    }

    let reset = header("x-ratelimit-reset")
        .and_then(|s| s.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    // Absurd `retry-after` values fall through to the reset header.
    let after_retry = retry_after
        .and_then(TimeDelta::try_seconds)
        .and_then(|d| now.checked_add_signed(d));

    Some(after_retry.or(reset).unwrap_or(now))
}

/// GitHub logins are ASCII letters, digits and hyphens (underscores on
/// managed enterprise accounts). Anything else cannot name an account.
fn is_valid_login(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim().strip_prefix('<')?.strip_suffix('>')?;
        pieces
            .any(|p| p.trim() == "rel=\"next\"")
            .then(|| target.to_string())
    })
}
