use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::github::{FetchError, FetchProgress, GithubClient};
use crate::stats::{self, AnalysisResult};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("please enter a GitHub username")]
    EmptyUsername,

    #[error("an analysis of `{0}` is already running")]
    Busy(String),
}

/// Where the front end is in the analyze/export cycle. Only one analysis may
/// be in flight.
#[derive(Debug, Default)]
pub enum AnalysisState {
    #[default]
    Idle,
    Running {
        username: String,
    },
    Ready(AnalysisResult),
}

#[derive(Debug, Default)]
pub struct Session {
    state: AnalysisState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new analysis, returning the trimmed username. Any previous
    /// result is dropped.
    pub fn begin(&mut self, input: &str) -> Result<String, SessionError> {
        if let AnalysisState::Running { username } = &self.state {
            return Err(SessionError::Busy(username.clone()));
        }
        let username = input.trim();
        if username.is_empty() {
            return Err(SessionError::EmptyUsername);
        }
        self.state = AnalysisState::Running {
            username: username.to_string(),
        };
        Ok(username.to_string())
    }

    pub fn complete(&mut self, result: AnalysisResult) {
        self.state = AnalysisState::Ready(result);
    }

    /// Abandon the running analysis (error or cancellation).
    pub fn abort(&mut self) {
        self.state = AnalysisState::Idle;
    }

    /// Forget a finished result. A running analysis is left alone.
    pub fn clear(&mut self) {
        if matches!(self.state, AnalysisState::Ready(_)) {
            self.state = AnalysisState::Idle;
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.state {
            AnalysisState::Ready(result) => Some(result),
            _ => None,
        }
    }
}

/// Confirm the token before fetching. Only an outright rejection stops the
/// run: app installation tokens cannot read `/user` but can still list
/// public repositories.
pub async fn check_token(client: &GithubClient) -> Result<Option<String>, FetchError> {
    if !client.is_authenticated() {
        return Ok(None);
    }
    match client.validate_token().await {
        Ok(login) => {
            info!(%login, "authenticated");
            Ok(Some(login))
        }
        Err(FetchError::Auth) => Err(FetchError::Auth),
        Err(e) => {
            warn!(error = %e, "could not confirm the token owner, continuing");
            Ok(None)
        }
    }
}

/// Fetch everything for `username`, then aggregate. Aggregation only runs on
/// a complete record set.
pub async fn analyze(
    client: &GithubClient,
    username: &str,
    year: i32,
    progress: Option<&UnboundedSender<FetchProgress>>,
) -> Result<AnalysisResult, FetchError> {
    let records = client.fetch_repositories(username, progress).await?;
    let result = stats::aggregate(username, &records, year);
    info!(
        languages = result.language_counts.len(),
        topics = result.topic_counts.len(),
        new_this_year = result.total_new_repositories(),
        "aggregated profile"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::YearMonth;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo(name: &str, lang: &str, topics: &[&str], created: &str, fork: bool) -> serde_json::Value {
        json!({
            "name": name,
            "language": lang,
            "topics": topics,
            "created_at": created,
            "fork": fork,
            "owner": { "login": "octocat" },
        })
    }

    fn sample_result() -> AnalysisResult {
        stats::aggregate("octocat", &[], 2024)
    }

    #[test]
    fn begin_trims_and_rejects_blank() {
        let mut s = Session::new();
        assert_eq!(s.begin("   "), Err(SessionError::EmptyUsername));
        assert!(matches!(s.state, AnalysisState::Idle));
        assert_eq!(s.begin("  octocat \n").unwrap(), "octocat");
    }

    #[test]
    fn second_begin_while_running_is_rejected() {
        let mut s = Session::new();
        s.begin("octocat").unwrap();
        assert_eq!(s.begin("other"), Err(SessionError::Busy("octocat".into())));

        s.abort();
        assert!(s.begin("other").is_ok());
    }

    #[test]
    fn new_run_supersedes_previous_result() {
        let mut s = Session::new();
        s.begin("octocat").unwrap();
        s.complete(sample_result());
        assert_eq!(s.result().map(|r| r.subject_username.as_str()), Some("octocat"));

        s.begin("hubot").unwrap();
        assert!(s.result().is_none());
        assert!(matches!(s.state, AnalysisState::Running { ref username } if username == "hubot"));
    }

    #[test]
    fn clear_drops_finished_result_only() {
        let mut s = Session::new();
        s.begin("octocat").unwrap();
        s.clear();
        assert!(matches!(s.state, AnalysisState::Running { .. }));

        s.complete(sample_result());
        s.clear();
        assert!(s.result().is_none());
        assert!(matches!(s.state, AnalysisState::Idle));
    }

    #[tokio::test]
    async fn integration_token_without_user_access_still_analyzes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(403).set_body_json(
                json!({ "message": "Resource not accessible by integration" }),
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/octocat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "octocat" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                repo("a", "Go", &["cli"], "2024-01-10T00:00:00Z", false),
            ])))
            .mount(&server)
            .await;

        let client = GithubClient::new(&server.uri(), Some("ghs_app".into()), "ghprofile-test")
            .unwrap();
        assert_eq!(check_token(&client).await.unwrap(), None);
        let result = analyze(&client, "octocat", 2024, None).await.unwrap();
        assert_eq!(result.language_counts, vec![("Go".to_string(), 1)]);
        server.verify().await;
    }

    #[tokio::test]
    async fn rejected_token_stops_before_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = GithubClient::new(&server.uri(), Some("revoked".into()), "ghprofile-test")
            .unwrap();
        assert!(matches!(check_token(&client).await, Err(FetchError::Auth)));
    }

    #[tokio::test]
    async fn analyze_fetches_then_aggregates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octocat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "octocat" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/octocat/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                repo("a", "Go", &["cli"], "2024-01-10T00:00:00Z", false),
                repo("b", "Go", &[], "2024-01-20T00:00:00Z", false),
                repo("c", "Rust", &["cli", "systems"], "2023-05-01T00:00:00Z", false),
                repo("d", "Python", &["cli"], "2024-03-01T00:00:00Z", true),
            ])))
            .mount(&server)
            .await;

        let client = GithubClient::new(&server.uri(), None, "ghprofile-test").unwrap();
        let result = analyze(&client, "octocat", 2024, None).await.unwrap();

        assert_eq!(
            result.language_counts,
            vec![("Go".to_string(), 2), ("Rust".to_string(), 1)]
        );
        assert_eq!(
            result.topic_counts,
            vec![("cli".to_string(), 2), ("systems".to_string(), 1)]
        );
        assert_eq!(
            result.monthly_activity,
            vec![(YearMonth { year: 2024, month: 1 }, 2)]
        );
    }

    #[tokio::test]
    async fn auth_failure_yields_no_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = GithubClient::new(&server.uri(), Some("revoked".into()), "ghprofile-test")
            .unwrap();
        let err = analyze(&client, "octocat", 2024, None).await.unwrap_err();
        assert!(matches!(err, FetchError::Auth));
    }
}
