//! Narrow source-control interface
//!
//! The orchestrator consumes a small slice of the hosting API: issues,
//! comments, and pull requests. [`SourceControl`] is that seam;
//! [`RetryingSourceControl`] layers the auth-refresh retry policy on top
//! (at most two attempts per call with a token refresh in between).
//! [`MockSourceControl`] backs the tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use sandbox::TargetRepository;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{info, warn};

/// Errors from the hosting API
#[derive(Error, Debug, Clone)]
pub enum ScmError {
    /// Installation token expired; a refresh plus retry may succeed.
    #[error("authentication expired")]
    AuthExpired,

    #[error("issue #{0} not found")]
    IssueNotFound(u64),

    #[error("source-control error: {0}")]
    Other(String),
}

pub type ScmResult<T> = std::result::Result<T, ScmError>;

/// An issue as the orchestrator sees it
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// A comment on an issue
#[derive(Debug, Clone, PartialEq)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
    pub author: String,
}

/// Request to open a pull request
#[derive(Debug, Clone)]
pub struct OpenPrRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
}

/// An opened pull request
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

/// The slice of the hosting API the core consumes
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn get_issue(&self, repo: &TargetRepository, number: u64) -> ScmResult<Issue>;

    async fn list_issue_comments(
        &self,
        repo: &TargetRepository,
        number: u64,
    ) -> ScmResult<Vec<IssueComment>>;

    async fn create_issue(
        &self,
        repo: &TargetRepository,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> ScmResult<Issue>;

    async fn update_issue_body(
        &self,
        repo: &TargetRepository,
        number: u64,
        body: &str,
    ) -> ScmResult<()>;

    async fn create_issue_comment(
        &self,
        repo: &TargetRepository,
        number: u64,
        body: &str,
    ) -> ScmResult<IssueComment>;

    async fn open_pull_request(
        &self,
        repo: &TargetRepository,
        request: OpenPrRequest,
    ) -> ScmResult<PullRequestRef>;

    /// Regenerate the installation token. A no-op for PAT-backed setups.
    async fn refresh_token(&self) -> ScmResult<()>;

    /// Current token for git-over-HTTPS access, if any.
    async fn git_token(&self) -> ScmResult<Option<String>> {
        Ok(None)
    }
}

#[async_trait]
impl<T: SourceControl + ?Sized> SourceControl for std::sync::Arc<T> {
    async fn get_issue(&self, repo: &TargetRepository, number: u64) -> ScmResult<Issue> {
        (**self).get_issue(repo, number).await
    }

    async fn list_issue_comments(
        &self,
        repo: &TargetRepository,
        number: u64,
    ) -> ScmResult<Vec<IssueComment>> {
        (**self).list_issue_comments(repo, number).await
    }

    async fn create_issue(
        &self,
        repo: &TargetRepository,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> ScmResult<Issue> {
        (**self).create_issue(repo, title, body, labels).await
    }

    async fn update_issue_body(
        &self,
        repo: &TargetRepository,
        number: u64,
        body: &str,
    ) -> ScmResult<()> {
        (**self).update_issue_body(repo, number, body).await
    }

    async fn create_issue_comment(
        &self,
        repo: &TargetRepository,
        number: u64,
        body: &str,
    ) -> ScmResult<IssueComment> {
        (**self).create_issue_comment(repo, number, body).await
    }

    async fn open_pull_request(
        &self,
        repo: &TargetRepository,
        request: OpenPrRequest,
    ) -> ScmResult<PullRequestRef> {
        (**self).open_pull_request(repo, request).await
    }

    async fn refresh_token(&self) -> ScmResult<()> {
        (**self).refresh_token().await
    }

    async fn git_token(&self) -> ScmResult<Option<String>> {
        (**self).git_token().await
    }
}

/// Auth-refresh retry wrapper
///
/// Each call is attempted at most twice: on [`ScmError::AuthExpired`] the
/// token is refreshed and the call retried once. Other errors pass through.
pub struct RetryingSourceControl<S> {
    inner: S,
}

impl<S: SourceControl> RetryingSourceControl<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    async fn with_refresh<T, F, Fut>(&self, operation: F) -> ScmResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ScmResult<T>>,
    {
        match operation().await {
            Err(ScmError::AuthExpired) => {
                warn!("source-control auth expired, refreshing token");
                self.inner.refresh_token().await?;
                operation().await
            }
            other => other,
        }
    }
}

#[async_trait]
impl<S: SourceControl> SourceControl for RetryingSourceControl<S> {
    async fn get_issue(&self, repo: &TargetRepository, number: u64) -> ScmResult<Issue> {
        self.with_refresh(|| self.inner.get_issue(repo, number)).await
    }

    async fn list_issue_comments(
        &self,
        repo: &TargetRepository,
        number: u64,
    ) -> ScmResult<Vec<IssueComment>> {
        self.with_refresh(|| self.inner.list_issue_comments(repo, number))
            .await
    }

    async fn create_issue(
        &self,
        repo: &TargetRepository,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> ScmResult<Issue> {
        self.with_refresh(|| self.inner.create_issue(repo, title, body, labels))
            .await
    }

    async fn update_issue_body(
        &self,
        repo: &TargetRepository,
        number: u64,
        body: &str,
    ) -> ScmResult<()> {
        self.with_refresh(|| self.inner.update_issue_body(repo, number, body))
            .await
    }

    async fn create_issue_comment(
        &self,
        repo: &TargetRepository,
        number: u64,
        body: &str,
    ) -> ScmResult<IssueComment> {
        self.with_refresh(|| self.inner.create_issue_comment(repo, number, body))
            .await
    }

    async fn open_pull_request(
        &self,
        repo: &TargetRepository,
        request: OpenPrRequest,
    ) -> ScmResult<PullRequestRef> {
        self.with_refresh(|| self.inner.open_pull_request(repo, request.clone()))
            .await
    }

    async fn refresh_token(&self) -> ScmResult<()> {
        self.inner.refresh_token().await
    }

    async fn git_token(&self) -> ScmResult<Option<String>> {
        self.inner.git_token().await
    }
}

/// In-memory source control for tests
#[derive(Default)]
pub struct MockSourceControl {
    issues: Mutex<HashMap<u64, Issue>>,
    comments: Mutex<HashMap<u64, Vec<IssueComment>>>,
    pull_requests: Mutex<Vec<(OpenPrRequest, PullRequestRef)>>,
    next_issue: AtomicU64,
    next_comment: AtomicU64,
    next_pr: AtomicU64,
    auth_failures: AtomicUsize,
    refreshes: AtomicUsize,
}

impl MockSourceControl {
    pub fn new() -> Self {
        Self {
            next_issue: AtomicU64::new(100),
            next_comment: AtomicU64::new(1000),
            next_pr: AtomicU64::new(1),
            ..Default::default()
        }
    }

    pub fn seed_issue(&self, issue: Issue) {
        self.issues.lock().insert(issue.number, issue);
    }

    pub fn seed_comment(&self, issue_number: u64, comment: IssueComment) {
        self.comments
            .lock()
            .entry(issue_number)
            .or_default()
            .push(comment);
    }

    /// Make the next `n` calls fail with `AuthExpired`.
    pub fn fail_next_auth(&self, n: usize) {
        self.auth_failures.store(n, Ordering::SeqCst);
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn issue(&self, number: u64) -> Option<Issue> {
        self.issues.lock().get(&number).cloned()
    }

    pub fn comments_on(&self, number: u64) -> Vec<IssueComment> {
        self.comments.lock().get(&number).cloned().unwrap_or_default()
    }

    pub fn opened_pull_requests(&self) -> Vec<(OpenPrRequest, PullRequestRef)> {
        self.pull_requests.lock().clone()
    }

    fn check_auth(&self) -> ScmResult<()> {
        let remaining = self.auth_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.auth_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ScmError::AuthExpired);
        }
        Ok(())
    }
}

#[async_trait]
impl SourceControl for MockSourceControl {
    async fn get_issue(&self, _repo: &TargetRepository, number: u64) -> ScmResult<Issue> {
        self.check_auth()?;
        self.issues
            .lock()
            .get(&number)
            .cloned()
            .ok_or(ScmError::IssueNotFound(number))
    }

    async fn list_issue_comments(
        &self,
        _repo: &TargetRepository,
        number: u64,
    ) -> ScmResult<Vec<IssueComment>> {
        self.check_auth()?;
        Ok(self.comments.lock().get(&number).cloned().unwrap_or_default())
    }

    async fn create_issue(
        &self,
        _repo: &TargetRepository,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> ScmResult<Issue> {
        self.check_auth()?;
        let issue = Issue {
            number: self.next_issue.fetch_add(1, Ordering::SeqCst),
            title: title.to_string(),
            body: body.to_string(),
            labels: labels.to_vec(),
        };
        self.issues.lock().insert(issue.number, issue.clone());
        info!(issue = issue.number, "created issue");
        Ok(issue)
    }

    async fn update_issue_body(
        &self,
        _repo: &TargetRepository,
        number: u64,
        body: &str,
    ) -> ScmResult<()> {
        self.check_auth()?;
        let mut issues = self.issues.lock();
        let issue = issues.get_mut(&number).ok_or(ScmError::IssueNotFound(number))?;
        issue.body = body.to_string();
        Ok(())
    }

    async fn create_issue_comment(
        &self,
        _repo: &TargetRepository,
        number: u64,
        body: &str,
    ) -> ScmResult<IssueComment> {
        self.check_auth()?;
        let comment = IssueComment {
            id: self.next_comment.fetch_add(1, Ordering::SeqCst),
            body: body.to_string(),
            author: "patchwork[bot]".to_string(),
        };
        self.comments
            .lock()
            .entry(number)
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    async fn open_pull_request(
        &self,
        repo: &TargetRepository,
        request: OpenPrRequest,
    ) -> ScmResult<PullRequestRef> {
        self.check_auth()?;
        let number = self.next_pr.fetch_add(1, Ordering::SeqCst);
        let reference = PullRequestRef {
            number,
            url: format!("https://github.com/{}/pull/{number}", repo.full_name()),
        };
        self.pull_requests
            .lock()
            .push((request, reference.clone()));
        Ok(reference)
    }

    async fn refresh_token(&self) -> ScmResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn git_token(&self) -> ScmResult<Option<String>> {
        Ok(Some("mock-token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> TargetRepository {
        TargetRepository::new("acme", "widget")
    }

    #[tokio::test]
    async fn auth_expiry_refreshes_and_retries_once() {
        let mock = MockSourceControl::new();
        mock.seed_issue(Issue {
            number: 42,
            title: "Fix typo".into(),
            body: "in README".into(),
            labels: vec![],
        });
        mock.fail_next_auth(1);

        let scm = RetryingSourceControl::new(mock);
        let issue = scm.get_issue(&repo(), 42).await.unwrap();
        assert_eq!(issue.title, "Fix typo");
        assert_eq!(scm.inner.refresh_count(), 1);
    }

    #[tokio::test]
    async fn persistent_auth_failure_surfaces_after_two_attempts() {
        let mock = MockSourceControl::new();
        mock.fail_next_auth(5);

        let scm = RetryingSourceControl::new(mock);
        let err = scm.get_issue(&repo(), 42).await.unwrap_err();
        assert!(matches!(err, ScmError::AuthExpired));
        // One refresh between the two attempts, no more.
        assert_eq!(scm.inner.refresh_count(), 1);
    }

    #[tokio::test]
    async fn other_errors_pass_through_without_refresh() {
        let scm = RetryingSourceControl::new(MockSourceControl::new());
        let err = scm.get_issue(&repo(), 7).await.unwrap_err();
        assert!(matches!(err, ScmError::IssueNotFound(7)));
        assert_eq!(scm.inner.refresh_count(), 0);
    }
}
