//! GitHub Issues adapter.
//!
//! Status lives in the issue `state` plus `status:*` labels, kind in
//! `type:*` labels. Pull requests returned by the issues API are skipped.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::GithubSettings;
use crate::error::{Error, Result};
use crate::model::{ItemFields, ItemFilter, ItemStatus, RemoteItem, RemoteKind};
use crate::remote::adapter::{RateLimitInfo, RemoteAdapter};
use crate::remote::http::{self, RateLimitCell};
use crate::remote::status_map::{github_kind_map, github_status_map, KindMap, StatusMap};

const DEFAULT_ENDPOINT: &str = "https://api.github.com";
const STATUS_PREFIX: &str = "status:";
const TYPE_PREFIX: &str = "type:";
const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
    #[serde(default)]
    assignee: Option<GhUser>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct GhIssueWrite {
    title: String,
    body: String,
    labels: Vec<String>,
    assignees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct GhComment<'a> {
    body: &'a str,
}

/// GitHub Issues backend.
pub struct GithubAdapter {
    client: Client,
    endpoint: String,
    owner: String,
    repo: String,
    token: String,
    timeout: Duration,
    statuses: StatusMap,
    kinds: KindMap,
    rate: RateLimitCell,
}

impl std::fmt::Debug for GithubAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubAdapter")
            .field("endpoint", &self.endpoint)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl GithubAdapter {
    /// Build from resolved settings.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the token, owner or repository is missing.
    pub fn new(settings: &GithubSettings, timeout: Duration) -> Result<Self> {
        let token = required(settings.token.as_deref(), "GitHub token (GITHUB_TOKEN)")?;
        let owner = required(settings.owner.as_deref(), "GitHub owner (GITHUB_OWNER)")?;
        let repo = required(settings.repo.as_deref(), "GitHub repository (GITHUB_REPO)")?;

        Ok(Self {
            client: http::build_client(timeout)?,
            endpoint: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            owner,
            repo,
            token,
            timeout,
            statuses: github_status_map(),
            kinds: github_kind_map(),
            rate: RateLimitCell::default(),
        })
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.endpoint, self.owner, self.repo)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        h.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        let auth = format!("Bearer {}", self.token);
        h.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| Error::Config(format!("invalid GitHub token: {e}")))?,
        );
        Ok(h)
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<reqwest::Response> {
        request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| http::classify_transport(&e, operation, self.timeout))
    }

    /// Map an issue to the unified shape.
    fn to_remote_item(&self, issue: GhIssue) -> RemoteItem {
        let mut status_label = None;
        let mut kind_label = None;
        let mut labels = Vec::new();
        for label in issue.labels {
            if let Some(rest) = label.name.strip_prefix(STATUS_PREFIX) {
                status_label.get_or_insert_with(|| rest.to_string());
            } else if let Some(rest) = label.name.strip_prefix(TYPE_PREFIX) {
                kind_label.get_or_insert_with(|| rest.to_string());
            } else {
                labels.push(label.name);
            }
        }

        let closed = issue.state.eq_ignore_ascii_case("closed");
        let native_status = match (&status_label, closed) {
            (Some(label), true) if self.statuses.lookup(label) == Some(ItemStatus::Deferred) => {
                label.clone()
            }
            (_, true) => issue.state.clone(),
            (Some(label), false) => label.clone(),
            (None, false) => issue.state.clone(),
        };
        let status = self.statuses.to_unified(&native_status);
        let kind = kind_label
            .as_deref()
            .map_or_else(Default::default, |k| self.kinds.to_unified(k));

        RemoteItem {
            remote_id: issue.number.to_string(),
            fields: ItemFields {
                title: issue.title,
                description: issue.body.filter(|b| !b.is_empty()),
                status,
                kind,
                assignee: issue.assignee.map(|u| u.login),
                labels,
            },
            native_status,
            url: issue.html_url,
            created_at: issue.created_at,
            updated_at: issue.updated_at,
        }
    }

    /// Request body carrying every syncable field.
    ///
    /// `labels` replaces the whole label set, so an `Unknown` status keeps
    /// the `status:*` labels in `current_status` instead of dropping them.
    fn to_write(&self, fields: &ItemFields, current_status: &[String]) -> GhIssueWrite {
        let mut labels: Vec<String> = fields
            .labels
            .iter()
            .filter(|l| !l.starts_with(STATUS_PREFIX) && !l.starts_with(TYPE_PREFIX))
            .cloned()
            .collect();

        match fields.status {
            ItemStatus::Open | ItemStatus::Closed => {}
            ItemStatus::Unknown => labels.extend(current_status.iter().cloned()),
            status => {
                if let Some(native) = self.statuses.to_native(status) {
                    labels.push(format!("{STATUS_PREFIX}{native}"));
                }
            }
        }
        if let Some(kind) = self.kinds.to_native(fields.kind) {
            labels.push(format!("{TYPE_PREFIX}{kind}"));
        }

        let (state, state_reason) = match fields.status {
            ItemStatus::Closed => (Some("closed"), Some("completed")),
            ItemStatus::Deferred => (Some("closed"), Some("not_planned")),
            ItemStatus::Unknown => (None, None),
            _ => (Some("open"), None),
        };

        GhIssueWrite {
            title: fields.title.clone(),
            body: fields.description.clone().unwrap_or_default(),
            labels,
            assignees: fields.assignee.iter().cloned().collect(),
            state,
            state_reason,
        }
    }

    async fn fetch_issue(&self, number: u64, remote_id: &str, operation: &str) -> Result<GhIssue> {
        let url = format!("{}/issues/{number}", self.repo_url());
        let response = self.send(self.client.get(&url), operation).await?;
        http::read_json(response, &self.rate, remote_id, operation, self.timeout).await
    }

    async fn patch_issue(&self, number: u64, body: &GhIssueWrite) -> Result<RemoteItem> {
        let id = number.to_string();
        let url = format!("{}/issues/{number}", self.repo_url());
        let response = self.send(self.client.patch(&url).json(body), "update_item").await?;
        let issue: GhIssue =
            http::read_json(response, &self.rate, &id, "update_item", self.timeout).await?;
        Ok(self.to_remote_item(issue))
    }

    fn list_query(filter: &ItemFilter, page: usize) -> Vec<(&'static str, String)> {
        let state = match filter.status {
            Some(ItemStatus::Closed | ItemStatus::Deferred) => "closed",
            Some(ItemStatus::Unknown) | None => "all",
            Some(_) => "open",
        };
        let mut query = vec![
            ("state", state.to_string()),
            ("per_page", PAGE_SIZE.to_string()),
            ("page", page.to_string()),
        ];
        if !filter.labels.is_empty() {
            query.push(("labels", filter.labels.join(",")));
        }
        if let Some(since) = filter.updated_since {
            query.push(("since", since.to_rfc3339()));
        }
        query
    }
}

fn required(value: Option<&str>, what: &str) -> Result<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("{what} is not configured")))
}

fn status_labels(issue: &GhIssue) -> Vec<String> {
    issue
        .labels
        .iter()
        .filter(|l| l.name.starts_with(STATUS_PREFIX))
        .map(|l| l.name.clone())
        .collect()
}

fn issue_number(remote_id: &str) -> Result<u64> {
    remote_id
        .trim()
        .trim_start_matches('#')
        .parse()
        .map_err(|_| Error::Validation(format!("'{remote_id}' is not a GitHub issue number")))
}

impl RemoteAdapter for GithubAdapter {
    fn kind(&self) -> RemoteKind {
        RemoteKind::Github
    }

    #[instrument(level = "debug", skip(self), fields(repo = %self.repo))]
    async fn authenticate(&self) -> Result<()> {
        let response = self
            .send(self.client.get(self.repo_url()), "authenticate")
            .await?;
        match http::read_empty(response, &self.rate, &self.repo).await {
            Err(Error::RemoteNotFound { .. }) => Err(Error::Auth(format!(
                "repository {}/{} not found or not visible to this token",
                self.owner, self.repo
            ))),
            other => other,
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_item(&self, remote_id: &str) -> Result<RemoteItem> {
        let number = issue_number(remote_id)?;
        let issue = self.fetch_issue(number, remote_id, "get_item").await?;
        if issue.pull_request.is_some() {
            return Err(Error::Validation(format!("#{number} is a pull request")));
        }
        Ok(self.to_remote_item(issue))
    }

    #[instrument(level = "debug", skip(self, filter))]
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<RemoteItem>> {
        let url = format!("{}/issues", self.repo_url());
        let mut out = Vec::new();
        let mut page = 1;

        loop {
            let query = Self::list_query(filter, page);
            let response = self
                .send(self.client.get(&url).query(&query), "list_items")
                .await?;
            let issues: Vec<GhIssue> =
                http::read_json(response, &self.rate, &url, "list_items", self.timeout).await?;
            let fetched = issues.len();

            for issue in issues.into_iter().filter(|i| i.pull_request.is_none()) {
                let item = self.to_remote_item(issue);
                if filter.matches(&item) {
                    out.push(item);
                }
                if filter.limit.is_some_and(|limit| out.len() >= limit) {
                    return Ok(out);
                }
            }

            debug!(page, fetched, kept = out.len(), "Listed GitHub issues page");
            if fetched < PAGE_SIZE {
                return Ok(out);
            }
            page += 1;
        }
    }

    #[instrument(level = "debug", skip(self, fields), fields(title = %fields.title))]
    async fn create_item(&self, fields: &ItemFields) -> Result<RemoteItem> {
        let mut body = self.to_write(fields, &[]);
        // Issues are always created open; closing takes a second call.
        let state = body.state.take();
        let state_reason = body.state_reason.take();

        let url = format!("{}/issues", self.repo_url());
        let response = self.send(self.client.post(&url).json(&body), "create_item").await?;
        let issue: GhIssue =
            http::read_json(response, &self.rate, &url, "create_item", self.timeout).await?;
        let number = issue.number;

        if state == Some("closed") {
            body.state = state;
            body.state_reason = state_reason;
            return self.patch_issue(number, &body).await;
        }
        Ok(self.to_remote_item(issue))
    }

    #[instrument(level = "debug", skip(self, fields))]
    async fn update_item(&self, remote_id: &str, fields: &ItemFields) -> Result<RemoteItem> {
        let number = issue_number(remote_id)?;
        let current_status = if fields.status == ItemStatus::Unknown {
            let current = self.fetch_issue(number, remote_id, "update_item").await?;
            status_labels(&current)
        } else {
            Vec::new()
        };
        self.patch_issue(number, &self.to_write(fields, &current_status))
            .await
    }

    #[instrument(level = "debug", skip(self, text))]
    async fn add_comment(&self, remote_id: &str, text: &str) -> Result<()> {
        let number = issue_number(remote_id)?;
        let url = format!("{}/issues/{number}/comments", self.repo_url());
        let response = self
            .send(self.client.post(&url).json(&GhComment { body: text }), "add_comment")
            .await?;
        http::read_empty(response, &self.rate, remote_id).await
    }

    fn check_rate_limit(&self) -> Option<RateLimitInfo> {
        self.rate.get()
    }
}
