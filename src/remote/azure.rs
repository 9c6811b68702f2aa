//! Azure DevOps Boards adapter.
//!
//! Work items are written with JSON-Patch documents and listed with a WIQL
//! query followed by a batch fetch. Credentials are a personal access token
//! sent as basic auth with an empty user name.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::config::AzureSettings;
use crate::error::{Error, Result};
use crate::model::{ItemFields, ItemFilter, RemoteItem, RemoteKind};
use crate::remote::adapter::{RateLimitInfo, RemoteAdapter};
use crate::remote::http::{self, RateLimitCell};
use crate::remote::status_map::{azure_kind_map, azure_status_map, KindMap, StatusMap};

const DEFAULT_ENDPOINT: &str = "https://dev.azure.com";
const DEFAULT_TASK_TYPE: &str = "Task";
const API_VERSION: &str = "7.1";
const COMMENTS_API_VERSION: &str = "7.1-preview.4";
const BATCH_SIZE: usize = 200;
const JSON_PATCH: &str = "application/json-patch+json";

const F_TITLE: &str = "System.Title";
const F_DESCRIPTION: &str = "System.Description";
const F_STATE: &str = "System.State";
const F_TYPE: &str = "System.WorkItemType";
const F_ASSIGNED: &str = "System.AssignedTo";
const F_TAGS: &str = "System.Tags";
const F_CREATED: &str = "System.CreatedDate";
const F_CHANGED: &str = "System.ChangedDate";

#[derive(Debug, Deserialize)]
struct AdoWorkItem {
    id: u64,
    #[serde(default)]
    fields: HashMap<String, Value>,
    #[serde(default, rename = "_links")]
    links: Option<AdoLinks>,
}

#[derive(Debug, Deserialize)]
struct AdoLinks {
    html: Option<AdoHref>,
}

#[derive(Debug, Deserialize)]
struct AdoHref {
    href: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WiqlResult {
    #[serde(default)]
    work_items: Vec<WiqlRef>,
}

#[derive(Debug, Deserialize)]
struct WiqlRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct AdoList {
    #[serde(default)]
    value: Vec<AdoWorkItem>,
}

#[derive(Debug, Serialize, PartialEq)]
struct PatchOp {
    op: &'static str,
    path: String,
    value: Value,
}

impl PatchOp {
    fn add(field: &str, value: impl Into<Value>) -> Self {
        Self {
            op: "add",
            path: format!("/fields/{field}"),
            value: value.into(),
        }
    }
}

/// Azure DevOps Boards backend.
pub struct AzureDevopsAdapter {
    client: Client,
    endpoint: String,
    organization: String,
    project: String,
    token: String,
    timeout: Duration,
    statuses: StatusMap,
    kinds: KindMap,
    rate: RateLimitCell,
}

impl std::fmt::Debug for AzureDevopsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDevopsAdapter")
            .field("endpoint", &self.endpoint)
            .field("organization", &self.organization)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl AzureDevopsAdapter {
    /// Build from resolved settings.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the organization, project or token is missing.
    pub fn new(settings: &AzureSettings, timeout: Duration) -> Result<Self> {
        let organization = required(
            settings.organization.as_deref(),
            "Azure DevOps organization (AZURE_DEVOPS_ORG)",
        )?;
        let project = required(
            settings.project.as_deref(),
            "Azure DevOps project (AZURE_DEVOPS_PROJECT)",
        )?;
        let token = required(settings.token.as_deref(), "Azure DevOps token (AZURE_DEVOPS_PAT)")?;
        let task_type = settings
            .default_work_item_type
            .as_deref()
            .unwrap_or(DEFAULT_TASK_TYPE);

        Ok(Self {
            client: http::build_client(timeout)?,
            endpoint: settings
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            organization,
            project,
            token,
            timeout,
            statuses: azure_status_map(),
            kinds: azure_kind_map(task_type),
            rate: RateLimitCell::default(),
        })
    }

    fn project_url(&self) -> String {
        format!(
            "{}/{}/{}/_apis/wit",
            self.endpoint,
            self.organization,
            encode_segment(&self.project)
        )
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth("", Some(&self.token))
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<reqwest::Response> {
        self.authed(request)
            .send()
            .await
            .map_err(|e| http::classify_transport(&e, operation, self.timeout))
    }

    fn to_remote_item(&self, item: AdoWorkItem) -> RemoteItem {
        let text = |name: &str| {
            item.fields
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let date = |name: &str| {
            item.fields
                .get(name)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
        };

        let native_status = text(F_STATE).unwrap_or_default();
        let kind = text(F_TYPE).map_or_else(Default::default, |t| self.kinds.to_unified(&t));

        RemoteItem {
            remote_id: item.id.to_string(),
            fields: ItemFields {
                title: text(F_TITLE).unwrap_or_default(),
                description: text(F_DESCRIPTION).filter(|d| !d.is_empty()),
                status: self.statuses.to_unified(&native_status),
                kind,
                assignee: item.fields.get(F_ASSIGNED).and_then(identity_name),
                labels: text(F_TAGS).map(|t| split_tags(&t)).unwrap_or_default(),
            },
            native_status,
            url: item.links.as_ref().and_then(|l| l.html.as_ref()).map(|h| h.href.clone()),
            created_at: date(F_CREATED),
            updated_at: date(F_CHANGED),
        }
    }

    /// JSON-Patch document setting every syncable field.
    ///
    /// State is left out when the unified status has no native counterpart,
    /// so an unrecognized remote state survives a push.
    fn patch_document(&self, fields: &ItemFields, creating: bool) -> Vec<PatchOp> {
        let mut ops = vec![PatchOp::add(F_TITLE, fields.title.clone())];
        if creating {
            if let Some(description) = &fields.description {
                ops.push(PatchOp::add(F_DESCRIPTION, description.clone()));
            }
        } else {
            ops.push(PatchOp::add(
                F_DESCRIPTION,
                fields.description.clone().unwrap_or_default(),
            ));
        }
        if let Some(state) = self.statuses.to_native(fields.status) {
            ops.push(PatchOp::add(F_STATE, state));
        }
        ops.push(PatchOp::add(F_TAGS, join_tags(&fields.labels)));
        match &fields.assignee {
            Some(who) => ops.push(PatchOp::add(F_ASSIGNED, who.clone())),
            None if !creating => ops.push(PatchOp::add(F_ASSIGNED, "")),
            None => {}
        }
        ops
    }

    fn wiql(&self, filter: &ItemFilter) -> String {
        let mut clauses = vec![format!(
            "[System.TeamProject] = '{}'",
            escape_wiql(&self.project)
        )];

        if let Some(status) = filter.status {
            let natives = self.statuses.natives_for(status);
            if !natives.is_empty() {
                let list = natives
                    .iter()
                    .map(|s| format!("'{}'", escape_wiql(s)))
                    .collect::<Vec<_>>()
                    .join(", ");
                clauses.push(format!("[System.State] IN ({list})"));
            }
        }
        for label in &filter.labels {
            clauses.push(format!("[System.Tags] CONTAINS '{}'", escape_wiql(label)));
        }
        if let Some(since) = filter.updated_since {
            clauses.push(format!(
                "[System.ChangedDate] >= '{}'",
                since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            ));
        }

        format!(
            "SELECT [System.Id] FROM WorkItems WHERE {} ORDER BY [System.ChangedDate] DESC",
            clauses.join(" AND ")
        )
    }

    async fn fetch_batch(&self, ids: &[u64]) -> Result<Vec<AdoWorkItem>> {
        let url = format!("{}/workitemsbatch?api-version={API_VERSION}", self.project_url());
        let body = json!({
            "ids": ids,
            "fields": [F_TITLE, F_DESCRIPTION, F_STATE, F_TYPE, F_ASSIGNED, F_TAGS, F_CREATED, F_CHANGED],
        });
        let response = self.send(self.client.post(&url).json(&body), "list_items").await?;
        let list: AdoList =
            http::read_json(response, &self.rate, &url, "list_items", self.timeout).await?;
        Ok(list.value)
    }
}

fn required(value: Option<&str>, what: &str) -> Result<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("{what} is not configured")))
}

fn work_item_id(remote_id: &str) -> Result<u64> {
    remote_id
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("'{remote_id}' is not an Azure DevOps work item id")))
}

/// `System.AssignedTo` is an identity object in 7.x and a plain string in older responses.
fn identity_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("uniqueName")
            .or_else(|| map.get("displayName"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_tags(tags: &[String]) -> String {
    tags.join("; ")
}

fn escape_wiql(value: &str) -> String {
    value.replace('\'', "''")
}

fn encode_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace(' ', "%20")
}

impl RemoteAdapter for AzureDevopsAdapter {
    fn kind(&self) -> RemoteKind {
        RemoteKind::AzureDevops
    }

    #[instrument(level = "debug", skip(self), fields(project = %self.project))]
    async fn authenticate(&self) -> Result<()> {
        let url = format!(
            "{}/{}/_apis/projects/{}?api-version={API_VERSION}",
            self.endpoint,
            self.organization,
            encode_segment(&self.project)
        );
        let response = self.send(self.client.get(&url), "authenticate").await?;
        match http::read_empty(response, &self.rate, &self.project).await {
            Err(Error::RemoteNotFound { .. }) => Err(Error::Auth(format!(
                "project {}/{} not found or not visible to this token",
                self.organization, self.project
            ))),
            other => other,
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_item(&self, remote_id: &str) -> Result<RemoteItem> {
        let id = work_item_id(remote_id)?;
        let url = format!(
            "{}/workitems/{id}?$expand=links&api-version={API_VERSION}",
            self.project_url()
        );
        let response = self.send(self.client.get(&url), "get_item").await?;
        let item: AdoWorkItem =
            http::read_json(response, &self.rate, remote_id, "get_item", self.timeout).await?;
        Ok(self.to_remote_item(item))
    }

    #[instrument(level = "debug", skip(self, filter))]
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<RemoteItem>> {
        let mut url = format!(
            "{}/wiql?timePrecision=true&api-version={API_VERSION}",
            self.project_url()
        );
        if let Some(limit) = filter.limit {
            url.push_str(&format!("&$top={limit}"));
        }
        let query = json!({ "query": self.wiql(filter) });
        let response = self.send(self.client.post(&url).json(&query), "list_items").await?;
        let found: WiqlResult =
            http::read_json(response, &self.rate, &url, "list_items", self.timeout).await?;

        let ids: Vec<u64> = found.work_items.iter().map(|w| w.id).collect();
        debug!(matched = ids.len(), "WIQL query returned work items");

        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_SIZE) {
            for raw in self.fetch_batch(chunk).await? {
                let item = self.to_remote_item(raw);
                if filter.matches(&item) {
                    out.push(item);
                }
            }
        }
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    #[instrument(level = "debug", skip(self, fields), fields(title = %fields.title))]
    async fn create_item(&self, fields: &ItemFields) -> Result<RemoteItem> {
        let work_item_type = self.kinds.to_native(fields.kind).unwrap_or(DEFAULT_TASK_TYPE);
        let url = format!(
            "{}/workitems/${}?api-version={API_VERSION}",
            self.project_url(),
            encode_segment(work_item_type)
        );
        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static(JSON_PATCH))
            .json(&self.patch_document(fields, true));
        let response = self.send(request, "create_item").await?;
        let item: AdoWorkItem =
            http::read_json(response, &self.rate, &url, "create_item", self.timeout).await?;
        Ok(self.to_remote_item(item))
    }

    #[instrument(level = "debug", skip(self, fields))]
    async fn update_item(&self, remote_id: &str, fields: &ItemFields) -> Result<RemoteItem> {
        let id = work_item_id(remote_id)?;
        let url = format!("{}/workitems/{id}?api-version={API_VERSION}", self.project_url());
        let request = self
            .client
            .patch(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static(JSON_PATCH))
            .json(&self.patch_document(fields, false));
        let response = self.send(request, "update_item").await?;
        let item: AdoWorkItem =
            http::read_json(response, &self.rate, remote_id, "update_item", self.timeout).await?;
        Ok(self.to_remote_item(item))
    }

    #[instrument(level = "debug", skip(self, text))]
    async fn add_comment(&self, remote_id: &str, text: &str) -> Result<()> {
        let id = work_item_id(remote_id)?;
        let url = format!(
            "{}/workItems/{id}/comments?api-version={COMMENTS_API_VERSION}",
            self.project_url()
        );
        let response = self
            .send(self.client.post(&url).json(&json!({ "text": text })), "add_comment")
            .await?;
        http::read_empty(response, &self.rate, remote_id).await
    }

    fn check_rate_limit(&self) -> Option<RateLimitInfo> {
        self.rate.get()
    }
}
