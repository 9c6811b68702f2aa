//! In-memory tracker backend.
//!
//! Behaves like a remote tracker without a network: items get numeric ids,
//! every call is logged with its time, and failures, latency and a request
//! quota can be injected. Used by tests and for dry experiments with the
//! library.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{ItemFields, ItemFilter, RemoteItem, RemoteKind};
use crate::remote::adapter::{RateLimitInfo, RemoteAdapter};

/// Error class an injected failure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    RateLimited,
    Transient,
    Timeout,
    NotFound,
    Validation,
}

impl FailureKind {
    fn to_error(self, target: &str, reset_at: Option<DateTime<Utc>>) -> Error {
        match self {
            Self::Auth => Error::Auth(format!("injected auth failure on {target}")),
            Self::RateLimited => Error::RateLimited {
                message: format!("injected rate limit on {target}"),
                reset_at,
            },
            Self::Transient => Error::Transient(format!("injected failure on {target}")),
            Self::Timeout => Error::Timeout {
                operation: target.to_string(),
                after_ms: 0,
            },
            Self::NotFound => Error::RemoteNotFound {
                id: target.to_string(),
            },
            Self::Validation => Error::Validation(format!("injected rejection of {target}")),
        }
    }
}

/// One logged adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterCall {
    pub op: &'static str,
    /// Remote id, or the title for creates.
    pub target: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct Injected {
    kind: FailureKind,
    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Debug)]
struct Quota {
    remaining: u32,
    limit: u32,
    reset_at: DateTime<Utc>,
    window: TimeDelta,
}

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<u64, RemoteItem>,
    comments: Vec<(String, String)>,
    next_id: u64,
    calls: Vec<AdapterCall>,
    failures: HashMap<String, Injected>,
    auth_failure: Option<FailureKind>,
    quota: Option<Quota>,
    reading: Option<RateLimitInfo>,
    latency: Duration,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Debug)]
struct Inner {
    kind: RemoteKind,
    clock: Clock,
    state: Mutex<State>,
}

/// Fake remote tracker. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    inner: Arc<Inner>,
}

impl MemoryAdapter {
    #[must_use]
    pub fn new(kind: RemoteKind) -> Self {
        Self::with_clock(kind, Clock::new())
    }

    /// Use `clock` for item timestamps, call times and quota windows.
    #[must_use]
    pub fn with_clock(kind: RemoteKind, clock: Clock) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                clock,
                state: Mutex::new(State {
                    next_id: 1,
                    ..State::default()
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding and inspection ───────────────────────────────

    /// Add an item directly, as if someone created it on the remote.
    pub fn seed(&self, fields: ItemFields) -> RemoteItem {
        let now = self.inner.clock.now();
        let mut state = self.state();
        insert_new(&mut state, fields, now)
    }

    /// Edit an item directly, bumping its modification time.
    ///
    /// Returns `None` if the item does not exist.
    pub fn edit(&self, remote_id: &str, f: impl FnOnce(&mut ItemFields)) -> Option<RemoteItem> {
        let now = self.inner.clock.now();
        let mut state = self.state();
        let item = state.items.get_mut(&parse_id(remote_id)?)?;
        f(&mut item.fields);
        touch(item, now);
        Some(item.clone())
    }

    /// Remove an item, as if deleted on the remote.
    pub fn delete(&self, remote_id: &str) -> bool {
        parse_id(remote_id).is_some_and(|id| self.state().items.remove(&id).is_some())
    }

    #[must_use]
    pub fn item(&self, remote_id: &str) -> Option<RemoteItem> {
        let id = parse_id(remote_id)?;
        self.state().items.get(&id).cloned()
    }

    #[must_use]
    pub fn items(&self) -> Vec<RemoteItem> {
        self.state().items.values().cloned().collect()
    }

    /// `(remote_id, text)` of every comment posted.
    #[must_use]
    pub fn comments(&self) -> Vec<(String, String)> {
        self.state().comments.clone()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<AdapterCall> {
        self.state().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| c.op == op).count()
    }

    /// Highest number of calls that were in progress at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    // ── Fault injection ──────────────────────────────────────

    /// Every call whose target is `key` (remote id, or title on create) fails.
    pub fn fail_on(&self, key: impl Into<String>, kind: FailureKind) {
        self.state().failures.insert(
            key.into(),
            Injected {
                kind,
                remaining: None,
            },
        );
    }

    /// Like [`fail_on`](Self::fail_on) for the next `times` matching calls only.
    pub fn fail_times(&self, key: impl Into<String>, kind: FailureKind, times: usize) {
        self.state().failures.insert(
            key.into(),
            Injected {
                kind,
                remaining: Some(times),
            },
        );
    }

    /// Make `authenticate` fail.
    pub fn fail_authenticate(&self, kind: FailureKind) {
        self.state().auth_failure = Some(kind);
    }

    /// Undo [`fail_authenticate`](Self::fail_authenticate).
    pub fn allow_authenticate(&self) {
        self.state().auth_failure = None;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Enforce a request quota of `limit` per `window`, starting with
    /// `remaining` calls left until `reset_at`.
    pub fn set_quota(&self, remaining: u32, limit: u32, reset_at: DateTime<Utc>, window: TimeDelta) {
        let mut state = self.state();
        state.reading = Some(RateLimitInfo {
            remaining,
            limit: Some(limit),
            reset_at,
        });
        state.quota = Some(Quota {
            remaining,
            limit,
            reset_at,
            window,
        });
    }

    // ── Call bookkeeping ─────────────────────────────────────

    /// Log the call, apply quota and injected failures, then wait out the latency.
    async fn begin(&self, op: &'static str, target: Option<&str>) -> Result<()> {
        let now = self.inner.clock.now();
        let (outcome, latency) = {
            let mut state = self.state();
            state.calls.push(AdapterCall {
                op,
                target: target.map(str::to_string),
                at: now,
            });
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);

            let outcome = consume_quota(&mut state, now)
                .and_then(|()| self.injected(&mut state, op, target));
            (outcome, state.latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.state().in_flight -= 1;
        outcome
    }

    fn injected(&self, state: &mut State, op: &str, target: Option<&str>) -> Result<()> {
        let reset_at = state.reading.map(|r| r.reset_at);
        if op == "authenticate" {
            return match state.auth_failure {
                Some(kind) => Err(kind.to_error("authenticate", reset_at)),
                None => Ok(()),
            };
        }
        let Some(key) = target else {
            return Ok(());
        };
        let Some(injected) = state.failures.get_mut(key) else {
            return Ok(());
        };
        match &mut injected.remaining {
            Some(0) => Ok(()),
            Some(n) => {
                *n -= 1;
                Err(injected.kind.to_error(key, reset_at))
            }
            None => Err(injected.kind.to_error(key, reset_at)),
        }
    }
}

fn consume_quota(state: &mut State, now: DateTime<Utc>) -> Result<()> {
    let Some(quota) = state.quota.as_mut() else {
        return Ok(());
    };
    while now >= quota.reset_at {
        quota.remaining = quota.limit;
        quota.reset_at += quota.window;
    }
    let result = if quota.remaining == 0 {
        Err(Error::RateLimited {
            message: "quota exhausted".to_string(),
            reset_at: Some(quota.reset_at),
        })
    } else {
        quota.remaining -= 1;
        Ok(())
    };
    state.reading = Some(RateLimitInfo {
        remaining: quota.remaining,
        limit: Some(quota.limit),
        reset_at: quota.reset_at,
    });
    result
}

fn parse_id(remote_id: &str) -> Option<u64> {
    remote_id.trim().parse().ok()
}

fn touch(item: &mut RemoteItem, now: DateTime<Utc>) {
    let floor = item
        .updated_at
        .map_or(now, |prev| prev + TimeDelta::milliseconds(1));
    item.updated_at = Some(now.max(floor));
    item.native_status = item.fields.status.as_str().to_string();
}

fn insert_new(state: &mut State, fields: ItemFields, now: DateTime<Utc>) -> RemoteItem {
    let id = state.next_id;
    state.next_id += 1;
    let item = RemoteItem {
        remote_id: id.to_string(),
        native_status: fields.status.as_str().to_string(),
        fields: fields.normalized(),
        url: Some(format!("memory://items/{id}")),
        created_at: Some(now),
        updated_at: Some(now),
    };
    state.items.insert(id, item.clone());
    item
}

impl RemoteAdapter for MemoryAdapter {
    fn kind(&self) -> RemoteKind {
        self.inner.kind
    }

    async fn authenticate(&self) -> Result<()> {
        self.begin("authenticate", None).await
    }

    async fn get_item(&self, remote_id: &str) -> Result<RemoteItem> {
        self.begin("get_item", Some(remote_id)).await?;
        self.item(remote_id).ok_or_else(|| Error::RemoteNotFound {
            id: remote_id.to_string(),
        })
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<RemoteItem>> {
        self.begin("list_items", None).await?;
        let mut out: Vec<RemoteItem> = self
            .state()
            .items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn create_item(&self, fields: &ItemFields) -> Result<RemoteItem> {
        if fields.title.trim().is_empty() {
            self.begin("create_item", None).await?;
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        self.begin("create_item", Some(&fields.title)).await?;
        let now = self.inner.clock.now();
        let mut state = self.state();
        Ok(insert_new(&mut state, fields.clone(), now))
    }

    async fn update_item(&self, remote_id: &str, fields: &ItemFields) -> Result<RemoteItem> {
        self.begin("update_item", Some(remote_id)).await?;
        let now = self.inner.clock.now();
        let mut state = self.state();
        let item = parse_id(remote_id)
            .and_then(|id| state.items.get_mut(&id))
            .ok_or_else(|| Error::RemoteNotFound {
                id: remote_id.to_string(),
            })?;
        item.fields = fields.normalized();
        touch(item, now);
        Ok(item.clone())
    }

    async fn add_comment(&self, remote_id: &str, text: &str) -> Result<()> {
        self.begin("add_comment", Some(remote_id)).await?;
        let mut state = self.state();
        let exists = parse_id(remote_id).is_some_and(|id| state.items.contains_key(&id));
        if !exists {
            return Err(Error::RemoteNotFound {
                id: remote_id.to_string(),
            });
        }
        state.comments.push((remote_id.to_string(), text.to_string()));
        Ok(())
    }

    fn check_rate_limit(&self) -> Option<RateLimitInfo> {
        self.state().reading
    }
}
