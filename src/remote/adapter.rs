//! Remote adapter trait.
//!
//! Defines the interface every remote tracker backend implements. Methods
//! are async for the HTTP backends; `BoxedAdapter` provides runtime
//! selection of the backend behind the same trait.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{ItemFields, ItemFilter, RemoteItem, RemoteKind};

/// Quota reading from the most recent response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub remaining: u32,
    pub limit: Option<u32>,
    pub reset_at: DateTime<Utc>,
}

/// Trait for remote tracker backends.
///
/// Implemented by the GitHub and Azure DevOps adapters and by the
/// in-memory adapter used in tests.
pub trait RemoteAdapter: Send + Sync {
    /// Which tracker this adapter talks to.
    fn kind(&self) -> RemoteKind;

    /// Validate the configured credentials.
    fn authenticate(&self) -> impl Future<Output = Result<()>> + Send;

    fn get_item(&self, remote_id: &str) -> impl Future<Output = Result<RemoteItem>> + Send;

    fn list_items(&self, filter: &ItemFilter)
    -> impl Future<Output = Result<Vec<RemoteItem>>> + Send;

    fn create_item(&self, fields: &ItemFields) -> impl Future<Output = Result<RemoteItem>> + Send;

    fn update_item(
        &self,
        remote_id: &str,
        fields: &ItemFields,
    ) -> impl Future<Output = Result<RemoteItem>> + Send;

    fn add_comment(&self, remote_id: &str, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Quota as of the last response. Never makes a network call.
    fn check_rate_limit(&self) -> Option<RateLimitInfo>;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of `RemoteAdapter` for boxing.
trait RemoteAdapterBoxed: Send + Sync {
    fn kind(&self) -> RemoteKind;
    fn authenticate_boxed(&self) -> BoxFuture<'_, Result<()>>;
    fn get_item_boxed(&self, remote_id: &str) -> BoxFuture<'_, Result<RemoteItem>>;
    fn list_items_boxed(&self, filter: &ItemFilter) -> BoxFuture<'_, Result<Vec<RemoteItem>>>;
    fn create_item_boxed(&self, fields: &ItemFields) -> BoxFuture<'_, Result<RemoteItem>>;
    fn update_item_boxed(
        &self,
        remote_id: &str,
        fields: &ItemFields,
    ) -> BoxFuture<'_, Result<RemoteItem>>;
    fn add_comment_boxed(&self, remote_id: &str, text: &str) -> BoxFuture<'_, Result<()>>;
    fn check_rate_limit(&self) -> Option<RateLimitInfo>;
}

/// Boxed adapter for dynamic dispatch.
///
/// Since the trait has async methods with `impl Future`, this wrapper
/// provides runtime polymorphism. It implements `RemoteAdapter` itself,
/// so the orchestrator never needs to know which backend it drives.
pub struct BoxedAdapter {
    inner: Box<dyn RemoteAdapterBoxed>,
}

impl std::fmt::Debug for BoxedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedAdapter")
            .field("kind", &self.inner.kind())
            .finish()
    }
}

impl BoxedAdapter {
    pub fn new<A: RemoteAdapter + 'static>(adapter: A) -> Self {
        Self {
            inner: Box::new(Wrapper(adapter)),
        }
    }
}

impl RemoteAdapter for BoxedAdapter {
    fn kind(&self) -> RemoteKind {
        self.inner.kind()
    }

    async fn authenticate(&self) -> Result<()> {
        self.inner.authenticate_boxed().await
    }

    async fn get_item(&self, remote_id: &str) -> Result<RemoteItem> {
        self.inner.get_item_boxed(remote_id).await
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<RemoteItem>> {
        self.inner.list_items_boxed(filter).await
    }

    async fn create_item(&self, fields: &ItemFields) -> Result<RemoteItem> {
        self.inner.create_item_boxed(fields).await
    }

    async fn update_item(&self, remote_id: &str, fields: &ItemFields) -> Result<RemoteItem> {
        self.inner.update_item_boxed(remote_id, fields).await
    }

    async fn add_comment(&self, remote_id: &str, text: &str) -> Result<()> {
        self.inner.add_comment_boxed(remote_id, text).await
    }

    fn check_rate_limit(&self) -> Option<RateLimitInfo> {
        self.inner.check_rate_limit()
    }
}

struct Wrapper<A: RemoteAdapter + 'static>(A);

impl<A: RemoteAdapter + 'static> RemoteAdapterBoxed for Wrapper<A> {
    fn kind(&self) -> RemoteKind {
        self.0.kind()
    }

    fn authenticate_boxed(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.0.authenticate())
    }

    // Arguments are copied so the boxed future only borrows `self`.
    fn get_item_boxed(&self, remote_id: &str) -> BoxFuture<'_, Result<RemoteItem>> {
        let remote_id = remote_id.to_string();
        Box::pin(async move { self.0.get_item(&remote_id).await })
    }

    fn list_items_boxed(&self, filter: &ItemFilter) -> BoxFuture<'_, Result<Vec<RemoteItem>>> {
        let filter = filter.clone();
        Box::pin(async move { self.0.list_items(&filter).await })
    }

    fn create_item_boxed(&self, fields: &ItemFields) -> BoxFuture<'_, Result<RemoteItem>> {
        let fields = fields.clone();
        Box::pin(async move { self.0.create_item(&fields).await })
    }

    fn update_item_boxed(
        &self,
        remote_id: &str,
        fields: &ItemFields,
    ) -> BoxFuture<'_, Result<RemoteItem>> {
        let remote_id = remote_id.to_string();
        let fields = fields.clone();
        Box::pin(async move { self.0.update_item(&remote_id, &fields).await })
    }

    fn add_comment_boxed(&self, remote_id: &str, text: &str) -> BoxFuture<'_, Result<()>> {
        let remote_id = remote_id.to_string();
        let text = text.to_string();
        Box::pin(async move { self.0.add_comment(&remote_id, &text).await })
    }

    fn check_rate_limit(&self) -> Option<RateLimitInfo> {
        self.0.check_rate_limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryAdapter;

    #[tokio::test]
    async fn test_boxed_adapter_delegates() {
        let fake = MemoryAdapter::new(RemoteKind::AzureDevops);
        let boxed = BoxedAdapter::new(fake.clone());

        assert_eq!(boxed.kind(), RemoteKind::AzureDevops);
        boxed.authenticate().await.unwrap();

        let created = boxed
            .create_item(&ItemFields { title: "Boxed".into(), ..ItemFields::default() })
            .await
            .unwrap();
        let fetched = boxed.get_item(&created.remote_id).await.unwrap();
        assert_eq!(fetched.fields.title, "Boxed");
        assert_eq!(fake.calls().len(), 3);
    }
}
