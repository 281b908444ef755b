/// Domain-data collaborator boundary
///
/// The costing tool's domain objects (windows, payments, settings) live
/// behind this trait. The auth core only ever asks it to cascade-remove
/// everything keyed by an account id when the account is deleted.
use crate::error::ApiResult;
use async_trait::async_trait;

#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Remove every domain record keyed by the account id. Returns the
    /// number of records removed.
    async fn purge_account_data(&self, account_id: &str) -> ApiResult<u64>;
}

/// Stand-in used until the domain service is wired up. Purges nothing
/// and says so.
pub struct DetachedDomainStore;

#[async_trait]
impl DomainStore for DetachedDomainStore {
    async fn purge_account_data(&self, account_id: &str) -> ApiResult<u64> {
        tracing::warn!(account_id, "no domain store wired, nothing purged");
        Ok(0)
    }
}
