use async_trait::async_trait;

use crate::Result;

/// Broadcast side of the bridge. Only a fixed non-connectable envelope is supported; the
/// payload is opaque.
#[async_trait]
pub trait PeripheralManager: Send + Sync {
    async fn is_advertising(&self) -> Result<bool>;

    /// Returns `false` when the adapter has no advertiser available.
    async fn start_advertising(&self, payload: &[u8]) -> Result<bool>;

    async fn stop_advertising(&self) -> Result<bool>;
}
