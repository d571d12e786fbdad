use async_trait::async_trait;

use crate::Result;
use crate::api::peripheral::PeripheralManager;
use crate::host::central_actor::ManagerCommand;
use crate::host::central_manager::Central;

#[async_trait]
impl PeripheralManager for Central {
    async fn is_advertising(&self) -> Result<bool> {
        self.request(|responder| ManagerCommand::IsAdvertising { responder })
            .await
    }

    async fn start_advertising(&self, payload: &[u8]) -> Result<bool> {
        self.request(|responder| ManagerCommand::StartAdvertising {
            payload: payload.to_vec(),
            responder,
        })
        .await
    }

    async fn stop_advertising(&self) -> Result<bool> {
        self.request(|responder| ManagerCommand::StopAdvertising { responder })
            .await
    }
}
