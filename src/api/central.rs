use std::fmt::{self, Display, Formatter};

use async_trait::async_trait;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;
use crate::api::central_event::{CentralState, ConnectionState};
use crate::api::characteristic::CharacteristicWriteType;
use crate::api::service::Service;

/// Application-facing surface of the bridge. Every call returns once the request has been
/// validated and handed to the radio; completions arrive later as
/// [`CentralEvent`](crate::api::central_event::CentralEvent)s.
#[async_trait]
pub trait CentralManager: Send + Sync {
    /// The only query that does not require an adapter.
    async fn is_available(&self) -> Result<bool>;

    async fn adapter_state(&self) -> Result<CentralState>;

    async fn is_on(&self) -> Result<bool>;

    async fn enable_adapter(&self) -> Result<bool>;

    async fn disable_adapter(&self) -> Result<bool>;

    /// Threshold for diagnostic `Log` events forwarded to the application.
    async fn set_log_level(&self, level: LevelFilter) -> Result<()>;

    async fn start_scan(&self, settings: ScanSettings) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    async fn peripheral(&self, id: &PeripheralId) -> Result<PeripheralInfo>;

    async fn connected_peripherals(&self) -> Result<Vec<PeripheralInfo>>;

    async fn peripheral_state(&self, id: &PeripheralId) -> Result<ConnectionState>;

    async fn connect(&self, id: &PeripheralId, auto_reconnect: bool) -> Result<()>;

    /// Returns `false` when no session existed for `id`.
    async fn disconnect(&self, id: &PeripheralId) -> Result<bool>;

    /// Returns whether any session existed.
    async fn disconnect_all(&self) -> Result<bool>;

    async fn discover_services(&self, id: &PeripheralId) -> Result<()>;

    async fn services(&self, id: &PeripheralId) -> Result<Vec<Service>>;

    async fn read_characteristic(&self, request: &AttributeRequest) -> Result<()>;

    async fn write_characteristic(
        &self,
        request: &AttributeRequest,
        value: &[u8],
        write_type: CharacteristicWriteType,
    ) -> Result<()>;

    async fn read_descriptor(&self, request: &AttributeRequest) -> Result<()>;

    async fn write_descriptor(&self, request: &AttributeRequest, value: &[u8]) -> Result<()>;

    // enable or disable notifications/indications through the CCCD
    async fn set_notification(&self, request: &AttributeRequest, enable: bool) -> Result<()>;

    async fn mtu(&self, id: &PeripheralId) -> Result<u16>;

    async fn request_mtu(&self, id: &PeripheralId, mtu: u16) -> Result<()>;
}

/// Declarative scan filter. Every entry becomes its own platform filter, so a device matching
/// any one of them is reported.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScanFilter {
    pub services: Vec<Uuid>,
    pub names: Vec<String>,
    pub addresses: Vec<PeripheralId>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub filter: ScanFilter,
    pub allow_duplicates: bool,
    /// Platform scan mode, passed through untouched.
    pub scan_mode: i32,
}

/// Hardware address of a remote device.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PeripheralId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeripheralId {
    fn from(address: String) -> Self {
        Self(address)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum DeviceKind {
    #[default]
    Unknown = 0,
    Classic = 1,
    Le = 2,
    Dual = 3,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PeripheralInfo {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub kind: DeviceKind,
}

impl PeripheralInfo {
    pub fn new(id: impl Into<PeripheralId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: DeviceKind::Le,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Identifies one attribute on one device. Completion events echo the request that caused
/// them.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct AttributeRequest {
    pub peripheral: PeripheralId,
    pub service: Uuid,
    pub secondary_service: Option<Uuid>,
    pub characteristic: Uuid,
    pub descriptor: Option<Uuid>,
}

impl AttributeRequest {
    pub fn new(peripheral: impl Into<PeripheralId>, service: Uuid, characteristic: Uuid) -> Self {
        Self {
            peripheral: peripheral.into(),
            service,
            secondary_service: None,
            characteristic,
            descriptor: None,
        }
    }

    pub fn with_secondary_service(mut self, secondary_service: Uuid) -> Self {
        self.secondary_service = Some(secondary_service);
        self
    }

    pub fn with_descriptor(mut self, descriptor: Uuid) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// Builds a request from canonical uuid strings. Empty secondary service or descriptor
    /// strings mean "absent".
    pub fn parse(
        peripheral: &str,
        service: &str,
        secondary_service: &str,
        characteristic: &str,
        descriptor: &str,
    ) -> Result<Self> {
        Ok(Self {
            peripheral: PeripheralId::from(peripheral),
            service: Uuid::parse_str(service)?,
            secondary_service: parse_optional(secondary_service)?,
            characteristic: Uuid::parse_str(characteristic)?,
            descriptor: parse_optional(descriptor)?,
        })
    }
}

fn parse_optional(value: &str) -> Result<Option<Uuid>> {
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(Uuid::parse_str(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn parse_treats_empty_strings_as_absent() {
        let request = AttributeRequest::parse(
            "AA:BB:CC:DD:EE:FF",
            "0000180d-0000-1000-8000-00805f9b34fb",
            "",
            "00002a37-0000-1000-8000-00805f9b34fb",
            "",
        )
        .unwrap();

        assert_eq!(request.peripheral.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(request.secondary_service, None);
        assert_eq!(request.descriptor, None);
    }

    #[test]
    fn parse_rejects_malformed_uuid() {
        let result = AttributeRequest::parse("AA:BB:CC:DD:EE:FF", "not-a-uuid", "", "", "");
        assert!(matches!(result, Err(Error::InvalidUuid(_))));
    }
}
