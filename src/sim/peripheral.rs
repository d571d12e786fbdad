use std::collections::HashMap;

use uuid::Uuid;

use crate::api::central::{PeripheralId, PeripheralInfo};
use crate::api::central_event::AdvertisementData;
use crate::api::service::Service;
use crate::platform::AttributeAddress;

/// Scripted remote device: what it advertises and the GATT table it serves.
#[derive(Debug, Clone)]
pub struct VirtualPeripheral {
    pub info: PeripheralInfo,
    pub advertisement: AdvertisementData,
    pub rssi: i16,
    pub services: Vec<Service>,
    pub(crate) values: HashMap<AttributeAddress, Vec<u8>>,
}

impl VirtualPeripheral {
    pub fn new(id: impl Into<PeripheralId>) -> Self {
        Self {
            info: PeripheralInfo::new(id),
            advertisement: AdvertisementData {
                connectable: true,
                ..AdvertisementData::default()
            },
            rssi: -60,
            services: Vec::new(),
            values: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.info.name = Some(name.to_string());
        self.advertisement.local_name = Some(name.to_string());
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// Also lists the service uuid in the advertisement.
    pub fn with_service(mut self, service: Service) -> Self {
        self.advertisement.service_uuids.push(service.uuid);
        self.services.push(service);
        self
    }

    pub fn with_manufacturer_data(mut self, company: u16, data: &[u8]) -> Self {
        self.advertisement
            .manufacturer_data
            .insert(company, data.to_vec());
        self
    }

    /// Value returned when `address` is read.
    pub fn with_value(mut self, address: AttributeAddress, value: &[u8]) -> Self {
        self.values.insert(address, value.to_vec());
        self
    }

    pub fn id(&self) -> &PeripheralId {
        &self.info.id
    }

    pub fn value(&self, address: &AttributeAddress) -> Option<&[u8]> {
        self.values.get(address).map(Vec::as_slice)
    }

    pub(crate) fn has_attribute(&self, address: &AttributeAddress) -> bool {
        let scope = self.services.iter().find_map(|service| {
            if service.uuid == address.service {
                Some(service)
            } else {
                service.included_service(address.service)
            }
        });
        let Some(characteristic) = scope.and_then(|s| s.characteristic(address.characteristic))
        else {
            return false;
        };
        match address.descriptor {
            Some(descriptor) => characteristic.descriptor(descriptor).is_some(),
            None => true,
        }
    }

    pub(crate) fn advertises_service(&self, uuid: Uuid) -> bool {
        self.advertisement.service_uuids.contains(&uuid)
    }
}
