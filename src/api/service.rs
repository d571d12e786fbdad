use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::characteristic::Characteristic;

#[derive(Debug, Ord, Eq, PartialEq, PartialOrd, Clone, Serialize, Deserialize)]
pub struct Service {
    pub uuid: Uuid,
    pub primary: bool,
    pub included_services: Vec<Service>,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(uuid: Uuid, primary: bool) -> Self {
        Service {
            uuid,
            primary,
            included_services: Vec::new(),
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn with_included_service(mut self, service: Service) -> Self {
        self.included_services.push(service);
        self
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }

    pub fn included_service(&self, uuid: Uuid) -> Option<&Service> {
        self.included_services.iter().find(|s| s.uuid == uuid)
    }
}
