//! Lookup over a discovered attribute tree. Nothing here mutates or triggers discovery.

use thiserror::Error;
use uuid::Uuid;

use crate::api::central::{AttributeRequest, PeripheralId};
use crate::api::characteristic::Characteristic;
use crate::api::descriptor::Descriptor;
use crate::api::service::Service;
use crate::platform::AttributeAddress;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("service {0} not found, have services been discovered?")]
    ServiceNotFound(Uuid),
    #[error("secondary service {0} not found")]
    SecondaryServiceNotFound(Uuid),
    #[error("characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },
    #[error("descriptor {descriptor} not found on characteristic {characteristic}")]
    DescriptorNotFound { characteristic: Uuid, descriptor: Uuid },
}

/// Snapshot produced by one service discovery. Shared behind an `Arc` and replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeTree {
    services: Vec<Service>,
}

impl AttributeTree {
    pub fn new(services: Vec<Service>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    /// Scope the characteristic lives in: the secondary service when one was named.
    pub service: &'a Service,
    pub characteristic: &'a Characteristic,
    pub descriptor: Option<&'a Descriptor>,
}

impl Resolved<'_> {
    pub fn address(&self) -> AttributeAddress {
        AttributeAddress {
            service: self.service.uuid,
            characteristic: self.characteristic.uuid,
            descriptor: self.descriptor.map(|descriptor| descriptor.uuid),
        }
    }
}

pub fn resolve(
    tree: &AttributeTree,
    service: Uuid,
    secondary_service: Option<Uuid>,
    characteristic: Uuid,
    descriptor: Option<Uuid>,
) -> Result<Resolved<'_>, ResolveError> {
    let primary = tree
        .services
        .iter()
        .find(|s| s.uuid == service)
        .ok_or(ResolveError::ServiceNotFound(service))?;

    let scope = match secondary_service {
        Some(secondary) => primary
            .included_service(secondary)
            .ok_or(ResolveError::SecondaryServiceNotFound(secondary))?,
        None => primary,
    };

    let found = scope
        .characteristic(characteristic)
        .ok_or(ResolveError::CharacteristicNotFound {
            service: scope.uuid,
            characteristic,
        })?;

    let descriptor = match descriptor {
        Some(uuid) => Some(
            found
                .descriptor(uuid)
                .ok_or(ResolveError::DescriptorNotFound {
                    characteristic,
                    descriptor: uuid,
                })?,
        ),
        None => None,
    };

    Ok(Resolved {
        service: scope,
        characteristic: found,
        descriptor,
    })
}

pub fn resolve_request<'a>(
    tree: &'a AttributeTree,
    request: &AttributeRequest,
) -> Result<Resolved<'a>, ResolveError> {
    resolve(
        tree,
        request.service,
        request.secondary_service,
        request.characteristic,
        request.descriptor,
    )
}

/// Finds where a service reported by the platform sits in the tree: `(primary, None)` for a
/// top-level service or `(primary, Some(secondary))` for an included one.
pub fn locate_owner(tree: &AttributeTree, service: Uuid) -> Option<(Uuid, Option<Uuid>)> {
    if tree.services.iter().any(|s| s.uuid == service) {
        return Some((service, None));
    }
    tree.services
        .iter()
        .find(|s| s.included_service(service).is_some())
        .map(|primary| (primary.uuid, Some(service)))
}

/// Rebuilds request fields for a callback nobody asked for. Falls back to treating the reported
/// service as top-level when the tree does not know it.
pub fn request_for(
    tree: &AttributeTree,
    peripheral: &PeripheralId,
    address: &AttributeAddress,
) -> AttributeRequest {
    let (service, secondary_service) =
        locate_owner(tree, address.service).unwrap_or((address.service, None));
    AttributeRequest {
        peripheral: peripheral.clone(),
        service,
        secondary_service,
        characteristic: address.characteristic,
        descriptor: address.descriptor,
    }
}
