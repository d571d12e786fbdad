//! One outstanding hardware operation per session, matched to the callback that completes it.
//!
//! Every operation follows the same order: resolve the target, check the slot, make the
//! hardware call, record. Nothing is recorded when any step fails, so an error return always
//! leaves the session exactly as it was.

use std::sync::Arc;
use std::time::Duration;

use log::{Level, debug};
use tokio::time::Instant;

use crate::api::central::{AttributeRequest, PeripheralId};
use crate::api::central_event::{CentralEvent, GattOperation};
use crate::api::characteristic::{CharacteristicProperty, CharacteristicWriteType};
use crate::api::descriptor::{CLIENT_CHARACTERISTIC_CONFIGURATION, Descriptor, SubscriptionState};
use crate::api::service::Service;
use crate::host::event_bus::EventBus;
use crate::host::resolver::{self, AttributeTree, ResolveError};
use crate::host::session::{Session, SessionRegistry};
use crate::platform::{AttributeAddress, GattStatus};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingRequest {
    pub(crate) operation: GattOperation,
    /// Fields echoed back in the completion event. `None` for MTU requests.
    pub(crate) request: Option<AttributeRequest>,
    pub(crate) address: Option<AttributeAddress>,
    /// Bytes written, kept for descriptor writes.
    pub(crate) value: Option<Vec<u8>>,
    pub(crate) issued_at: Instant,
}

impl PendingRequest {
    fn new(
        operation: GattOperation,
        request: Option<AttributeRequest>,
        address: Option<AttributeAddress>,
        value: Option<Vec<u8>>,
    ) -> Self {
        Self {
            operation,
            request,
            address,
            value,
            issued_at: Instant::now(),
        }
    }
}

fn ensure_idle(session: &Session) -> Result<()> {
    match &session.pending {
        Some(pending) => {
            debug!(
                "{} busy with {:?}, rejecting new request",
                session.id, pending.operation
            );
            Err(Error::OperationInProgress(session.id.clone()))
        }
        None => Ok(()),
    }
}

fn characteristic_address(tree: &AttributeTree, request: &AttributeRequest) -> Result<AttributeAddress> {
    let resolved = resolver::resolve(
        tree,
        request.service,
        request.secondary_service,
        request.characteristic,
        None,
    )?;
    Ok(resolved.address())
}

fn descriptor_address(tree: &AttributeTree, request: &AttributeRequest) -> Result<AttributeAddress> {
    let resolved = resolver::resolve_request(tree, request)?;
    if resolved.descriptor.is_none() {
        // a descriptor operation without a descriptor id can never match anything
        return Err(ResolveError::DescriptorNotFound {
            characteristic: request.characteristic,
            descriptor: uuid::Uuid::nil(),
        }
        .into());
    }
    Ok(resolved.address())
}

pub(crate) fn discover_services(session: &mut Session) -> Result<()> {
    if !session.link.discover_services() {
        return Err(Error::HardwareRejected("discover_services"));
    }
    Ok(())
}

pub(crate) fn read_characteristic(session: &mut Session, request: &AttributeRequest) -> Result<()> {
    let address = characteristic_address(&session.tree, request)?;
    ensure_idle(session)?;

    if !session.link.read_characteristic(&address) {
        return Err(Error::HardwareRejected("read_characteristic"));
    }
    session.pending = Some(PendingRequest::new(
        GattOperation::ReadCharacteristic,
        Some(request.clone()),
        Some(address),
        None,
    ));
    Ok(())
}

/// Writes without response never occupy the slot: the platform gives no completion for them,
/// so success is reported as soon as the write is accepted.
pub(crate) fn write_characteristic(
    session: &mut Session,
    bus: &mut EventBus,
    request: &AttributeRequest,
    value: &[u8],
    write_type: CharacteristicWriteType,
) -> Result<()> {
    let address = characteristic_address(&session.tree, request)?;
    ensure_idle(session)?;

    if !session.link.write_characteristic(&address, value, write_type) {
        return Err(Error::HardwareRejected("write_characteristic"));
    }

    match write_type {
        CharacteristicWriteType::WriteWithResponse => {
            session.pending = Some(PendingRequest::new(
                GattOperation::WriteCharacteristic,
                Some(request.clone()),
                Some(address),
                Some(value.to_vec()),
            ));
        }
        CharacteristicWriteType::WriteWithoutResponse => {
            bus.emit(CentralEvent::CharacteristicWritten {
                request: request.clone(),
                success: true,
            });
        }
    }
    Ok(())
}

pub(crate) fn read_descriptor(session: &mut Session, request: &AttributeRequest) -> Result<()> {
    let address = descriptor_address(&session.tree, request)?;
    ensure_idle(session)?;

    if !session.link.read_descriptor(&address) {
        return Err(Error::HardwareRejected("read_descriptor"));
    }
    session.pending = Some(PendingRequest::new(
        GattOperation::ReadDescriptor,
        Some(request.clone()),
        Some(address),
        None,
    ));
    Ok(())
}

pub(crate) fn write_descriptor(
    session: &mut Session,
    request: &AttributeRequest,
    value: &[u8],
) -> Result<()> {
    let address = descriptor_address(&session.tree, request)?;
    ensure_idle(session)?;

    if !session.link.write_descriptor(&address, value) {
        return Err(Error::HardwareRejected("write_descriptor"));
    }
    session.pending = Some(PendingRequest::new(
        GattOperation::WriteDescriptor,
        Some(request.clone()),
        Some(address),
        Some(value.to_vec()),
    ));
    Ok(())
}

pub(crate) fn set_notification(
    session: &mut Session,
    request: &AttributeRequest,
    enable: bool,
) -> Result<()> {
    let (address, value) = {
        let resolved = resolver::resolve(
            &session.tree,
            request.service,
            request.secondary_service,
            request.characteristic,
            None,
        )?;
        let characteristic = resolved.characteristic;

        if !characteristic
            .descriptors
            .iter()
            .any(Descriptor::is_client_configuration)
        {
            return Err(ResolveError::DescriptorNotFound {
                characteristic: characteristic.uuid,
                descriptor: CLIENT_CHARACTERISTIC_CONFIGURATION,
            }
            .into());
        }

        let subscription = if !enable {
            SubscriptionState::None
        } else if characteristic.has_property(CharacteristicProperty::Indicate) {
            SubscriptionState::Indicate
        } else if characteristic.has_property(CharacteristicProperty::Notify) {
            SubscriptionState::Notify
        } else {
            return Err(Error::NotifySupportNotAvailable(characteristic.uuid));
        };

        (
            AttributeAddress::descriptor(
                resolved.service.uuid,
                characteristic.uuid,
                CLIENT_CHARACTERISTIC_CONFIGURATION,
            ),
            subscription.cccd_value(),
        )
    };
    ensure_idle(session)?;

    let characteristic = AttributeAddress::characteristic(address.service, address.characteristic);
    if !session
        .link
        .set_characteristic_notification(&characteristic, enable)
    {
        return Err(Error::HardwareRejected("set_characteristic_notification"));
    }
    if !session.link.write_descriptor(&address, &value) {
        return Err(Error::HardwareRejected("write_descriptor"));
    }

    let mut echoed = request.clone();
    echoed.descriptor = Some(CLIENT_CHARACTERISTIC_CONFIGURATION);
    session.pending = Some(PendingRequest::new(
        GattOperation::SetNotification,
        Some(echoed),
        Some(address),
        Some(value.to_vec()),
    ));
    Ok(())
}

pub(crate) fn request_mtu(session: &mut Session, mtu: u16) -> Result<()> {
    ensure_idle(session)?;
    if !session.link.request_mtu(mtu) {
        return Err(Error::HardwareRejected("request_mtu"));
    }
    session.pending = Some(PendingRequest::new(
        GattOperation::RequestMtu,
        None,
        None,
        None,
    ));
    Ok(())
}

/// Clears the slot when it holds one of `operations` on `address`. Returns the request fields
/// to report and the cleared request, or rebuilt fields when the callback is independent.
fn settle(
    session: Option<&mut Session>,
    peripheral: &PeripheralId,
    operations: &[GattOperation],
    address: &AttributeAddress,
) -> (AttributeRequest, Option<PendingRequest>) {
    let Some(session) = session else {
        return (
            resolver::request_for(&AttributeTree::default(), peripheral, address),
            None,
        );
    };

    let matched = session.pending.as_ref().is_some_and(|pending| {
        operations.contains(&pending.operation) && pending.address.as_ref() == Some(address)
    });
    if matched {
        if let Some(pending) = session.pending.take() {
            let request = pending
                .request
                .clone()
                .unwrap_or_else(|| resolver::request_for(&session.tree, peripheral, address));
            return (request, Some(pending));
        }
    }

    debug!(
        "{:?} on {} matches no pending request, reporting as independent",
        address, peripheral
    );
    (resolver::request_for(&session.tree, peripheral, address), None)
}

pub(crate) fn on_services_discovered(
    registry: &mut SessionRegistry,
    bus: &mut EventBus,
    peripheral: PeripheralId,
    services: Vec<Service>,
    status: GattStatus,
) {
    let success = status.is_success();
    if success {
        if let Some(session) = registry.get_mut(&peripheral) {
            session.tree = Arc::new(AttributeTree::new(services.clone()));
        }
    }
    bus.emit(CentralEvent::ServicesDiscovered {
        peripheral,
        services,
        success,
    });
}

pub(crate) fn on_characteristic_read(
    registry: &mut SessionRegistry,
    bus: &mut EventBus,
    peripheral: PeripheralId,
    address: AttributeAddress,
    value: Vec<u8>,
    status: GattStatus,
) {
    let (request, _) = settle(
        registry.get_mut(&peripheral),
        &peripheral,
        &[GattOperation::ReadCharacteristic],
        &address,
    );
    bus.emit(CentralEvent::CharacteristicRead {
        request,
        value,
        success: status.is_success(),
    });
}

pub(crate) fn on_characteristic_written(
    registry: &mut SessionRegistry,
    bus: &mut EventBus,
    peripheral: PeripheralId,
    address: AttributeAddress,
    status: GattStatus,
) {
    let (request, _) = settle(
        registry.get_mut(&peripheral),
        &peripheral,
        &[GattOperation::WriteCharacteristic],
        &address,
    );
    bus.emit(CentralEvent::CharacteristicWritten {
        request,
        success: status.is_success(),
    });
}

/// Notifications and indications are never completions.
pub(crate) fn on_characteristic_changed(
    registry: &mut SessionRegistry,
    bus: &mut EventBus,
    peripheral: PeripheralId,
    address: AttributeAddress,
    value: Vec<u8>,
) {
    let request = match registry.get_mut(&peripheral) {
        Some(session) => resolver::request_for(&session.tree, &peripheral, &address),
        None => resolver::request_for(&AttributeTree::default(), &peripheral, &address),
    };
    bus.emit(CentralEvent::CharacteristicChanged { request, value });
}

pub(crate) fn on_descriptor_read(
    registry: &mut SessionRegistry,
    bus: &mut EventBus,
    peripheral: PeripheralId,
    address: AttributeAddress,
    value: Vec<u8>,
    status: GattStatus,
) {
    let (request, _) = settle(
        registry.get_mut(&peripheral),
        &peripheral,
        &[GattOperation::ReadDescriptor],
        &address,
    );
    bus.emit(CentralEvent::DescriptorRead {
        request,
        value,
        success: status.is_success(),
    });
}

/// A CCCD write is followed by a characteristic-level `NotificationStateChanged` whether it came
/// from `set_notification` or a raw descriptor write.
pub(crate) fn on_descriptor_written(
    registry: &mut SessionRegistry,
    bus: &mut EventBus,
    peripheral: PeripheralId,
    address: AttributeAddress,
    status: GattStatus,
) {
    let success = status.is_success();
    let (request, pending) = settle(
        registry.get_mut(&peripheral),
        &peripheral,
        &[GattOperation::WriteDescriptor, GattOperation::SetNotification],
        &address,
    );
    bus.emit(CentralEvent::DescriptorWritten {
        request: request.clone(),
        success,
    });

    if address.descriptor != Some(CLIENT_CHARACTERISTIC_CONFIGURATION) {
        return;
    }

    let written = pending
        .as_ref()
        .and_then(|pending| pending.value.as_deref())
        .map(SubscriptionState::from_cccd_value);
    let subscription = match registry.get_mut(&peripheral) {
        Some(session) => {
            if let (true, Some(written)) = (success, written) {
                session
                    .subscriptions
                    .insert((address.service, address.characteristic), written);
            }
            session.subscription(address.service, address.characteristic)
        }
        None => written.unwrap_or_default(),
    };

    let mut request = request;
    request.descriptor = None;
    bus.emit(CentralEvent::NotificationStateChanged {
        request,
        subscription,
        success,
    });
}

/// Reports the session's MTU after the callback; a failed negotiation leaves it unchanged.
pub(crate) fn on_mtu_changed(
    registry: &mut SessionRegistry,
    bus: &mut EventBus,
    peripheral: PeripheralId,
    mtu: u16,
    status: GattStatus,
) {
    let success = status.is_success();
    let mtu = match registry.get_mut(&peripheral) {
        Some(session) => {
            if session
                .pending
                .as_ref()
                .is_some_and(|pending| pending.operation == GattOperation::RequestMtu)
            {
                session.pending = None;
            }
            if success {
                session.mtu = mtu;
            }
            session.mtu
        }
        None => mtu,
    };
    bus.emit(CentralEvent::MtuChanged {
        peripheral,
        mtu,
        success,
    });
}

/// Clears every request older than `timeout` and reports it.
pub(crate) fn sweep_expired(
    registry: &mut SessionRegistry,
    bus: &mut EventBus,
    now: Instant,
    timeout: Duration,
) {
    for session in registry.sessions_mut() {
        let expired = session
            .pending
            .as_ref()
            .is_some_and(|pending| now.duration_since(pending.issued_at) >= timeout);
        if !expired {
            continue;
        }
        if let Some(pending) = session.pending.take() {
            bus.log(
                Level::Warn,
                format!(
                    "{:?} on {} got no answer within {:?}, clearing",
                    pending.operation, session.id, timeout
                ),
            );
            bus.emit(CentralEvent::RequestTimedOut {
                peripheral: session.id.clone(),
                operation: pending.operation,
                request: pending.request,
            });
        }
    }
}
