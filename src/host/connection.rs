//! Link lifecycle. The adapter is authoritative: every reported state is accepted, odd edges
//! are only logged.

use log::{Level, debug, warn};

use crate::api::central::PeripheralId;
use crate::api::central_event::{CentralEvent, ConnectionState};
use crate::host::event_bus::EventBus;
use crate::host::session::SessionRegistry;
use crate::platform::GattStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) state: ConnectionState,
    /// Close and evict the handle whatever the reported state.
    pub(crate) release: bool,
}

pub(crate) fn transition(
    current: ConnectionState,
    status: GattStatus,
    reported: ConnectionState,
) -> Transition {
    if !is_expected(current, reported) {
        warn!("unexpected connection transition {:?} -> {:?}", current, reported);
    }
    Transition {
        state: reported,
        release: !status.is_success(),
    }
}

fn is_expected(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;
    from == to
        || matches!(
            (from, to),
            (Disconnected, Connecting)
                | (Disconnected, Connected)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Connected, Disconnected)
                | (Disconnecting, Disconnected)
        )
}

enum Cleanup {
    None,
    Release,
    LinkLost,
}

pub(crate) fn on_connection_state_changed(
    registry: &mut SessionRegistry,
    bus: &mut EventBus,
    peripheral: PeripheralId,
    status: GattStatus,
    state: ConnectionState,
) {
    debug!(
        "connection state for {}: {:?} (status {})",
        peripheral, state, status.0
    );

    let cleanup = match registry.get_mut(&peripheral) {
        None => {
            if state == ConnectionState::Disconnected || !status.is_success() {
                registry.release_detached(&peripheral);
            }
            Cleanup::None
        }
        Some(session) => {
            let next = transition(session.state, status, state);
            session.state = next.state;
            if next.release {
                Cleanup::Release
            } else if next.state == ConnectionState::Disconnected {
                if session.closing {
                    Cleanup::Release
                } else {
                    Cleanup::LinkLost
                }
            } else {
                Cleanup::None
            }
        }
    };

    match cleanup {
        Cleanup::Release => {
            if !status.is_success() {
                bus.log(
                    Level::Warn,
                    format!("connection to {} failed with status {}", peripheral, status.0),
                );
            }
            registry.release(&peripheral);
        }
        Cleanup::LinkLost => {
            if let Some(session) = registry.get_mut(&peripheral) {
                session.link_lost();
            }
        }
        Cleanup::None => {}
    }

    bus.emit(CentralEvent::ConnectionStateChanged { peripheral, state });
}

#[cfg(test)]
mod tests {
    use log::LevelFilter;
    use tokio::sync::mpsc;

    use super::*;
    use crate::platform::{CallbackSink, GattLink, MockBluetoothAdapter, MockGattLink};

    fn id() -> PeripheralId {
        PeripheralId::from("AA:BB:CC:DD:EE:FF")
    }

    fn bus() -> EventBus {
        let (tx, _rx) = mpsc::channel(8);
        EventBus::new(tx, LevelFilter::Info)
    }

    fn registry_with(link: MockGattLink) -> SessionRegistry {
        let mut adapter = MockBluetoothAdapter::new();
        adapter
            .expect_connect()
            .return_once(move |_, _, _| Some(Box::new(link) as Box<dyn GattLink>));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = SessionRegistry::new(20);
        registry
            .connect(&adapter, &id(), false, &CallbackSink::new(tx))
            .unwrap();
        registry
    }

    #[test]
    fn error_status_always_releases() {
        for reported in [ConnectionState::Connected, ConnectionState::Disconnected] {
            let next = transition(ConnectionState::Connecting, GattStatus(133), reported);
            assert!(next.release);
            assert_eq!(next.state, reported);
        }
        assert!(
            !transition(
                ConnectionState::Connecting,
                GattStatus::SUCCESS,
                ConnectionState::Connected
            )
            .release
        );
    }

    #[test]
    fn connected_then_link_loss_keeps_handle() {
        let mut link = MockGattLink::new();
        link.expect_close().never();
        let mut registry = registry_with(link);
        let mut bus = bus();

        on_connection_state_changed(
            &mut registry,
            &mut bus,
            id(),
            GattStatus::SUCCESS,
            ConnectionState::Connected,
        );
        on_connection_state_changed(
            &mut registry,
            &mut bus,
            id(),
            GattStatus::SUCCESS,
            ConnectionState::Disconnected,
        );

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup(&id()).unwrap().state,
            ConnectionState::Disconnected
        );
        assert_eq!(
            bus.drain(),
            vec![
                CentralEvent::ConnectionStateChanged {
                    peripheral: id(),
                    state: ConnectionState::Connected
                },
                CentralEvent::ConnectionStateChanged {
                    peripheral: id(),
                    state: ConnectionState::Disconnected
                },
            ]
        );
    }

    #[test]
    fn error_with_connected_state_closes_handle() {
        let mut link = MockGattLink::new();
        link.expect_close().times(1).return_const(());
        let mut registry = registry_with(link);
        let mut bus = bus();

        on_connection_state_changed(
            &mut registry,
            &mut bus,
            id(),
            GattStatus(8),
            ConnectionState::Connected,
        );

        assert_eq!(registry.len(), 0);
        let events = bus.drain();
        assert_eq!(
            events.last(),
            Some(&CentralEvent::ConnectionStateChanged {
                peripheral: id(),
                state: ConnectionState::Connected
            })
        );
    }

    #[test]
    fn closing_session_is_evicted_on_disconnected() {
        let mut link = MockGattLink::new();
        link.expect_close().times(1).return_const(());
        let mut registry = registry_with(link);
        registry.get_mut(&id()).unwrap().closing = true;

        on_connection_state_changed(
            &mut registry,
            &mut bus(),
            id(),
            GattStatus::SUCCESS,
            ConnectionState::Disconnected,
        );

        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn disconnected_without_session_still_emits() {
        let mut registry = SessionRegistry::new(20);
        let mut bus = bus();

        on_connection_state_changed(
            &mut registry,
            &mut bus,
            id(),
            GattStatus::SUCCESS,
            ConnectionState::Disconnected,
        );

        assert_eq!(bus.drain().len(), 1);
    }
}
