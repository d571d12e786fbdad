use std::collections::HashMap;
use std::sync::Arc;

use log::{Level, debug};
use uuid::Uuid;

use crate::api::central::PeripheralId;
use crate::api::central_event::ConnectionState;
use crate::api::descriptor::SubscriptionState;
use crate::host::correlator::PendingRequest;
use crate::host::event_bus::EventBus;
use crate::host::resolver::AttributeTree;
use crate::platform::{BluetoothAdapter, CallbackSink, GattLink};
use crate::{Error, Result};

/// Everything tracked for one remote device. Owns its connection handle exclusively.
pub(crate) struct Session {
    pub(crate) id: PeripheralId,
    pub(crate) link: Box<dyn GattLink>,
    pub(crate) state: ConnectionState,
    pub(crate) mtu: u16,
    /// Set once the application asked for teardown; the session goes away on the next
    /// `Disconnected` from the adapter.
    pub(crate) closing: bool,
    pub(crate) tree: Arc<AttributeTree>,
    pub(crate) pending: Option<PendingRequest>,
    /// Keyed by (owning service, characteristic).
    pub(crate) subscriptions: HashMap<(Uuid, Uuid), SubscriptionState>,
}

impl Session {
    fn new(id: PeripheralId, link: Box<dyn GattLink>, mtu: u16) -> Self {
        Self {
            id,
            link,
            state: ConnectionState::Connecting,
            mtu,
            closing: false,
            tree: Arc::new(AttributeTree::default()),
            pending: None,
            subscriptions: HashMap::new(),
        }
    }

    /// Link dropped without being asked to. The handle is kept for a later reconnect.
    pub(crate) fn link_lost(&mut self) {
        self.pending = None;
        self.subscriptions.clear();
    }

    pub(crate) fn subscription(&self, service: Uuid, characteristic: Uuid) -> SubscriptionState {
        self.subscriptions
            .get(&(service, characteristic))
            .copied()
            .unwrap_or_default()
    }
}

pub(crate) struct SessionRegistry {
    sessions: HashMap<PeripheralId, Session>,
    /// Handles taken out of their session by `disconnect_all`, waiting for the adapter to
    /// confirm the link is down before they are closed.
    detached: HashMap<PeripheralId, Box<dyn GattLink>>,
    default_mtu: u16,
}

impl SessionRegistry {
    pub(crate) fn new(default_mtu: u16) -> Self {
        Self {
            sessions: HashMap::new(),
            detached: HashMap::new(),
            default_mtu,
        }
    }

    pub(crate) fn connect(
        &mut self,
        adapter: &dyn BluetoothAdapter,
        id: &PeripheralId,
        auto_reconnect: bool,
        sink: &CallbackSink,
    ) -> Result<()> {
        if let Some(session) = self.sessions.get_mut(id) {
            if session.state == ConnectionState::Connected
                || adapter.connection_state(id) == ConnectionState::Connected
            {
                return Err(Error::AlreadyConnected(id.clone()));
            }
            debug!("reusing connection handle for {}", id);
            if !session.link.reconnect() {
                return Err(Error::ReconnectFailed(id.clone()));
            }
            session.closing = false;
            return Ok(());
        }

        self.release_detached(id);

        let link = adapter
            .connect(id, auto_reconnect, sink.clone())
            .ok_or(Error::HardwareRejected("connect"))?;
        debug!("registered session for {}", id);
        self.sessions
            .insert(id.clone(), Session::new(id.clone(), link, self.default_mtu));
        Ok(())
    }

    /// Returns `false` when no session exists for `id`.
    pub(crate) fn disconnect(&mut self, adapter: &dyn BluetoothAdapter, id: &PeripheralId) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };

        // no confirmation will ever arrive for a link that is already down
        if adapter.connection_state(id) == ConnectionState::Disconnected {
            session.link.disconnect();
            self.release(id);
            return true;
        }

        session.link.disconnect();
        session.closing = true;
        session.pending = None;
        true
    }

    pub(crate) fn disconnect_all(
        &mut self,
        adapter: &dyn BluetoothAdapter,
        bus: &mut EventBus,
    ) -> bool {
        let any = !self.sessions.is_empty();

        for (id, session) in self.sessions.drain() {
            let down = adapter.connection_state(&id) == ConnectionState::Disconnected;
            session.link.disconnect();
            if down {
                session.link.close();
            } else {
                self.detached.insert(id, session.link);
            }
        }

        for device in adapter.connected_devices() {
            if !self.detached.contains_key(&device.id) {
                bus.log(
                    Level::Error,
                    format!(
                        "adapter still reports {} connected after all sessions were cleared",
                        device.id
                    ),
                );
            }
        }

        any
    }

    /// For GATT operations: a closing session no longer accepts work.
    pub(crate) fn lookup(&self, id: &PeripheralId) -> Result<&Session> {
        match self.sessions.get(id) {
            Some(session) if !session.closing => Ok(session),
            _ => Err(Error::NotConnected(id.clone())),
        }
    }

    pub(crate) fn lookup_mut(&mut self, id: &PeripheralId) -> Result<&mut Session> {
        match self.sessions.get_mut(id) {
            Some(session) if !session.closing => Ok(session),
            _ => Err(Error::NotConnected(id.clone())),
        }
    }

    /// Raw access for callback handling, closing sessions included.
    pub(crate) fn get_mut(&mut self, id: &PeripheralId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub(crate) fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    /// Closes the handle and evicts the session.
    pub(crate) fn release(&mut self, id: &PeripheralId) -> bool {
        match self.sessions.remove(id) {
            Some(session) => {
                session.link.close();
                debug!("released session for {}", id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn release_detached(&mut self, id: &PeripheralId) -> bool {
        match self.detached.remove(id) {
            Some(link) => {
                link.close();
                debug!("released detached handle for {}", id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub(crate) fn detached_len(&self) -> usize {
        self.detached.len()
    }
}

#[cfg(test)]
mod tests {
    use log::LevelFilter;
    use tokio::sync::mpsc;

    use super::*;
    use crate::api::central::PeripheralInfo;
    use crate::api::central_event::CentralEvent;
    use crate::platform::{MockBluetoothAdapter, MockGattLink};

    fn id() -> PeripheralId {
        PeripheralId::from("AA:BB:CC:DD:EE:FF")
    }

    fn sink() -> CallbackSink {
        let (tx, _rx) = mpsc::unbounded_channel();
        CallbackSink::new(tx)
    }

    fn bus() -> EventBus {
        let (tx, _rx) = mpsc::channel(8);
        EventBus::new(tx, LevelFilter::Info)
    }

    fn adapter_returning(link: MockGattLink) -> MockBluetoothAdapter {
        let mut adapter = MockBluetoothAdapter::new();
        adapter
            .expect_connect()
            .times(1)
            .return_once(move |_, _, _| Some(Box::new(link) as Box<dyn GattLink>));
        adapter
    }

    #[test]
    fn connect_registers_one_session() {
        let adapter = adapter_returning(MockGattLink::new());
        let mut registry = SessionRegistry::new(20);

        registry.connect(&adapter, &id(), false, &sink()).unwrap();

        let session = registry.lookup(&id()).unwrap();
        assert_eq!(session.state, ConnectionState::Connecting);
        assert_eq!(session.mtu, 20);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn connect_rejected_by_platform() {
        let mut adapter = MockBluetoothAdapter::new();
        adapter.expect_connect().return_once(|_, _, _| None);
        let mut registry = SessionRegistry::new(20);

        assert_eq!(
            registry.connect(&adapter, &id(), false, &sink()),
            Err(Error::HardwareRejected("connect"))
        );
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn second_connect_while_connected_fails() {
        let mut adapter = adapter_returning(MockGattLink::new());
        adapter
            .expect_connection_state()
            .return_const(ConnectionState::Connected);
        let mut registry = SessionRegistry::new(20);

        registry.connect(&adapter, &id(), false, &sink()).unwrap();
        registry.get_mut(&id()).unwrap().state = ConnectionState::Connected;

        assert_eq!(
            registry.connect(&adapter, &id(), false, &sink()),
            Err(Error::AlreadyConnected(id()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn connect_on_dropped_link_reuses_handle() {
        let mut link = MockGattLink::new();
        link.expect_reconnect().times(1).return_const(false);
        let mut adapter = adapter_returning(link);
        adapter
            .expect_connection_state()
            .return_const(ConnectionState::Disconnected);
        let mut registry = SessionRegistry::new(20);

        registry.connect(&adapter, &id(), true, &sink()).unwrap();
        registry.get_mut(&id()).unwrap().state = ConnectionState::Disconnected;

        assert_eq!(
            registry.connect(&adapter, &id(), true, &sink()),
            Err(Error::ReconnectFailed(id()))
        );
    }

    #[test]
    fn disconnect_unknown_is_a_noop() {
        let adapter = MockBluetoothAdapter::new();
        let mut registry = SessionRegistry::new(20);
        assert!(!registry.disconnect(&adapter, &id()));
    }

    #[test]
    fn disconnect_waits_for_confirmation_on_live_link() {
        let mut link = MockGattLink::new();
        link.expect_disconnect().times(1).return_const(());
        link.expect_close().never();
        let mut adapter = adapter_returning(link);
        adapter
            .expect_connection_state()
            .return_const(ConnectionState::Connected);
        let mut registry = SessionRegistry::new(20);

        registry.connect(&adapter, &id(), false, &sink()).unwrap();
        registry.get_mut(&id()).unwrap().state = ConnectionState::Connected;

        assert!(registry.disconnect(&adapter, &id()));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup(&id()).err(),
            Some(Error::NotConnected(id()))
        );
    }

    #[test]
    fn disconnect_evicts_link_that_is_already_down() {
        let mut link = MockGattLink::new();
        link.expect_disconnect().times(1).return_const(());
        link.expect_close().times(1).return_const(());
        let mut adapter = adapter_returning(link);
        adapter
            .expect_connection_state()
            .return_const(ConnectionState::Disconnected);
        let mut registry = SessionRegistry::new(20);

        registry.connect(&adapter, &id(), false, &sink()).unwrap();
        registry.get_mut(&id()).unwrap().state = ConnectionState::Disconnected;

        assert!(registry.disconnect(&adapter, &id()));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn disconnect_evicts_attempt_that_never_came_up() {
        let mut link = MockGattLink::new();
        link.expect_disconnect().times(1).return_const(());
        link.expect_close().times(1).return_const(());
        let mut adapter = adapter_returning(link);
        adapter
            .expect_connection_state()
            .return_const(ConnectionState::Disconnected);
        let mut registry = SessionRegistry::new(20);

        registry.connect(&adapter, &id(), false, &sink()).unwrap();
        assert_eq!(
            registry.get_mut(&id()).unwrap().state,
            ConnectionState::Connecting
        );

        assert!(registry.disconnect(&adapter, &id()));
        assert_eq!(registry.len(), 0);
        assert!(!registry.disconnect(&adapter, &id()));
    }

    #[test]
    fn disconnect_all_closes_attempts_that_never_came_up() {
        let mut link = MockGattLink::new();
        link.expect_disconnect().times(1).return_const(());
        link.expect_close().times(1).return_const(());
        let mut adapter = adapter_returning(link);
        adapter
            .expect_connection_state()
            .return_const(ConnectionState::Disconnected);
        adapter.expect_connected_devices().return_const(Vec::new());
        let mut registry = SessionRegistry::new(20);

        registry.connect(&adapter, &id(), false, &sink()).unwrap();

        assert!(registry.disconnect_all(&adapter, &mut bus()));
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.detached_len(), 0);
    }

    #[test]
    fn disconnect_all_detaches_live_links_and_logs_strays() {
        let mut link = MockGattLink::new();
        link.expect_disconnect().times(1).return_const(());
        link.expect_close().times(1).return_const(());
        let mut adapter = adapter_returning(link);
        adapter
            .expect_connection_state()
            .return_const(ConnectionState::Connected);
        adapter.expect_connected_devices().return_once(|| {
            vec![
                PeripheralInfo::new("AA:BB:CC:DD:EE:FF"),
                PeripheralInfo::new("11:22:33:44:55:66"),
            ]
        });
        let mut registry = SessionRegistry::new(20);
        let mut bus = bus();

        registry.connect(&adapter, &id(), false, &sink()).unwrap();

        assert!(registry.disconnect_all(&adapter, &mut bus));
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.detached_len(), 1);

        let events = bus.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            CentralEvent::Log { level: Level::Error, message } if message.contains("11:22:33:44:55:66")
        ));

        assert!(registry.release_detached(&id()));
        assert!(!registry.release_detached(&id()));
    }

    #[test]
    fn disconnect_all_without_sessions() {
        let mut adapter = MockBluetoothAdapter::new();
        adapter.expect_connected_devices().return_const(Vec::new());
        let mut registry = SessionRegistry::new(20);
        assert!(!registry.disconnect_all(&adapter, &mut bus()));
    }
}
