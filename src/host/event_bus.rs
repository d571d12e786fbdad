use std::collections::VecDeque;

use futures::Stream;
use log::{Level, LevelFilter};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::api::central_event::CentralEvent;

/// Ordered outbound queue to the application. Handlers push synchronously while they hold
/// mutable state; the actor flushes once the message has been fully handled, so events leave in
/// the order their causes were observed.
pub(crate) struct EventBus {
    queue: VecDeque<CentralEvent>,
    sender: Sender<CentralEvent>,
    level: LevelFilter,
}

impl EventBus {
    pub(crate) fn new(sender: Sender<CentralEvent>, level: LevelFilter) -> Self {
        Self {
            queue: VecDeque::new(),
            sender,
            level,
        }
    }

    pub(crate) fn emit(&mut self, event: CentralEvent) {
        self.queue.push_back(event);
    }

    /// Logs locally and forwards a `Log` event when `level` passes the runtime threshold.
    pub(crate) fn log(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();
        log::log!(level, "{}", message);
        if level <= self.level {
            self.queue.push_back(CentralEvent::Log { level, message });
        }
    }

    pub(crate) fn set_level(&mut self, level: LevelFilter) {
        self.level = level;
    }

    pub(crate) async fn flush(&mut self) {
        while let Some(event) = self.queue.pop_front() {
            if let Err(e) = self.sender.send(event).await {
                log::error!("Error sending central event, receiver dropped: {}", e);
                self.queue.clear();
                return;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn drain(&mut self) -> Vec<CentralEvent> {
        self.queue.drain(..).collect()
    }
}

/// Adapts the event receiver into a `Stream` for callers that prefer combinators.
/// The stream is `Unpin`, so `next()` works on it directly.
pub fn event_stream(
    receiver: Receiver<CentralEvent>,
) -> impl Stream<Item = CentralEvent> + Unpin + Send {
    Box::pin(futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|event| (event, receiver))
    }))
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::sync::mpsc;

    use super::*;
    use crate::api::central_event::CentralState;

    #[tokio::test]
    async fn flush_preserves_emit_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut bus = EventBus::new(tx, LevelFilter::Info);

        bus.emit(CentralEvent::StateChanged {
            state: CentralState::TurningOn,
        });
        bus.emit(CentralEvent::StateChanged {
            state: CentralState::PoweredOn,
        });
        bus.flush().await;

        assert_eq!(
            rx.recv().await,
            Some(CentralEvent::StateChanged {
                state: CentralState::TurningOn
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(CentralEvent::StateChanged {
                state: CentralState::PoweredOn
            })
        );
    }

    #[tokio::test]
    async fn log_events_respect_threshold() {
        let (tx, _rx) = mpsc::channel(8);
        let mut bus = EventBus::new(tx, LevelFilter::Warn);

        bus.log(Level::Debug, "hidden");
        bus.log(Level::Error, "shown");
        assert_eq!(
            bus.drain(),
            vec![CentralEvent::Log {
                level: Level::Error,
                message: "shown".to_string()
            }]
        );

        bus.set_level(LevelFilter::Trace);
        bus.log(Level::Debug, "now shown");
        assert_eq!(bus.drain().len(), 1);
    }

    #[tokio::test]
    async fn flush_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let mut bus = EventBus::new(tx, LevelFilter::Info);
        bus.emit(CentralEvent::ScanError { code: 2 });
        bus.flush().await;
        assert!(bus.drain().is_empty());
    }

    #[tokio::test]
    async fn stream_ends_when_senders_are_gone() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(CentralEvent::ScanError { code: 1 }).await.unwrap();
        drop(tx);

        let events: Vec<_> = event_stream(rx).collect().await;
        assert_eq!(events, vec![CentralEvent::ScanError { code: 1 }]);
    }

    #[tokio::test]
    async fn stream_can_be_polled_without_pinning() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(CentralEvent::ScanError { code: 2 }).await.unwrap();
        drop(tx);

        let mut events = event_stream(rx);
        assert_eq!(events.next().await, Some(CentralEvent::ScanError { code: 2 }));
        assert_eq!(events.next().await, None);
    }
}
