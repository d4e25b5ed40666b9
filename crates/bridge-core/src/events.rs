use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::types::{DevicePayload, LifecycleEvent};

// ─── EventBus ─────────────────────────────────────────────────────────────

/// Fan-out of [`LifecycleEvent`]s to any number of listeners.
///
/// Emission never waits on a listener: each subscriber has its own slot in a
/// bounded broadcast ring. A listener that falls more than `capacity` events
/// behind skips the oldest ones and is told how many it lost.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no listeners is not an error.
    pub fn emit(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: Some(BroadcastStream::new(self.tx.subscribe())),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// ─── Subscription ─────────────────────────────────────────────────────────

/// Handle to one listener's view of an [`EventBus`].
///
/// Events arrive in emission order. Dropping the handle or calling
/// [`Subscription::cancel`] unsubscribes.
pub struct Subscription {
    rx: Option<BroadcastStream<LifecycleEvent>>,
}

impl Subscription {
    /// Stop receiving events. Further polls yield `None`.
    pub fn cancel(&mut self) {
        self.rx.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.is_none()
    }

    /// Drain whatever has been emitted so far without waiting.
    pub fn drain_ready(&mut self) -> Vec<LifecycleEvent> {
        use futures::FutureExt;
        use futures::StreamExt;

        let mut events = Vec::new();
        while let Some(Some(event)) = self.next().now_or_never() {
            events.push(event);
        }
        events
    }
}

impl Stream for Subscription {
    type Item = LifecycleEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(rx) = self.rx.as_mut() else {
                return Poll::Ready(None);
            };
            let polled = Pin::new(rx).poll_next(cx);
            match polled {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(n)))) => {
                    tracing::warn!(missed = n, "event listener lagged behind");
                    continue;
                }
                Poll::Ready(None) => {
                    self.rx = None;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// ─── ProgressReporter ─────────────────────────────────────────────────────

/// Handed to a peripheral session so it can report progress for its device.
///
/// Reports are re-broadcast as non-terminal `DeviceProcessed` events; the
/// terminal `Disconnected` event is reserved for the orchestrator.
#[derive(Clone)]
pub struct ProgressReporter {
    device_id: String,
    bus: EventBus,
}

impl ProgressReporter {
    pub fn new(device_id: impl Into<String>, bus: EventBus) -> Self {
        Self {
            device_id: device_id.into(),
            bus,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn stage(&self, stage: impl Into<String>) {
        self.bus.emit(LifecycleEvent::DeviceProcessed(DevicePayload::progress(
            self.device_id.clone(),
            stage,
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceStatus;
    use futures::StreamExt;

    #[tokio::test]
    async fn every_listener_sees_events_in_order() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(LifecycleEvent::info("one"));
        bus.emit(LifecycleEvent::error("two"));

        for sub in [&mut a, &mut b] {
            let first = sub.next().await.unwrap();
            let second = sub.next().await.unwrap();
            assert!(matches!(first, LifecycleEvent::Info { ref message, .. } if message == "one"));
            assert!(matches!(second, LifecycleEvent::Error { ref message, .. } if message == "two"));
        }
    }

    #[tokio::test]
    async fn emit_without_listeners_is_fine() {
        let bus = EventBus::new(4);
        bus.emit(LifecycleEvent::info("nobody home"));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_subscription_ends_and_detaches() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe();
        assert_eq!(bus.listener_count(), 1);
        sub.cancel();
        assert!(sub.is_cancelled());
        assert_eq!(bus.listener_count(), 0);
        bus.emit(LifecycleEvent::info("late"));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn lagging_listener_skips_to_newest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.emit(LifecycleEvent::info(format!("m{i}")));
        }
        let got = sub.drain_ready();
        let messages: Vec<_> = got
            .iter()
            .map(|e| match e {
                LifecycleEvent::Info { message, .. } => message.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(messages, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn progress_reports_are_not_terminal() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe();
        ProgressReporter::new("dev-1", bus.clone()).stage("searching");
        match sub.next().await.unwrap() {
            LifecycleEvent::DeviceProcessed(p) => {
                assert_eq!(p.device_id, "dev-1");
                assert_eq!(
                    p.status,
                    DeviceStatus::InProgress {
                        stage: "searching".into()
                    }
                );
                assert!(!p.status.is_terminal());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
