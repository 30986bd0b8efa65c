//! The publish/subscribe hub.
//!
//! Publishers push into a bounded intake channel. A single dispatcher task
//! ([`EventBus::run`]) drains the intake and fans each event out to the
//! subscribers of its type, in publish order. Subscriber channels hold one
//! event; a send that stays blocked for longer than
//! [`BusConfig::delivery_timeout`] is dropped for that subscriber and logged.
//!
//! Subscribers that react by emitting further events use
//! [`EventBus::publish_follow_up`]. Follow-ups bypass the bounded intake and
//! are dispatched ahead of it, so a handler never waits on the queue the
//! dispatcher is trying to deliver from.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{EventError, Result};
use crate::event::{Event, EventType};

/// Identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receiving end handed to a subscriber.
pub type EventReceiver = mpsc::Receiver<Arc<Event>>;

type SubscriberMap = HashMap<EventType, HashMap<SubscriptionId, mpsc::Sender<Arc<Event>>>>;

/// Receiving ends owned by the dispatcher.
struct Lanes {
    intake: mpsc::Receiver<Event>,
    follow_ups: mpsc::UnboundedReceiver<Event>,
}

/// Tuning for the event bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Capacity of the publisher intake channel.
    pub intake_capacity: usize,
    /// How long one delivery may block before it is dropped.
    pub delivery_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            intake_capacity: 64,
            delivery_timeout: Duration::from_secs(5),
        }
    }
}

/// Typed in-process event bus.
pub struct EventBus {
    declared: HashSet<EventType>,
    config: BusConfig,
    intake: mpsc::Sender<Event>,
    follow_ups: mpsc::UnboundedSender<Event>,
    lanes: Mutex<Option<Lanes>>,
    subscriptions: RwLock<SubscriberMap>,
}

impl EventBus {
    /// Create a bus accepting only the given event types.
    #[must_use]
    pub fn new(types: &[EventType], config: BusConfig) -> Self {
        let (intake, intake_rx) = mpsc::channel(config.intake_capacity.max(1));
        let (follow_ups, follow_ups_rx) = mpsc::unbounded_channel();
        Self {
            declared: types.iter().copied().collect(),
            config,
            intake,
            follow_ups,
            lanes: Mutex::new(Some(Lanes {
                intake: intake_rx,
                follow_ups: follow_ups_rx,
            })),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a bus accepting every event type with default tuning.
    #[must_use]
    pub fn with_all_types() -> Self {
        Self::new(&EventType::ALL, BusConfig::default())
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }

    fn ensure_declared(&self, event_type: EventType) -> Result<()> {
        if self.declared.contains(&event_type) {
            Ok(())
        } else {
            Err(EventError::UnknownEventType(event_type))
        }
    }

    /// Queue an event for delivery.
    ///
    /// Returns once the event is in the intake; subscribers observe it later.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEventType` for undeclared types and `Closed` once the
    /// dispatcher has stopped.
    pub async fn publish(&self, event: Event) -> Result<()> {
        let event_type = event.event_type();
        self.ensure_declared(event_type)?;
        self.intake
            .send(event)
            .await
            .map_err(|_| EventError::Closed)?;
        tracing::trace!(%event_type, "Published event");
        Ok(())
    }

    /// Queue an event raised while handling another one.
    ///
    /// Never waits: follow-ups go to an unbounded lane that the dispatcher
    /// drains before the intake. Their number is bounded by the events
    /// already accepted through [`EventBus::publish`].
    ///
    /// # Errors
    ///
    /// Returns `UnknownEventType` for undeclared types and `Closed` once the
    /// dispatcher has stopped.
    pub fn publish_follow_up(&self, event: Event) -> Result<()> {
        let event_type = event.event_type();
        self.ensure_declared(event_type)?;
        self.follow_ups.send(event).map_err(|_| EventError::Closed)?;
        tracing::trace!(%event_type, "Published follow-up event");
        Ok(())
    }

    /// Register a new subscription.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEventType` if the type was not declared.
    pub async fn subscribe(&self, event_type: EventType) -> Result<(SubscriptionId, EventReceiver)> {
        self.ensure_declared(event_type)?;
        let (tx, rx) = mpsc::channel(1);
        let id = SubscriptionId::generate();
        self.subscriptions
            .write()
            .await
            .entry(event_type)
            .or_default()
            .insert(id, tx);
        tracing::debug!(%event_type, subscription = %id, "Subscribed");
        Ok((id, rx))
    }

    /// Remove a subscription and close its channel.
    ///
    /// # Errors
    ///
    /// Returns `NotSubscribed` if no such subscription exists.
    pub async fn unsubscribe(&self, event_type: EventType, id: SubscriptionId) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let removed = subscriptions
            .get_mut(&event_type)
            .and_then(|subs| subs.remove(&id));
        if removed.is_none() {
            return Err(EventError::NotSubscribed { event_type, id });
        }
        tracing::debug!(%event_type, subscription = %id, "Unsubscribed");
        Ok(())
    }

    /// Number of live subscriptions for a type.
    pub async fn subscriber_count(&self, event_type: EventType) -> usize {
        self.subscriptions
            .read()
            .await
            .get(&event_type)
            .map_or(0, HashMap::len)
    }

    /// Drive the dispatch loop until `cancel` fires.
    ///
    /// On exit every subscription is removed, which closes all receivers,
    /// and later publishes fail with `Closed`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if a dispatcher has already taken the intake.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let Lanes {
            mut intake,
            mut follow_ups,
        } = self.lanes.lock().take().ok_or(EventError::AlreadyRunning)?;
        tracing::info!(event_types = self.declared.len(), "Event bus dispatcher started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(event) = follow_ups.recv() => self.dispatch(event, &cancel).await,
                event = intake.recv() => match event {
                    Some(event) => self.dispatch(event, &cancel).await,
                    None => break,
                },
            }
        }

        intake.close();
        follow_ups.close();
        drop((intake, follow_ups));

        let mut subscriptions = self.subscriptions.write().await;
        let closed: usize = subscriptions.values().map(HashMap::len).sum();
        subscriptions.clear();
        tracing::info!(subscriptions = closed, "Event bus dispatcher stopped");
        Ok(())
    }

    async fn dispatch(&self, event: Event, cancel: &CancellationToken) {
        let event_type = event.event_type();
        let event = Arc::new(event);
        // Snapshot the targets so (un)subscribing never waits on a delivery.
        let targets: Vec<_> = match self.subscriptions.read().await.get(&event_type) {
            Some(targets) => targets.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
            None => return,
        };

        for (id, tx) in &targets {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                sent = tokio::time::timeout(self.config.delivery_timeout, tx.send(Arc::clone(&event))) => {
                    match sent {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => {
                            tracing::debug!(%event_type, subscription = %id, "Subscriber channel closed");
                        }
                        Err(_) => {
                            tracing::warn!(
                                %event_type,
                                subscription = %id,
                                timeout_ms = u64::try_from(self.config.delivery_timeout.as_millis()).unwrap_or(u64::MAX),
                                "Dropped event for slow subscriber"
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use greenspace_core::{MqttPayload, SensorDataId, SensorId};
    use greenspace_store::SensorData;

    use crate::Event;

    pub fn sensor_event(n: i64) -> Event {
        let sensor_id = SensorId::new("eui-test").unwrap();
        Event::NewSensorData {
            new: SensorData {
                id: SensorDataId::new(n),
                sensor_id,
                payload: MqttPayload {
                    device_id: "eui-test".into(),
                    battery: 3.3,
                    humidity: 40.0,
                    temperature: 11.0,
                    latitude: None,
                    longitude: None,
                    watermarks: Vec::new(),
                },
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    pub fn data_id(event: &Event) -> i64 {
        match event {
            Event::NewSensorData { new } => new.id.get(),
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{data_id, sensor_event};
    use super::*;

    fn spawn_bus(bus: &Arc<EventBus>, cancel: &CancellationToken) -> tokio::task::JoinHandle<Result<()>> {
        let bus = Arc::clone(bus);
        let cancel = cancel.clone();
        tokio::spawn(async move { bus.run(cancel).await })
    }

    #[tokio::test]
    async fn publish_without_subscribers() {
        let bus = Arc::new(EventBus::with_all_types());
        let cancel = CancellationToken::new();
        let handle = spawn_bus(&bus, &cancel);

        bus.publish(sensor_event(1)).await.unwrap();
        assert_eq!(bus.subscriber_count(EventType::NewSensorData).await, 0);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn subscriber_receives_event_once() {
        let bus = Arc::new(EventBus::with_all_types());
        let cancel = CancellationToken::new();
        let (_id, mut rx) = bus.subscribe(EventType::NewSensorData).await.unwrap();
        let handle = spawn_bus(&bus, &cancel);

        bus.publish(sensor_event(7)).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(data_id(&received), 7);
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn order_is_preserved_per_subscriber() {
        let bus = Arc::new(EventBus::with_all_types());
        let cancel = CancellationToken::new();
        let (_id, mut rx) = bus.subscribe(EventType::NewSensorData).await.unwrap();
        let handle = spawn_bus(&bus, &cancel);

        for n in 1..=5 {
            bus.publish(sensor_event(n)).await.unwrap();
        }
        for n in 1..=5 {
            assert_eq!(data_id(&rx.recv().await.unwrap()), n);
        }

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn every_subscriber_gets_every_event() {
        let bus = Arc::new(EventBus::with_all_types());
        let cancel = CancellationToken::new();
        let (_a, mut rx_a) = bus.subscribe(EventType::NewSensorData).await.unwrap();
        let (_b, mut rx_b) = bus.subscribe(EventType::NewSensorData).await.unwrap();
        let (_c, mut rx_other) = bus.subscribe(EventType::DeleteTree).await.unwrap();
        let handle = spawn_bus(&bus, &cancel);

        bus.publish(sensor_event(1)).await.unwrap();
        bus.publish(sensor_event(2)).await.unwrap();
        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(data_id(&rx.recv().await.unwrap()), 1);
            assert_eq!(data_id(&rx.recv().await.unwrap()), 2);
        }
        assert!(rx_other.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn undeclared_type_is_rejected() {
        let bus = EventBus::new(&[EventType::CreateTree], BusConfig::default());
        assert!(matches!(
            bus.subscribe(EventType::NewSensorData).await,
            Err(EventError::UnknownEventType(EventType::NewSensorData))
        ));
        assert!(matches!(
            bus.publish(sensor_event(1)).await,
            Err(EventError::UnknownEventType(_))
        ));
    }

    #[tokio::test]
    async fn unsubscribe_closes_channel() {
        let bus = EventBus::with_all_types();
        let (id, mut rx) = bus.subscribe(EventType::NewSensorData).await.unwrap();

        bus.unsubscribe(EventType::NewSensorData, id).await.unwrap();
        assert!(rx.recv().await.is_none());

        let again = bus.unsubscribe(EventType::NewSensorData, id).await;
        assert!(matches!(again, Err(EventError::NotSubscribed { .. })));
    }

    #[tokio::test]
    async fn cancellation_closes_all_subscriptions() {
        let bus = Arc::new(EventBus::with_all_types());
        let cancel = CancellationToken::new();
        let (_a, mut rx_a) = bus.subscribe(EventType::UpdateTree).await.unwrap();
        let (_b, mut rx_b) = bus.subscribe(EventType::NewSensorData).await.unwrap();
        let handle = spawn_bus(&bus, &cancel);

        cancel.cancel();
        handle.await.unwrap().unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            (rx_a.recv().await, rx_b.recv().await)
        })
        .await
        .unwrap();
        assert!(closed.0.is_none() && closed.1.is_none());
        assert!(matches!(bus.publish(sensor_event(1)).await, Err(EventError::Closed)));
    }

    #[tokio::test]
    async fn only_one_dispatcher() {
        let bus = EventBus::with_all_types();
        let cancel = CancellationToken::new();
        cancel.cancel();

        bus.run(cancel.clone()).await.unwrap();
        assert!(matches!(
            bus.run(cancel).await,
            Err(EventError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn follow_ups_never_wait_on_a_full_intake() {
        let config = BusConfig {
            intake_capacity: 2,
            delivery_timeout: Duration::from_secs(60),
        };
        let bus = Arc::new(EventBus::new(&EventType::ALL, config));
        let cancel = CancellationToken::new();
        let (_id, mut rx) = bus.subscribe(EventType::NewSensorData).await.unwrap();
        let handle = spawn_bus(&bus, &cancel);

        // Echo every original reading back as a follow-up, like a handler
        // that reacts to one event by raising another.
        let echo = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                let mut originals = 0;
                let mut echoes = 0;
                while originals + echoes < 400 {
                    let n = data_id(&rx.recv().await.unwrap());
                    if n < 1000 {
                        originals += 1;
                        bus.publish_follow_up(sensor_event(n + 1000)).unwrap();
                    } else {
                        echoes += 1;
                    }
                }
                (originals, echoes)
            })
        };

        for n in 0..200 {
            bus.publish(sensor_event(n)).await.unwrap();
        }
        let counts = tokio::time::timeout(Duration::from_secs(10), echo)
            .await
            .expect("dispatch stalled")
            .unwrap();
        assert_eq!(counts, (200, 200));

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(matches!(
            bus.publish_follow_up(sensor_event(1)),
            Err(EventError::Closed)
        ));
    }

    #[tokio::test]
    async fn subscribe_is_not_blocked_by_a_pending_delivery() {
        let config = BusConfig {
            intake_capacity: 8,
            delivery_timeout: Duration::from_secs(60),
        };
        let bus = Arc::new(EventBus::new(&EventType::ALL, config));
        let cancel = CancellationToken::new();
        let (_id, _rx) = bus.subscribe(EventType::NewSensorData).await.unwrap();
        let handle = spawn_bus(&bus, &cancel);

        // The second delivery waits on the full, unread channel.
        bus.publish(sensor_event(1)).await.unwrap();
        bus.publish(sensor_event(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let subscribed = tokio::time::timeout(Duration::from_secs(1), bus.subscribe(EventType::UpdateTree)).await;
        assert!(subscribed.unwrap().is_ok());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_subscriber_is_skipped_after_timeout() {
        let config = BusConfig {
            intake_capacity: 8,
            delivery_timeout: Duration::from_millis(100),
        };
        let bus = Arc::new(EventBus::new(&EventType::ALL, config));
        let cancel = CancellationToken::new();
        let (_slow, mut slow_rx) = bus.subscribe(EventType::NewSensorData).await.unwrap();
        let handle = spawn_bus(&bus, &cancel);

        // The slow channel holds one event; the second delivery times out.
        bus.publish(sensor_event(1)).await.unwrap();
        bus.publish(sensor_event(2)).await.unwrap();
        bus.publish(sensor_event(3)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(data_id(&slow_rx.recv().await.unwrap()), 1);
        bus.publish(sensor_event(4)).await.unwrap();
        assert_eq!(data_id(&slow_rx.recv().await.unwrap()), 4);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
