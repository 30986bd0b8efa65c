//! Long-running subscription loops.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::error::{EventError, Result};
use crate::event::{Event, EventType};

/// A consumer of one event type.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// The event type this subscriber consumes.
    fn event_type(&self) -> EventType;

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// An error ends the subscription loop.
    async fn handle(&self, event: &Event) -> greenspace_core::Result<()>;
}

impl EventBus {
    /// Subscribe `subscriber` and feed it events until `cancel` fires, the
    /// bus shuts down, or the handler fails.
    ///
    /// The subscription is always removed before this returns.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEventType` if the subscriber's type was not declared,
    /// or `Handler` with the handler's error.
    pub async fn run_subscription<S>(&self, cancel: CancellationToken, subscriber: &S) -> Result<()>
    where
        S: Subscriber + ?Sized,
    {
        let event_type = subscriber.event_type();
        let (id, mut rx) = self.subscribe(event_type).await?;
        tracing::debug!(
            subscriber = subscriber.name(),
            %event_type,
            subscription = %id,
            "Subscription loop started"
        );

        let outcome = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Ok(()),
                event = rx.recv() => {
                    let Some(event) = event else {
                        break Ok(());
                    };
                    if let Err(source) = subscriber.handle(&event).await {
                        break Err(EventError::Handler {
                            subscriber: subscriber.name(),
                            source,
                        });
                    }
                }
            }
        };

        drop(rx);
        match self.unsubscribe(event_type, id).await {
            Ok(()) | Err(EventError::NotSubscribed { .. }) => {}
            Err(e) => {
                tracing::warn!(subscriber = subscriber.name(), error = %e, "Failed to unsubscribe");
            }
        }
        tracing::debug!(subscriber = subscriber.name(), %event_type, "Subscription loop stopped");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use greenspace_core::ServiceError;
    use parking_lot::Mutex;

    use super::*;
    use crate::bus::test_support::{data_id, sensor_event};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<i64>>,
        fail_on: Option<i64>,
    }

    #[async_trait]
    impl Subscriber for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn event_type(&self) -> EventType {
            EventType::NewSensorData
        }

        async fn handle(&self, event: &Event) -> greenspace_core::Result<()> {
            let id = data_id(event);
            self.seen.lock().push(id);
            if self.fail_on == Some(id) {
                return Err(ServiceError::internal("boom"));
            }
            Ok(())
        }
    }

    async fn wait_for_subscriber(bus: &EventBus) {
        while bus.subscriber_count(EventType::NewSensorData).await == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn delivers_until_cancelled_then_unsubscribes() {
        let bus = Arc::new(EventBus::with_all_types());
        let cancel = CancellationToken::new();
        let recorder = Arc::new(Recorder::default());

        let dispatcher = {
            let (bus, cancel) = (Arc::clone(&bus), cancel.clone());
            tokio::spawn(async move { bus.run(cancel).await })
        };
        let sub_cancel = cancel.child_token();
        let loop_handle = {
            let (bus, recorder, token) = (Arc::clone(&bus), Arc::clone(&recorder), sub_cancel.clone());
            tokio::spawn(async move { bus.run_subscription(token, recorder.as_ref()).await })
        };
        wait_for_subscriber(&bus).await;

        bus.publish(sensor_event(1)).await.unwrap();
        bus.publish(sensor_event(2)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while recorder.seen.lock().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        sub_cancel.cancel();
        loop_handle.await.unwrap().unwrap();
        assert_eq!(bus.subscriber_count(EventType::NewSensorData).await, 0);
        assert_eq!(*recorder.seen.lock(), vec![1, 2]);

        cancel.cancel();
        dispatcher.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn handler_error_stops_loop() {
        let bus = Arc::new(EventBus::with_all_types());
        let cancel = CancellationToken::new();
        let recorder = Arc::new(Recorder {
            fail_on: Some(1),
            ..Recorder::default()
        });

        let dispatcher = {
            let (bus, cancel) = (Arc::clone(&bus), cancel.clone());
            tokio::spawn(async move { bus.run(cancel).await })
        };
        let loop_handle = {
            let (bus, recorder, token) = (Arc::clone(&bus), Arc::clone(&recorder), cancel.clone());
            tokio::spawn(async move { bus.run_subscription(token, recorder.as_ref()).await })
        };
        wait_for_subscriber(&bus).await;

        bus.publish(sensor_event(1)).await.unwrap();
        let result = loop_handle.await.unwrap();
        assert!(matches!(result, Err(EventError::Handler { subscriber: "recorder", .. })));
        assert_eq!(bus.subscriber_count(EventType::NewSensorData).await, 0);

        cancel.cancel();
        dispatcher.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bus_shutdown_ends_loop() {
        let bus = Arc::new(EventBus::with_all_types());
        let bus_cancel = CancellationToken::new();
        let recorder = Arc::new(Recorder::default());

        let dispatcher = {
            let (bus, cancel) = (Arc::clone(&bus), bus_cancel.clone());
            tokio::spawn(async move { bus.run(cancel).await })
        };
        let loop_handle = {
            let (bus, recorder) = (Arc::clone(&bus), Arc::clone(&recorder));
            tokio::spawn(async move {
                bus.run_subscription(CancellationToken::new(), recorder.as_ref())
                    .await
            })
        };
        wait_for_subscriber(&bus).await;

        bus_cancel.cancel();
        dispatcher.await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(2), loop_handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
