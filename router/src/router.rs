use events::{Device, DeviceDirectory, Event};
use log::*;
use parking_lot::Mutex;
use push::Dispatcher;
use sse::Hub;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorKind};
use crate::metrics::{self, Metrics};

const DEFAULT_QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Clone)]
pub struct Config {
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// An event waiting for the consumer task.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub user_id: String,
    pub device_id: Option<String>,
    pub event: Event,
}

pub struct EventRouter {
    sender: mpsc::Sender<QueuedEvent>,
    // Taken by the one consumer that runs.
    receiver: Mutex<Option<mpsc::Receiver<QueuedEvent>>>,
    directory: Arc<dyn DeviceDirectory>,
    push: Option<Arc<Dispatcher>>,
    hub: Arc<Hub>,
    metrics: Metrics,
}

impl EventRouter {
    /// `push` is `None` when push delivery is disabled; devices with a push
    /// token are then counted as failed.
    pub fn new(
        config: Config,
        directory: Arc<dyn DeviceDirectory>,
        push: Option<Arc<Dispatcher>>,
        hub: Arc<Hub>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));

        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            directory,
            push,
            hub,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Queues `event` for the devices of `user_id`, or only `device_id` when given.
    ///
    /// Never waits for room in the queue.
    pub fn notify(&self, user_id: &str, device_id: Option<&str>, event: Event) -> Result<(), Error> {
        let event_type = event.event_type();
        let queued = QueuedEvent {
            user_id: user_id.to_string(),
            device_id: device_id.map(str::to_string),
            event,
        };

        match self.sender.try_send(queued) {
            Ok(()) => {
                self.metrics
                    .enqueued
                    .with_label_values(&[event_type.as_str()])
                    .inc();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.count_failed(
                    event_type.as_str(),
                    metrics::DELIVERY_UNKNOWN,
                    metrics::REASON_QUEUE_FULL,
                );
                warn!("Event queue is full, rejecting {event_type} for user {user_id}");
                Err(Error::new(ErrorKind::QueueFull))
            }
            Err(TrySendError::Closed(_)) => Err(Error::new(ErrorKind::Closed)),
        }
    }

    /// Consumes queued events in order until `cancel` fires.
    ///
    /// Events still queued at cancellation are discarded.
    pub async fn run(&self, cancel: CancellationToken) {
        let Some(mut receiver) = self.receiver.lock().take() else {
            error!("Event router consumer is already running");
            return;
        };

        info!("Event router started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                queued = receiver.recv() => match queued {
                    Some(queued) => self.process(queued).await,
                    None => break,
                },
            }
        }
        info!("Event router stopped");
    }

    async fn process(&self, queued: QueuedEvent) {
        let devices = match self
            .directory
            .select(&queued.user_id, queued.device_id.as_deref())
            .await
        {
            Ok(devices) => devices,
            Err(e) => {
                error!("Failed to select devices for user {}: {e}", queued.user_id);
                return;
            }
        };

        if devices.is_empty() {
            info!("No devices found for user {}", queued.user_id);
            return;
        }

        for device in &devices {
            self.deliver(&queued, device).await;
        }
    }

    async fn deliver(&self, queued: &QueuedEvent, device: &Device) {
        let event_type = queued.event.event_type().as_str();

        if let Some(token) = device.push_token() {
            let result = match &self.push {
                Some(push) => push
                    .enqueue(token, &queued.event)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("push delivery is disabled".to_string()),
            };

            match result {
                Ok(()) => self.metrics.count_sent(event_type, metrics::DELIVERY_PUSH),
                Err(e) => {
                    error!(
                        "Failed to enqueue push notification for device {} of user {}: {e}",
                        device.id, queued.user_id
                    );
                    self.metrics.count_failed(
                        event_type,
                        metrics::DELIVERY_PUSH,
                        metrics::REASON_PROVIDER_FAILED,
                    );
                }
            }
            return;
        }

        match self.hub.send(&device.id, &queued.event) {
            Ok(()) => self.metrics.count_sent(event_type, metrics::DELIVERY_SSE),
            Err(e) => {
                error!(
                    "Failed to send SSE notification to device {} of user {}: {e}",
                    device.id, queued.user_id
                );
                self.metrics.count_failed(
                    event_type,
                    metrics::DELIVERY_SSE,
                    metrics::REASON_PROVIDER_FAILED,
                );
            }
        }
    }
}
