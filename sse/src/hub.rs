use crate::connection::{ConnectionId, ConnectionRegistry};
use crate::error::Error;
use crate::frame::{Frame, KEEPALIVE};
use crate::metrics::{self, Metrics};
use async_stream::stream;
use bytes::Bytes;
use events::Event;
use futures::Stream;
use log::*;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(15);
const DEFAULT_BUFFER_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Period between keepalive comments; zero disables them.
    pub keepalive: Duration,
    /// Outbound frames buffered per connection before sends are skipped.
    pub buffer_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            keepalive: DEFAULT_KEEPALIVE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// Delivers events to the open event streams of devices.
pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    config: HubConfig,
    metrics: Arc<Metrics>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let config = HubConfig {
            buffer_capacity: config.buffer_capacity.max(1),
            ..config
        };

        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            config,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Registers a new connection for `device_id`.
    ///
    /// The connection is live as soon as this returns, so events sent before
    /// the response body is first polled are buffered rather than lost. Once
    /// the hub is closed the returned stream ends after its first keepalive.
    pub fn connect(&self, device_id: &str) -> Subscription {
        let (sender, frames) = mpsc::channel(self.config.buffer_capacity);
        let (close, closed) = oneshot::channel();

        let connection_id = self.registry.register(device_id.to_string(), sender, close);
        match &connection_id {
            Some(connection_id) => {
                self.metrics.active_connections.inc();
                info!(
                    "Registered SSE connection {} for device {}",
                    connection_id.as_str(),
                    device_id
                );
            }
            None => warn!("SSE hub is closed, refusing connection for device {device_id}"),
        }

        Subscription {
            device_id: device_id.to_string(),
            frames,
            closed,
            keepalive: self.config.keepalive,
            registration: Registration {
                registry: self.registry.clone(),
                metrics: self.metrics.clone(),
                connection_id,
            },
        }
    }

    /// Queues `event` on every live connection of `device_id` without waiting.
    ///
    /// A connection whose buffer is full is skipped and counted. Fails with
    /// `NoConnection` when the device has no connections or none of them
    /// accepted the event.
    pub fn send(&self, device_id: &str, event: &Event) -> Result<(), Error> {
        let senders = self.registry.senders(device_id);
        if senders.is_empty() {
            self.metrics.connection_error(metrics::ERROR_NO_CONNECTION);
            debug!("Device {device_id} has no SSE connection");
            return Err(Error::no_connection(&format!(
                "device {device_id} is not connected"
            )));
        }

        let frame = Frame::from_event(event).inspect_err(|e| {
            self.metrics.connection_error(metrics::ERROR_MARSHAL);
            error!("Failed to serialize SSE event for device {device_id}: {e}");
        })?;

        let total = senders.len();
        let mut delivered = 0;
        for (connection_id, sender) in senders {
            match self.deliver(&connection_id, &sender, frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    "Skipping SSE connection {} of device {}: {}",
                    connection_id.as_str(),
                    device_id,
                    e
                ),
            }
        }

        if delivered == 0 {
            return Err(Error::no_connection(&format!(
                "none of {total} connection(s) of device {device_id} accepted the event"
            )));
        }

        self.metrics
            .events_sent
            .with_label_values(&[&frame.event_type])
            .inc();
        debug!("Sent SSE event to {delivered}/{total} connection(s) of device {device_id}");
        Ok(())
    }

    fn deliver(
        &self,
        connection_id: &ConnectionId,
        sender: &mpsc::Sender<Frame>,
        frame: Frame,
    ) -> Result<(), Error> {
        match sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.connection_error(metrics::ERROR_BUFFER_FULL);
                Err(Error::buffer_full(connection_id.as_str()))
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.connection_error(metrics::ERROR_CLOSED);
                Err(Error::no_connection(connection_id.as_str()))
            }
        }
    }

    /// Closes every live connection and refuses new ones from now on.
    pub fn close(&self) {
        let closed = self.registry.close_all();
        info!("Closed {closed} SSE connection(s)");
    }

    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    pub fn connection_count(&self, device_id: &str) -> usize {
        self.registry.connection_count(device_id)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// Removes the connection from the registry when the serving side goes away,
/// whatever the reason.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
    /// `None` when the hub was already closed.
    connection_id: Option<ConnectionId>,
}

impl Registration {
    fn label(&self) -> &str {
        self.connection_id
            .as_ref()
            .map_or("(refused)", |connection_id| connection_id.as_str())
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(connection_id) = &self.connection_id else {
            return;
        };
        self.registry.unregister(connection_id);
        self.metrics.active_connections.dec();
        debug!("Unregistered SSE connection {}", connection_id.as_str());
    }
}

enum Step {
    Frame(Frame),
    KeepAlive,
    Close,
}

/// The serving side of one connection.
pub struct Subscription {
    device_id: String,
    frames: mpsc::Receiver<Frame>,
    closed: oneshot::Receiver<()>,
    keepalive: Duration,
    registration: Registration,
}

impl Subscription {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Turns the subscription into the response body stream.
    ///
    /// Emits a keepalive right away, then frames in send order interleaved
    /// with keepalives. Ends when the hub closes the connection; dropping the
    /// stream deregisters it.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        let Subscription {
            device_id,
            mut frames,
            mut closed,
            keepalive,
            registration,
        } = self;

        stream! {
            let registration = registration;
            let metrics = registration.metrics.clone();
            let mut ticker = keepalive_ticker(keepalive);

            yield Ok(Bytes::from_static(KEEPALIVE));

            loop {
                let step = tokio::select! {
                    biased;
                    frame = frames.recv() => match frame {
                        Some(frame) => Step::Frame(frame),
                        None => Step::Close,
                    },
                    _ = &mut closed => Step::Close,
                    _ = next_tick(&mut ticker) => Step::KeepAlive,
                };

                match step {
                    Step::Frame(frame) => yield Ok(frame.encode()),
                    Step::KeepAlive => {
                        metrics.keepalives_sent.inc();
                        yield Ok(Bytes::from_static(KEEPALIVE));
                    }
                    Step::Close => break,
                }
            }

            debug!(
                "SSE connection {} for device {} closed",
                registration.label(),
                device_id
            );
        }
    }
}

fn keepalive_ticker(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }

    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn frame_bytes(event: &Event) -> Bytes {
        Frame::from_event(event).unwrap().encode()
    }

    #[test]
    fn send_without_connection_is_no_connection() {
        let hub = Hub::default();
        let err = hub.send("d1", &Event::message_enqueued()).unwrap_err();
        assert_eq!(err.error_kind, crate::ErrorKind::NoConnection);
    }

    #[test]
    fn send_reaches_every_connection_of_the_device() {
        let hub = Hub::default();
        let mut first = hub.connect("d1");
        let mut second = hub.connect("d1");
        let mut other = hub.connect("d2");

        hub.send("d1", &Event::message_enqueued()).unwrap();

        assert_eq!(first.frames.try_recv().unwrap().event_type, "MessageEnqueued");
        assert_eq!(second.frames.try_recv().unwrap().event_type, "MessageEnqueued");
        assert!(other.frames.try_recv().is_err());
    }

    #[test]
    fn full_buffer_skips_only_that_connection() {
        let hub = Hub::new(HubConfig {
            buffer_capacity: 1,
            ..HubConfig::default()
        });
        let mut busy = hub.connect("d1");
        hub.send("d1", &Event::message_enqueued()).unwrap();
        let mut idle = hub.connect("d1");

        hub.send("d1", &Event::settings_updated()).unwrap();

        assert_eq!(busy.frames.try_recv().unwrap().event_type, "MessageEnqueued");
        assert!(busy.frames.try_recv().is_err());
        assert_eq!(idle.frames.try_recv().unwrap().event_type, "SettingsUpdated");
        assert_eq!(
            hub.metrics()
                .connection_errors
                .with_label_values(&[metrics::ERROR_BUFFER_FULL])
                .get(),
            1
        );
    }

    #[test]
    fn send_fails_when_every_buffer_is_full() {
        let hub = Hub::new(HubConfig {
            buffer_capacity: 1,
            ..HubConfig::default()
        });
        let _subscription = hub.connect("d1");
        hub.send("d1", &Event::message_enqueued()).unwrap();

        let err = hub.send("d1", &Event::message_enqueued()).unwrap_err();

        assert_eq!(err.error_kind, crate::ErrorKind::NoConnection);
    }

    #[tokio::test]
    async fn stream_starts_with_keepalive_then_frames_in_order() {
        let hub = Hub::default();
        let stream = hub.connect("d1").into_stream();
        tokio::pin!(stream);

        hub.send("d1", &Event::message_enqueued()).unwrap();
        hub.send("d1", &Event::webhooks_updated()).unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), KEEPALIVE);
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            frame_bytes(&Event::message_enqueued())
        );
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            frame_bytes(&Event::webhooks_updated())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_is_written_every_period() {
        let hub = Hub::new(HubConfig {
            keepalive: Duration::from_secs(15),
            ..HubConfig::default()
        });
        let stream = hub.connect("d1").into_stream();
        tokio::pin!(stream);

        assert_eq!(stream.next().await.unwrap().unwrap(), KEEPALIVE);
        assert_eq!(stream.next().await.unwrap().unwrap(), KEEPALIVE);
        assert_eq!(stream.next().await.unwrap().unwrap(), KEEPALIVE);
        assert_eq!(hub.metrics().keepalives_sent.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_keepalive_disables_periodic_comments() {
        let hub = Hub::new(HubConfig {
            keepalive: Duration::ZERO,
            ..HubConfig::default()
        });
        let stream = hub.connect("d1").into_stream();
        tokio::pin!(stream);

        assert_eq!(stream.next().await.unwrap().unwrap(), KEEPALIVE);
        let next = time::timeout(Duration::from_secs(60), stream.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn close_ends_streams_and_clears_registry() {
        let hub = Hub::default();
        let first = hub.connect("d1").into_stream();
        let second = hub.connect("d2").into_stream();

        hub.close();

        assert_eq!(hub.connection_count("d1"), 0);
        assert_eq!(hub.connection_count("d2"), 0);
        let first: Vec<_> = first.collect().await;
        let second: Vec<_> = second.collect().await;
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(hub.metrics().active_connections.get(), 0);
    }

    #[tokio::test]
    async fn dropping_stream_deregisters_connection() {
        let hub = Hub::default();
        let stream = hub.connect("d1").into_stream();
        assert_eq!(hub.connection_count("d1"), 1);
        assert_eq!(hub.metrics().active_connections.get(), 1);

        drop(stream);

        assert_eq!(hub.connection_count("d1"), 0);
        assert_eq!(hub.metrics().active_connections.get(), 0);
        assert!(hub.send("d1", &Event::message_enqueued()).is_err());
    }

    #[tokio::test]
    async fn connect_after_close_ends_after_first_keepalive() {
        let hub = Hub::default();
        hub.close();

        let stream = hub.connect("d1").into_stream();

        assert!(hub.is_closed());
        assert_eq!(hub.connection_count("d1"), 0);
        assert_eq!(hub.metrics().active_connections.get(), 0);
        assert!(hub.send("d1", &Event::message_enqueued()).is_err());

        let frames = time::timeout(Duration::from_secs(1), stream.collect::<Vec<_>>())
            .await
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap(), &Bytes::from_static(KEEPALIVE));
        assert_eq!(hub.metrics().active_connections.get(), 0);
    }
}
