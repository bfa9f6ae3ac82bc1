//! Topic routing.
//!
//! A notification goes to every channel routed for its topic, concurrently.
//! One channel failing never stops the others, and nothing is propagated to
//! the caller beyond the [`DeliveryReport`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::traits::{Notification, Notifier, Topic};

/// Outcome of one [`Dispatcher::dispatch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<&'static str>,
    /// `(channel, error)` pairs.
    pub failed: Vec<(&'static str, String)>,
}

impl DeliveryReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<Topic, Vec<Arc<dyn Notifier>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Dispatcher::add_route`].
    pub fn route(mut self, topic: Topic, channel: Arc<dyn Notifier>) -> Self {
        self.add_route(topic, channel);
        self
    }

    /// Send `topic` notifications to `channel` as well. The same channel may
    /// be routed for several topics.
    pub fn add_route(&mut self, topic: Topic, channel: Arc<dyn Notifier>) {
        self.routes.entry(topic).or_default().push(channel);
    }

    /// Channel labels routed for `topic`, in routing order.
    pub fn channels(&self, topic: Topic) -> Vec<&'static str> {
        self.routes
            .get(&topic)
            .map(|channels| channels.iter().map(|c| c.name()).collect())
            .unwrap_or_default()
    }

    pub async fn dispatch(&self, notification: &Notification) -> DeliveryReport {
        let topic = notification.topic;
        let Some(channels) = self.routes.get(&topic).filter(|c| !c.is_empty()) else {
            debug!(?topic, "No channel routed, notification dropped");
            return DeliveryReport::default();
        };

        let sends = channels.iter().map(|channel| async move {
            let start = Instant::now();
            let result = channel.send(notification).await;
            (channel.name(), result, start.elapsed().as_millis() as u64)
        });

        let mut report = DeliveryReport::default();
        for (channel, result, duration_ms) in join_all(sends).await {
            match result {
                Ok(()) => {
                    info!(?topic, channel, duration_ms, "Notification delivered");
                    report.delivered.push(channel);
                }
                Err(e) => {
                    warn!(?topic, channel, duration_ms, error = %e, "Notification delivery failed");
                    report.failed.push((channel, e.to_string()));
                }
            }
        }
        report
    }
}
