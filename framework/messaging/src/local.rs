use crate::bus::{dispatch, Endpoint, Message, MessageContext, NotificationBus, Subscription};
use crate::payload::Fields;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Sender;
use yardstick_core::prelude::AbortHandle;

const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// In-process notification bus.
///
/// Each topic is a broadcast channel so every subscriber sees every message published while it
/// is listening. Listeners run as tasks on the runtime the bus was created with.
pub struct LocalBus {
    runtime: Handle,
    capacity: usize,
    topics: Mutex<HashMap<String, Sender<Arc<Message>>>>,
}

impl LocalBus {
    pub fn new(runtime: Handle) -> Self {
        Self::with_capacity(runtime, DEFAULT_TOPIC_CAPACITY)
    }

    /// A listener that falls more than `capacity` messages behind skips the oldest ones.
    pub fn with_capacity(runtime: Handle, capacity: usize) -> Self {
        Self {
            runtime,
            capacity: capacity.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn topic_sender(&self, topic: &str) -> Sender<Arc<Message>> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| tokio::sync::broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl NotificationBus for LocalBus {
    fn publish(&self, topic: &str, context: MessageContext, method: &str, payload: Fields) {
        let message = Arc::new(Message {
            topic: topic.to_string(),
            context,
            method: method.to_string(),
            payload,
        });

        if self.topic_sender(topic).send(message).is_err() {
            log::trace!("No subscribers on {} for {}", topic, method);
        }
    }

    fn subscribe(
        &self,
        topic: &str,
        endpoints: Vec<Arc<dyn Endpoint>>,
    ) -> anyhow::Result<Subscription> {
        let mut receiver = self.topic_sender(topic).subscribe();
        let stop = AbortHandle::new();
        let stop_listener = stop.new_listener();
        let topic_name = topic.to_string();

        self.runtime.spawn(async move {
            loop {
                select! {
                    _ = stop_listener.wait_for_abort() => {
                        log::debug!("Listener on {} shutting down", topic_name);
                        break;
                    }
                    message = receiver.recv() => {
                        match message {
                            Ok(message) => dispatch(&endpoints, &message),
                            Err(RecvError::Lagged(skipped)) => {
                                log::warn!("Listener on {} skipped {} messages", topic_name, skipped);
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(topic, stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    struct Collect {
        seen: Arc<Mutex<Vec<(u32, String)>>>,
    }

    impl Endpoint for Collect {
        fn methods(&self) -> &[&'static str] {
            &["ping", "fail"]
        }

        fn handle(
            &self,
            method: &str,
            context: &MessageContext,
            _payload: Fields,
        ) -> anyhow::Result<()> {
            if method == "fail" {
                anyhow::bail!("Endpoint refused the message");
            }
            self.seen.lock().push((context.pid, method.to_string()));
            Ok(())
        }
    }

    fn wait_for(seen: &Arc<Mutex<Vec<(u32, String)>>>, count: usize) -> bool {
        for _ in 0..200 {
            if seen.lock().len() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn fanout_to_every_subscriber_and_survive_endpoint_errors() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let bus = LocalBus::new(runtime.handle().clone());

        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        let _a = bus
            .subscribe("topic", vec![Arc::new(Collect { seen: first.clone() })])
            .unwrap();
        let _b = bus
            .subscribe("topic", vec![Arc::new(Collect { seen: second.clone() })])
            .unwrap();

        let mut payload = Fields::new();
        payload.insert("value".to_string(), json!(1));
        bus.publish("topic", MessageContext::new(1), "fail", payload.clone());
        bus.publish("topic", MessageContext::new(2), "ignored", payload.clone());
        bus.publish("topic", MessageContext::new(3), "ping", payload.clone());
        bus.publish("other", MessageContext::new(4), "ping", payload);

        assert!(wait_for(&first, 1));
        assert!(wait_for(&second, 1));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*first.lock(), vec![(3, "ping".to_string())]);
        assert_eq!(*second.lock(), vec![(3, "ping".to_string())]);
    }

    #[test]
    fn closed_subscription_stops_receiving() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let bus = LocalBus::new(runtime.handle().clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscription = bus
            .subscribe("topic", vec![Arc::new(Collect { seen: seen.clone() })])
            .unwrap();
        assert_eq!(subscription.topic(), "topic");

        bus.publish("topic", MessageContext::new(1), "ping", Fields::new());
        assert!(wait_for(&seen, 1));

        subscription.close();
        std::thread::sleep(Duration::from_millis(50));
        bus.publish("topic", MessageContext::new(2), "ping", Fields::new());
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(seen.lock().len(), 1);
    }
}
