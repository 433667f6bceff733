//! Human-readable trail: `log_and_publish` and `error_publish`
//!
//! Each call emits a tracing event, queues the line for the matching log
//! file and forwards it to the message bus. Normal lines also become the
//! current on-screen status text.

use crate::host::Clock;
use crate::messaging::MessagePublisher;
use crate::queue::{LogEntry, LogQueue};
use crate::storage::{ERROR_LOG, NORMAL_LOG};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Reporter {
    queue: LogQueue,
    publisher: Arc<dyn MessagePublisher>,
    clock: Arc<dyn Clock>,
    status: Arc<watch::Sender<String>>,
    log_topic: String,
    error_topic: String,
}

impl Reporter {
    pub fn new(
        queue: LogQueue,
        publisher: Arc<dyn MessagePublisher>,
        clock: Arc<dyn Clock>,
        log_topic: String,
        error_topic: String,
    ) -> Self {
        let (status, _) = watch::channel(String::new());
        Self {
            queue,
            publisher,
            clock,
            status: Arc::new(status),
            log_topic,
            error_topic,
        }
    }

    pub fn log_and_publish(&self, message: &str) {
        info!(target: "dashfeed::trail", "{message}");
        self.forward(NORMAL_LOG, &self.log_topic, message, false);
        self.status.send_replace(message.to_string());
    }

    pub fn error_publish(&self, message: &str) {
        warn!(target: "dashfeed::trail", "{message}");
        self.forward(ERROR_LOG, &self.error_topic, message, true);
    }

    /// Latest status line for the display
    pub fn status(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }

    fn forward(&self, log_name: &'static str, topic: &str, message: &str, retained: bool) {
        self.queue.enqueue(LogEntry {
            log_name,
            timestamp: self.clock.now().timestamp(),
            message: message.to_string(),
        });
        if let Err(e) = self.publisher.publish(topic, message, retained) {
            debug!(topic, error = %e, "Publish skipped");
        }
    }
}
