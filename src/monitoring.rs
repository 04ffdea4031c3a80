use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Error,
    Metric,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorEvent {
    pub kind: EventKind,
    pub name: String,
    pub code: Option<String>,
    pub message: Option<String>,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub max_events: usize,
    pub batch_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_events: 100,
            batch_size: 20,
        }
    }
}

/// Destination for flushed event batches
#[async_trait]
pub trait MonitorSink: Send + Sync {
    async fn send(&self, batch: &[MonitorEvent]) -> Result<()>;
}

/// Sink that writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl MonitorSink for TracingSink {
    async fn send(&self, batch: &[MonitorEvent]) -> Result<()> {
        for event in batch {
            match event.kind {
                EventKind::Error => warn!(
                    source = %event.name,
                    code = event.code.as_deref().unwrap_or("UNKNOWN"),
                    "{}",
                    event.message.as_deref().unwrap_or("")
                ),
                EventKind::Metric => info!(
                    metric = %event.name,
                    value = event.value.unwrap_or_default(),
                    "metric recorded"
                ),
            }
        }
        Ok(())
    }
}

/// Bounded in-memory queue of error and metric events, flushed in batches.
/// When full, the oldest event is evicted.
#[derive(Clone)]
pub struct Monitor {
    events: Arc<Mutex<VecDeque<MonitorEvent>>>,
    evicted: Arc<AtomicU64>,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(config.max_events))),
            evicted: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    pub fn record_error(&self, name: &str, error: &Error) {
        self.push(MonitorEvent {
            kind: EventKind::Error,
            name: name.to_string(),
            code: Some(error.error_code().to_string()),
            message: Some(error.to_string()),
            value: None,
            timestamp: Utc::now(),
        });
    }

    pub fn record_metric(&self, name: &str, value: f64) {
        self.push(MonitorEvent {
            kind: EventKind::Metric,
            name: name.to_string(),
            code: None,
            message: None,
            value: Some(value),
            timestamp: Utc::now(),
        });
    }

    fn push(&self, event: MonitorEvent) {
        if self.config.max_events == 0 {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut events = self.events.lock();
        while events.len() >= self.config.max_events {
            events.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
    }

    /// Hand the oldest `batch_size` events to `sink`. A failed batch goes
    /// back to the front of the queue.
    pub async fn flush(&self, sink: &dyn MonitorSink) -> Result<usize> {
        let batch: Vec<MonitorEvent> = {
            let mut events = self.events.lock();
            let count = self.config.batch_size.max(1).min(events.len());
            events.drain(..count).collect()
        };

        if batch.is_empty() {
            return Ok(0);
        }

        match sink.send(&batch).await {
            Ok(()) => Ok(batch.len()),
            Err(e) => {
                let mut events = self.events.lock();
                for event in batch.into_iter().rev() {
                    if events.len() >= self.config.max_events {
                        self.evicted.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    events.push_front(event);
                }
                Err(e)
            }
        }
    }

    /// Flush until the queue is empty or the sink fails
    pub async fn flush_all(&self, sink: &dyn MonitorSink) -> Result<usize> {
        let mut total = 0;
        loop {
            match self.flush(sink).await? {
                0 => return Ok(total),
                sent => total += sent,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Events lost to the size bound so far
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}
