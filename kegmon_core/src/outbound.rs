//! Bounded hand-off to publishers (MQTT, HTTP push, display).
//!
//! The pipeline never blocks on a slow consumer: when the queue is full the
//! oldest message is discarded to make room for the newest.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel as xch;

use crate::status::DeviceStatus;
use crate::types::{KegEvent, LevelReading, PourEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Level(LevelReading),
    Pour(PourEvent),
    Keg(KegEvent),
    Status(DeviceStatus),
}

#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: xch::Sender<OutboundMessage>,
    // Held so the producer can pop the oldest message when full.
    rx: xch::Receiver<OutboundMessage>,
    dropped: Arc<AtomicU64>,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = xch::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn push(&self, msg: OutboundMessage) {
        let mut msg = msg;
        loop {
            match self.tx.try_send(msg) {
                Ok(()) => return,
                Err(xch::TrySendError::Full(back)) => {
                    // A consumer may drain concurrently; either way there is room on retry.
                    if self.rx.try_recv().is_ok() {
                        let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if n.is_power_of_two() {
                            tracing::warn!(dropped = n, "outbound queue full; dropping oldest");
                        }
                    }
                    msg = back;
                }
                // Unreachable while `self.rx` is alive.
                Err(xch::TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Receiving end for a consumer. All subscribers share one queue.
    pub fn subscriber(&self) -> xch::Receiver<OutboundMessage> {
        self.rx.clone()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}
