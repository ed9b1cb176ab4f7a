//! Transport boundary
//!
//! The bridge only sees raw JSON text: inbound batches it drains once per
//! tick and outbound batches it hands over. `QueueTransport` is the
//! in-process implementation: two append-only queues behind one mutex,
//! shared between the bridge thread and a peer (another thread, a plugin
//! callback, a test).

use crate::error::{BridgeError, BridgeResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub trait Transport {
    /// Take up to the transport's limit of raw inbound batches.
    fn receive(&mut self) -> BridgeResult<Vec<String>>;

    /// Hand one serialized outbound batch to the peer.
    fn send(&mut self, batch: String) -> BridgeResult<()>;
}

#[derive(Default)]
struct Queues {
    inbound: VecDeque<String>,
    outbound: VecDeque<String>,
}

#[derive(Clone)]
pub struct QueueTransport {
    queues: Arc<Mutex<Queues>>,
    receive_max: usize,
}

impl Default for QueueTransport {
    fn default() -> Self {
        Self::new(100)
    }
}

impl QueueTransport {
    pub fn new(receive_max: usize) -> Self {
        Self { queues: Arc::new(Mutex::new(Queues::default())), receive_max: receive_max.max(1) }
    }

    /// Peer side: queue one inbound batch.
    pub fn push_inbound(&self, batch: impl Into<String>) -> BridgeResult<()> {
        self.lock()?.inbound.push_back(batch.into());
        Ok(())
    }

    /// Peer side: take every outbound batch sent so far.
    pub fn drain_outbound(&self) -> BridgeResult<Vec<String>> {
        Ok(self.lock()?.outbound.drain(..).collect())
    }

    pub fn inbound_len(&self) -> usize {
        self.lock().map(|q| q.inbound.len()).unwrap_or(0)
    }

    fn lock(&self) -> BridgeResult<std::sync::MutexGuard<'_, Queues>> {
        self.queues.lock().map_err(|_| BridgeError::Transport("queue lock poisoned".into()))
    }
}

impl Transport for QueueTransport {
    fn receive(&mut self) -> BridgeResult<Vec<String>> {
        let mut queues = self.lock()?;
        let n = queues.inbound.len().min(self.receive_max);
        Ok(queues.inbound.drain(..n).collect())
    }

    fn send(&mut self, batch: String) -> BridgeResult<()> {
        self.lock()?.outbound.push_back(batch);
        Ok(())
    }
}
