//! Bounded store of captured response bodies awaiting retrieval.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use parking_lot::Mutex;

#[derive(Default)]
struct StoreInner {
    bodies: HashMap<String, Bytes>,
    /// Request ids, oldest first
    order: VecDeque<String>,
}

/// Holds the most recent bodies by request id.
///
/// Once `capacity` bodies are waiting, the oldest is discarded. A body that
/// was discarded or already taken is simply gone, the same way a browser
/// forgets responses of a busy page.
pub struct BodyStore {
    inner: Mutex<StoreInner>,
    capacity: usize,
}

impl BodyStore {
    /// Creates a store retaining at most `capacity` bodies.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Stores a body, discarding the oldest ones beyond capacity.
    pub fn insert(&self, request_id: impl Into<String>, body: Bytes) {
        let request_id = request_id.into();
        let mut inner = self.inner.lock();

        if inner.bodies.insert(request_id.clone(), body).is_none() {
            inner.order.push_back(request_id);
        }
        while inner.bodies.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.bodies.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Removes and returns a body.
    pub fn take(&self, request_id: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let body = inner.bodies.remove(request_id)?;
        inner.order.retain(|id| id != request_id);
        Some(body)
    }

    /// Drops every stored body.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.bodies.clear();
        inner.order.clear();
    }

    /// Returns the number of stored bodies.
    pub fn len(&self) -> usize {
        self.inner.lock().bodies.len()
    }

    /// Returns true if no body is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
