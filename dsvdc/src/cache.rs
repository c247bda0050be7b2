//! Outstanding endpoint-initiated requests.
//!
//! Every request the endpoint sends that expects a generic response is kept
//! here until the reply arrives, the entry times out, or the connection goes
//! away. The cache only stores and expires entries; the caller runs the
//! completion it gets back.

use std::time::{Duration, Instant};

use crate::config::RESERVED_REQUEST_ID;
use crate::error::*;

#[derive(Debug)]
pub struct PendingRequest<C> {
    pub id: u32,
    pub created: Instant,
    pub completion: C,
}

#[derive(Debug)]
pub struct RequestCache<C> {
    entries: Vec<PendingRequest<C>>,
    response_timeout: Duration,
    sweep_interval: Duration,
    last_sweep: Instant,
}

impl<C> RequestCache<C> {
    pub fn new(response_timeout: Duration, sweep_interval: Duration) -> Self {
        RequestCache {
            entries: Vec::new(),
            response_timeout,
            sweep_interval,
            last_sweep: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn register(&mut self, id: u32, completion: C) -> Result<()> {
        self.register_at(id, completion, Instant::now())
    }

    pub fn register_at(&mut self, id: u32, completion: C, created: Instant) -> Result<()> {
        if id == RESERVED_REQUEST_ID {
            return Err(ErrorKind::Param("request id 0 is reserved".into()).into());
        }
        if self.contains(id) {
            return Err(ErrorKind::Param(format!("request id {} is already pending", id)).into());
        }
        self.entries.push(PendingRequest {
            id,
            created,
            completion,
        });
        Ok(())
    }

    pub fn take(&mut self, id: u32) -> Option<PendingRequest<C>> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    /// Remove the entries that will never see a reply, oldest first.
    ///
    /// While connected this runs at most once per sweep interval and returns
    /// entries older than the response timeout with [`ErrorKind::Timeout`].
    /// Without a connection every entry is returned with
    /// [`ErrorKind::NotConnected`].
    pub fn sweep(&mut self, now: Instant, connected: bool) -> Vec<(PendingRequest<C>, ErrorKind)> {
        if !connected {
            return self.flush();
        }
        if now.saturating_duration_since(self.last_sweep) < self.sweep_interval {
            return Vec::new();
        }
        self.last_sweep = now;

        let timeout = self.response_timeout;
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|e| now.saturating_duration_since(e.created) > timeout);
        self.entries = kept;
        expired
            .into_iter()
            .map(|e| (e, ErrorKind::Timeout))
            .collect()
    }

    /// Remove everything; the connection is gone.
    pub fn flush(&mut self) -> Vec<(PendingRequest<C>, ErrorKind)> {
        self.entries
            .drain(..)
            .map(|e| (e, ErrorKind::NotConnected))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);
    const INTERVAL: Duration = Duration::from_secs(20);

    #[test]
    fn test_reserved_and_duplicate_ids() {
        let mut cache = RequestCache::new(TIMEOUT, INTERVAL);
        assert!(cache.register(0, "zero").is_err());
        cache.register(1, "one").unwrap();
        assert!(cache.register(1, "again").is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_replies_in_any_order() {
        let mut cache = RequestCache::new(TIMEOUT, INTERVAL);
        for id in 1..=5u32 {
            cache.register(id, format!("arg{}", id)).unwrap();
        }
        for id in [4u32, 1, 5, 3, 2] {
            let entry = cache.take(id).unwrap();
            assert_eq!(entry.completion, format!("arg{}", id));
            assert!(cache.take(id).is_none());
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_timeout_when_connected() {
        let start = Instant::now();
        let mut cache = RequestCache::new(TIMEOUT, INTERVAL);
        cache.register_at(1, "old", start).unwrap();
        cache
            .register_at(2, "young", start + Duration::from_secs(15))
            .unwrap();

        // inside the sweep interval nothing happens
        assert!(cache.sweep(start + Duration::from_secs(11), true).is_empty());
        assert_eq!(cache.len(), 2);

        let removed = cache.sweep(start + Duration::from_secs(21), true);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0.id, 1);
        assert_eq!(removed[0].1, ErrorKind::Timeout);
        assert!(cache.contains(2));
    }

    #[test]
    fn test_sweep_flushes_when_disconnected() {
        let start = Instant::now();
        let mut cache = RequestCache::new(TIMEOUT, INTERVAL);
        cache.register_at(1, "a", start).unwrap();
        cache.register_at(2, "b", start).unwrap();

        let removed = cache.sweep(start, false);
        assert_eq!(
            removed.iter().map(|(e, _)| e.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(removed.iter().all(|(_, k)| *k == ErrorKind::NotConnected));
        assert!(cache.is_empty());
    }
}
