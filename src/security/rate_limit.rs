//! Per-IP connection admission control.
//!
//! Counts live connections per client IP. A connection is admitted while its
//! IP holds fewer than `max_per_ip` slots; the slot is returned when the
//! [`Admission`] guard drops. Idle records are pruned by a periodic sweep.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::time;

use crate::config::RateLimitConfig;
use crate::lifecycle::ShutdownSignal;

/// Admission bookkeeping for one IP.
#[derive(Debug, Clone, Copy)]
struct AdmissionRecord {
    active: usize,
    last_seen: Instant,
}

/// Tracks live connection counts per client IP.
///
/// A single mutex guards the whole map; admission checks are short.
#[derive(Debug)]
pub struct RateLimiter {
    records: Mutex<HashMap<IpAddr, AdmissionRecord>>,
    max_per_ip: usize,
}

impl RateLimiter {
    pub fn new(max_per_ip: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            max_per_ip,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_connections_per_ip)
    }

    /// Try to take a connection slot for `ip`.
    /// Returns true if admitted, false if the IP is at its limit.
    pub fn allow(&self, ip: IpAddr) -> bool {
        let mut records = self.records.lock().expect("rate limiter mutex poisoned");
        let record = records.entry(ip).or_insert(AdmissionRecord {
            active: 0,
            last_seen: Instant::now(),
        });
        record.last_seen = Instant::now();

        if record.active < self.max_per_ip {
            record.active += 1;
            true
        } else {
            false
        }
    }

    /// Return a connection slot for `ip`.
    pub fn release(&self, ip: IpAddr) {
        let mut records = self.records.lock().expect("rate limiter mutex poisoned");
        if let Some(record) = records.get_mut(&ip) {
            record.active = record.active.saturating_sub(1);
            record.last_seen = Instant::now();
        }
    }

    /// Admit `ip` and hand back a guard that releases the slot on drop.
    pub fn try_admit(self: &Arc<Self>, ip: IpAddr) -> Option<Admission> {
        if self.allow(ip) {
            Some(Admission {
                limiter: Arc::clone(self),
                ip,
            })
        } else {
            None
        }
    }

    /// Drop records with no live connections that have been idle longer than
    /// `stale_after`. Returns the number of records removed.
    pub fn cleanup(&self, stale_after: Duration) -> usize {
        let mut records = self.records.lock().expect("rate limiter mutex poisoned");
        let before = records.len();
        records.retain(|_, record| record.active > 0 || record.last_seen.elapsed() < stale_after);
        before - records.len()
    }

    /// Live connections currently counted for `ip`.
    pub fn active(&self, ip: IpAddr) -> usize {
        let records = self.records.lock().expect("rate limiter mutex poisoned");
        records.get(&ip).map_or(0, |record| record.active)
    }

    /// Number of IPs with a record, live or idle.
    pub fn tracked_ips(&self) -> usize {
        self.records.lock().expect("rate limiter mutex poisoned").len()
    }

    pub fn max_per_ip(&self) -> usize {
        self.max_per_ip
    }

    /// Periodically prune stale records until shutdown.
    pub async fn run_cleanup(
        self: Arc<Self>,
        interval: Duration,
        stale_after: Duration,
        mut shutdown: ShutdownSignal,
    ) {
        let mut ticker = time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.cleanup(stale_after);
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.tracked_ips(), "Pruned idle admission records");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Admission sweeper stopping");
                    break;
                }
            }
        }
    }
}

/// A connection slot held for the lifetime of a session.
///
/// The slot is returned even if the session task panics.
#[derive(Debug)]
pub struct Admission {
    limiter: Arc<RateLimiter>,
    ip: IpAddr,
}

impl Admission {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.limiter.release(self.ip);
    }
}
