//! In-memory fleet table with per-vehicle expiry timers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use mercury_core::constants::TRACKING_TTL;
use mercury_core::types::{LocationRecord, RedactionPolicy};

/// A tracked vehicle: its latest location and the timer that will evict it.
struct TrackedEntity {
    location: LocationRecord,
    /// Distinguishes this sighting from earlier ones of the same vehicle
    generation: u64,
    timer: JoinHandle<()>,
}

impl TrackedEntity {
    fn cancel_timer(&self) {
        self.timer.abort();
    }
}

impl Drop for TrackedEntity {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

type FleetTable = HashMap<String, TrackedEntity>;

#[derive(Default)]
struct FleetCounters {
    ingested_records: AtomicU64,
    ingest_batches: AtomicU64,
    evictions: AtomicU64,
}

/// Fleet cache configuration.
#[derive(Clone, Debug)]
pub struct FleetConfig {
    /// How long a vehicle stays tracked after its last sighting
    pub ttl: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self { ttl: TRACKING_TTL }
    }
}

/// Outcome of one ingest call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Vehicles seen for the first time
    pub inserted: usize,
    /// Vehicles already tracked whose location and timer were replaced
    pub refreshed: usize,
}

/// Freshness-bounded table of active vehicles.
///
/// Every entry owns a timer that removes it `ttl` after its latest
/// sighting. Membership of the table is therefore the freshness check:
/// snapshots never filter on age.
///
/// One reader/writer lock guards the table. Ingest holds the write lock for
/// a whole batch, snapshots take the read lock, and each eviction timer
/// takes the write lock from its own task.
///
/// Share it behind an `Arc` between the feed interceptor and the HTTP facade.
pub struct FleetCache {
    table: Arc<RwLock<FleetTable>>,
    config: FleetConfig,
    next_generation: AtomicU64,
    counters: Arc<FleetCounters>,
}

impl FleetCache {
    /// Creates a cache with the default two-minute TTL.
    pub fn new() -> Self {
        Self::with_config(FleetConfig::default())
    }

    /// Creates a cache with custom configuration.
    pub fn with_config(config: FleetConfig) -> Self {
        Self {
            table: Arc::new(RwLock::new(HashMap::new())),
            config,
            next_generation: AtomicU64::new(0),
            counters: Arc::new(FleetCounters::default()),
        }
    }

    /// Upserts a batch of locations keyed by bus id.
    ///
    /// A vehicle already present has its location replaced and its timer
    /// cancelled and restarted, so it expires `ttl` after this call. Within
    /// one batch the last record for a bus wins.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; eviction timers are
    /// spawned as tasks.
    pub fn ingest(&self, records: impl IntoIterator<Item = LocationRecord>) -> IngestSummary {
        let mut summary = IngestSummary::default();
        let mut table = self.table.write();

        for record in records {
            if let Some(previous) = table.remove(&record.bus_id) {
                previous.cancel_timer();
                summary.refreshed += 1;
            } else {
                summary.inserted += 1;
            }

            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let timer = self.schedule_eviction(record.bus_id.clone(), generation);
            table.insert(
                record.bus_id.clone(),
                TrackedEntity {
                    location: record,
                    generation,
                    timer,
                },
            );
        }
        drop(table);

        let total = (summary.inserted + summary.refreshed) as u64;
        self.counters.ingested_records.fetch_add(total, Ordering::Relaxed);
        self.counters.ingest_batches.fetch_add(1, Ordering::Relaxed);

        summary
    }

    /// Spawns the timer that evicts `bus_id` unless a newer sighting replaced it.
    fn schedule_eviction(&self, bus_id: String, generation: u64) -> JoinHandle<()> {
        let table: Weak<RwLock<FleetTable>> = Arc::downgrade(&self.table);
        let counters = Arc::clone(&self.counters);
        let ttl = self.config.ttl;

        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;

            let Some(table) = table.upgrade() else {
                return;
            };

            let evicted = {
                let mut table = table.write();
                match table.get(&bus_id) {
                    Some(entity) if entity.generation == generation => table.remove(&bus_id),
                    _ => None,
                }
            };

            if evicted.is_some() {
                counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(bus_id = %bus_id, "Bus expired and removed");
            }
        })
    }

    /// Returns a copy of every tracked location, in no particular order.
    pub fn snapshot(&self) -> Vec<LocationRecord> {
        self.table
            .read()
            .values()
            .map(|entity| entity.location.clone())
            .collect()
    }

    /// Returns a snapshot with the fields selected by `policy` blanked.
    pub fn snapshot_redacted(&self, policy: &RedactionPolicy) -> Vec<LocationRecord> {
        let mut locations = self.snapshot();
        if !policy.is_none() {
            locations.iter_mut().for_each(|record| policy.apply(record));
        }
        locations
    }

    /// Gets the latest location of one vehicle.
    pub fn get(&self, bus_id: &str) -> Option<LocationRecord> {
        self.table
            .read()
            .get(bus_id.trim())
            .map(|entity| entity.location.clone())
    }

    /// Returns the number of tracked vehicles.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if no vehicle is tracked.
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Returns the configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> FleetStats {
        FleetStats {
            tracked_vehicles: self.len(),
            ingested_records: self.counters.ingested_records.load(Ordering::Relaxed),
            ingest_batches: self.counters.ingest_batches.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            ttl_seconds: self.config.ttl.as_secs(),
        }
    }
}

impl Default for FleetCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Fleet cache statistics.
#[derive(Clone, Debug, Serialize)]
pub struct FleetStats {
    pub tracked_vehicles: usize,
    pub ingested_records: u64,
    pub ingest_batches: u64,
    pub evictions: u64,
    pub ttl_seconds: u64,
}
