//! Resource tracker: free/used cores and GPUs of the allocation.
//!
//! Availability of both axes is packed into one `AtomicU64` (cores in the
//! high half, GPUs in the low half) so `reserve` and `release` are a single
//! compare-and-swap over both. Every update is visible to the next
//! `snapshot()`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{Demand, ResourceSnapshot};
use crate::error::ResourceError;

fn pack(d: Demand) -> u64 {
    ((d.cores as u64) << 32) | d.gpus as u64
}

fn unpack(v: u64) -> Demand {
    Demand {
        cores: (v >> 32) as u32,
        gpus: v as u32,
    }
}

#[derive(Debug)]
pub struct ResourceTracker {
    total: Demand,
    available: AtomicU64,
}

impl ResourceTracker {
    /// A tracker with everything free.
    pub fn new(total: Demand) -> Self {
        Self {
            total,
            available: AtomicU64::new(pack(total)),
        }
    }

    pub fn total(&self) -> Demand {
        self.total
    }

    pub fn available(&self) -> Demand {
        unpack(self.available.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            total: self.total,
            available: self.available(),
        }
    }

    /// Take `demand` out of the free pool, all or nothing.
    pub fn reserve(&self, demand: Demand) -> Result<ResourceSnapshot, ResourceError> {
        let result = self
            .available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let free = unpack(current);
                demand.fits_within(free).then(|| {
                    pack(Demand {
                        cores: free.cores - demand.cores,
                        gpus: free.gpus - demand.gpus,
                    })
                })
            });

        match result {
            Ok(previous) => {
                let free = unpack(previous);
                Ok(ResourceSnapshot {
                    total: self.total,
                    available: Demand {
                        cores: free.cores - demand.cores,
                        gpus: free.gpus - demand.gpus,
                    },
                })
            }
            Err(current) => Err(ResourceError::Insufficient {
                requested: demand,
                available: unpack(current),
            }),
        }
    }

    /// Give `demand` back. Availability is clamped to the total; a release
    /// that had to be clamped is reported as `OverRelease`.
    pub fn release(&self, demand: Demand) -> Result<ResourceSnapshot, ResourceError> {
        let total = self.total;
        let mut clamped = false;
        let previous = self
            .available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let free = unpack(current);
                let cores = free.cores.saturating_add(demand.cores);
                let gpus = free.gpus.saturating_add(demand.gpus);
                clamped = cores > total.cores || gpus > total.gpus;
                Some(pack(Demand {
                    cores: cores.min(total.cores),
                    gpus: gpus.min(total.gpus),
                }))
            })
            .unwrap_or_else(|v| v);

        if clamped {
            return Err(ResourceError::OverRelease {
                released: demand,
                total,
            });
        }

        let free = unpack(previous);
        Ok(ResourceSnapshot {
            total,
            available: Demand {
                cores: free.cores + demand.cores,
                gpus: free.gpus + demand.gpus,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reserve_and_release_update_snapshot_immediately() {
        let tracker = ResourceTracker::new(Demand::new(4, 1));

        let after = tracker.reserve(Demand::new(3, 1)).unwrap();
        assert_eq!(after.available, Demand::new(1, 0));
        assert_eq!(tracker.snapshot().available, Demand::new(1, 0));
        assert_eq!(tracker.snapshot().reserved(), Demand::new(3, 1));

        tracker.release(Demand::new(3, 1)).unwrap();
        assert_eq!(tracker.available(), Demand::new(4, 1));
    }

    #[test]
    fn reserve_is_all_or_nothing() {
        let tracker = ResourceTracker::new(Demand::new(4, 1));

        let err = tracker.reserve(Demand::new(1, 2)).unwrap_err();
        assert_eq!(
            err,
            ResourceError::Insufficient {
                requested: Demand::new(1, 2),
                available: Demand::new(4, 1),
            }
        );
        // cores were not touched even though they would have fit
        assert_eq!(tracker.available(), Demand::new(4, 1));
    }

    #[test]
    fn double_release_is_clamped_and_reported() {
        let tracker = ResourceTracker::new(Demand::new(2, 0));
        tracker.reserve(Demand::new(1, 0)).unwrap();
        tracker.release(Demand::new(1, 0)).unwrap();

        let err = tracker.release(Demand::new(1, 0)).unwrap_err();
        assert!(matches!(err, ResourceError::OverRelease { .. }));
        assert_eq!(tracker.available(), Demand::new(2, 0));
    }

    #[test]
    fn concurrent_reservations_never_overcommit() {
        let tracker = Arc::new(ResourceTracker::new(Demand::new(64, 0)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| tracker.reserve(Demand::new(1, 0)).is_ok())
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 64);
        assert_eq!(tracker.available(), Demand::ZERO);
    }
}
