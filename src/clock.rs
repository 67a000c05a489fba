//! Time source injected into the engine.
//!
//! Accrual depends on elapsed time, so the engine never reads the wall clock
//! directly. Tests and simulations drive a [`ManualClock`]; a live deployment
//! plugs in [`SystemClock`].

use crate::types::Timestamp;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    secs: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            secs: Arc::new(AtomicI64::new(start.as_secs())),
        }
    }

    pub fn set(&self, timestamp: Timestamp) {
        self.secs.store(timestamp.as_secs(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) -> Timestamp {
        let now = self.secs.fetch_add(secs, Ordering::SeqCst) + secs;
        Timestamp::from_secs(now)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_secs(self.secs.load(Ordering::SeqCst))
    }
}
