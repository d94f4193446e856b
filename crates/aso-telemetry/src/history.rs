//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Bounded, append-only sample history owned by the bus."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;

use crate::sample::Sample;

/// Default number of samples retained by the bus.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Ring buffer of the most recent samples, oldest first.
#[derive(Debug, Clone)]
pub struct History {
    samples: VecDeque<Arc<Sample>>,
    capacity: usize,
    appended: u64,
}

impl History {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            appended: 0,
        }
    }

    pub fn push(&mut self, sample: Arc<Sample>) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.appended += 1;
    }

    /// The last `count` samples, oldest first.
    pub fn recent(&self, count: usize) -> Vec<Arc<Sample>> {
        let skip = self.samples.len().saturating_sub(count);
        self.samples.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<Arc<Sample>> {
        self.samples.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Arc<Sample>> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of samples ever appended, including evicted ones.
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Status;

    fn sample(description: &str) -> Arc<Sample> {
        Arc::new(
            Sample::builder(Status::Optimal)
                .description(description)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut history = History::with_capacity(3);
        for i in 0..5 {
            history.push(sample(&format!("s{}", i)));
        }
        let kept: Vec<_> = history
            .snapshot()
            .iter()
            .map(|s| s.description().to_owned())
            .collect();
        assert_eq!(kept, ["s2", "s3", "s4"]);
        assert_eq!(history.appended(), 5);
        assert_eq!(history.latest().unwrap().description(), "s4");
    }

    #[test]
    fn recent_returns_tail_oldest_first() {
        let mut history = History::with_capacity(10);
        for i in 0..4 {
            history.push(sample(&format!("s{}", i)));
        }
        let tail: Vec<_> = history
            .recent(2)
            .iter()
            .map(|s| s.description().to_owned())
            .collect();
        assert_eq!(tail, ["s2", "s3"]);
        assert_eq!(history.recent(20).len(), 4);
    }
}
