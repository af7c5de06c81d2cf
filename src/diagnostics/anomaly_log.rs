//! Bounded log of recent anomalies for debug panels.

use crossbeam_queue::ArrayQueue;

use super::anomaly::Anomaly;

/// Lock-free ring of the most recent anomalies.
///
/// Pushing never blocks or allocates; when full, the oldest entry is
/// discarded.
pub struct AnomalyLog {
    queue: Option<ArrayQueue<Anomaly>>,
}

impl AnomalyLog {
    /// Create a log holding up to `capacity` entries. A capacity of zero
    /// disables the log.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: (capacity > 0).then(|| ArrayQueue::new(capacity)),
        }
    }

    /// Record an anomaly.
    #[inline]
    pub fn push(&self, anomaly: Anomaly) {
        if let Some(queue) = &self.queue {
            queue.force_push(anomaly);
        }
    }

    /// Remove and return every buffered anomaly, oldest first.
    pub fn drain(&self) -> Vec<Anomaly> {
        let mut out = Vec::new();
        if let Some(queue) = &self.queue {
            out.reserve(queue.len());
            while let Some(anomaly) = queue.pop() {
                out.push(anomaly);
            }
        }
        out
    }

    /// Number of buffered anomalies.
    pub fn len(&self) -> usize {
        self.queue.as_ref().map_or(0, ArrayQueue::len)
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered anomalies.
    pub fn capacity(&self) -> usize {
        self.queue.as_ref().map_or(0, ArrayQueue::capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::anomaly::AnomalyKind;

    fn anomaly(address: usize) -> Anomaly {
        Anomaly {
            kind: AnomalyKind::UntrackedFree,
            address,
            size: 0,
            thread_id_hash: 1,
            timestamp: 0,
        }
    }

    #[test]
    fn test_full_log_drops_oldest() {
        let log = AnomalyLog::new(2);
        log.push(anomaly(1));
        log.push(anomaly(2));
        log.push(anomaly(3));
        let drained: Vec<usize> = log.drain().iter().map(|a| a.address).collect();
        assert_eq!(drained, vec![2, 3]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_zero_capacity_disables() {
        let log = AnomalyLog::new(0);
        log.push(anomaly(1));
        assert_eq!(log.len(), 0);
        assert_eq!(log.capacity(), 0);
    }
}
