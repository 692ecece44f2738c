use std::collections::{HashSet, VecDeque};

#[derive(Debug)]
/// Most recent event keys, oldest evicted first once `cap` is reached.
pub(crate) struct ProcessedEventHistory {
    cap: usize,
    order: VecDeque<String>,
    index: HashSet<String>,
}

impl ProcessedEventHistory {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            index: HashSet::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Returns `false` when the key was already recorded.
    pub(crate) fn mark_processed(&mut self, key: &str) -> bool {
        if !self.index.insert(key.to_string()) {
            return false;
        }
        self.order.push_back(key.to_string());
        while self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.index.remove(&evicted);
            }
        }
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}
