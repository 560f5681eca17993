use std::collections::VecDeque;

/// Points kept per widget unless its render props ask for `maxPoints`.
pub const DEFAULT_HISTORY_SIZE: usize = 60;

/// Last N numeric readings of one widget, oldest first.
///
/// Lives in the event bus slot next to the latest payload, so the history
/// and the value it ends with always change together.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    limit: usize,
    points: VecDeque<f64>,
}

impl RollingWindow {
    /// A limit of zero still keeps the latest point.
    pub fn with_capacity(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            points: VecDeque::with_capacity(limit),
        }
    }

    pub fn capacity(&self) -> usize {
        self.limit
    }

    /// A widget whose `maxPoints` shrank loses its oldest points.
    pub fn set_capacity(&mut self, limit: usize) {
        self.limit = limit.max(1);
        let excess = self.points.len().saturating_sub(self.limit);
        self.points.drain(..excess);
    }

    pub fn push(&mut self, value: f64) {
        if self.points.len() == self.limit {
            self.points.pop_front();
        }
        self.points.push_back(value);
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.points.iter().copied().collect()
    }
}
