use std::collections::VecDeque;

/// Simple moving average over the last `len` samples.
///
/// `value()` is `None` until the window holds exactly `len` samples.
#[derive(Debug, Clone)]
pub struct RollingSma {
    len: usize,
    window: VecDeque<f64>,
}

impl RollingSma {
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "SMA window length must be positive");
        Self {
            len,
            window: VecDeque::with_capacity(len),
        }
    }

    pub fn push(&mut self, price: f64) {
        self.window.push_back(price);
        while self.window.len() > self.len {
            self.window.pop_front();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.window.len() >= self.len
    }

    pub fn value(&self) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.len as f64)
    }

    /// Samples currently held.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Configured window length.
    pub fn capacity(&self) -> usize {
        self.len
    }
}
