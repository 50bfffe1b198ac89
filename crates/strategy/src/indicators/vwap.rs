use std::collections::VecDeque;

/// Volume-weighted average price over the last `len` samples.
///
/// VWAP = Σ(price × volume) / Σ(volume). A window with zero total volume
/// leaves the previous value in place.
#[derive(Debug, Clone)]
pub struct RollingVwap {
    len: usize,
    /// (volume, price × volume)
    window: VecDeque<(f64, f64)>,
    value: Option<f64>,
}

impl RollingVwap {
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "VWAP window length must be positive");
        Self {
            len,
            window: VecDeque::with_capacity(len),
            value: None,
        }
    }

    pub fn push(&mut self, price: f64, volume: f64) {
        self.window.push_back((volume, price * volume));
        while self.window.len() > self.len {
            self.window.pop_front();
        }

        let (total_volume, total_pv) = self
            .window
            .iter()
            .fold((0.0, 0.0), |(v, pv), &(vol, p_v)| (v + vol, pv + p_v));
        if total_volume > 0.0 {
            self.value = Some(total_pv / total_volume);
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_prices_by_volume() {
        let mut vwap = RollingVwap::new(10);
        vwap.push(100.0, 1.0);
        vwap.push(110.0, 3.0);
        assert_eq!(vwap.value(), Some(107.5));
    }

    #[test]
    fn zero_volume_keeps_previous_value() {
        let mut vwap = RollingVwap::new(2);
        assert!(vwap.value().is_none());
        vwap.push(100.0, 0.0);
        assert!(vwap.value().is_none());

        vwap.push(105.0, 2.0);
        assert_eq!(vwap.value(), Some(105.0));

        // Window now holds only zero-volume samples
        vwap.push(120.0, 0.0);
        vwap.push(130.0, 0.0);
        assert_eq!(vwap.value(), Some(105.0));
    }

    #[test]
    fn window_is_bounded() {
        let mut vwap = RollingVwap::new(2);
        vwap.push(100.0, 1.0);
        vwap.push(200.0, 1.0);
        vwap.push(300.0, 1.0);
        assert_eq!(vwap.len(), 2);
        assert_eq!(vwap.value(), Some(250.0));
    }
}
