use chrono::NaiveDate;

/// Price range of one trading session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionRange {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
}

/// Emitted on the first in-hours sample of a new session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionChange {
    pub date: NaiveDate,
    pub open_price: f64,
    /// The session that just ended, if one was observed.
    pub previous: Option<SessionRange>,
}

/// Captures each session's opening price and running range.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    current: Option<SessionRange>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an in-hours sample. Returns `Some` when `date` starts a new session.
    pub fn observe(&mut self, date: NaiveDate, price: f64) -> Option<SessionChange> {
        match self.current.as_mut() {
            Some(range) if range.date == date => {
                range.high = range.high.max(price);
                range.low = range.low.min(price);
                None
            }
            _ => {
                let previous = self.current.replace(SessionRange {
                    date,
                    open: price,
                    high: price,
                    low: price,
                });
                Some(SessionChange {
                    date,
                    open_price: price,
                    previous,
                })
            }
        }
    }

    pub fn current(&self) -> Option<&SessionRange> {
        self.current.as_ref()
    }

    /// Opening price of the session in progress.
    pub fn open_price(&self) -> Option<f64> {
        self.current.map(|r| r.open)
    }
}
