use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::{Broker, BrokerPosition, Error, Fill, Order, OrderSide, Result};

/// Simulated broker for paper trading.
///
/// Orders fill at their mark price with configurable slippage. Nothing is
/// ever sent to a real brokerage.
pub struct PaperBroker {
    /// Net position per symbol.
    positions: Arc<RwLock<HashMap<String, BrokerPosition>>>,
    /// Order ids passed to `cancel_order`, in call order.
    cancelled: Arc<RwLock<Vec<String>>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    /// Simulated round-trip delay before a fill is returned.
    latency: Option<Duration>,
    /// Number of upcoming orders to reject.
    fail_next: AtomicU32,
    placed: AtomicU32,
}

impl PaperBroker {
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps = slippage_bps, "PaperBroker initialized");
        Self {
            positions: Arc::new(RwLock::new(HashMap::new())),
            cancelled: Arc::new(RwLock::new(Vec::new())),
            slippage_bps,
            latency: None,
            fail_next: AtomicU32::new(0),
            placed: AtomicU32::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject the next `n` orders with a broker error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of `place_order` calls received, including rejected ones.
    pub fn orders_placed(&self) -> u32 {
        self.placed.load(Ordering::SeqCst)
    }

    pub async fn cancelled_orders(&self) -> Vec<String> {
        self.cancelled.read().await.clone()
    }

    fn fill_price(&self, order: &Order) -> f64 {
        // Buys pay more, sells receive less
        match order.side {
            OrderSide::Buy => order.mark_price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => order.mark_price * (1.0 - self.slippage_bps / 10_000.0),
        }
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn place_order(&self, order: &Order) -> Result<Fill> {
        self.placed.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.take_failure() {
            warn!(order_id = %order.id, symbol = %order.symbol, "Paper order rejected (injected failure)");
            return Err(Error::Broker(format!("simulated rejection of order {}", order.id)));
        }
        if !(order.mark_price.is_finite() && order.mark_price > 0.0) {
            return Err(Error::Broker(format!(
                "PaperBroker has no usable mark price for order {} ({})",
                order.id, order.mark_price
            )));
        }
        if order.quantity == 0 {
            return Err(Error::Broker("order quantity must be at least 1".into()));
        }

        let fill_price = self.fill_price(order);
        debug!(
            symbol = %order.symbol,
            side = %order.side,
            mark = order.mark_price,
            fill = fill_price,
            qty = order.quantity,
            "Paper fill simulated"
        );

        let signed = match order.side {
            OrderSide::Buy => order.quantity as i64,
            OrderSide::Sell => -(order.quantity as i64),
        };

        // Update in-memory net position ledger
        let mut positions = self.positions.write().await;
        let entry = positions.entry(order.symbol.clone()).or_insert_with(|| BrokerPosition {
            symbol: order.symbol.clone(),
            net_quantity: 0,
            average_price: 0.0,
        });
        let before = entry.net_quantity;
        let after = before + signed;
        if before == 0 || ((before > 0) != (after > 0) && after != 0) {
            // Opened or flipped
            entry.average_price = fill_price;
        } else if before.signum() == signed.signum() {
            // Added to the same side
            entry.average_price =
                (entry.average_price * before.abs() as f64 + fill_price * signed.abs() as f64) / after.abs() as f64;
        }
        entry.net_quantity = after;
        if after == 0 {
            positions.remove(&order.symbol);
        }

        Ok(Fill {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            fill_price,
            quantity: order.quantity,
            timestamp: order.created_at,
        })
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>> {
        Ok(self.positions.read().await.values().cloned().collect())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        debug!(order_id = %order_id, "Paper cancel");
        self.cancelled.write().await.push(order_id.to_string());
        Ok(())
    }
}
