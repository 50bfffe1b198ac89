use async_trait::async_trait;

use crate::{BrokerPosition, Fill, Order, Result};

/// Abstraction over the brokerage connection.
///
/// `PaperBroker` implements this for simulation. Only `OrderExecutor` in
/// `crates/engine` should hold a reference to a `dyn Broker`; every order
/// passes the risk gates before reaching the executor.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Submit an order and return the fill confirmation.
    async fn place_order(&self, order: &Order) -> Result<Fill>;

    /// Query current net positions held at the broker.
    async fn positions(&self) -> Result<Vec<BrokerPosition>>;

    /// Cancel a working order. Cancelling an unknown id is not an error.
    async fn cancel_order(&self, order_id: &str) -> Result<()>;
}
