use async_trait::async_trait;

use crate::{Candle, Fill, Order, PositionSide, Result};

/// Abstraction over the exchange connection.
///
/// `BybitClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// The strategy loop never retries a failed call within a cycle; an `Err`
/// from a market-data method is treated as missing data for that cycle.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Most recent `limit` candles for `symbol`, oldest first.
    async fn candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;

    /// Get the latest traded price for a symbol.
    async fn current_price(&self, symbol: &str) -> Result<f64>;

    /// Submit a market order and return the exchange confirmation.
    async fn submit_order(&self, order: &Order) -> Result<Fill>;

    /// Flatten `quantity` of a position with an opposite-side market order.
    async fn close_position(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
    ) -> Result<Fill> {
        self.submit_order(&Order::closing(symbol, side, quantity)).await
    }

    /// Cancel every resting order on `symbol`.
    async fn cancel_all_orders(&self, symbol: &str) -> Result<()>;

    /// Available balance of `coin` in the trading account.
    async fn wallet_balance(&self, coin: &str) -> Result<f64>;
}
