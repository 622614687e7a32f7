use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Candle, Error, ExchangeClient, Fill, Order, OrderSide, Result};

/// Coin the simulated balance is held in.
const QUOTE_COIN: &str = "USDT";

/// Candles kept per symbol; older ones are dropped.
pub const MAX_CANDLE_HISTORY: usize = 1_000;

/// Most recent fills kept in the ledger.
pub const MAX_FILL_HISTORY: usize = 10_000;

/// Simulated exchange client for paper trading.
///
/// Fills are simulated at the latest known price with configurable slippage.
/// Market data comes from an optional feed (usually a credential-less
/// `BybitClient`) or from candles and prices pushed in by the caller.
/// No real orders are ever sent.
pub struct PaperClient {
    /// Simulated cash balance in USDT.
    balance_usd: Arc<RwLock<f64>>,
    /// Latest known price per symbol.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    /// Locally supplied candle history per symbol, oldest first.
    candles: Arc<RwLock<HashMap<String, Vec<Candle>>>>,
    /// Every simulated fill, in order.
    fills: Arc<RwLock<Vec<Fill>>>,
    feed: Option<Arc<dyn ExchangeClient>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

impl PaperClient {
    pub fn new(initial_balance_usd: f64, slippage_bps: f64) -> Self {
        info!(
            balance = initial_balance_usd,
            slippage_bps = slippage_bps,
            "PaperClient initialized"
        );
        Self {
            balance_usd: Arc::new(RwLock::new(initial_balance_usd)),
            prices: Arc::new(RwLock::new(HashMap::new())),
            candles: Arc::new(RwLock::new(HashMap::new())),
            fills: Arc::new(RwLock::new(Vec::new())),
            feed: None,
            slippage_bps,
        }
    }

    /// Read candles and prices from `feed` instead of local data.
    pub fn with_feed(mut self, feed: Arc<dyn ExchangeClient>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Update the latest price for a symbol.
    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Append a candle; its close becomes the latest price.
    pub async fn push_candle(&self, symbol: &str, candle: Candle) {
        self.update_price(symbol, candle.close).await;
        let mut candles = self.candles.write().await;
        let history = candles.entry(symbol.to_string()).or_default();
        history.push(candle);
        trim_front(history, MAX_CANDLE_HISTORY);
    }

    pub async fn balance(&self) -> f64 {
        *self.balance_usd.read().await
    }

    pub async fn fills(&self) -> Vec<Fill> {
        self.fills.read().await.clone()
    }

    async fn latest_price(&self, symbol: &str) -> Result<f64> {
        self.prices
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::Exchange(format!("No price available for {symbol}")))
    }
}

fn trim_front<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        if let Some(feed) = &self.feed {
            return feed.candles(symbol, interval, limit).await;
        }
        let candles = self.candles.read().await;
        let history = candles.get(symbol).map(Vec::as_slice).unwrap_or_default();
        Ok(history[history.len().saturating_sub(limit)..].to_vec())
    }

    async fn current_price(&self, symbol: &str) -> Result<f64> {
        if let Some(feed) = &self.feed {
            let price = feed.current_price(symbol).await?;
            self.update_price(symbol, price).await;
            return Ok(price);
        }
        self.latest_price(symbol).await
    }

    async fn submit_order(&self, order: &Order) -> Result<Fill> {
        let mid_price = self.latest_price(&order.symbol).await.map_err(|_| {
            Error::Exchange(format!(
                "PaperClient has no price for '{}'. Ensure market data is flowing.",
                order.symbol
            ))
        })?;

        // Apply slippage: buys pay more, sells receive less
        let fill_price = match order.side {
            OrderSide::Buy => mid_price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid_price * (1.0 - self.slippage_bps / 10_000.0),
        };

        let notional = fill_price * order.quantity;
        {
            let mut balance = self.balance_usd.write().await;
            match order.side {
                OrderSide::Buy => *balance -= notional,
                OrderSide::Sell => *balance += notional,
            }
        }

        debug!(
            symbol = %order.symbol,
            side = %order.side,
            mid = mid_price,
            fill = fill_price,
            qty = order.quantity,
            reduce_only = order.reduce_only,
            "Paper fill simulated"
        );

        let fill = Fill {
            order_id: order.link_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            fill_price: Some(fill_price),
            quantity: order.quantity,
            timestamp: Utc::now(),
        };
        {
            let mut fills = self.fills.write().await;
            fills.push(fill.clone());
            trim_front(&mut fills, MAX_FILL_HISTORY);
        }

        Ok(fill)
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        // Paper orders fill immediately; nothing ever rests.
        debug!(symbol = %symbol, "Paper cancel-all (no resting orders)");
        Ok(())
    }

    async fn wallet_balance(&self, coin: &str) -> Result<f64> {
        if coin == QUOTE_COIN {
            Ok(self.balance().await)
        } else {
            Ok(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::PositionSide;

    fn candle(close: f64, minute: u32) -> Candle {
        Candle {
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
            start_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn paper_buy_fill_applies_positive_slippage() {
        let client = PaperClient::new(10_000.0, 10.0); // 10 bps
        client.update_price("BTCUSDT", 1000.0).await;

        let order = Order::market("BTCUSDT", OrderSide::Buy, 0.01);
        let fill = client.submit_order(&order).await.unwrap();

        let expected = 1000.0 * (1.0 + 10.0 / 10_000.0);
        let price = fill.fill_price.unwrap();
        assert!(
            (price - expected).abs() < 1e-6,
            "Buy fill price {price}, expected {expected}"
        );
        assert_eq!(fill.order_id, order.link_id);
    }

    #[tokio::test]
    async fn paper_close_of_long_sells_with_negative_slippage() {
        let client = PaperClient::new(10_000.0, 10.0);
        client.update_price("BTCUSDT", 1000.0).await;

        let fill = client
            .close_position("BTCUSDT", PositionSide::Long, 0.01)
            .await
            .unwrap();

        assert_eq!(fill.side, OrderSide::Sell);
        let expected = 1000.0 * (1.0 - 10.0 / 10_000.0);
        assert!((fill.fill_price.unwrap() - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn paper_order_without_price_fails() {
        let client = PaperClient::new(10_000.0, 0.0);
        let order = Order::market("ETHUSDT", OrderSide::Buy, 1.0);
        assert!(client.submit_order(&order).await.is_err());
        assert!(client.fills().await.is_empty());
    }

    #[tokio::test]
    async fn paper_balance_tracks_round_trip() {
        let client = PaperClient::new(10_000.0, 0.0);
        client.update_price("ETHUSDT", 500.0).await;
        client
            .submit_order(&Order::market("ETHUSDT", OrderSide::Buy, 2.0))
            .await
            .unwrap();
        assert!((client.wallet_balance("USDT").await.unwrap() - 9_000.0).abs() < 1e-9);

        client.update_price("ETHUSDT", 510.0).await;
        client
            .close_position("ETHUSDT", PositionSide::Long, 2.0)
            .await
            .unwrap();
        assert!((client.balance().await - 10_020.0).abs() < 1e-9);
        assert_eq!(client.wallet_balance("BTC").await.unwrap(), 0.0);
        assert_eq!(client.fills().await.len(), 2);
    }

    #[tokio::test]
    async fn candles_return_most_recent_window() {
        let client = PaperClient::new(10_000.0, 0.0);
        for (i, close) in [100.0, 101.0, 102.0, 103.0].into_iter().enumerate() {
            client.push_candle("BTCUSDT", candle(close, i as u32)).await;
        }

        let window = client.candles("BTCUSDT", "1", 2).await.unwrap();
        assert_eq!(window.iter().map(|c| c.close).collect::<Vec<_>>(), vec![102.0, 103.0]);
        assert_eq!(client.current_price("BTCUSDT").await.unwrap(), 103.0);
        assert!(client.candles("ETHUSDT", "1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn candle_history_is_bounded() {
        let client = PaperClient::new(10_000.0, 0.0);
        for i in 0..MAX_CANDLE_HISTORY + 5 {
            client.push_candle("BTCUSDT", candle(i as f64, 0)).await;
        }

        let history = client.candles("BTCUSDT", "1", usize::MAX).await.unwrap();
        assert_eq!(history.len(), MAX_CANDLE_HISTORY);
        assert_eq!(history[0].close, 5.0);
        assert_eq!(history[MAX_CANDLE_HISTORY - 1].close, (MAX_CANDLE_HISTORY + 4) as f64);
    }

    #[test]
    fn trim_front_drops_oldest() {
        let mut items = vec![1, 2, 3, 4, 5];
        trim_front(&mut items, 3);
        assert_eq!(items, vec![3, 4, 5]);
        trim_front(&mut items, 10);
        assert_eq!(items, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn feed_supplies_market_data() {
        let feed = Arc::new(PaperClient::new(0.0, 0.0));
        feed.push_candle("BTCUSDT", candle(250.0, 0)).await;

        let client = PaperClient::new(10_000.0, 0.0).with_feed(feed);
        assert_eq!(client.current_price("BTCUSDT").await.unwrap(), 250.0);
        assert_eq!(client.candles("BTCUSDT", "1", 5).await.unwrap().len(), 1);

        // The fed price is cached for simulated fills.
        let fill = client
            .submit_order(&Order::market("BTCUSDT", OrderSide::Buy, 1.0))
            .await
            .unwrap();
        assert_eq!(fill.fill_price, Some(250.0));
    }
}
