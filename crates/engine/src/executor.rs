use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use common::{is_tradable_price, ExchangeClient, Fill, Order, Position, PositionSide, Result};

/// Places entry and exit orders for one symbol.
///
/// This is the ONLY component that calls `ExchangeClient::submit_order` and
/// `ExchangeClient::close_position`.
pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    symbol: String,
}

impl OrderExecutor {
    pub fn new(client: Arc<dyn ExchangeClient>, symbol: impl Into<String>) -> Self {
        Self {
            client,
            symbol: symbol.into(),
        }
    }

    pub fn client(&self) -> &Arc<dyn ExchangeClient> {
        &self.client
    }

    /// Place a market entry order and build the position from its fill.
    ///
    /// The entry price is the reported fill price, else a fresh ticker
    /// query, else `fallback_price`.
    pub async fn open(
        &self,
        side: PositionSide,
        quantity: f64,
        fallback_price: f64,
        now: DateTime<Utc>,
    ) -> Result<Position> {
        let order = Order::market(&self.symbol, side.entry_order_side(), quantity);
        info!(symbol = %order.symbol, side = %order.side, qty = order.quantity, "Executing entry order");

        let fill = self.client.submit_order(&order).await.map_err(|e| {
            error!(symbol = %order.symbol, error = %e, "Entry order failed");
            e
        })?;

        let entry_price = match fill.fill_price.filter(|p| is_tradable_price(*p)) {
            Some(price) => price,
            None => match self.client.current_price(&self.symbol).await {
                Ok(price) if is_tradable_price(price) => price,
                Ok(price) => {
                    warn!(price, fallback = fallback_price, "Ticker price unusable, using cycle price");
                    fallback_price
                }
                Err(e) => {
                    warn!(error = %e, fallback = fallback_price, "No fill price, using cycle price");
                    fallback_price
                }
            },
        };

        info!(
            symbol = %fill.symbol,
            order_id = %fill.order_id,
            side = %side,
            price = entry_price,
            qty = fill.quantity,
            "Position opened"
        );

        Ok(Position {
            symbol: self.symbol.clone(),
            side,
            size: fill.quantity,
            entry_price,
            opened_at: now,
            order_id: fill.order_id,
        })
    }

    /// Flatten a position with an opposite-side market order.
    pub async fn close(&self, position: &Position) -> Result<Fill> {
        info!(
            symbol = %position.symbol,
            side = %position.side,
            qty = position.size,
            order_id = %position.order_id,
            "Executing exit order"
        );
        match self
            .client
            .close_position(&position.symbol, position.side, position.size)
            .await
        {
            Ok(fill) => {
                info!(symbol = %fill.symbol, order_id = %fill.order_id, "Position closed");
                Ok(fill)
            }
            Err(e) => {
                error!(symbol = %position.symbol, error = %e, "Exit order failed");
                Err(e)
            }
        }
    }
}
