use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::debug;

use common::{is_tradable_price, Candle, Error, ExchangeClient, Fill, Order, Result};

const MAINNET_URL: &str = "https://api.bybit.com";
const TESTNET_URL: &str = "https://api-testnet.bybit.com";
const RECV_WINDOW: &str = "5000";
/// USDT perpetuals.
const CATEGORY: &str = "linear";
const ACCOUNT_TYPE: &str = "UNIFIED";

/// REST client for the Bybit v5 API. Used for market data, order placement
/// and account queries.
pub struct BybitClient {
    api_key: String,
    secret: String,
    base_url: String,
    http: Client,
}

impl BybitClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, testnet: bool) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: if testnet { TESTNET_URL } else { MAINNET_URL }.to_string(),
            http,
        })
    }

    /// Client without credentials. Only market-data calls will succeed.
    pub fn public(testnet: bool) -> Result<Self> {
        Self::new("", "", testnet)
    }

    fn timestamp_ms() -> String {
        Utc::now().timestamp_millis().to_string()
    }

    /// Signature over `timestamp + api_key + recv_window + payload`.
    fn sign(&self, timestamp: &str, payload: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Other(format!("invalid signing key: {e}")))?;
        mac.update(timestamp.as_bytes());
        mac.update(self.api_key.as_bytes());
        mac.update(RECV_WINDOW.as_bytes());
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T> {
        let url = format!("{}{path}?{query}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        parse_envelope(&body)
    }

    async fn signed_get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T> {
        let ts = Self::timestamp_ms();
        let signature = self.sign(&ts, query)?;
        let url = format!("{}{path}?{query}", self.base_url);

        let resp = self
            .http
            .get(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", &ts)
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        parse_envelope(&body)
    }

    async fn signed_post<T: DeserializeOwned>(&self, path: &str, payload: &serde_json::Value) -> Result<T> {
        let ts = Self::timestamp_ms();
        let body = payload.to_string();
        let signature = self.sign(&ts, &body)?;
        let url = format!("{}{path}", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", &ts)
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        parse_envelope(&text)
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    async fn candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let query = format!("category={CATEGORY}&symbol={symbol}&interval={interval}&limit={limit}");
        let result: KlineResult = self.public_get("/v5/market/kline", &query).await?;
        parse_klines(result)
    }

    async fn current_price(&self, symbol: &str) -> Result<f64> {
        let query = format!("category={CATEGORY}&symbol={symbol}");
        let result: TickerResult = self.public_get("/v5/market/tickers", &query).await?;
        parse_ticker_price(&result, symbol)
    }

    async fn submit_order(&self, order: &Order) -> Result<Fill> {
        let payload = json!({
            "category": CATEGORY,
            "symbol": order.symbol,
            "side": order.side.to_string(),
            "orderType": "Market",
            "qty": order.quantity.to_string(),
            "orderLinkId": order.link_id,
            "reduceOnly": order.reduce_only,
        });

        debug!(symbol = %order.symbol, side = %order.side, qty = order.quantity, "Submitting order to Bybit");
        let resp: OrderResult = self.signed_post("/v5/order/create", &payload).await?;

        // Market order executions are reported asynchronously; the caller
        // falls back to the latest price.
        Ok(Fill {
            order_id: resp.order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            fill_price: None,
            quantity: order.quantity,
            timestamp: Utc::now(),
        })
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let payload = json!({ "category": CATEGORY, "symbol": symbol });
        let _: serde_json::Value = self.signed_post("/v5/order/cancel-all", &payload).await?;
        Ok(())
    }

    async fn wallet_balance(&self, coin: &str) -> Result<f64> {
        let query = format!("accountType={ACCOUNT_TYPE}&coin={coin}");
        let result: WalletResult = self.signed_get("/v5/account/wallet-balance", &query).await?;
        result
            .list
            .iter()
            .flat_map(|account| account.coin.iter())
            .find(|c| c.coin == coin)
            .map(|c| parse_decimal(&c.wallet_balance))
            .unwrap_or(Ok(0.0))
    }
}

// ─── Response parsing ─────────────────────────────────────────────────────────

/// Unwrap the `{ retCode, retMsg, result }` envelope every v5 endpoint uses.
fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if envelope.ret_code != 0 {
        return Err(Error::Exchange(format!(
            "retCode {}: {}",
            envelope.ret_code, envelope.ret_msg
        )));
    }
    Ok(serde_json::from_value(envelope.result)?)
}

/// Bybit returns klines newest first; candles are handed out oldest first.
fn parse_klines(result: KlineResult) -> Result<Vec<Candle>> {
    let mut candles = result
        .list
        .iter()
        .map(|row| parse_kline_row(row))
        .collect::<Result<Vec<_>>>()?;
    candles.reverse();
    Ok(candles)
}

/// Row layout: `[startTime, open, high, low, close, volume, turnover]`.
fn parse_kline_row(row: &[String]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(Error::Exchange(format!("malformed kline row: {row:?}")));
    }
    let start_ms: i64 = row[0]
        .parse()
        .map_err(|_| Error::Exchange(format!("bad kline start time: {}", row[0])))?;
    let start_time = Utc
        .timestamp_millis_opt(start_ms)
        .single()
        .ok_or_else(|| Error::Exchange(format!("kline start time out of range: {start_ms}")))?;

    Ok(Candle {
        open: parse_decimal(&row[1])?,
        high: parse_decimal(&row[2])?,
        low: parse_decimal(&row[3])?,
        close: parse_decimal(&row[4])?,
        volume: parse_decimal(&row[5])?,
        start_time,
    })
}

/// Last traded price from a ticker response. An empty or non-positive
/// `lastPrice` means the symbol has no usable price right now.
fn parse_ticker_price(result: &TickerResult, symbol: &str) -> Result<f64> {
    let ticker = result
        .list
        .first()
        .ok_or_else(|| Error::Exchange(format!("no ticker returned for {symbol}")))?;
    let price = parse_decimal(&ticker.last_price)?;
    if !is_tradable_price(price) {
        return Err(Error::Exchange(format!(
            "no valid last price for {symbol}: '{}'",
            ticker.last_price
        )));
    }
    Ok(price)
}

/// Bybit encodes numbers as strings, sometimes empty.
fn parse_decimal(raw: &str) -> Result<f64> {
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f64>()
        .map_err(|e| Error::Exchange(format!("bad number '{raw}': {e}")))
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TickerResult {
    #[serde(default)]
    list: Vec<Ticker>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    last_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResult {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct WalletResult {
    #[serde(default)]
    list: Vec<WalletAccount>,
}

#[derive(Debug, Deserialize)]
struct WalletAccount {
    #[serde(default)]
    coin: Vec<CoinBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinBalance {
    coin: String,
    #[serde(default)]
    wallet_balance: String,
}
