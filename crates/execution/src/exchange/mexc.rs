//! MEXC spot REST client.

use super::{Balance, ExchangeClient, ExchangeError, OrderAck, OrderRequest, Ticker};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use sniper_domain::precision::{SymbolRules, format_decimal};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_BASE_URL: &str = "https://api.mexc.com";

/// API key pair. The secret is wiped from memory on drop.
#[derive(Clone)]
pub struct MexcCredentials {
    pub api_key: String,
    secret: Zeroizing<String>,
}

impl MexcCredentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    /// Reads `MEXC_API_KEY` and `MEXC_SECRET_KEY`.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("MEXC_API_KEY").ok().filter(|k| !k.is_empty())?;
        let secret = std::env::var("MEXC_SECRET_KEY").ok().filter(|s| !s.is_empty())?;
        Some(Self::new(api_key, secret))
    }

    fn sign(&self, query: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ExchangeError::InvalidRequest(format!("bad signing key: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for MexcCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MexcCredentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerResponse {
    symbol: String,
    last_price: Decimal,
    #[serde(default)]
    volume: Decimal,
}

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    base_asset_precision: u32,
    quote_precision: u32,
    base_size_precision: Decimal,
    quote_amount_precision: Decimal,
    quote_amount_precision_market: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: String,
    symbol: String,
    #[serde(default)]
    executed_qty: Decimal,
    #[serde(default)]
    cummulative_quote_qty: Decimal,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    msg: Option<String>,
}

/// REST client for MEXC spot trading, signing private calls with HMAC-SHA256.
pub struct MexcClient {
    base_url: String,
    credentials: MexcCredentials,
    recv_window_ms: u64,
    client: reqwest::Client,
}

impl MexcClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        credentials: MexcCredentials,
        timeout: Duration,
    ) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms: 5_000,
            client,
        })
    }

    fn signed_query(&self, params: &[(&str, String)]) -> Result<String, ExchangeError> {
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            self.recv_window_ms,
            chrono::Utc::now().timestamp_millis()
        ));
        let signature = self.credentials.sign(&query)?;
        Ok(format!("{query}&signature={signature}"))
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ExchangeError> {
        let response = request
            .header("X-MEXC-APIKEY", &self.credentials.api_key)
            .send()
            .await
            .map_err(map_transport)?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ExchangeError::Network(format!("undecodable response: {e}")));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1_000);
            warn!(retry_after_ms, "MEXC rate limit hit");
            return Err(ExchangeError::RateLimited { retry_after_ms });
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(ExchangeError::Network(format!("{status}: {body}")));
        }
        let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
        Err(ExchangeError::Rejected {
            code: parsed.as_ref().and_then(|b| b.code),
            message: parsed.and_then(|b| b.msg).unwrap_or(body),
        })
    }
}

fn map_transport(e: reqwest::Error) -> ExchangeError {
    if e.is_timeout() {
        ExchangeError::Timeout(0)
    } else {
        ExchangeError::Network(e.to_string())
    }
}

#[async_trait]
impl ExchangeClient for MexcClient {
    fn name(&self) -> &str {
        "mexc"
    }

    async fn ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        let ticker: TickerResponse = self
            .send(self.client.get(url).query(&[("symbol", symbol)]))
            .await?;
        Ok(Ticker {
            symbol: ticker.symbol,
            last_price: ticker.last_price,
            volume: ticker.volume,
        })
    }

    async fn balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let url = format!("{}/api/v3/account?{}", self.base_url, self.signed_query(&[])?);
        let account: AccountResponse = self.send(self.client.get(url)).await?;
        Ok(account.balances)
    }

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, ExchangeError> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let info: ExchangeInfoResponse = self
            .send(self.client.get(url).query(&[("symbol", symbol)]))
            .await?;
        let info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::InvalidRequest(format!("unknown symbol {symbol}")))?;
        Ok(SymbolRules {
            symbol: info.symbol,
            base_asset_precision: info.base_asset_precision,
            quote_precision: info.quote_precision,
            min_base_size: info.base_size_precision,
            min_notional_market: info.quote_amount_precision_market,
            min_notional_limit: info.quote_amount_precision,
        })
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", order.order_type.as_str().to_string()),
        ];
        if let Some(quantity) = order.quantity {
            params.push(("quantity", format_decimal(quantity, 28)));
        }
        if let Some(quote) = order.quote_order_qty {
            params.push(("quoteOrderQty", format_decimal(quote, 28)));
        }
        if let Some(price) = order.price {
            params.push(("price", format_decimal(price, 28)));
        }
        if let Some(id) = &order.client_order_id {
            params.push(("newClientOrderId", id.clone()));
        }

        let url = format!("{}/api/v3/order?{}", self.base_url, self.signed_query(&params)?);
        debug!(symbol = %order.symbol, side = order.side.as_str(), "Submitting MEXC order");
        let ack: OrderResponse = self.send(self.client.post(url)).await?;
        Ok(OrderAck {
            order_id: ack.order_id,
            symbol: ack.symbol,
            executed_qty: ack.executed_qty,
            cummulative_quote_qty: ack.cummulative_quote_qty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_hex_hmac() {
        let credentials = MexcCredentials::new("key", "secret");
        let a = credentials.sign("symbol=NEWUSDT&timestamp=1").unwrap();
        let b = credentials.sign("symbol=NEWUSDT&timestamp=1").unwrap();
        let c = credentials.sign("symbol=NEWUSDT&timestamp=2").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credentials = MexcCredentials::new("key", "hunter2");
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_signed_query_layout() {
        let client = MexcClient::new(
            "https://api.mexc.com/",
            MexcCredentials::new("key", "secret"),
            Duration::from_secs(5),
        )
        .unwrap();
        let query = client
            .signed_query(&[("symbol", "NEWUSDT".to_string())])
            .unwrap();
        assert!(query.starts_with("symbol=NEWUSDT&recvWindow=5000&timestamp="));
        assert!(query.contains("&signature="));
        assert_eq!(client.base_url, "https://api.mexc.com");
    }
}
