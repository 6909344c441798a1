//! Binance USD-M futures [`VenueAdapter`] implementation.

mod normalize;
mod rest;
mod stream;

use crate::adapter::{CreateOrderParams, TimeWindow, VenueAdapter};
use crate::error::{AdapterError, ErrorKind};
use crate::session::{StreamSession, StreamSessionConfig, StreamSessionHandle};
use async_trait::async_trait;
use rest::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use stream::BinanceSessionAdapter;
use tokio::sync::Mutex;
use xchange_integration::protocol::http::RestClient;
use xchange_integration::ratelimit::{RateLimiter, RateLimiterConfig};
use xchange_schema::{
    Balance, FundingRate, Kline, Market, MarginMode, Order, OrderBook, Position, Side,
    Subscription, Symbol, Ticker, Trade,
};

const REST_BASE_URL: &str = "https://fapi.binance.com";
const WS_BASE_URL: &str = "wss://fstream.binance.com/ws";

/// Credentials for authenticated endpoints. `None` restricts the adapter to
/// public/market-data operations.
#[derive(Debug, Clone)]
pub struct BinanceCredentials {
    pub api_key: String,
    pub api_secret: String,
}

pub struct BinanceAdapter {
    rest: RestClient<BinanceRequestSigner>,
    limiter: RateLimiter,
    credentials: Option<BinanceCredentials>,
    public_session: Mutex<Option<StreamSessionHandle>>,
    private_session: Mutex<Option<StreamSessionHandle>>,
}

impl BinanceAdapter {
    pub fn new(credentials: Option<BinanceCredentials>) -> Self {
        let (api_key, api_secret) = credentials
            .as_ref()
            .map(|c| (c.api_key.as_str(), c.api_secret.as_str()))
            .unwrap_or(("", ""));
        let signer = BinanceRequestSigner::new((api_key, api_secret));
        let base_url = url::Url::parse(REST_BASE_URL).expect("static base url parses");
        Self {
            rest: RestClient::new(base_url, signer),
            limiter: RateLimiter::new(RateLimiterConfig {
                max_requests: 2400,
                window: std::time::Duration::from_secs(60),
                ..RateLimiterConfig::default()
            }),
            credentials,
            public_session: Mutex::new(None),
            private_session: Mutex::new(None),
        }
    }

    fn require_credentials(&self) -> Result<&BinanceCredentials, AdapterError> {
        self.credentials
            .as_ref()
            .ok_or_else(|| AdapterError::new(ErrorKind::AuthenticationError, "adapter has no API credentials"))
    }

    /// Executes a request, then — for a non-2xx response — deserializes
    /// Binance's `{code, msg}` envelope out of the preserved body so the
    /// resulting [`AdapterError`] carries the venue's own classification
    /// rather than a blanket network error.
    async fn execute<R>(&self, request: R) -> Result<R::Response, AdapterError>
    where
        R: xchange_integration::protocol::http::RestRequest,
    {
        self.limiter.acquire().await.map_err(AdapterError::from)?;
        match self.rest.execute(request).await {
            Ok(response) => {
                self.limiter.report_success();
                Ok(response)
            }
            Err(xchange_integration::SocketError::HttpStatus { status, body }) => {
                let adapter_err = match serde_json::from_str::<BinanceApiError>(&body) {
                    Ok(api_err) => AdapterError::new(
                        api_err.classify(),
                        format!("binance error {}: {} (http {status})", api_err.code, api_err.msg),
                    ),
                    Err(_) if status == 429 => {
                        AdapterError::new(ErrorKind::RateLimitExceeded, format!("binance http {status}: {body}"))
                    }
                    Err(_) => AdapterError::new(ErrorKind::NetworkError, format!("binance http {status}: {body}")),
                };
                if adapter_err.kind == ErrorKind::RateLimitExceeded {
                    self.limiter.report_throttled();
                }
                Err(adapter_err)
            }
            Err(err) => Err(AdapterError::from(err)),
        }
    }

    async fn ensure_session(&self, is_private: bool) -> Result<StreamSessionHandle, AdapterError> {
        let slot = if is_private {
            &self.private_session
        } else {
            &self.public_session
        };
        let mut guard = slot.lock().await;
        if let Some(handle) = guard.as_ref() {
            return Ok(handle.clone());
        }
        let (api_key, api_secret) = if is_private {
            let creds = self.require_credentials()?;
            (Some(creds.api_key.clone()), Some(creds.api_secret.clone()))
        } else {
            (None, None)
        };
        let handle = StreamSession::connect(
            StreamSessionConfig {
                url: WS_BASE_URL.to_string(),
                is_private,
                api_key,
                api_secret,
            },
            Arc::new(BinanceSessionAdapter::new()),
        )
        .await?;
        *guard = Some(handle.clone());
        Ok(handle)
    }
}

fn window_query(window: TimeWindow) -> (Option<i64>, Option<i64>, Option<u32>) {
    (Some(window.since_ms), window.until_ms, window.limit)
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn venue_id(&self) -> &'static str {
        "binance"
    }

    async fn create_order(&self, params: CreateOrderParams) -> Result<Order, AdapterError> {
        self.require_credentials()?;
        let symbol = normalize::venue_symbol(&params.symbol)?;
        let query = CreateOrderQuery {
            symbol,
            side: match params.side {
                Side::Buy => "BUY".to_string(),
                Side::Sell => "SELL".to_string(),
            },
            order_type: match params.kind {
                xchange_schema::OrderType::Market => "MARKET".to_string(),
                xchange_schema::OrderType::Limit => "LIMIT".to_string(),
                other => other.to_string().to_uppercase(),
            },
            quantity: params.amount.to_string(),
            price: params.price.map(|p| p.to_string()),
            time_in_force: params.price.map(|_| "GTC".to_string()),
            new_client_order_id: params.client_order_id,
            reduce_only: params.reduce_only.then_some(true),
        };
        let raw = self.execute(CreateOrder(query)).await?;
        normalize::order(raw)
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> Result<(), AdapterError> {
        self.require_credentials()?;
        let order_id: u64 = order_id
            .parse()
            .map_err(|e| AdapterError::parse_error("order_id", e))?;
        self.execute(CancelOrder(SymbolOrderIdQuery {
            symbol: normalize::venue_symbol(symbol)?,
            order_id,
        }))
        .await?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<(), AdapterError> {
        self.require_credentials()?;
        self.execute(CancelAllOrders(SymbolQuery {
            symbol: normalize::venue_symbol(symbol)?,
        }))
        .await?;
        Ok(())
    }

    async fn fetch_order(&self, symbol: &Symbol, order_id: &str) -> Result<Order, AdapterError> {
        self.require_credentials()?;
        let order_id: u64 = order_id
            .parse()
            .map_err(|e| AdapterError::parse_error("order_id", e))?;
        let raw = self
            .execute(FetchOrder(SymbolOrderIdQuery {
                symbol: normalize::venue_symbol(symbol)?,
                order_id,
            }))
            .await?;
        normalize::order(raw)
    }

    async fn fetch_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, AdapterError> {
        self.require_credentials()?;
        let symbol = symbol.map(normalize::venue_symbol).transpose()?;
        let raw = self.execute(FetchOpenOrders(OptionalSymbolQuery { symbol })).await?;
        raw.into_iter().map(normalize::order).collect()
    }

    async fn fetch_closed_orders(&self, symbol: Option<&Symbol>, window: TimeWindow) -> Result<Vec<Order>, AdapterError> {
        self.require_credentials()?;
        let symbol = symbol.map(normalize::venue_symbol).transpose()?;
        let (start_time, end_time, limit) = window_query(window);
        let raw = self
            .execute(FetchAllOrders(HistoryQuery {
                symbol,
                start_time,
                end_time,
                limit,
            }))
            .await?;
        let orders = raw
            .into_iter()
            .map(normalize::order)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders
            .into_iter()
            .filter(|o| {
                !matches!(
                    o.status,
                    xchange_schema::OrderStatus::Pending
                        | xchange_schema::OrderStatus::Open
                        | xchange_schema::OrderStatus::PartiallyFilled
                )
            })
            .collect())
    }

    async fn fetch_my_trades(&self, symbol: Option<&Symbol>, window: TimeWindow) -> Result<Vec<Trade>, AdapterError> {
        self.require_credentials()?;
        let symbol = symbol.map(normalize::venue_symbol).transpose()?;
        let (start_time, end_time, limit) = window_query(window);
        let raw = self
            .execute(FetchMyTrades(HistoryQuery {
                symbol,
                start_time,
                end_time,
                limit,
            }))
            .await?;
        raw.into_iter().map(normalize::trade).collect()
    }

    async fn fetch_balance(&self) -> Result<Balance, AdapterError> {
        self.require_credentials()?;
        let raw = self.execute(FetchAccount).await?;
        normalize::balance(raw)
    }

    async fn fetch_positions(&self, symbol: Option<&Symbol>) -> Result<Vec<Position>, AdapterError> {
        self.require_credentials()?;
        let raw = self.execute(FetchPositionRisk).await?;
        let venue_filter = symbol.map(normalize::venue_symbol).transpose()?;
        raw.into_iter()
            .filter(|p| match venue_filter.as_deref() {
                Some(f) => f == p.symbol,
                None => true,
            })
            .filter_map(|p| normalize::position(p).transpose())
            .collect()
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: Decimal) -> Result<(), AdapterError> {
        self.require_credentials()?;
        let leverage: u32 = leverage
            .to_string()
            .parse::<f64>()
            .map(|f| f as u32)
            .map_err(|e| AdapterError::parse_error("leverage", e))?;
        self.execute(SetLeverage(LeverageQuery {
            symbol: normalize::venue_symbol(symbol)?,
            leverage,
        }))
        .await?;
        Ok(())
    }

    async fn set_margin_mode(&self, symbol: &Symbol, mode: MarginMode) -> Result<(), AdapterError> {
        self.require_credentials()?;
        let margin_type = match mode {
            MarginMode::Cross => "CROSSED",
            MarginMode::Isolated => "ISOLATED",
        };
        self.execute(SetMarginType(MarginTypeQuery {
            symbol: normalize::venue_symbol(symbol)?,
            margin_type: margin_type.to_string(),
        }))
        .await?;
        Ok(())
    }

    async fn fetch_markets(&self) -> Result<Vec<Market>, AdapterError> {
        let raw = self.execute(FetchExchangeInfo).await?;
        raw.symbols.into_iter().map(normalize::market).collect()
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, AdapterError> {
        let raw = self
            .execute(FetchTicker24h(SymbolQuery {
                symbol: normalize::venue_symbol(symbol)?,
            }))
            .await?;
        normalize::ticker(raw)
    }

    async fn fetch_order_book(&self, symbol: &Symbol, depth: Option<u32>) -> Result<OrderBook, AdapterError> {
        let raw = self
            .execute(FetchDepth(DepthQuery {
                symbol: normalize::venue_symbol(symbol)?,
                limit: depth,
            }))
            .await?;
        normalize::order_book(symbol, raw, xchange_core::time::now_ms())
    }

    async fn fetch_trades(&self, symbol: &Symbol, window: TimeWindow) -> Result<Vec<Trade>, AdapterError> {
        let (start_time, end_time, limit) = window_query(window);
        let raw = self
            .execute(FetchAggTrades(AggTradesQuery {
                symbol: normalize::venue_symbol(symbol)?,
                start_time,
                end_time,
                limit,
            }))
            .await?;
        raw.into_iter()
            .map(|t| normalize::agg_trade(symbol, t))
            .collect()
    }

    async fn fetch_ohlcv(&self, symbol: &Symbol, timeframe: &str, window: TimeWindow) -> Result<Vec<Kline>, AdapterError> {
        let (start_time, end_time, limit) = window_query(window);
        let raw = self
            .execute(FetchKlines(KlineQuery {
                symbol: normalize::venue_symbol(symbol)?,
                interval: timeframe.to_string(),
                start_time,
                end_time,
                limit,
            }))
            .await?;
        raw.into_iter().map(normalize::kline).collect()
    }

    async fn fetch_mark_ohlcv(&self, symbol: &Symbol, timeframe: &str, window: TimeWindow) -> Result<Vec<Kline>, AdapterError> {
        let (start_time, end_time, limit) = window_query(window);
        let raw = self
            .execute(FetchMarkPriceKlines(KlineQuery {
                symbol: normalize::venue_symbol(symbol)?,
                interval: timeframe.to_string(),
                start_time,
                end_time,
                limit,
            }))
            .await?;
        raw.into_iter().map(normalize::kline).collect()
    }

    async fn fetch_funding_rate(&self, symbol: &Symbol) -> Result<FundingRate, AdapterError> {
        let mut raw = self
            .execute(FetchFundingRate(SymbolQuery {
                symbol: normalize::venue_symbol(symbol)?,
            }))
            .await?;
        let row = raw
            .pop()
            .ok_or_else(|| AdapterError::new(ErrorKind::ExchangeError, "no funding rate returned"))?;
        normalize::funding_rate(row)
    }

    async fn fetch_funding_rate_history(&self, symbol: &Symbol, window: TimeWindow) -> Result<Vec<FundingRate>, AdapterError> {
        let (start_time, end_time, limit) = window_query(window);
        let raw = self
            .execute(FetchFundingRateHistory(HistoryQuery {
                symbol: Some(normalize::venue_symbol(symbol)?),
                start_time,
                end_time,
                limit,
            }))
            .await?;
        raw.into_iter().map(normalize::funding_rate).collect()
    }

    async fn fetch_open_interest_history(&self, symbol: &Symbol, timeframe: &str, window: TimeWindow) -> Result<Vec<Kline>, AdapterError> {
        let (start_time, end_time, limit) = window_query(window);
        let raw = self
            .execute(FetchOpenInterestHist(OpenInterestHistQuery {
                symbol: normalize::venue_symbol(symbol)?,
                period: timeframe.to_string(),
                start_time,
                end_time,
                limit,
            }))
            .await?;
        raw.into_iter().map(normalize::open_interest_kline).collect()
    }

    async fn subscribe_public(&self, sub: Subscription) -> Result<StreamSessionHandle, AdapterError> {
        let handle = self.ensure_session(false).await?;
        handle.subscribe(sub, &BinanceSessionAdapter::new()).await?;
        Ok(handle)
    }

    async fn subscribe_private(&self, sub: Subscription) -> Result<StreamSessionHandle, AdapterError> {
        if !sub.is_private {
            return Err(AdapterError::new(ErrorKind::InvalidOrder, "subscribe_private requires an is_private subscription"));
        }
        let handle = self.ensure_session(true).await?;
        handle.subscribe(sub, &BinanceSessionAdapter::new()).await?;
        Ok(handle)
    }

    async fn unsubscribe(&self, sub: &Subscription) -> Result<(), AdapterError> {
        let slot = if sub.is_private {
            &self.private_session
        } else {
            &self.public_session
        };
        let guard = slot.lock().await;
        match guard.as_ref() {
            Some(handle) => handle.unsubscribe(sub, &BinanceSessionAdapter::new()).await,
            None => Ok(()),
        }
    }
}
