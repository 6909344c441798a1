//! Bybit v5 unified-account (linear perpetual) [`VenueAdapter`] implementation.

mod normalize;
mod rest;
mod stream;

use crate::adapter::{CreateOrderParams, TimeWindow, VenueAdapter};
use crate::error::{AdapterError, ErrorKind};
use crate::session::{StreamSession, StreamSessionConfig, StreamSessionHandle};
use async_trait::async_trait;
use rest::*;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use stream::BybitSessionAdapter;
use tokio::sync::Mutex;
use xchange_integration::protocol::http::RestClient;
use xchange_integration::ratelimit::{RateLimiter, RateLimiterConfig};
use xchange_schema::{
    Balance, FundingRate, Kline, Market, MarginMode, Order, OrderBook, Position, Side,
    Subscription, Symbol, Ticker, Trade,
};

const REST_BASE_URL: &str = "https://api.bybit.com";
const WS_PUBLIC_URL: &str = "wss://stream.bybit.com/v5/public/linear";
const WS_PRIVATE_URL: &str = "wss://stream.bybit.com/v5/private";
const CATEGORY: &str = "linear";

#[derive(Debug, Clone)]
pub struct BybitCredentials {
    pub api_key: String,
    pub api_secret: String,
}

pub struct BybitAdapter {
    rest: RestClient<BybitRequestSigner>,
    limiter: RateLimiter,
    credentials: Option<BybitCredentials>,
    public_session: Mutex<Option<StreamSessionHandle>>,
    private_session: Mutex<Option<StreamSessionHandle>>,
}

impl BybitAdapter {
    pub fn new(credentials: Option<BybitCredentials>) -> Self {
        let (api_key, api_secret) = credentials
            .as_ref()
            .map(|c| (c.api_key.as_str(), c.api_secret.as_str()))
            .unwrap_or(("", ""));
        let signer = BybitRequestSigner::new((api_key, api_secret));
        let base_url = url::Url::parse(REST_BASE_URL).expect("static base url parses");
        Self {
            rest: RestClient::new(base_url, signer),
            limiter: RateLimiter::new(RateLimiterConfig {
                max_requests: 120,
                window: std::time::Duration::from_secs(5),
                ..RateLimiterConfig::default()
            }),
            credentials,
            public_session: Mutex::new(None),
            private_session: Mutex::new(None),
        }
    }

    fn require_credentials(&self) -> Result<&BybitCredentials, AdapterError> {
        self.credentials
            .as_ref()
            .ok_or_else(|| AdapterError::new(ErrorKind::AuthenticationError, "adapter has no API credentials"))
    }

    /// Executes a request, then checks the v5 `{retCode, retMsg}` envelope —
    /// Bybit reports business errors with HTTP 200, unlike Binance's status
    /// codes, so the envelope must be unwrapped before a caller sees success.
    async fn execute<R, T>(&self, request: R) -> Result<T, AdapterError>
    where
        R: xchange_integration::protocol::http::RestRequest<Response = BybitEnvelope<T>>,
        T: DeserializeOwned,
    {
        self.limiter.acquire().await.map_err(AdapterError::from)?;
        let envelope = match self.rest.execute(request).await {
            Ok(envelope) => envelope,
            Err(err) => {
                self.limiter.report_throttled();
                return Err(AdapterError::from(err));
            }
        };
        if envelope.ret_code != 0 {
            let kind = BybitEnvelope::<serde_json::Value>::classify(envelope.ret_code);
            if kind == ErrorKind::RateLimitExceeded {
                self.limiter.report_throttled();
            }
            return Err(AdapterError::new(
                kind,
                format!("bybit retCode {}: {}", envelope.ret_code, envelope.ret_msg),
            ));
        }
        self.limiter.report_success();
        Ok(envelope.result)
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
                url: if is_private { WS_PRIVATE_URL } else { WS_PUBLIC_URL }.to_string(),
                is_private,
                api_key,
                api_secret,
            },
            Arc::new(BybitSessionAdapter::new()),
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
impl VenueAdapter for BybitAdapter {
    fn venue_id(&self) -> &'static str {
        "bybit"
    }

    async fn create_order(&self, params: CreateOrderParams) -> Result<Order, AdapterError> {
        self.require_credentials()?;
        let symbol = normalize::venue_symbol(&params.symbol)?;
        let body = CreateOrderBody {
            category: CATEGORY.to_string(),
            symbol,
            side: match params.side {
                Side::Buy => "Buy".to_string(),
                Side::Sell => "Sell".to_string(),
            },
            order_type: match params.kind {
                xchange_schema::OrderType::Market => "Market".to_string(),
                _ => "Limit".to_string(),
            },
            qty: params.amount.to_string(),
            price: params.price.map(|p| p.to_string()),
            order_link_id: params.client_order_id,
            reduce_only: params.reduce_only.then_some(true),
            time_in_force: "GTC".to_string(),
        };
        let raw = self.execute(CreateOrder(body)).await?;
        normalize::order(raw)
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> Result<(), AdapterError> {
        self.require_credentials()?;
        self.execute(CancelOrder(CancelOrderBody {
            category: CATEGORY.to_string(),
            symbol: normalize::venue_symbol(symbol)?,
            order_id: order_id.to_string(),
        }))
        .await?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<(), AdapterError> {
        self.require_credentials()?;
        self.execute(CancelAllOrders(CategoryQuery {
            category: CATEGORY.to_string(),
            symbol: Some(normalize::venue_symbol(symbol)?),
        }))
        .await?;
        Ok(())
    }

    async fn fetch_order(&self, symbol: &Symbol, order_id: &str) -> Result<Order, AdapterError> {
        self.require_credentials()?;
        let result = self
            .execute(FetchOrderHistory(OrderQuery {
                category: CATEGORY.to_string(),
                symbol: Some(normalize::venue_symbol(symbol)?),
                order_id: Some(order_id.to_string()),
                ..Default::default()
            }))
            .await?;
        let raw = result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::new(ErrorKind::OrderNotFound, format!("order {order_id} not found")))?;
        normalize::order(raw)
    }

    async fn fetch_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, AdapterError> {
        self.require_credentials()?;
        let symbol = symbol.map(normalize::venue_symbol).transpose()?;
        let result = self
            .execute(FetchOpenOrders(OrderQuery {
                category: CATEGORY.to_string(),
                symbol,
                ..Default::default()
            }))
            .await?;
        result.list.into_iter().map(normalize::order).collect()
    }

    async fn fetch_closed_orders(&self, symbol: Option<&Symbol>, window: TimeWindow) -> Result<Vec<Order>, AdapterError> {
        self.require_credentials()?;
        let symbol = symbol.map(normalize::venue_symbol).transpose()?;
        let (start_time, end_time, limit) = window_query(window);
        let result = self
            .execute(FetchOrderHistory(OrderQuery {
                category: CATEGORY.to_string(),
                symbol,
                start_time,
                end_time,
                limit,
                ..Default::default()
            }))
            .await?;
        result.list.into_iter().map(normalize::order).collect()
    }

    async fn fetch_my_trades(&self, symbol: Option<&Symbol>, window: TimeWindow) -> Result<Vec<Trade>, AdapterError> {
        self.require_credentials()?;
        let symbol = symbol.map(normalize::venue_symbol).transpose()?;
        let (start_time, end_time, limit) = window_query(window);
        let result = self
            .execute(FetchMyTrades(OrderQuery {
                category: CATEGORY.to_string(),
                symbol,
                start_time,
                end_time,
                limit,
                ..Default::default()
            }))
            .await?;
        result.list.into_iter().map(normalize::trade).collect()
    }

    async fn fetch_balance(&self) -> Result<Balance, AdapterError> {
        self.require_credentials()?;
        let result = self
            .execute(FetchWalletBalance(WalletBalanceQuery {
                account_type: "UNIFIED".to_string(),
            }))
            .await?;
        let wallet = result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::new(ErrorKind::ExchangeError, "no wallet returned"))?;
        normalize::balance(wallet)
    }

    async fn fetch_positions(&self, symbol: Option<&Symbol>) -> Result<Vec<Position>, AdapterError> {
        self.require_credentials()?;
        let symbol = symbol.map(normalize::venue_symbol).transpose()?;
        let result = self
            .execute(FetchPositions(CategoryQuery {
                category: CATEGORY.to_string(),
                symbol,
            }))
            .await?;
        result
            .list
            .into_iter()
            .filter_map(|p| normalize::position(p).transpose())
            .collect()
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: Decimal) -> Result<(), AdapterError> {
        self.require_credentials()?;
        let leverage = leverage.to_string();
        self.execute(SetLeverage(SetLeverageBody {
            category: CATEGORY.to_string(),
            symbol: normalize::venue_symbol(symbol)?,
            buy_leverage: leverage.clone(),
            sell_leverage: leverage,
        }))
        .await?;
        Ok(())
    }

    async fn set_margin_mode(&self, symbol: &Symbol, mode: MarginMode) -> Result<(), AdapterError> {
        self.require_credentials()?;
        let trade_mode = match mode {
            MarginMode::Cross => 0,
            MarginMode::Isolated => 1,
        };
        self.execute(SwitchMarginMode(SwitchMarginModeBody {
            category: CATEGORY.to_string(),
            symbol: normalize::venue_symbol(symbol)?,
            trade_mode,
            buy_leverage: "10".to_string(),
            sell_leverage: "10".to_string(),
        }))
        .await?;
        Ok(())
    }

    async fn fetch_markets(&self) -> Result<Vec<Market>, AdapterError> {
        let result = self
            .execute(FetchInstruments(CategoryQuery {
                category: CATEGORY.to_string(),
                symbol: None,
            }))
            .await?;
        result.list.into_iter().map(normalize::market).collect()
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, AdapterError> {
        let result = self
            .execute(FetchTicker(CategoryQuery {
                category: CATEGORY.to_string(),
                symbol: Some(normalize::venue_symbol(symbol)?),
            }))
            .await?;
        let raw = result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::invalid_symbol(symbol.clone()))?;
        normalize::ticker(raw)
    }

    async fn fetch_order_book(&self, symbol: &Symbol, depth: Option<u32>) -> Result<OrderBook, AdapterError> {
        let raw = self
            .execute(FetchOrderBook(OrderBookQuery {
                category: CATEGORY.to_string(),
                symbol: normalize::venue_symbol(symbol)?,
                limit: depth,
            }))
            .await?;
        normalize::order_book(raw)
    }

    async fn fetch_trades(&self, symbol: &Symbol, _window: TimeWindow) -> Result<Vec<Trade>, AdapterError> {
        let result = self
            .execute(FetchPublicTrades(CategoryQuery {
                category: CATEGORY.to_string(),
                symbol: Some(normalize::venue_symbol(symbol)?),
            }))
            .await?;
        result.list.into_iter().map(normalize::public_trade).collect()
    }

    async fn fetch_ohlcv(&self, symbol: &Symbol, timeframe: &str, window: TimeWindow) -> Result<Vec<Kline>, AdapterError> {
        let (start_time, end_time, limit) = window_query(window);
        let result = self
            .execute(FetchKline(KlineQuery {
                category: CATEGORY.to_string(),
                symbol: normalize::venue_symbol(symbol)?,
                interval: timeframe.to_string(),
                start_time,
                end_time,
                limit,
            }))
            .await?;
        result.list.into_iter().map(normalize::kline).collect()
    }

    async fn fetch_mark_ohlcv(&self, symbol: &Symbol, timeframe: &str, window: TimeWindow) -> Result<Vec<Kline>, AdapterError> {
        let (start_time, end_time, limit) = window_query(window);
        let result = self
            .execute(FetchMarkPriceKline(KlineQuery {
                category: CATEGORY.to_string(),
                symbol: normalize::venue_symbol(symbol)?,
                interval: timeframe.to_string(),
                start_time,
                end_time,
                limit,
            }))
            .await?;
        result.list.into_iter().map(normalize::kline).collect()
    }

    async fn fetch_funding_rate(&self, symbol: &Symbol) -> Result<FundingRate, AdapterError> {
        // Bybit's current funding rate is just the most recent history row;
        // there's no separate "current funding rate" endpoint for linear perps.
        let history = self
            .execute(FetchFundingHistory(FundingHistoryQuery {
                category: CATEGORY.to_string(),
                symbol: normalize::venue_symbol(symbol)?,
                start_time: None,
                end_time: None,
                limit: Some(1),
            }))
            .await?;
        let row = history
            .list
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::new(ErrorKind::ExchangeError, "no funding rate returned"))?;
        normalize::funding_rate(row)
    }

    async fn fetch_funding_rate_history(&self, symbol: &Symbol, window: TimeWindow) -> Result<Vec<FundingRate>, AdapterError> {
        let (start_time, end_time, limit) = window_query(window);
        let result = self
            .execute(FetchFundingHistory(FundingHistoryQuery {
                category: CATEGORY.to_string(),
                symbol: normalize::venue_symbol(symbol)?,
                start_time,
                end_time,
                limit,
            }))
            .await?;
        result.list.into_iter().map(normalize::funding_rate).collect()
    }

    async fn fetch_open_interest_history(&self, symbol: &Symbol, timeframe: &str, window: TimeWindow) -> Result<Vec<Kline>, AdapterError> {
        let (start_time, end_time, limit) = window_query(window);
        let result = self
            .execute(FetchOpenInterest(OpenInterestQuery {
                category: CATEGORY.to_string(),
                symbol: normalize::venue_symbol(symbol)?,
                interval_time: timeframe.to_string(),
                start_time,
                end_time,
                limit,
            }))
            .await?;
        result
            .list
            .into_iter()
            .map(normalize::open_interest_kline)
            .collect()
    }

    async fn subscribe_public(&self, sub: Subscription) -> Result<StreamSessionHandle, AdapterError> {
        let handle = self.ensure_session(false).await?;
        handle.subscribe(sub, &BybitSessionAdapter::new()).await?;
        Ok(handle)
    }

    async fn subscribe_private(&self, sub: Subscription) -> Result<StreamSessionHandle, AdapterError> {
        if !sub.is_private {
            return Err(AdapterError::new(ErrorKind::InvalidOrder, "subscribe_private requires an is_private subscription"));
        }
        let handle = self.ensure_session(true).await?;
        handle.subscribe(sub, &BybitSessionAdapter::new()).await?;
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
            Some(handle) => handle.unsubscribe(sub, &BybitSessionAdapter::new()).await,
            None => Ok(()),
        }
    }
}
