//! The fixed per-venue capability surface: every adapter implements the same
//! REST operations and the same three stream operations, normalizing
//! venue-native payloads into [`xchange_schema`]'s unified model.

pub mod binance;
pub mod bybit;

use crate::error::AdapterError;
use crate::session::StreamSessionHandle;
use async_trait::async_trait;
use rust_decimal::Decimal;
use xchange_schema::{
    Balance, FundingRate, Kline, Market, MarginMode, Order, OrderBook, OrderType, Position, Side,
    Subscription, Ticker, Trade,
};

/// Parameters for [`VenueAdapter::create_order`].
#[derive(Debug, Clone)]
pub struct CreateOrderParams {
    pub symbol: xchange_schema::Symbol,
    pub side: Side,
    pub kind: OrderType,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub client_order_id: Option<String>,
    pub reduce_only: bool,
}

/// An inclusive-from/exclusive-to millisecond window, used by every
/// paginated history fetch (klines, funding-rate history, open-interest
/// history, mark-price OHLCV, public trades).
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub since_ms: i64,
    pub until_ms: Option<i64>,
    pub limit: Option<u32>,
}

/// The fixed capability surface every venue adapter implements. REST
/// operations return [`AdapterError`] classified per its error-kind taxonomy;
/// callers inspect [`AdapterError::retryable`] rather than matching on venue
/// status text.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Short venue identifier, e.g. `"binance"`, used as the checkpoint and
    /// metric label value.
    fn venue_id(&self) -> &'static str;

    async fn create_order(&self, params: CreateOrderParams) -> Result<Order, AdapterError>;
    async fn cancel_order(&self, symbol: &xchange_schema::Symbol, order_id: &str) -> Result<(), AdapterError>;
    async fn cancel_all_orders(&self, symbol: &xchange_schema::Symbol) -> Result<(), AdapterError>;
    async fn fetch_order(&self, symbol: &xchange_schema::Symbol, order_id: &str) -> Result<Order, AdapterError>;
    async fn fetch_open_orders(&self, symbol: Option<&xchange_schema::Symbol>) -> Result<Vec<Order>, AdapterError>;
    async fn fetch_closed_orders(
        &self,
        symbol: Option<&xchange_schema::Symbol>,
        window: TimeWindow,
    ) -> Result<Vec<Order>, AdapterError>;
    async fn fetch_my_trades(
        &self,
        symbol: Option<&xchange_schema::Symbol>,
        window: TimeWindow,
    ) -> Result<Vec<Trade>, AdapterError>;
    async fn fetch_balance(&self) -> Result<Balance, AdapterError>;
    async fn fetch_positions(&self, symbol: Option<&xchange_schema::Symbol>) -> Result<Vec<Position>, AdapterError>;
    async fn set_leverage(&self, symbol: &xchange_schema::Symbol, leverage: Decimal) -> Result<(), AdapterError>;
    async fn set_margin_mode(&self, symbol: &xchange_schema::Symbol, mode: MarginMode) -> Result<(), AdapterError>;

    async fn fetch_markets(&self) -> Result<Vec<Market>, AdapterError>;
    async fn fetch_ticker(&self, symbol: &xchange_schema::Symbol) -> Result<Ticker, AdapterError>;
    async fn fetch_order_book(&self, symbol: &xchange_schema::Symbol, depth: Option<u32>) -> Result<OrderBook, AdapterError>;
    async fn fetch_trades(&self, symbol: &xchange_schema::Symbol, window: TimeWindow) -> Result<Vec<Trade>, AdapterError>;
    async fn fetch_ohlcv(
        &self,
        symbol: &xchange_schema::Symbol,
        timeframe: &str,
        window: TimeWindow,
    ) -> Result<Vec<Kline>, AdapterError>;
    async fn fetch_mark_ohlcv(
        &self,
        symbol: &xchange_schema::Symbol,
        timeframe: &str,
        window: TimeWindow,
    ) -> Result<Vec<Kline>, AdapterError>;
    async fn fetch_funding_rate(&self, symbol: &xchange_schema::Symbol) -> Result<FundingRate, AdapterError>;
    async fn fetch_funding_rate_history(
        &self,
        symbol: &xchange_schema::Symbol,
        window: TimeWindow,
    ) -> Result<Vec<FundingRate>, AdapterError>;
    async fn fetch_open_interest_history(
        &self,
        symbol: &xchange_schema::Symbol,
        timeframe: &str,
        window: TimeWindow,
    ) -> Result<Vec<Kline>, AdapterError>;

    /// Opens (or reuses) the public stream session and subscribes `sub`.
    async fn subscribe_public(&self, sub: Subscription) -> Result<StreamSessionHandle, AdapterError>;
    /// Opens (or reuses) the authenticated private stream session and
    /// subscribes `sub`. `sub.is_private` must be `true`.
    async fn subscribe_private(&self, sub: Subscription) -> Result<StreamSessionHandle, AdapterError>;
    /// Unsubscribes `sub` from whichever session (public or private) holds it.
    async fn unsubscribe(&self, sub: &Subscription) -> Result<(), AdapterError>;
}
