//! Canonical, venue-independent domain types.

use derive_more::{Display, From};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// Opaque canonical symbol in the form `BASE/QUOTE[:SETTLE]`, e.g.
/// `BTC/USDT:USDT`. Venue-specific encoding is a per-adapter concern (§4.D).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct Symbol(pub SmolStr);

impl Symbol {
    pub fn new(raw: impl Into<SmolStr>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Splits the canonical form into `(base, quote, settle)`.
    pub fn parts(&self) -> Option<(&str, &str, Option<&str>)> {
        let (pair, settle) = match self.0.split_once(':') {
            Some((pair, settle)) => (pair, Some(settle)),
            None => (self.0.as_str(), None),
        };
        let (base, quote) = pair.split_once('/')?;
        Some((base, quote, settle))
    }
}

impl<S: Into<SmolStr>> From<S> for Symbol {
    fn from(value: S) -> Self {
        Self::new(value)
    }
}

/// Buy/sell side of an order or position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// Canonical order type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    TakeProfit,
    TakeProfitLimit,
    TrailingStop,
}

/// Canonical order status enum. Unknown venue strings must be rejected at the
/// adapter, not silently mapped here — this workspace treats an unknown venue
/// status as a hard `PARSE_ERROR` rather than a silent fallback to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

/// Margin mode for a leveraged position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    Cross,
    Isolated,
}

/// A `{cost, currency}` fee pair attached to an order or trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub cost: Decimal,
    pub currency: SmolStr,
}

/// Market identity, kind flags, and precision/step metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: SmolStr,
    pub symbol: Symbol,
    pub base: SmolStr,
    pub quote: SmolStr,
    pub settle: Option<SmolStr>,
    pub spot: bool,
    pub swap: bool,
    pub future: bool,
    pub option: bool,
    pub active: bool,
    pub price_precision: u32,
    pub amount_precision: u32,
    pub tick_size: Decimal,
    pub lot_size: Decimal,
    pub min_amount: Decimal,
    pub contract_size: Option<Decimal>,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
}

/// A client or venue order in the unified schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: SmolStr,
    pub client_order_id: Option<SmolStr>,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderType,
    pub status: OrderStatus,
    pub price: Option<Decimal>,
    pub average: Option<Decimal>,
    pub amount: Decimal,
    pub filled: Decimal,
    pub remaining: Decimal,
    pub cost: Decimal,
    pub fee: Option<Fee>,
    pub timestamp: i64,
    pub last_update_timestamp: Option<i64>,
}

/// An open position. Zero-size positions are elided at the
/// adapter boundary — they never reach this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: PositionSide,
    pub amount: Decimal,
    pub contracts: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub liquidation_price: Option<Decimal>,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub margin_mode: MarginMode,
    pub leverage: Decimal,
    pub margin: Decimal,
    pub notional: Decimal,
}

/// Per-currency balance entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyBalance {
    pub currency: SmolStr,
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
}

/// Account balance snapshot: a per-currency mapping plus
/// account-level aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currencies: Vec<CurrencyBalance>,
    pub total_equity: Decimal,
    pub available_margin: Decimal,
    pub used_margin: Decimal,
    pub unrealized_pnl: Decimal,
    pub timestamp: i64,
}

/// Best bid/ask snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: Symbol,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub base_volume: Decimal,
    pub quote_volume: Decimal,
    pub timestamp: i64,
}

/// A single `(price, amount)` book level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub amount: Decimal,
}

/// Order book snapshot. Bids descending by price, asks ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: Symbol,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub timestamp: i64,
}

/// A single executed trade (public tape or account fill).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: SmolStr,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    pub timestamp: i64,
}

/// A single OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub symbol_hash: u64,
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A funding-rate observation for a perpetual swap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    pub timestamp: i64,
    pub rate: Decimal,
    pub mark_price: Decimal,
}

/// Checkpoint lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Data types the ingestion pipeline can resume independently, keyed per
/// `(venue, symbol)` checkpoint entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Kline,
    MarkPrice,
    OpenInterest,
    FundingRate,
    AggTrade,
}

/// Durable per-task progress marker, keyed by `(venue, symbol, data_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub venue: SmolStr,
    pub symbol: Symbol,
    pub data_type: DataType,
    pub last_timestamp: i64,
    pub updated_at: i64,
    pub status: CheckpointStatus,
    pub downloaded_count: u64,
    pub error_message: Option<String>,
}

impl Checkpoint {
    /// The stable `(venue, symbol, data_type)` identity used as a map key by
    /// every [`CheckpointStore`](../../xchange_ingestion/checkpoint/trait.CheckpointStore.html) backend.
    pub fn key(&self) -> CheckpointKey {
        CheckpointKey {
            venue: self.venue.clone(),
            symbol: self.symbol.clone(),
            data_type: self.data_type,
        }
    }
}

/// The `(venue, symbol, data_type)` triple identifying a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub venue: SmolStr,
    pub symbol: Symbol,
    pub data_type: DataType,
}

impl CheckpointKey {
    /// Local-file-backend filename: `<venue>_<symbol with '/' and ':' replaced
    /// by '_'>_<dataType>.json`.
    pub fn file_stem(&self) -> String {
        let sanitized_symbol = self.symbol.as_str().replace(['/', ':'], "_");
        format!(
            "{}_{}_{}",
            self.venue,
            sanitized_symbol,
            serde_plain_data_type(self.data_type)
        )
    }
}

fn serde_plain_data_type(dt: DataType) -> &'static str {
    match dt {
        DataType::Kline => "kline",
        DataType::MarkPrice => "mark_price",
        DataType::OpenInterest => "open_interest",
        DataType::FundingRate => "funding_rate",
        DataType::AggTrade => "agg_trade",
    }
}

/// Alert severity, ordered `Info < Warning < Critical < Emergency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
    Emergency,
}

/// Alert lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Silenced,
}

/// A fired alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: SmolStr,
    pub alert_type: SmolStr,
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub source: SmolStr,
    pub created_at: i64,
    pub status: AlertStatus,
    pub silenced_until: Option<i64>,
    pub acknowledged_at: Option<i64>,
    pub resolved_at: Option<i64>,
    pub data: Option<serde_json::Value>,
}

impl Alert {
    /// Dedup fingerprint: `type|level|title|source`.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.alert_type, self.level, self.title, self.source
        )
    }
}

/// Metric kinds supported by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// A metric definition: name, kind, help text, and the ordered set of label
/// keys every series of this metric must supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDef {
    pub name: SmolStr,
    pub kind: MetricKind,
    pub help: String,
    pub label_keys: Vec<SmolStr>,
}

/// A market-data or account-data stream subscription.
/// Uniqueness key is the triple `(channel, symbol, params canonical form)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub channel: SmolStr,
    pub symbol: Option<Symbol>,
    pub params: Option<SmolStr>,
    pub is_private: bool,
}

impl Subscription {
    pub fn new(channel: impl Into<SmolStr>, symbol: Option<Symbol>, is_private: bool) -> Self {
        Self {
            channel: channel.into(),
            symbol,
            params: None,
            is_private,
        }
    }

    /// The canonical `(channel, symbol, params)` uniqueness key used by the
    /// stream session to track replayable subscriptions.
    pub fn unique_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.channel,
            self.symbol.as_ref().map(Symbol::as_str).unwrap_or(""),
            self.params.as_deref().unwrap_or("")
        )
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unique_key())
    }
}

/// Typed domain events a [`StreamSession`](../../xchange_exchange/session/index.html)
/// dispatches to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
pub enum StreamEvent {
    Ticker(Ticker),
    OrderBook(OrderBook),
    Trade(Trade),
    Kline(Kline),
    Order(Order),
    Position(Position),
    Balance(Balance),
    Subscribed(Subscription),
    Connected,
    Disconnected,
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_parts_splits_base_quote_settle() {
        let sym = Symbol::new("BTC/USDT:USDT");
        assert_eq!(sym.parts(), Some(("BTC", "USDT", Some("USDT"))));

        let spot = Symbol::new("ETH/USDT");
        assert_eq!(spot.parts(), Some(("ETH", "USDT", None)));
    }

    #[test]
    fn checkpoint_key_file_stem_sanitizes_symbol() {
        let key = CheckpointKey {
            venue: "binance".into(),
            symbol: Symbol::new("BTC/USDT:USDT"),
            data_type: DataType::Kline,
        };
        assert_eq!(key.file_stem(), "binance_BTC_USDT_USDT_kline");
    }

    #[test]
    fn alert_fingerprint_is_stable_for_identical_fields() {
        let a = Alert {
            id: "1".into(),
            alert_type: "margin".into(),
            level: AlertLevel::Warning,
            title: "Margin low".into(),
            message: "m".into(),
            source: "risk".into(),
            created_at: 0,
            status: AlertStatus::Active,
            silenced_until: None,
            acknowledged_at: None,
            resolved_at: None,
            data: None,
        };
        let mut b = a.clone();
        b.id = "2".into();
        b.created_at = 123;
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
