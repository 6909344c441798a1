//! Binance combined-stream `SessionAdapter`: subscribe/unsubscribe framing
//! and event normalization for the USD-M futures user-data and market-data
//! streams.

use crate::adapter::binance::normalize;
use crate::error::{AdapterError, ErrorKind};
use crate::session::{ParsedFrame, SessionAdapter};
use crate::session::hmac_sha256_hex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use xchange_schema::{
    Balance, CurrencyBalance, Kline, MarginMode, Order, OrderBook, Position, PositionSide,
    StreamEvent, Subscription, Ticker, Trade,
};

#[derive(Debug, Default)]
pub struct BinanceSessionAdapter {
    next_id: AtomicU64,
}

impl BinanceSessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream_name(sub: &Subscription) -> String {
        let symbol = sub
            .symbol
            .as_ref()
            .map(|s| normalize::venue_symbol(s).unwrap_or_else(|_| s.as_str().to_string()))
            .unwrap_or_default();
        match sub.channel.as_str() {
            "ticker" => format!("{}@ticker", symbol.to_lowercase()),
            "orderbook" => format!("{}@depth20@100ms", symbol.to_lowercase()),
            "trade" => format!("{}@aggTrade", symbol.to_lowercase()),
            "kline" => {
                let interval = sub.params.as_deref().unwrap_or("1m");
                format!("{}@kline_{interval}", symbol.to_lowercase())
            }
            other => other.to_string(),
        }
    }
}

impl SessionAdapter for BinanceSessionAdapter {
    fn encode_subscribe(&self, sub: &Subscription) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        json!({
            "method": "SUBSCRIBE",
            "params": [Self::stream_name(sub)],
            "id": id,
        })
        .to_string()
    }

    fn encode_unsubscribe(&self, sub: &Subscription) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        json!({
            "method": "UNSUBSCRIBE",
            "params": [Self::stream_name(sub)],
            "id": id,
        })
        .to_string()
    }

    fn encode_auth(&self, api_key: &str, secret: &str, expiry_ms: i64) -> String {
        let payload = format!("apiKey={api_key}&expiry={expiry_ms}");
        let signature = hmac_sha256_hex(secret, &payload);
        json!({
            "method": "session.logon",
            "params": {
                "apiKey": api_key,
                "expiry": expiry_ms,
                "signature": signature,
            },
        })
        .to_string()
    }

    fn parse(&self, raw: &str) -> Result<ParsedFrame, AdapterError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| AdapterError::parse_error("frame", e))?;

        if value.get("result").is_some() && value.get("id").is_some() {
            return Ok(ParsedFrame::Ignored);
        }

        let event_type = match value.get("e").and_then(|e| e.as_str()) {
            Some(e) => e,
            None => return Ok(ParsedFrame::Ignored),
        };

        match event_type {
            "24hrTicker" => {
                let raw: WsTicker24h = serde_json::from_value(value)
                    .map_err(|e| AdapterError::parse_error("24hrTicker", e))?;
                Ok(ParsedFrame::Event(StreamEvent::Ticker(raw.into_ticker()?)))
            }
            "depthUpdate" => {
                let raw: WsDepthUpdate = serde_json::from_value(value)
                    .map_err(|e| AdapterError::parse_error("depthUpdate", e))?;
                Ok(ParsedFrame::Event(StreamEvent::OrderBook(raw.into_book()?)))
            }
            "aggTrade" => {
                let raw: WsAggTrade = serde_json::from_value(value)
                    .map_err(|e| AdapterError::parse_error("aggTrade", e))?;
                Ok(ParsedFrame::Event(StreamEvent::Trade(raw.into_trade()?)))
            }
            "kline" => {
                let raw: WsKlineEvent = serde_json::from_value(value)
                    .map_err(|e| AdapterError::parse_error("kline", e))?;
                Ok(ParsedFrame::Event(StreamEvent::Kline(raw.into_kline()?)))
            }
            "ORDER_TRADE_UPDATE" => {
                let raw: WsOrderTradeUpdate = serde_json::from_value(value)
                    .map_err(|e| AdapterError::parse_error("ORDER_TRADE_UPDATE", e))?;
                Ok(ParsedFrame::Event(StreamEvent::Order(raw.o.into_order()?)))
            }
            "ACCOUNT_UPDATE" => {
                let raw: WsAccountUpdate = serde_json::from_value(value)
                    .map_err(|e| AdapterError::parse_error("ACCOUNT_UPDATE", e))?;
                raw.a.into_events()
            }
            other => Err(AdapterError::new(
                ErrorKind::ParseError,
                format!("unrecognized stream event type: {other}"),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WsTicker24h {
    s: String,
    b: String,
    a: String,
    c: String,
    h: String,
    l: String,
    v: String,
    q: String,
    #[serde(rename = "E")]
    event_time: i64,
}

impl WsTicker24h {
    fn into_ticker(self) -> Result<Ticker, AdapterError> {
        Ok(Ticker {
            symbol: normalize::canonical_symbol(&self.s),
            bid: normalize::decimal("b", &self.b)?,
            ask: normalize::decimal("a", &self.a)?,
            last: normalize::decimal("c", &self.c)?,
            high: normalize::decimal("h", &self.h)?,
            low: normalize::decimal("l", &self.l)?,
            base_volume: normalize::decimal("v", &self.v)?,
            quote_volume: normalize::decimal("q", &self.q)?,
            timestamp: self.event_time,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WsDepthUpdate {
    s: String,
    b: Vec<(String, String)>,
    a: Vec<(String, String)>,
    #[serde(rename = "E")]
    event_time: i64,
}

impl WsDepthUpdate {
    fn into_book(self) -> Result<OrderBook, AdapterError> {
        let levels = |rows: Vec<(String, String)>| -> Result<Vec<xchange_schema::Level>, AdapterError> {
            rows.into_iter()
                .map(|(p, a)| {
                    Ok(xchange_schema::Level {
                        price: normalize::decimal("price", &p)?,
                        amount: normalize::decimal("amount", &a)?,
                    })
                })
                .collect()
        };
        Ok(OrderBook {
            symbol: normalize::canonical_symbol(&self.s),
            bids: levels(self.b)?,
            asks: levels(self.a)?,
            timestamp: self.event_time,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WsAggTrade {
    s: String,
    p: String,
    q: String,
    #[serde(rename = "T")]
    trade_time: i64,
    m: bool,
    a: u64,
}

impl WsAggTrade {
    fn into_trade(self) -> Result<Trade, AdapterError> {
        Ok(Trade {
            id: self.a.to_string().into(),
            symbol: normalize::canonical_symbol(&self.s),
            side: if self.m { xchange_schema::Side::Sell } else { xchange_schema::Side::Buy },
            price: normalize::decimal("p", &self.p)?,
            amount: normalize::decimal("q", &self.q)?,
            timestamp: self.trade_time,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WsKlineEvent {
    k: WsKlinePayload,
}

#[derive(Debug, Deserialize)]
struct WsKlinePayload {
    t: i64,
    o: String,
    h: String,
    l: String,
    c: String,
    v: String,
}

impl WsKlineEvent {
    fn into_kline(self) -> Result<Kline, AdapterError> {
        let k = self.k;
        let parse = |field: &str, raw: &str| -> Result<Decimal, AdapterError> {
            Decimal::from_str(raw).map_err(|e| AdapterError::parse_error(field, e))
        };
        Ok(Kline {
            symbol_hash: 0,
            timestamp: k.t,
            open: parse("o", &k.o)?,
            high: parse("h", &k.h)?,
            low: parse("l", &k.l)?,
            close: parse("c", &k.c)?,
            volume: parse("v", &k.v)?,
        })
    }
}

/// Futures user-data stream order update (`ORDER_TRADE_UPDATE`).
#[derive(Debug, Deserialize)]
struct WsOrderTradeUpdate {
    o: WsOrderDetail,
}

#[derive(Debug, Deserialize)]
struct WsOrderDetail {
    s: String,
    #[serde(rename = "c")]
    client_order_id: String,
    #[serde(rename = "S")]
    side: String,
    #[serde(rename = "o")]
    order_type: String,
    #[serde(rename = "X")]
    status: String,
    i: u64,
    q: String,
    p: String,
    ap: String,
    z: String,
    #[serde(rename = "T")]
    trade_time: i64,
}

impl WsOrderDetail {
    fn into_order(self) -> Result<Order, AdapterError> {
        let amount = normalize::decimal("q", &self.q)?;
        let filled = normalize::decimal("z", &self.z)?;
        let average = normalize::decimal("ap", &self.ap).ok().filter(|p| !p.is_zero());
        Ok(Order {
            id: self.i.to_string().into(),
            client_order_id: (!self.client_order_id.is_empty()).then(|| self.client_order_id.into()),
            symbol: normalize::canonical_symbol(&self.s),
            side: normalize::side(&self.side)?,
            kind: normalize::order_type(&self.order_type)?,
            status: normalize::order_status(&self.status)?,
            price: normalize::decimal("p", &self.p).ok().filter(|p| !p.is_zero()),
            average,
            remaining: amount - filled,
            amount,
            filled,
            cost: average.map(|a| a * filled).unwrap_or_default(),
            fee: None,
            timestamp: self.trade_time,
            last_update_timestamp: Some(self.trade_time),
        })
    }
}

/// Futures user-data stream account update (`ACCOUNT_UPDATE`), carrying both
/// balance and position deltas in one frame.
#[derive(Debug, Deserialize)]
struct WsAccountUpdate {
    a: WsAccountUpdateData,
}

#[derive(Debug, Deserialize)]
struct WsAccountUpdateData {
    #[serde(rename = "B", default)]
    balances: Vec<WsBalanceEntry>,
    #[serde(rename = "P", default)]
    positions: Vec<WsPositionEntry>,
}

#[derive(Debug, Deserialize)]
struct WsBalanceEntry {
    a: String,
    #[serde(rename = "wb")]
    wallet_balance: String,
    #[serde(rename = "cw")]
    cross_wallet_balance: String,
}

#[derive(Debug, Deserialize)]
struct WsPositionEntry {
    s: String,
    #[serde(rename = "pa")]
    position_amt: String,
    #[serde(rename = "ep")]
    entry_price: String,
    #[serde(rename = "up")]
    unrealized_pnl: String,
    #[serde(rename = "mt")]
    margin_type: String,
    #[serde(rename = "iw")]
    isolated_wallet: String,
}

impl WsAccountUpdateData {
    fn into_events(self) -> Result<ParsedFrame, AdapterError> {
        let now = xchange_core::time::now_ms();
        let mut events = Vec::with_capacity(self.balances.len().min(1) + self.positions.len());

        if !self.balances.is_empty() {
            let currencies = self
                .balances
                .into_iter()
                .map(|b| {
                    let total = normalize::decimal("wb", &b.wallet_balance)?;
                    let cross = normalize::decimal("cw", &b.cross_wallet_balance).unwrap_or(total);
                    Ok(CurrencyBalance {
                        currency: b.a.into(),
                        free: cross,
                        used: total - cross,
                        total,
                    })
                })
                .collect::<Result<Vec<_>, AdapterError>>()?;
            let total_equity = currencies.iter().map(|c| c.total).sum();
            let available_margin = currencies.iter().map(|c| c.free).sum();
            events.push(StreamEvent::Balance(Balance {
                currencies,
                total_equity,
                available_margin,
                used_margin: total_equity - available_margin,
                unrealized_pnl: Decimal::ZERO,
                timestamp: now,
            }));
        }

        for entry in self.positions {
            let amount = normalize::decimal("pa", &entry.position_amt)?;
            if amount.is_zero() {
                continue;
            }
            let entry_price = normalize::decimal("ep", &entry.entry_price)?;
            let margin_mode = match entry.margin_type.as_str() {
                "isolated" => MarginMode::Isolated,
                _ => MarginMode::Cross,
            };
            let margin = normalize::decimal("iw", &entry.isolated_wallet).unwrap_or_default();
            events.push(StreamEvent::Position(Position {
                symbol: normalize::canonical_symbol(&entry.s),
                side: if amount.is_sign_positive() { PositionSide::Long } else { PositionSide::Short },
                amount: amount.abs(),
                contracts: amount.abs(),
                entry_price,
                // ACCOUNT_UPDATE does not carry a live mark price; approximate
                // with the entry price until the next ticker/orderbook event.
                mark_price: entry_price,
                liquidation_price: None,
                unrealized_pnl: normalize::decimal("up", &entry.unrealized_pnl)?,
                realized_pnl: Decimal::ZERO,
                margin_mode,
                // ACCOUNT_UPDATE does not carry leverage; it arrives on a
                // separate ACCOUNT_CONFIG_UPDATE stream this adapter doesn't
                // subscribe to.
                leverage: Decimal::ONE,
                margin,
                notional: (amount.abs() * entry_price),
            }));
        }

        Ok(ParsedFrame::Events(events))
    }
}
