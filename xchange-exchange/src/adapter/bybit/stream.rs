//! Bybit v5 public/private WebSocket `SessionAdapter`.

use crate::adapter::bybit::normalize;
use crate::adapter::bybit::rest::{BybitOrder, BybitPosition, BybitWallet};
use crate::error::{AdapterError, ErrorKind};
use crate::session::hmac_sha256_hex;
use crate::session::{ParsedFrame, SessionAdapter};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use xchange_schema::{Kline, Level, OrderBook, Side, StreamEvent, Subscription, Ticker, Trade};

#[derive(Debug, Default)]
pub struct BybitSessionAdapter;

impl BybitSessionAdapter {
    pub fn new() -> Self {
        Self
    }

    fn topic(sub: &Subscription) -> String {
        let symbol = sub
            .symbol
            .as_ref()
            .map(|s| normalize::venue_symbol(s).unwrap_or_else(|_| s.as_str().to_string()))
            .unwrap_or_default();
        match sub.channel.as_str() {
            "ticker" => format!("tickers.{symbol}"),
            "orderbook" => format!("orderbook.50.{symbol}"),
            "trade" => format!("publicTrade.{symbol}"),
            "kline" => {
                let interval = sub.params.as_deref().unwrap_or("1");
                format!("kline.{interval}.{symbol}")
            }
            "order" => "order".to_string(),
            "position" => "position".to_string(),
            "wallet" => "wallet".to_string(),
            other => other.to_string(),
        }
    }
}

impl SessionAdapter for BybitSessionAdapter {
    fn encode_subscribe(&self, sub: &Subscription) -> String {
        json!({ "op": "subscribe", "args": [Self::topic(sub)] }).to_string()
    }

    fn encode_unsubscribe(&self, sub: &Subscription) -> String {
        json!({ "op": "unsubscribe", "args": [Self::topic(sub)] }).to_string()
    }

    fn encode_auth(&self, api_key: &str, secret: &str, expiry_ms: i64) -> String {
        let payload = format!("GET/realtime{expiry_ms}");
        let signature = hmac_sha256_hex(secret, &payload);
        json!({ "op": "auth", "args": [api_key, expiry_ms, signature] }).to_string()
    }

    fn parse(&self, raw: &str) -> Result<ParsedFrame, AdapterError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| AdapterError::parse_error("frame", e))?;

        if value.get("op").and_then(|o| o.as_str()) == Some("subscribe") {
            return Ok(ParsedFrame::Ignored);
        }
        if value.get("op").and_then(|o| o.as_str()) == Some("pong") {
            return Ok(ParsedFrame::Ignored);
        }

        let topic = match value.get("topic").and_then(|t| t.as_str()) {
            Some(t) => t.to_string(),
            None => return Ok(ParsedFrame::Ignored),
        };

        if let Some(rest) = topic.strip_prefix("tickers.") {
            let payload: BybitWsTicker = serde_json::from_value(value["data"].clone())
                .map_err(|e| AdapterError::parse_error("tickers", e))?;
            return Ok(ParsedFrame::Event(StreamEvent::Ticker(payload.into_ticker(rest)?)));
        }
        if topic.starts_with("orderbook.") {
            let payload: BybitWsOrderBook = serde_json::from_value(value["data"].clone())
                .map_err(|e| AdapterError::parse_error("orderbook", e))?;
            return Ok(ParsedFrame::Event(StreamEvent::OrderBook(payload.into_book()?)));
        }
        if let Some(rest) = topic.strip_prefix("publicTrade.") {
            let payloads: Vec<BybitWsTrade> = serde_json::from_value(value["data"].clone())
                .map_err(|e| AdapterError::parse_error("publicTrade", e))?;
            let trade = payloads
                .into_iter()
                .next()
                .ok_or_else(|| AdapterError::new(ErrorKind::ParseError, "empty publicTrade payload"))?;
            return Ok(ParsedFrame::Event(StreamEvent::Trade(trade.into_trade(rest)?)));
        }
        if topic.starts_with("kline.") {
            let payloads: Vec<BybitWsKline> = serde_json::from_value(value["data"].clone())
                .map_err(|e| AdapterError::parse_error("kline", e))?;
            let kline = payloads
                .into_iter()
                .next()
                .ok_or_else(|| AdapterError::new(ErrorKind::ParseError, "empty kline payload"))?;
            return Ok(ParsedFrame::Event(StreamEvent::Kline(kline.into_kline()?)));
        }
        if topic == "order" {
            let rows: Vec<BybitOrder> = serde_json::from_value(value["data"].clone())
                .map_err(|e| AdapterError::parse_error("order", e))?;
            let events = rows
                .into_iter()
                .map(|row| normalize::order(row).map(StreamEvent::Order))
                .collect::<Result<Vec<_>, AdapterError>>()?;
            return Ok(ParsedFrame::Events(events));
        }
        if topic == "position" {
            let rows: Vec<BybitPosition> = serde_json::from_value(value["data"].clone())
                .map_err(|e| AdapterError::parse_error("position", e))?;
            let events = rows
                .into_iter()
                .filter_map(|row| normalize::position(row).transpose())
                .map(|r| r.map(StreamEvent::Position))
                .collect::<Result<Vec<_>, AdapterError>>()?;
            return Ok(ParsedFrame::Events(events));
        }
        if topic == "wallet" {
            let rows: Vec<BybitWallet> = serde_json::from_value(value["data"].clone())
                .map_err(|e| AdapterError::parse_error("wallet", e))?;
            let events = rows
                .into_iter()
                .map(|row| normalize::balance(row).map(StreamEvent::Balance))
                .collect::<Result<Vec<_>, AdapterError>>()?;
            return Ok(ParsedFrame::Events(events));
        }

        Err(AdapterError::new(
            ErrorKind::ParseError,
            format!("unrecognized topic: {topic}"),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct BybitWsTicker {
    #[serde(rename = "bid1Price", default)]
    bid1_price: Option<String>,
    #[serde(rename = "ask1Price", default)]
    ask1_price: Option<String>,
    #[serde(rename = "lastPrice", default)]
    last_price: Option<String>,
    #[serde(rename = "highPrice24h", default)]
    high_price_24h: Option<String>,
    #[serde(rename = "lowPrice24h", default)]
    low_price_24h: Option<String>,
    #[serde(rename = "volume24h", default)]
    volume_24h: Option<String>,
    #[serde(rename = "turnover24h", default)]
    turnover_24h: Option<String>,
}

impl BybitWsTicker {
    fn into_ticker(self, venue_symbol: &str) -> Result<Ticker, AdapterError> {
        let parse = |field: &str, raw: Option<String>| -> Result<Decimal, AdapterError> {
            raw.as_deref()
                .map(|s| normalize::decimal(field, s))
                .transpose()
                .map(|d| d.unwrap_or_default())
        };
        let last = parse("lastPrice", self.last_price)?;
        Ok(Ticker {
            symbol: normalize::canonical_symbol(venue_symbol),
            bid: parse("bid1Price", self.bid1_price).map(|d| if d.is_zero() { last } else { d })?,
            ask: parse("ask1Price", self.ask1_price).map(|d| if d.is_zero() { last } else { d })?,
            last,
            high: parse("highPrice24h", self.high_price_24h)?,
            low: parse("lowPrice24h", self.low_price_24h)?,
            base_volume: parse("volume24h", self.volume_24h)?,
            quote_volume: parse("turnover24h", self.turnover_24h)?,
            timestamp: xchange_core::time::now_ms(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct BybitWsOrderBook {
    s: String,
    b: Vec<(String, String)>,
    a: Vec<(String, String)>,
}

impl BybitWsOrderBook {
    fn into_book(self) -> Result<OrderBook, AdapterError> {
        let levels = |rows: Vec<(String, String)>| -> Result<Vec<Level>, AdapterError> {
            rows.into_iter()
                .map(|(p, a)| {
                    Ok(Level {
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
            timestamp: xchange_core::time::now_ms(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct BybitWsTrade {
    #[serde(rename = "i")]
    id: String,
    #[serde(rename = "S")]
    side: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "v")]
    size: String,
    #[serde(rename = "T")]
    timestamp: i64,
}

impl BybitWsTrade {
    fn into_trade(self, venue_symbol: &str) -> Result<Trade, AdapterError> {
        Ok(Trade {
            id: self.id.into(),
            symbol: normalize::canonical_symbol(venue_symbol),
            side: match self.side.as_str() {
                "Buy" => Side::Buy,
                _ => Side::Sell,
            },
            price: normalize::decimal("p", &self.price)?,
            amount: normalize::decimal("v", &self.size)?,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BybitWsKline {
    start: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

impl BybitWsKline {
    fn into_kline(self) -> Result<Kline, AdapterError> {
        let parse = |field: &str, raw: &str| -> Result<Decimal, AdapterError> {
            Decimal::from_str(raw).map_err(|e| AdapterError::parse_error(field, e))
        };
        Ok(Kline {
            symbol_hash: 0,
            timestamp: self.start,
            open: parse("open", &self.open)?,
            high: parse("high", &self.high)?,
            low: parse("low", &self.low)?,
            close: parse("close", &self.close)?,
            volume: parse("volume", &self.volume)?,
        })
    }
}
