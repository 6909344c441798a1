//! Binance wire payload → unified schema normalization.

use crate::adapter::binance::rest::*;
use crate::error::{AdapterError, ErrorKind};
use rust_decimal::Decimal;
use std::str::FromStr;
use xchange_schema::{
    Balance, CurrencyBalance, Fee, FundingRate, Kline, Level, Market, MarginMode, Order,
    OrderBook, OrderStatus, OrderType, Position, PositionSide, Side, Symbol, Ticker, Trade,
};

pub fn decimal(field: &str, raw: &str) -> Result<Decimal, AdapterError> {
    Decimal::from_str(raw).map_err(|e| AdapterError::parse_error(field, e))
}

pub fn canonical_symbol(venue_symbol: &str) -> Symbol {
    // Binance USD-M futures symbols are `{BASE}{QUOTE}`, settled in the quote
    // asset (almost always USDT); split on the conventional 4-letter quote
    // suffixes since the wire form carries no separator.
    for quote in ["USDT", "USDC", "BUSD", "BTC"] {
        if let Some(base) = venue_symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return Symbol::new(format!("{base}/{quote}:{quote}"));
            }
        }
    }
    Symbol::new(venue_symbol.to_string())
}

pub fn venue_symbol(symbol: &Symbol) -> Result<String, AdapterError> {
    let (base, quote, _settle) = symbol
        .parts()
        .ok_or_else(|| AdapterError::invalid_symbol(symbol.clone()))?;
    Ok(format!("{base}{quote}"))
}

pub(crate) fn side(raw: &str) -> Result<Side, AdapterError> {
    match raw {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(AdapterError::parse_error("side", other)),
    }
}

pub(crate) fn order_type(raw: &str) -> Result<OrderType, AdapterError> {
    match raw {
        "MARKET" => Ok(OrderType::Market),
        "LIMIT" => Ok(OrderType::Limit),
        "STOP" | "STOP_MARKET" => Ok(OrderType::Stop),
        "STOP_LIMIT" => Ok(OrderType::StopLimit),
        "TAKE_PROFIT" | "TAKE_PROFIT_MARKET" => Ok(OrderType::TakeProfit),
        "TAKE_PROFIT_LIMIT" => Ok(OrderType::TakeProfitLimit),
        "TRAILING_STOP_MARKET" => Ok(OrderType::TrailingStop),
        other => Err(AdapterError::new(
            ErrorKind::ParseError,
            format!("unrecognized order type: {other}"),
        )),
    }
}

pub(crate) fn order_status(raw: &str) -> Result<OrderStatus, AdapterError> {
    match raw {
        "NEW" => Ok(OrderStatus::Pending),
        "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
        "FILLED" => Ok(OrderStatus::Filled),
        "CANCELED" | "CANCELLED" => Ok(OrderStatus::Canceled),
        "REJECTED" => Ok(OrderStatus::Rejected),
        "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
        other => Err(AdapterError::new(
            ErrorKind::ParseError,
            format!("unrecognized order status: {other}"),
        )),
    }
}

pub fn order(raw: BinanceOrder) -> Result<Order, AdapterError> {
    let amount = decimal("origQty", &raw.orig_qty)?;
    let filled = decimal("executedQty", &raw.executed_qty)?;
    Ok(Order {
        id: raw.order_id.to_string().into(),
        client_order_id: Some(raw.client_order_id.into()),
        symbol: canonical_symbol(&raw.symbol),
        side: side(&raw.side)?,
        kind: order_type(&raw.order_type)?,
        status: order_status(&raw.status)?,
        price: decimal("price", &raw.price).ok().filter(|p| !p.is_zero()),
        average: raw
            .avg_price
            .as_deref()
            .and_then(|p| decimal("avgPrice", p).ok())
            .filter(|p| !p.is_zero()),
        remaining: amount - filled,
        amount,
        filled,
        cost: raw
            .cum_quote
            .as_deref()
            .and_then(|c| decimal("cumQuote", c).ok())
            .unwrap_or_default(),
        fee: None,
        timestamp: raw.time,
        last_update_timestamp: raw.update_time,
    })
}

pub fn trade(raw: BinanceTrade) -> Result<Trade, AdapterError> {
    let side = match (raw.side.as_deref(), raw.buyer) {
        (Some(s), _) => side(s)?,
        (None, Some(true)) => Side::Buy,
        (None, Some(false)) => Side::Sell,
        (None, None) => {
            return Err(AdapterError::parse_error("side", "missing on trade"));
        }
    };
    Ok(Trade {
        id: raw.id.to_string().into(),
        symbol: canonical_symbol(&raw.symbol),
        side,
        price: decimal("price", &raw.price)?,
        amount: decimal("qty", &raw.qty)?,
        timestamp: raw.time,
    })
}

pub fn balance(raw: BinanceAccount) -> Result<Balance, AdapterError> {
    let currencies = raw
        .assets
        .into_iter()
        .map(|a| {
            let free = decimal("availableBalance", &a.available_balance)?;
            let total = decimal("balance", &a.balance)?;
            Ok(CurrencyBalance {
                currency: a.asset.into(),
                free,
                used: total - free,
                total,
            })
        })
        .collect::<Result<Vec<_>, AdapterError>>()?;

    Ok(Balance {
        currencies,
        total_equity: decimal("totalMarginBalance", &raw.total_margin_balance)?,
        available_margin: decimal("availableBalance", &raw.available_balance)?,
        used_margin: decimal("totalMarginBalance", &raw.total_margin_balance)?
            - decimal("availableBalance", &raw.available_balance)?,
        unrealized_pnl: decimal("totalUnrealizedProfit", &raw.total_unrealized_profit)?,
        timestamp: raw.update_time,
    })
}

pub fn position(raw: BinancePositionEntry) -> Result<Option<Position>, AdapterError> {
    let amount = decimal("positionAmt", &raw.position_amt)?;
    if amount.is_zero() {
        return Ok(None);
    }
    let side = if amount.is_sign_positive() {
        PositionSide::Long
    } else {
        PositionSide::Short
    };
    let leverage = decimal("leverage", &raw.leverage)?;
    let notional = decimal("notional", &raw.notional)?.abs();
    let margin_mode = match raw.margin_type.as_str() {
        "isolated" => MarginMode::Isolated,
        _ => MarginMode::Cross,
    };
    let margin = if margin_mode == MarginMode::Isolated {
        decimal("isolatedMargin", &raw.isolated_margin).unwrap_or_default()
    } else if leverage.is_zero() {
        Decimal::ZERO
    } else {
        notional / leverage
    };

    Ok(Some(Position {
        symbol: canonical_symbol(&raw.symbol),
        side,
        amount: amount.abs(),
        contracts: amount.abs(),
        entry_price: decimal("entryPrice", &raw.entry_price)?,
        mark_price: decimal("markPrice", &raw.mark_price)?,
        liquidation_price: decimal("liquidationPrice", &raw.liquidation_price)
            .ok()
            .filter(|p| !p.is_zero()),
        unrealized_pnl: decimal("unRealizedProfit", &raw.unrealized_profit)?,
        realized_pnl: Decimal::ZERO,
        margin_mode,
        leverage,
        margin,
        notional,
    }))
}

pub fn market(raw: BinanceSymbolInfo) -> Result<Market, AdapterError> {
    let tick_size = raw
        .filters
        .iter()
        .find(|f| f.filter_type == "PRICE_FILTER")
        .and_then(|f| f.tick_size.as_deref())
        .map(|s| decimal("tickSize", s))
        .transpose()?
        .unwrap_or_else(|| Decimal::new(1, raw.price_precision));
    let lot_size = raw
        .filters
        .iter()
        .find(|f| f.filter_type == "LOT_SIZE")
        .and_then(|f| f.step_size.as_deref())
        .map(|s| decimal("stepSize", s))
        .transpose()?
        .unwrap_or_else(|| Decimal::new(1, raw.quantity_precision));
    let min_amount = raw
        .filters
        .iter()
        .find(|f| f.filter_type == "LOT_SIZE")
        .and_then(|f| f.min_qty.as_deref())
        .map(|s| decimal("minQty", s))
        .transpose()?
        .unwrap_or(lot_size);

    Ok(Market {
        id: raw.symbol.clone().into(),
        symbol: canonical_symbol(&raw.symbol),
        base: raw.base_asset.into(),
        quote: raw.quote_asset.into(),
        settle: raw.margin_asset.map(Into::into),
        spot: false,
        swap: true,
        future: false,
        option: false,
        active: raw.status == "TRADING",
        price_precision: raw.price_precision,
        amount_precision: raw.quantity_precision,
        tick_size,
        lot_size,
        min_amount,
        contract_size: Some(Decimal::ONE),
        maker_fee: Decimal::new(2, 4),
        taker_fee: Decimal::new(4, 4),
    })
}

pub fn ticker(raw: BinanceTicker24h) -> Result<Ticker, AdapterError> {
    let last = decimal("lastPrice", &raw.last_price)?;
    Ok(Ticker {
        symbol: canonical_symbol(&raw.symbol),
        bid: raw
            .bid_price
            .as_deref()
            .map(|p| decimal("bidPrice", p))
            .transpose()?
            .unwrap_or(last),
        ask: raw
            .ask_price
            .as_deref()
            .map(|p| decimal("askPrice", p))
            .transpose()?
            .unwrap_or(last),
        last,
        high: decimal("highPrice", &raw.high_price)?,
        low: decimal("lowPrice", &raw.low_price)?,
        base_volume: decimal("volume", &raw.volume)?,
        quote_volume: decimal("quoteVolume", &raw.quote_volume)?,
        timestamp: raw.close_time,
    })
}

pub fn order_book(symbol: &Symbol, raw: BinanceDepth, timestamp: i64) -> Result<OrderBook, AdapterError> {
    let levels = |rows: Vec<(String, String)>| -> Result<Vec<Level>, AdapterError> {
        rows.into_iter()
            .map(|(p, a)| {
                Ok(Level {
                    price: decimal("price", &p)?,
                    amount: decimal("amount", &a)?,
                })
            })
            .collect()
    };
    Ok(OrderBook {
        symbol: symbol.clone(),
        bids: levels(raw.bids)?,
        asks: levels(raw.asks)?,
        timestamp: raw.event_time.unwrap_or(timestamp),
    })
}

pub fn agg_trade(symbol: &Symbol, raw: BinanceAggTrade) -> Result<Trade, AdapterError> {
    Ok(Trade {
        id: raw.a.to_string().into(),
        symbol: symbol.clone(),
        side: if raw.buyer_is_maker { Side::Sell } else { Side::Buy },
        price: decimal("p", &raw.p)?,
        amount: decimal("q", &raw.q)?,
        timestamp: raw.timestamp,
    })
}

pub fn kline(row: BinanceKlineRow) -> Result<Kline, AdapterError> {
    let BinanceKlineRow(open_time, open, high, low, close, volume, ..) = row;
    Ok(Kline {
        symbol_hash: 0,
        timestamp: open_time,
        open: decimal("open", &open)?,
        high: decimal("high", &high)?,
        low: decimal("low", &low)?,
        close: decimal("close", &close)?,
        volume: decimal("volume", &volume)?,
    })
}

pub fn funding_rate(raw: BinanceFundingRateRow) -> Result<FundingRate, AdapterError> {
    Ok(FundingRate {
        timestamp: raw.funding_time,
        rate: decimal("fundingRate", &raw.funding_rate)?,
        mark_price: raw
            .mark_price
            .as_deref()
            .map(|p| decimal("markPrice", p))
            .transpose()?
            .unwrap_or_default(),
    })
}

pub fn open_interest_kline(raw: BinanceOpenInterestRow) -> Result<Kline, AdapterError> {
    let oi = decimal("sumOpenInterest", &raw.sum_open_interest)?;
    Ok(Kline {
        symbol_hash: 0,
        timestamp: raw.timestamp,
        open: oi,
        high: oi,
        low: oi,
        close: oi,
        volume: decimal("sumOpenInterestValue", &raw.sum_open_interest_value)?,
    })
}
