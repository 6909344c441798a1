//! Bybit wire payload → unified schema normalization.

use crate::adapter::bybit::rest::*;
use crate::error::{AdapterError, ErrorKind};
use rust_decimal::Decimal;
use std::str::FromStr;
use xchange_schema::{
    Balance, CurrencyBalance, FundingRate, Kline, Level, Market, MarginMode, Order, OrderBook,
    OrderStatus, OrderType, Position, PositionSide, Side, Symbol, Ticker, Trade,
};

pub fn decimal(field: &str, raw: &str) -> Result<Decimal, AdapterError> {
    Decimal::from_str(raw).map_err(|e| AdapterError::parse_error(field, e))
}

fn millis(field: &str, raw: &str) -> Result<i64, AdapterError> {
    raw.parse().map_err(|e| AdapterError::parse_error(field, format!("{e} on `{raw}`")))
}

pub fn canonical_symbol(venue_symbol: &str) -> Symbol {
    for quote in ["USDT", "USDC", "BTC"] {
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
        "Buy" => Ok(Side::Buy),
        "Sell" => Ok(Side::Sell),
        other => Err(AdapterError::parse_error("side", other)),
    }
}

pub(crate) fn order_type(raw: &str) -> Result<OrderType, AdapterError> {
    match raw {
        "Market" => Ok(OrderType::Market),
        "Limit" => Ok(OrderType::Limit),
        other => Err(AdapterError::new(
            ErrorKind::ParseError,
            format!("unrecognized order type: {other}"),
        )),
    }
}

pub(crate) fn order_status(raw: &str) -> Result<OrderStatus, AdapterError> {
    match raw {
        "Created" | "New" | "Untriggered" => Ok(OrderStatus::Pending),
        "PartiallyFilled" => Ok(OrderStatus::PartiallyFilled),
        "Filled" => Ok(OrderStatus::Filled),
        "Cancelled" | "PartiallyFilledCanceled" => Ok(OrderStatus::Canceled),
        "Rejected" => Ok(OrderStatus::Rejected),
        "Deactivated" => Ok(OrderStatus::Expired),
        other => Err(AdapterError::new(
            ErrorKind::ParseError,
            format!("unrecognized order status: {other}"),
        )),
    }
}

pub fn order(raw: BybitOrder) -> Result<Order, AdapterError> {
    let amount = decimal("qty", &raw.qty)?;
    let filled = decimal("cumExecQty", &raw.cum_exec_qty)?;
    Ok(Order {
        id: raw.order_id.into(),
        client_order_id: (!raw.order_link_id.is_empty()).then(|| raw.order_link_id.into()),
        symbol: canonical_symbol(&raw.symbol),
        side: side(&raw.side)?,
        kind: order_type(&raw.order_type)?,
        status: order_status(&raw.order_status)?,
        price: decimal("price", &raw.price).ok().filter(|p| !p.is_zero()),
        average: (!raw.avg_price.is_empty())
            .then(|| decimal("avgPrice", &raw.avg_price))
            .transpose()?
            .filter(|p| !p.is_zero()),
        remaining: amount - filled,
        amount,
        filled,
        cost: (!raw.cum_exec_value.is_empty())
            .then(|| decimal("cumExecValue", &raw.cum_exec_value))
            .transpose()?
            .unwrap_or_default(),
        fee: None,
        timestamp: millis("createdTime", &raw.created_time)?,
        last_update_timestamp: (!raw.updated_time.is_empty())
            .then(|| millis("updatedTime", &raw.updated_time))
            .transpose()?,
    })
}

pub fn trade(raw: BybitTrade) -> Result<Trade, AdapterError> {
    Ok(Trade {
        id: raw.exec_id.into(),
        symbol: canonical_symbol(&raw.symbol),
        side: side(&raw.side)?,
        price: decimal("execPrice", &raw.exec_price)?,
        amount: decimal("execQty", &raw.exec_qty)?,
        timestamp: millis("execTime", &raw.exec_time)?,
    })
}

pub fn public_trade(raw: BybitPublicTrade) -> Result<Trade, AdapterError> {
    Ok(Trade {
        id: raw.exec_id.into(),
        symbol: canonical_symbol(&raw.symbol),
        side: side(&raw.side)?,
        price: decimal("price", &raw.price)?,
        amount: decimal("size", &raw.size)?,
        timestamp: millis("time", &raw.time)?,
    })
}

pub fn balance(raw: BybitWallet) -> Result<Balance, AdapterError> {
    let currencies = raw
        .coin
        .into_iter()
        .map(|c| {
            let total = decimal("walletBalance", &c.wallet_balance)?;
            let free = (!c.available_to_withdraw.is_empty())
                .then(|| decimal("availableToWithdraw", &c.available_to_withdraw))
                .transpose()?
                .unwrap_or(total);
            Ok(CurrencyBalance {
                currency: c.coin.into(),
                free,
                used: total - free,
                total,
            })
        })
        .collect::<Result<Vec<_>, AdapterError>>()?;

    let total_equity = decimal("totalEquity", &raw.total_equity)?;
    let available_margin = decimal("totalAvailableBalance", &raw.total_available_balance)?;
    let margin_balance = decimal("totalMarginBalance", &raw.total_margin_balance)?;
    Ok(Balance {
        currencies,
        total_equity,
        available_margin,
        used_margin: margin_balance - available_margin,
        unrealized_pnl: decimal("totalPerpUPL", &raw.total_perp_upl)?,
        timestamp: xchange_core::time::now_ms(),
    })
}

pub fn position(raw: BybitPosition) -> Result<Option<Position>, AdapterError> {
    let amount = decimal("size", &raw.size)?;
    if amount.is_zero() {
        return Ok(None);
    }
    let side = match raw.side.as_str() {
        "Buy" => PositionSide::Long,
        _ => PositionSide::Short,
    };
    let leverage = decimal("leverage", &raw.leverage)?;
    let margin_mode = if raw.trade_mode == 1 {
        MarginMode::Isolated
    } else {
        MarginMode::Cross
    };
    let notional = decimal("positionValue", &raw.position_value)?;
    let margin = (!raw.position_im.is_empty())
        .then(|| decimal("positionIM", &raw.position_im))
        .transpose()?
        .unwrap_or_else(|| if leverage.is_zero() { Decimal::ZERO } else { notional / leverage });

    Ok(Some(Position {
        symbol: canonical_symbol(&raw.symbol),
        side,
        amount,
        contracts: amount,
        entry_price: decimal("avgPrice", &raw.avg_price)?,
        mark_price: decimal("markPrice", &raw.mark_price)?,
        liquidation_price: (!raw.liq_price.is_empty())
            .then(|| decimal("liqPrice", &raw.liq_price))
            .transpose()?
            .filter(|p| !p.is_zero()),
        unrealized_pnl: decimal("unrealisedPnl", &raw.unrealised_pnl)?,
        realized_pnl: (!raw.cum_realised_pnl.is_empty())
            .then(|| decimal("cumRealisedPnl", &raw.cum_realised_pnl))
            .transpose()?
            .unwrap_or_default(),
        margin_mode,
        leverage,
        margin,
        notional,
    }))
}

pub fn market(raw: BybitInstrument) -> Result<Market, AdapterError> {
    let price_precision: u32 = raw
        .price_scale
        .parse()
        .map_err(|e| AdapterError::parse_error("priceScale", format!("{e}")))?;
    let tick_size = decimal("tickSize", &raw.price_filter.tick_size)?;
    let lot_size = decimal("qtyStep", &raw.lot_size_filter.qty_step)?;
    let min_amount = decimal("minOrderQty", &raw.lot_size_filter.min_order_qty)?;
    let amount_precision = lot_size
        .normalize()
        .scale();

    Ok(Market {
        id: raw.symbol.clone().into(),
        symbol: canonical_symbol(&raw.symbol),
        base: raw.base_coin.into(),
        quote: raw.quote_coin.clone().into(),
        settle: Some(raw.quote_coin.into()),
        spot: false,
        swap: true,
        future: false,
        option: false,
        active: raw.status == "Trading",
        price_precision,
        amount_precision,
        tick_size,
        lot_size,
        min_amount,
        contract_size: Some(Decimal::ONE),
        maker_fee: Decimal::new(1, 4),
        taker_fee: Decimal::new(6, 4),
    })
}

pub fn ticker(raw: BybitTicker) -> Result<Ticker, AdapterError> {
    let last = decimal("lastPrice", &raw.last_price)?;
    Ok(Ticker {
        symbol: canonical_symbol(&raw.symbol),
        bid: (!raw.bid1_price.is_empty())
            .then(|| decimal("bid1Price", &raw.bid1_price))
            .transpose()?
            .unwrap_or(last),
        ask: (!raw.ask1_price.is_empty())
            .then(|| decimal("ask1Price", &raw.ask1_price))
            .transpose()?
            .unwrap_or(last),
        last,
        high: decimal("highPrice24h", &raw.high_price_24h)?,
        low: decimal("lowPrice24h", &raw.low_price_24h)?,
        base_volume: decimal("volume24h", &raw.volume_24h)?,
        quote_volume: decimal("turnover24h", &raw.turnover_24h)?,
        timestamp: xchange_core::time::now_ms(),
    })
}

pub fn order_book(raw: BybitOrderBookResult) -> Result<OrderBook, AdapterError> {
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
        symbol: canonical_symbol(&raw.s),
        bids: levels(raw.b)?,
        asks: levels(raw.a)?,
        timestamp: raw.ts,
    })
}

pub fn kline(row: BybitKlineRow) -> Result<Kline, AdapterError> {
    let BybitKlineRow(start, open, high, low, close, volume, _turnover) = row;
    Ok(Kline {
        symbol_hash: 0,
        timestamp: millis("start", &start)?,
        open: decimal("open", &open)?,
        high: decimal("high", &high)?,
        low: decimal("low", &low)?,
        close: decimal("close", &close)?,
        volume: decimal("volume", &volume)?,
    })
}

pub fn funding_rate(raw: BybitFundingRow) -> Result<FundingRate, AdapterError> {
    Ok(FundingRate {
        timestamp: millis("fundingRateTimestamp", &raw.funding_rate_timestamp)?,
        rate: decimal("fundingRate", &raw.funding_rate)?,
        mark_price: Decimal::ZERO,
    })
}

pub fn open_interest_kline(raw: BybitOpenInterestRow) -> Result<Kline, AdapterError> {
    let oi = decimal("openInterest", &raw.open_interest)?;
    Ok(Kline {
        symbol_hash: 0,
        timestamp: millis("timestamp", &raw.timestamp)?,
        open: oi,
        high: oi,
        low: oi,
        close: oi,
        volume: oi,
    })
}
