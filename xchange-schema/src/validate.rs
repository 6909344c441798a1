//! Runtime validation gate.
//!
//! The type system already enforces structural shape, so what's left to
//! check at runtime is field predicates and enum membership — exactly what
//! venue payloads can still get wrong after deserialization (a negative
//! amount, a `filled` that overshoots `amount`, a non-finite timestamp).
//! Every `validate` impl is a pure function, safe to call from any component
//! concurrently, and returns a [`ValidationError`] carrying the offending
//! field path.

use crate::error::{invalid, ValidationError};
use crate::model::*;
use rust_decimal::Decimal;

/// Validates `Self` against the unified schema's invariants, returning `Self`
/// unchanged on success. Implementors must not mutate data — only check it.
pub trait Validate: Sized {
    fn validate(self) -> Result<Self, ValidationError>;
}

fn non_negative(field: &str, value: Decimal) -> Result<(), ValidationError> {
    if value < Decimal::ZERO {
        invalid!(field, "must be >= 0, got {value}");
    }
    Ok(())
}

fn positive(field: &str, value: Decimal) -> Result<(), ValidationError> {
    if value <= Decimal::ZERO {
        invalid!(field, "must be > 0, got {value}");
    }
    Ok(())
}

impl Validate for Market {
    fn validate(self) -> Result<Self, ValidationError> {
        if self.id.is_empty() {
            invalid!("market.id", "must not be empty");
        }
        if !(self.spot || self.swap || self.future || self.option) {
            invalid!("market.kind", "at least one of spot/swap/future/option must be set");
        }
        positive("market.tick_size", self.tick_size)?;
        positive("market.lot_size", self.lot_size)?;
        non_negative("market.min_amount", self.min_amount)?;
        non_negative("market.maker_fee", self.maker_fee)?;
        non_negative("market.taker_fee", self.taker_fee)?;

        let expected_tick = Decimal::new(1, self.price_precision);
        if self.tick_size != expected_tick {
            invalid!(
                "market.tick_size",
                "inconsistent with price_precision: expected {expected_tick}, got {}",
                self.tick_size
            );
        }
        Ok(self)
    }
}

impl Validate for Order {
    fn validate(self) -> Result<Self, ValidationError> {
        non_negative("order.amount", self.amount)?;
        non_negative("order.filled", self.filled)?;
        non_negative("order.remaining", self.remaining)?;
        non_negative("order.cost", self.cost)?;
        if let Some(price) = self.price {
            positive("order.price", price)?;
        }

        // filled + remaining = amount, modulo venue rounding.
        let tolerance = Decimal::new(1, 8);
        if (self.filled + self.remaining - self.amount).abs() > tolerance {
            invalid!(
                "order.remaining",
                "filled ({}) + remaining ({}) != amount ({})",
                self.filled,
                self.remaining,
                self.amount
            );
        }

        if self.status == OrderStatus::Filled && self.remaining != Decimal::ZERO {
            invalid!("order.status", "status=filled requires remaining=0, got {}", self.remaining);
        }

        if matches!(
            self.status,
            OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        ) && self.filled > self.amount
        {
            invalid!("order.filled", "filled ({}) exceeds amount ({}) for a terminal non-fill status", self.filled, self.amount);
        }

        if self.timestamp <= 0 {
            invalid!("order.timestamp", "must be a positive ms epoch timestamp");
        }

        Ok(self)
    }
}

impl Validate for Position {
    fn validate(self) -> Result<Self, ValidationError> {
        non_negative("position.amount", self.amount)?;
        non_negative("position.contracts", self.contracts)?;
        positive("position.entry_price", self.entry_price)?;
        positive("position.mark_price", self.mark_price)?;
        non_negative("position.notional", self.notional)?;
        if self.leverage < Decimal::ONE {
            invalid!("position.leverage", "must be >= 1, got {}", self.leverage);
        }
        Ok(self)
    }
}

impl Validate for CurrencyBalance {
    fn validate(self) -> Result<Self, ValidationError> {
        non_negative("balance.free", self.free)?;
        non_negative("balance.used", self.used)?;
        let expected = self.free + self.used;
        if (self.total - expected).abs() > Decimal::new(1, 8) {
            invalid!(
                "balance.total",
                "total ({}) != free ({}) + used ({})",
                self.total,
                self.free,
                self.used
            );
        }
        Ok(self)
    }
}

impl Validate for Balance {
    fn validate(self) -> Result<Self, ValidationError> {
        let mut currencies = Vec::with_capacity(self.currencies.len());
        for c in self.currencies {
            currencies.push(c.validate()?);
        }
        if self.timestamp <= 0 {
            invalid!("balance.timestamp", "must be a positive ms epoch timestamp");
        }
        Ok(Self {
            currencies,
            ..self
        })
    }
}

impl Validate for Ticker {
    fn validate(self) -> Result<Self, ValidationError> {
        positive("ticker.bid", self.bid)?;
        positive("ticker.ask", self.ask)?;
        positive("ticker.last", self.last)?;
        non_negative("ticker.base_volume", self.base_volume)?;
        non_negative("ticker.quote_volume", self.quote_volume)?;
        if self.bid > self.ask {
            invalid!("ticker.bid", "bid ({}) must not exceed ask ({})", self.bid, self.ask);
        }
        Ok(self)
    }
}

impl Validate for OrderBook {
    fn validate(self) -> Result<Self, ValidationError> {
        for (i, window) in self.bids.windows(2).enumerate() {
            if window[0].price < window[1].price {
                invalid!("order_book.bids", "bids must be descending by price (index {i})");
            }
        }
        for (i, window) in self.asks.windows(2).enumerate() {
            if window[0].price > window[1].price {
                invalid!("order_book.asks", "asks must be ascending by price (index {i})");
            }
        }
        for level in self.bids.iter().chain(self.asks.iter()) {
            positive("order_book.level.price", level.price)?;
            non_negative("order_book.level.amount", level.amount)?;
        }
        Ok(self)
    }
}

impl Validate for Trade {
    fn validate(self) -> Result<Self, ValidationError> {
        positive("trade.price", self.price)?;
        non_negative("trade.amount", self.amount)?;
        if self.timestamp <= 0 {
            invalid!("trade.timestamp", "must be a positive ms epoch timestamp");
        }
        Ok(self)
    }
}

impl Validate for Kline {
    fn validate(self) -> Result<Self, ValidationError> {
        positive("kline.open", self.open)?;
        positive("kline.high", self.high)?;
        positive("kline.low", self.low)?;
        positive("kline.close", self.close)?;
        non_negative("kline.volume", self.volume)?;
        if self.low > self.open.min(self.close) {
            invalid!("kline.low", "low ({}) must be <= min(open, close)", self.low);
        }
        if self.high < self.open.max(self.close) {
            invalid!("kline.high", "high ({}) must be >= max(open, close)", self.high);
        }
        Ok(self)
    }
}

impl Validate for FundingRate {
    fn validate(self) -> Result<Self, ValidationError> {
        positive("funding_rate.mark_price", self.mark_price)?;
        Ok(self)
    }
}

impl Validate for Checkpoint {
    fn validate(self) -> Result<Self, ValidationError> {
        if self.last_timestamp < 0 {
            invalid!("checkpoint.last_timestamp", "must be >= 0, got {}", self.last_timestamp);
        }
        if self.status == CheckpointStatus::Failed && self.error_message.is_none() {
            invalid!("checkpoint.error_message", "a failed checkpoint must record an error_message");
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_order() -> Order {
        Order {
            id: "1".into(),
            client_order_id: None,
            symbol: Symbol::new("BTC/USDT"),
            side: Side::Buy,
            kind: OrderType::Limit,
            status: OrderStatus::Open,
            price: Some(dec!(100)),
            average: None,
            amount: dec!(1),
            filled: dec!(0.4),
            remaining: dec!(0.6),
            cost: dec!(40),
            fee: None,
            timestamp: 1_700_000_000_000,
            last_update_timestamp: None,
        }
    }

    #[test]
    fn order_filled_plus_remaining_must_equal_amount() {
        let mut order = base_order();
        order.remaining = dec!(0.5);
        assert!(order.validate().is_err());
    }

    #[test]
    fn order_filled_status_requires_zero_remaining() {
        let mut order = base_order();
        order.status = OrderStatus::Filled;
        order.filled = dec!(1);
        order.remaining = dec!(0);
        assert!(order.clone().validate().is_ok());

        order.remaining = dec!(0.1);
        order.filled = dec!(0.9);
        assert!(order.validate().is_err());
    }

    #[test]
    fn kline_ohlc_predicate_enforced() {
        let bad = Kline {
            symbol_hash: 1,
            timestamp: 1_700_000_000_000,
            open: dec!(12),
            high: dec!(10),
            low: dec!(11),
            close: dec!(11),
            volume: dec!(10),
        };
        assert!(bad.validate().is_err());

        let good = Kline {
            high: dec!(13),
            low: dec!(9),
            ..bad
        };
        assert!(good.validate().is_ok());
    }

    #[test]
    fn error_message_includes_field_path() {
        let mut order = base_order();
        order.amount = dec!(-1);
        let err = order.validate().unwrap_err();
        assert_eq!(err.field, "order.amount");
    }

    #[test]
    fn failed_checkpoint_requires_error_message() {
        let checkpoint = Checkpoint {
            venue: "binance".into(),
            symbol: Symbol::new("BTC/USDT"),
            data_type: DataType::Kline,
            last_timestamp: 100,
            updated_at: 200,
            status: CheckpointStatus::Failed,
            downloaded_count: 0,
            error_message: None,
        };
        assert!(checkpoint.validate().is_err());
    }
}
