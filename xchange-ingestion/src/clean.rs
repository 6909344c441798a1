//! Per-record validation, intra-batch dedup, and sort for raw venue payloads
//! before they reach a [`crate::sink::RecordSink`].

use rust_decimal::Decimal;
use std::collections::HashSet;
use xchange_core::time::valid_timestamp_range_ms;
use xchange_schema::{FundingRate, Kline, Trade};

#[derive(Debug, Clone, Default)]
pub struct Cleaner;

impl Cleaner {
    pub fn new() -> Self {
        Self
    }

    /// Validates OHLC predicates, drops duplicate timestamps, sorts
    /// ascending. Applies to kline, mark-price, and open-interest batches
    /// alike — all three are carried as [`Kline`] rows.
    pub fn clean_klines(&self, raw: Vec<Kline>) -> Vec<Kline> {
        let mut seen = HashSet::new();
        let mut cleaned: Vec<Kline> = raw
            .into_iter()
            .filter(|k| valid_timestamp(k.timestamp))
            .filter(|k| valid_ohlc(k.open, k.high, k.low, k.close))
            .filter(|k| k.volume >= Decimal::ZERO)
            .filter(|k| seen.insert(k.timestamp))
            .collect();
        cleaned.sort_by_key(|k| k.timestamp);
        cleaned
    }

    pub fn clean_funding_rates(&self, raw: Vec<FundingRate>) -> Vec<FundingRate> {
        let mut seen = HashSet::new();
        let mut cleaned: Vec<FundingRate> = raw
            .into_iter()
            .filter(|f| valid_timestamp(f.timestamp))
            .filter(|f| seen.insert(f.timestamp))
            .collect();
        cleaned.sort_by_key(|f| f.timestamp);
        cleaned
    }

    /// Dedups by `(id, timestamp)` rather than timestamp alone, since
    /// multiple trades can share a millisecond.
    pub fn clean_trades(&self, raw: Vec<Trade>) -> Vec<Trade> {
        let mut seen = HashSet::new();
        let mut cleaned: Vec<Trade> = raw
            .into_iter()
            .filter(|t| valid_timestamp(t.timestamp))
            .filter(|t| t.price > Decimal::ZERO)
            .filter(|t| t.amount >= Decimal::ZERO)
            .filter(|t| seen.insert((t.id.clone(), t.timestamp)))
            .collect();
        cleaned.sort_by_key(|t| t.timestamp);
        cleaned
    }

    /// Flags indices `i` where the close-to-close move exceeds `threshold`
    /// as a fraction of the previous close.
    pub fn detect_anomalies(&self, klines: &[Kline], threshold: Decimal) -> Vec<usize> {
        klines
            .windows(2)
            .enumerate()
            .filter_map(|(i, pair)| {
                let (prev, cur) = (&pair[0], &pair[1]);
                if prev.close.is_zero() {
                    return None;
                }
                let move_fraction = ((cur.close - prev.close) / prev.close).abs();
                (move_fraction > threshold).then_some(i + 1)
            })
            .collect()
    }

    /// Inserts flat-price, zero-volume klines at every missing `interval_ms`
    /// slot between consecutive real klines. Assumes `klines` is already
    /// sorted ascending (true of anything that went through
    /// [`Cleaner::clean_klines`]).
    pub fn fill_missing(&self, klines: &[Kline], interval_ms: i64) -> Vec<Kline> {
        let mut filled = Vec::with_capacity(klines.len());
        for pair in klines.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            filled.push(prev.clone());
            let mut ts = prev.timestamp + interval_ms;
            while ts < next.timestamp {
                filled.push(Kline {
                    symbol_hash: prev.symbol_hash,
                    timestamp: ts,
                    open: prev.close,
                    high: prev.close,
                    low: prev.close,
                    close: prev.close,
                    volume: Decimal::ZERO,
                });
                ts += interval_ms;
            }
        }
        if let Some(last) = klines.last() {
            filled.push(last.clone());
        }
        filled
    }
}

fn valid_timestamp(ts: i64) -> bool {
    valid_timestamp_range_ms().contains(&ts)
}

fn valid_ohlc(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> bool {
    let all_positive = open > Decimal::ZERO
        && high > Decimal::ZERO
        && low > Decimal::ZERO
        && close > Decimal::ZERO;
    all_positive && low <= open && low <= close && open <= high && close <= high
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn kline(ts: i64, o: i64, h: i64, l: i64, c: i64, v: i64) -> Kline {
        Kline {
            symbol_hash: 0,
            timestamp: ts,
            open: Decimal::from(o),
            high: Decimal::from(h),
            low: Decimal::from(l),
            close: Decimal::from(c),
            volume: Decimal::from(v),
        }
    }

    #[test]
    fn drops_duplicate_timestamp_and_invalid_ohlc_then_sorts() {
        let raw = vec![
            kline(1_700_000_000_000, 10, 12, 9, 11, 100),
            kline(1_700_000_000_000, 10, 12, 9, 11, 100),
            kline(1_700_000_060_000, 11, 13, 10, 12, 50),
            kline(1_700_000_120_000, 12, 10, 11, 11, 10), // high < low
        ];
        let cleaned = Cleaner::new().clean_klines(raw);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].timestamp, 1_700_000_000_000);
        assert_eq!(cleaned[1].timestamp, 1_700_000_060_000);
    }

    #[test]
    fn drops_timestamps_outside_valid_range() {
        let raw = vec![kline(1_000_000_000_000, 10, 12, 9, 11, 1)];
        assert!(Cleaner::new().clean_klines(raw).is_empty());
    }

    #[test]
    fn detect_anomalies_flags_large_moves() {
        let klines = vec![
            kline(0, 10, 10, 10, 10, 1),
            kline(60_000, 10, 10, 10, 10, 1),
            kline(120_000, 16, 16, 16, 16, 1),
        ];
        let flagged = Cleaner::new().detect_anomalies(&klines, dec!(0.5));
        assert_eq!(flagged, vec![2]);
    }

    #[test]
    fn fill_missing_inserts_flat_zero_volume_slots() {
        let klines = vec![kline(0, 10, 10, 10, 10, 5), kline(180_000, 12, 12, 12, 12, 7)];
        let filled = Cleaner::new().fill_missing(&klines, 60_000);
        assert_eq!(filled.len(), 4);
        assert_eq!(filled[1].timestamp, 60_000);
        assert_eq!(filled[1].close, Decimal::from(10));
        assert_eq!(filled[1].volume, Decimal::ZERO);
        assert_eq!(filled[2].timestamp, 120_000);
    }

    #[test]
    fn trades_dedup_by_id_and_timestamp_not_timestamp_alone() {
        let mut t1 = sample_trade("a", 1_700_000_000_000);
        let t2 = sample_trade("b", 1_700_000_000_000);
        t1.price = dec!(100);
        let cleaned = Cleaner::new().clean_trades(vec![t1.clone(), t2.clone()]);
        assert_eq!(cleaned.len(), 2);
    }

    fn sample_trade(id: &str, ts: i64) -> Trade {
        Trade {
            id: id.into(),
            symbol: xchange_schema::Symbol::new("BTC/USDT:USDT"),
            side: xchange_schema::Side::Buy,
            price: dec!(100),
            amount: dec!(1),
            timestamp: ts,
        }
    }
}
