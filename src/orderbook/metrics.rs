//! Microstructure metrics computed from level snapshots
//!
//! Pure functions over `(bids, asks)`; nothing here touches the book.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::BookLevel;

/// Metrics over the top levels of a book. Pair-dependent fields are
/// `None` unless both sides are populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetrics {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub midpoint: Option<Decimal>,

    /// Spread normalized by the midpoint, in basis points
    pub spread_bps: Option<Decimal>,

    /// Total bid size over total ask size; 1 when the ask side is empty
    pub imbalance: Decimal,

    /// `(imbalance - 1) / (imbalance + 1)`, in [-1, 1]
    pub market_pressure: Decimal,

    pub vwap_bid: Option<Decimal>,
    pub vwap_ask: Option<Decimal>,

    /// Resting bid size within half a percent of the best bid
    pub depth_half_pct_bid: Option<Decimal>,
    /// Resting ask size within half a percent of the best ask
    pub depth_half_pct_ask: Option<Decimal>,

    /// Relative price move to absorb 1% of two-sided depth on the ask
    /// side; `None` when the walk exhausts the visible book
    pub impact_1pct: Option<Decimal>,

    /// Total visible size per side
    pub bid_depth: Decimal,
    pub ask_depth: Decimal,

    pub bid_levels: usize,
    pub ask_levels: usize,
}

impl BookMetrics {
    /// A book with both sides quoted and a computable spread
    pub fn is_healthy(&self) -> bool {
        self.spread_bps.is_some() && self.bid_levels > 0 && self.ask_levels > 0
    }
}

/// Compute metrics from level snapshots in priority order (bids
/// descending, asks ascending).
pub fn compute_metrics(bids: &[BookLevel], asks: &[BookLevel]) -> BookMetrics {
    let bid_depth: Decimal = bids.iter().map(|l| l.size).sum();
    let ask_depth: Decimal = asks.iter().map(|l| l.size).sum();

    let best_bid = bids.first().map(|l| l.price);
    let best_ask = asks.first().map(|l| l.price);

    let (spread, midpoint) = match (best_bid, best_ask) {
        (Some(bid), Some(ask)) => (Some(ask - bid), Some((bid + ask) / Decimal::from(2))),
        _ => (None, None),
    };

    let spread_bps = match (spread, midpoint) {
        (Some(spread), Some(mid)) if mid > Decimal::ZERO => {
            Some(spread / mid * Decimal::from(10_000))
        }
        _ => None,
    };

    let imbalance = if ask_depth > Decimal::ZERO {
        bid_depth / ask_depth
    } else {
        Decimal::ONE
    };
    let market_pressure = (imbalance - Decimal::ONE) / (imbalance + Decimal::ONE);

    BookMetrics {
        best_bid,
        best_ask,
        spread,
        midpoint,
        spread_bps,
        imbalance,
        market_pressure,
        vwap_bid: vwap(bids),
        vwap_ask: vwap(asks),
        depth_half_pct_bid: best_bid.map(|best| {
            let floor = best * Decimal::new(995, 3);
            bids.iter()
                .filter(|l| l.price >= floor)
                .map(|l| l.size)
                .sum()
        }),
        depth_half_pct_ask: best_ask.map(|best| {
            let ceiling = best * Decimal::new(1005, 3);
            asks.iter()
                .filter(|l| l.price <= ceiling)
                .map(|l| l.size)
                .sum()
        }),
        impact_1pct: impact_1pct(asks, bid_depth + ask_depth),
        bid_depth,
        ask_depth,
        bid_levels: bids.len(),
        ask_levels: asks.len(),
    }
}

/// Volume-weighted average price over one side's levels
fn vwap(levels: &[BookLevel]) -> Option<Decimal> {
    let total: Decimal = levels.iter().map(|l| l.size).sum();
    if total <= Decimal::ZERO {
        return None;
    }
    let notional: Decimal = levels.iter().map(|l| l.price * l.size).sum();
    Some(notional / total)
}

/// Walk the ask side until the cumulative size covers 1% of total
/// two-sided depth; report the relative distance from the best ask to
/// the price that absorbed it.
fn impact_1pct(asks: &[BookLevel], total_depth: Decimal) -> Option<Decimal> {
    let best_ask = asks.first().map(|l| l.price)?;
    if best_ask <= Decimal::ZERO {
        return None;
    }
    let target = total_depth * Decimal::new(1, 2);

    let mut cumulative = Decimal::ZERO;
    for level in asks {
        cumulative += level.size;
        if cumulative >= target {
            return Some((level.price - best_ask) / best_ask);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn levels(pairs: &[(Decimal, Decimal)]) -> Vec<BookLevel> {
        pairs
            .iter()
            .map(|&(price, size)| BookLevel { price, size })
            .collect()
    }

    /// Balanced book: bids (100, 10), (99, 20); asks (101, 10), (102, 20)
    fn balanced() -> (Vec<BookLevel>, Vec<BookLevel>) {
        (
            levels(&[(dec!(100), dec!(10)), (dec!(99), dec!(20))]),
            levels(&[(dec!(101), dec!(10)), (dec!(102), dec!(20))]),
        )
    }

    #[test]
    fn test_balanced_book_metrics() {
        let (bids, asks) = balanced();
        let m = compute_metrics(&bids, &asks);

        assert_eq!(m.best_bid, Some(dec!(100)));
        assert_eq!(m.best_ask, Some(dec!(101)));
        assert_eq!(m.spread, Some(dec!(1)));
        assert_eq!(m.midpoint, Some(dec!(100.5)));
        assert_eq!(m.imbalance, dec!(1));
        assert_eq!(m.market_pressure, dec!(0));

        // spread 1 over midpoint 100.5, in bps
        assert_eq!(m.spread_bps.unwrap().round_dp(2), dec!(99.50));

        // (100*10 + 99*20) / 30 and the symmetric ask side
        assert_eq!(m.vwap_bid.unwrap().round_dp(4), dec!(99.3333));
        assert_eq!(m.vwap_ask.unwrap().round_dp(4), dec!(101.6667));

        assert_eq!(m.bid_depth, dec!(30));
        assert_eq!(m.ask_depth, dec!(30));
        assert_eq!(m.bid_levels, 2);
        assert_eq!(m.ask_levels, 2);
        assert!(m.is_healthy());
    }

    #[test]
    fn test_depth_within_half_percent() {
        let (bids, asks) = balanced();
        let m = compute_metrics(&bids, &asks);
        // 100 * 0.995 = 99.5 excludes the 99 level
        assert_eq!(m.depth_half_pct_bid, Some(dec!(10)));
        // 101 * 1.005 = 101.505 excludes the 102 level
        assert_eq!(m.depth_half_pct_ask, Some(dec!(10)));
    }

    #[test]
    fn test_impact_absorbed_at_touch() {
        let (bids, asks) = balanced();
        let m = compute_metrics(&bids, &asks);
        // 1% of 60 is 0.6, absorbed by the first ask level
        assert_eq!(m.impact_1pct, Some(dec!(0)));
    }

    #[test]
    fn test_impact_walks_levels() {
        // Total depth 400, target 4; first two ask levels hold 1 + 2,
        // the third finally absorbs it at price 103
        let bids = levels(&[(dec!(100), dec!(197))]);
        let asks = levels(&[
            (dec!(101), dec!(1)),
            (dec!(102), dec!(2)),
            (dec!(103), dec!(200)),
        ]);
        let m = compute_metrics(&bids, &asks);
        let expected = (dec!(103) - dec!(101)) / dec!(101);
        assert_eq!(m.impact_1pct, Some(expected));
    }

    #[test]
    fn test_impact_unavailable_when_book_too_thin() {
        let bids = levels(&[(dec!(100), dec!(1000))]);
        let asks = levels(&[(dec!(101), dec!(5))]);
        // Target is 10.05 but the whole ask side holds 5
        let m = compute_metrics(&bids, &asks);
        assert_eq!(m.impact_1pct, None);
    }

    #[test]
    fn test_imbalance_and_pressure() {
        let bids = levels(&[(dec!(100), dec!(30))]);
        let asks = levels(&[(dec!(101), dec!(10))]);
        let m = compute_metrics(&bids, &asks);
        assert_eq!(m.imbalance, dec!(3));
        assert_eq!(m.market_pressure, dec!(0.5));
    }

    #[test]
    fn test_one_sided_book_is_neutral() {
        let bids = levels(&[(dec!(100), dec!(10))]);
        let m = compute_metrics(&bids, &[]);
        assert_eq!(m.best_bid, Some(dec!(100)));
        assert_eq!(m.best_ask, None);
        assert_eq!(m.spread, None);
        assert_eq!(m.spread_bps, None);
        assert_eq!(m.imbalance, dec!(1));
        assert_eq!(m.market_pressure, dec!(0));
        assert_eq!(m.vwap_ask, None);
        assert_eq!(m.impact_1pct, None);
        assert!(!m.is_healthy());
    }

    #[test]
    fn test_empty_book_metrics() {
        let m = compute_metrics(&[], &[]);
        assert_eq!(m.best_bid, None);
        assert_eq!(m.imbalance, dec!(1));
        assert_eq!(m.bid_depth, dec!(0));
        assert_eq!(m.bid_levels, 0);
    }
}
