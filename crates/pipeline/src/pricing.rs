//! Limit-price adjustment.
//!
//! Entry orders are priced above the observed quote and exits below it so a
//! limit order still fills against a moving market. The default offset of 20%
//! is wide enough that the order behaves close to a market order.

use alert_bridge_core::OrderSide;
use rust_decimal::{Decimal, RoundingStrategy};

/// Default offset from the reference price, in percent.
pub const DEFAULT_BIAS_PCT: u32 = 20;

/// Rounds `value` to the nearest multiple of `tick_size`, ties to even.
#[must_use]
pub fn round_to_tick(value: Decimal, tick_size: Decimal) -> Decimal {
    (value / tick_size).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * tick_size
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceAdjuster {
    bias_pct: Decimal,
}

impl Default for PriceAdjuster {
    fn default() -> Self {
        Self::new(Decimal::from(DEFAULT_BIAS_PCT))
    }
}

impl PriceAdjuster {
    /// Creates an adjuster; the bias is clamped to `0..=100` percent.
    #[must_use]
    pub fn new(bias_pct: Decimal) -> Self {
        Self {
            bias_pct: bias_pct.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED),
        }
    }

    #[must_use]
    pub const fn bias_pct(&self) -> Decimal {
        self.bias_pct
    }

    /// Returns a limit price on the tick grid.
    ///
    /// A BUY is never below the reference price and a SELL never above it.
    /// A non-positive tick size leaves the reference price unchanged.
    #[must_use]
    pub fn adjust(&self, reference_price: Decimal, tick_size: Decimal, side: OrderSide) -> Decimal {
        if tick_size <= Decimal::ZERO {
            return reference_price;
        }

        let factor = self.bias_pct / Decimal::ONE_HUNDRED;
        let price = match side {
            OrderSide::Buy => {
                let biased = round_to_tick(reference_price * (Decimal::ONE + factor), tick_size);
                let floor = (reference_price / tick_size).ceil() * tick_size;
                biased.max(floor)
            }
            OrderSide::Sell => {
                let biased = round_to_tick(reference_price * (Decimal::ONE - factor), tick_size);
                let ceiling = (reference_price / tick_size).floor() * tick_size;
                let capped = biased.min(ceiling);
                if capped <= Decimal::ZERO && ceiling >= tick_size {
                    tick_size
                } else {
                    capped.max(Decimal::ZERO)
                }
            }
        };

        price.normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn on_grid(price: Decimal, tick: Decimal) -> bool {
        (price % tick).is_zero()
    }

    #[test]
    fn default_bias_moves_buy_up_and_sell_down() {
        let adjuster = PriceAdjuster::default();
        // 12.35 * 1.2 = 14.82 -> 296.4 ticks -> 296
        assert_eq!(adjuster.adjust(dec!(12.35), dec!(0.05), OrderSide::Buy), dec!(14.80));
        // 12.35 * 0.8 = 9.88 -> 197.6 ticks -> 198
        assert_eq!(adjuster.adjust(dec!(12.35), dec!(0.05), OrderSide::Sell), dec!(9.90));
    }

    #[test]
    fn ties_round_half_to_even() {
        assert_eq!(round_to_tick(dec!(0.125), dec!(0.05)), dec!(0.10));
        assert_eq!(round_to_tick(dec!(0.175), dec!(0.05)), dec!(0.20));
    }

    #[test]
    fn zero_bias_stays_on_side_of_reference() {
        let adjuster = PriceAdjuster::new(Decimal::ZERO);
        // 10.02 sits between ticks: BUY rounds up, SELL rounds down.
        assert_eq!(adjuster.adjust(dec!(10.02), dec!(0.05), OrderSide::Buy), dec!(10.05));
        assert_eq!(adjuster.adjust(dec!(10.02), dec!(0.05), OrderSide::Sell), dec!(10.00));
    }

    #[test]
    fn prices_are_tick_multiples_and_bounded() {
        let adjuster = PriceAdjuster::default();
        let ticks = [dec!(0.05), dec!(0.10), dec!(1), dec!(0.0025)];
        let references = [dec!(0.05), dec!(0.37), dec!(12.35), dec!(101.01), dec!(4567.89)];

        for tick in ticks {
            for reference in references {
                let buy = adjuster.adjust(reference, tick, OrderSide::Buy);
                let sell = adjuster.adjust(reference, tick, OrderSide::Sell);
                assert!(on_grid(buy, tick), "buy {buy} off grid {tick}");
                assert!(on_grid(sell, tick), "sell {sell} off grid {tick}");
                assert!(buy >= reference, "buy {buy} < {reference}");
                assert!(sell <= reference, "sell {sell} > {reference}");
            }
        }
    }

    #[test]
    fn full_bias_sell_keeps_one_tick() {
        let adjuster = PriceAdjuster::new(dec!(150));
        assert_eq!(adjuster.bias_pct(), dec!(100));
        assert_eq!(adjuster.adjust(dec!(3.00), dec!(0.05), OrderSide::Sell), dec!(0.05));
    }
}
