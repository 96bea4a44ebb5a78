//! Token amounts held by a concentrated-liquidity position.
//!
//! ## Math
//!
//! With $L$ the position liquidity and $\sqrt{P_c}, \sqrt{P_a}, \sqrt{P_b}$ the
//! unscaled current, lower and upper sqrt-prices:
//!
//! | Regime | amount0 | amount1 |
//! |--------|---------|---------|
//! | $\sqrt{P_c} \le \sqrt{P_a}$ | $L(1/\sqrt{P_a} - 1/\sqrt{P_b})$ | 0 |
//! | $\sqrt{P_c} \ge \sqrt{P_b}$ | 0 | $L(\sqrt{P_b} - \sqrt{P_a})$ |
//! | otherwise | $L(1/\sqrt{P_c} - 1/\sqrt{P_b})$ | $L(\sqrt{P_c} - \sqrt{P_a})$ |
//!
//! The regimes are tested in that order, so `current == lower` lands in
//! `Below` and `current == upper` lands in `Above`.

use alloy::primitives::U256;

use crate::tick_math::sqrt_ratio;

/// Where the pool price sits relative to a position's range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceRegime {
    /// Current sqrt-price at or below the lower bound: all token0.
    Below,
    /// Strictly inside the range: both tokens.
    Within,
    /// At or above the upper bound: all token1.
    Above,
}

/// Human-readable amounts of a position, ordered designated-token first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TokenAmounts {
    /// Amount of the designated token (REG).
    pub reg: f64,
    /// Amount of the other pool token.
    pub other: f64,
}

/// Classify the current sqrt-price against a range.
pub fn price_regime(sqrt_current: U256, sqrt_lower: U256, sqrt_upper: U256) -> PriceRegime {
    if sqrt_current <= sqrt_lower {
        PriceRegime::Below
    } else if sqrt_current >= sqrt_upper {
        PriceRegime::Above
    } else {
        PriceRegime::Within
    }
}

/// Compute the designated and other token amounts of a position.
///
/// ## Parameters
///
/// - `liquidity`: position liquidity in pool units.
/// - `sqrt_current`, `sqrt_lower`, `sqrt_upper`: Q64.96 sqrt-prices.
/// - `reg_is_token0`: whether the designated token is the pool's token0.
/// - `token0_decimals`, `token1_decimals`: decimals of the pool's token0 and
///   token1, used to scale the raw amounts.
pub fn token_amounts_from_liquidity(
    liquidity: u128,
    sqrt_current: U256,
    sqrt_lower: U256,
    sqrt_upper: U256,
    reg_is_token0: bool,
    token0_decimals: u8,
    token1_decimals: u8,
) -> TokenAmounts {
    let liquidity = liquidity as f64;
    let current = sqrt_ratio(sqrt_current);
    let lower = sqrt_ratio(sqrt_lower);
    let upper = sqrt_ratio(sqrt_upper);

    let (amount0, amount1) = match price_regime(sqrt_current, sqrt_lower, sqrt_upper) {
        PriceRegime::Below => (liquidity * (1.0 / lower - 1.0 / upper), 0.0),
        PriceRegime::Above => (0.0, liquidity * (upper - lower)),
        PriceRegime::Within => (
            liquidity * (1.0 / current - 1.0 / upper),
            liquidity * (current - lower),
        ),
    };

    let amount0 = amount0 / 10f64.powi(i32::from(token0_decimals));
    let amount1 = amount1 / 10f64.powi(i32::from(token1_decimals));

    if reg_is_token0 {
        TokenAmounts {
            reg: amount0,
            other: amount1,
        }
    } else {
        TokenAmounts {
            reg: amount1,
            other: amount0,
        }
    }
}
