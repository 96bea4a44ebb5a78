//! Tick and sqrt-price conversion for Uniswap V3–style pools.
//!
//! ## Math
//!
//! A tick $t$ stands for the raw price $P = 1.0001^t$ (token1 per token0 in
//! base units). Pools keep $\sqrt{P}$ as Q64.96 fixed point:
//!
//! $$sqrtPriceX96 = \lfloor \sqrt{1.0001^t} \times 2^{96} \rfloor$$
//!
//! ## Precision
//!
//! The power and square root are taken in `f64` and the truncated result is
//! moved into `U256` bit-exactly. Extreme ticks therefore carry the usual
//! 53-bit mantissa error of the float computation, but the fixed-point value
//! never wraps: `sqrt(1.0001^887272) * 2^96` is about 2^160, well inside U256.

use alloy::primitives::U256;

/// Base of the tick price grid.
pub const TICK_BASE: f64 = 1.0001;

/// Lowest tick a pool can initialize.
pub const MIN_TICK: i32 = -887_272;

/// Highest tick a pool can initialize.
pub const MAX_TICK: i32 = 887_272;

/// 2^96, the Q64.96 scale.
pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

/// 2^96 as `f64` (exactly representable).
pub const Q96_F64: f64 = 79_228_162_514_264_337_593_543_950_336.0;

const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

/// Convert a tick to its Q64.96 sqrt-price, truncated toward zero.
pub fn tick_to_sqrt_price_x96(tick: i32) -> U256 {
    let sqrt_price = TICK_BASE.powf(f64::from(tick)).sqrt();
    u256_from_f64(sqrt_price * Q96_F64)
}

/// Unscaled sqrt-price: `sqrt_price_x96 / 2^96`.
pub fn sqrt_ratio(sqrt_price_x96: U256) -> f64 {
    u256_to_f64(sqrt_price_x96) / Q96_F64
}

/// Convert a Q64.96 sqrt-price to a human-readable token1-per-token0 price.
///
/// Squares the unscaled sqrt-price and applies `10^(token1_decimals - token0_decimals)`.
pub fn sqrt_price_x96_to_price(sqrt_price_x96: U256, token0_decimals: u8, token1_decimals: u8) -> f64 {
    let ratio = sqrt_ratio(sqrt_price_x96);
    let decimal_adjustment = 10f64.powi(i32::from(token1_decimals) - i32::from(token0_decimals));
    ratio * ratio * decimal_adjustment
}

/// Nearest `f64` to a `U256`.
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * TWO_POW_64 + limb as f64)
}

/// Truncate a non-negative `f64` into a `U256`.
///
/// Reads the integer part straight from the IEEE-754 bit pattern so no
/// intermediate decimal rendering is involved. NaN and values below one map
/// to zero; values beyond U256 saturate.
pub fn u256_from_f64(value: f64) -> U256 {
    if value.is_nan() || value < 1.0 {
        return U256::ZERO;
    }
    if value.is_infinite() {
        return U256::MAX;
    }

    let bits = value.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32 - 1075;
    let mantissa = (bits & ((1u64 << 52) - 1)) | (1u64 << 52);

    if exponent >= 0 {
        // 53 significant bits shifted left must stay below 2^256.
        if exponent > 256 - 53 {
            return U256::MAX;
        }
        U256::from(mantissa) << (exponent as usize)
    } else {
        // value >= 1 keeps the exponent within [-52, -1].
        U256::from(mantissa >> exponent.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, rel_tol: f64) {
        let scale = expected.abs().max(f64::MIN_POSITIVE);
        assert!(
            ((actual - expected) / scale).abs() <= rel_tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn tick_zero_is_exactly_q96() {
        assert_eq!(tick_to_sqrt_price_x96(0), Q96);
        assert_eq!(u256_to_f64(Q96), Q96_F64);
    }

    #[test]
    fn adjacent_ticks_match_reference_values() {
        // floor(sqrt(1.0001^t) * 2^96) computed with IEEE doubles.
        let up = U256::from_str_radix("79232123823359791237469044736", 10).expect("valid U256");
        let down = U256::from_str_radix("79224201403219480230026543104", 10).expect("valid U256");
        assert_eq!(tick_to_sqrt_price_x96(1), up);
        assert_eq!(tick_to_sqrt_price_x96(-1), down);
    }

    #[test]
    fn extreme_ticks_stay_near_pool_limits() {
        // MIN_SQRT_RATIO / MAX_SQRT_RATIO of the reference AMM.
        let min = u256_to_f64(tick_to_sqrt_price_x96(MIN_TICK));
        let max = u256_to_f64(tick_to_sqrt_price_x96(MAX_TICK));
        assert_close(min, 4_295_128_739.0, 1e-9);
        assert_close(max, 1.461_446_703_485_210_1e48, 1e-9);
    }

    #[test]
    fn sqrt_price_is_monotonic_in_tick() {
        let mut previous = tick_to_sqrt_price_x96(MIN_TICK);
        let mut tick = MIN_TICK + 1;
        while tick <= MAX_TICK {
            let current = tick_to_sqrt_price_x96(tick);
            assert!(current > previous, "not increasing at tick {tick}");
            previous = current;
            tick += 9_973;
        }

        for tick in -50..50 {
            assert!(tick_to_sqrt_price_x96(tick) < tick_to_sqrt_price_x96(tick + 1));
        }
    }

    #[test]
    fn price_round_trips_through_fixed_point() {
        for tick in [-200_000, -46_054, -100, -1, 0, 1, 100, 46_054, 200_000] {
            let price = sqrt_price_x96_to_price(tick_to_sqrt_price_x96(tick), 18, 18);
            assert_close(price, TICK_BASE.powf(f64::from(tick)), 1e-9);
        }
    }

    #[test]
    fn price_applies_decimal_adjustment() {
        // Raw price 1.0 between an 18-decimal token0 and a 6-decimal token1.
        let price = sqrt_price_x96_to_price(Q96, 18, 6);
        assert_close(price, 1e-12, 1e-12);

        let price = sqrt_price_x96_to_price(Q96, 6, 18);
        assert_close(price, 1e12, 1e-12);
    }

    #[test]
    fn f64_conversion_truncates_and_saturates() {
        assert_eq!(u256_from_f64(0.99), U256::ZERO);
        assert_eq!(u256_from_f64(-5.0), U256::ZERO);
        assert_eq!(u256_from_f64(f64::NAN), U256::ZERO);
        assert_eq!(u256_from_f64(7.9), U256::from(7u64));
        assert_eq!(u256_from_f64(f64::INFINITY), U256::MAX);
        assert_eq!(u256_from_f64(1e300), U256::MAX);
        assert_eq!(u256_from_f64(Q96_F64 * 4.0), Q96 << 2);
    }
}
