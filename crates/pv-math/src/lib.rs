//! pv-math: concentrated-liquidity math.
//!
//! Converts ticks to Q64.96 sqrt-prices and a position's liquidity into the
//! token amounts it holds at the current pool price.

pub mod liquidity;
pub mod tick_math;

pub use liquidity::{price_regime, token_amounts_from_liquidity, PriceRegime, TokenAmounts};
pub use tick_math::{sqrt_price_x96_to_price, tick_to_sqrt_price_x96, Q96};
