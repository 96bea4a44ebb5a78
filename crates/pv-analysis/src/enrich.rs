//! Position enrichment: raw subgraph positions to voting-ready holdings.
//!
//! For each position with liquidity, the enricher
//!
//! 1. works out whether the designated token (REG) is token0 or token1,
//! 2. converts the range ticks and the pool tick to Q64.96 sqrt-prices,
//! 3. derives the held token amounts,
//! 4. expresses the range bounds and the pool price in designated-token terms,
//! 5. values the other token in REG (`reg_equivalent`),
//! 6. computes the fixed 4x / 2x sub-scores with a sanity clamp,
//! 7. measures how far the range center sits from the current price,
//! 8. classifies the position as below, in or above range.
//!
//! All positions are assumed to come from one pool; the first position that
//! survives the liquidity filter fixes the reported current price and the
//! other token's symbol.

use std::fmt;

use pv_data::types::RawPosition;
use pv_math::liquidity::token_amounts_from_liquidity;
use pv_math::tick_math::tick_to_sqrt_price_x96;
use tracing::{debug, info, warn};

use crate::scoring::{Variables, IS_ACTIVE, PRICE_DISTANCE, RELATIVE_DISTANCE};

/// Designated token symbol used when none is configured.
pub const DEFAULT_REG_SYMBOL: &str = "REG";

/// Votes per designated token held.
pub const REG_MULTIPLIER: f64 = 4.0;

/// Votes per designated-token equivalent of the other token.
pub const EQUIVALENT_MULTIPLIER: f64 = 2.0;

/// Sub-score totals above this are treated as a numeric error.
pub const SANITY_LIMIT: f64 = 1e10;

/// Per-amount cap applied when [`SANITY_LIMIT`] trips.
pub const CAPPED_AMOUNT: f64 = 1e5;

/// Where the current price sits relative to the range, and which token the
/// position therefore holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionType {
    BelowRangeRegOnly,
    BelowRangeOtherOnly,
    AboveRangeOtherOnly,
    AboveRangeRegOnly,
    InRange,
}

impl PositionType {
    /// Display label, e.g. `Below Range (REG only)` or `In Range (REG+USDC)`.
    pub fn label(self, reg_symbol: &str, other_symbol: &str) -> String {
        match self {
            PositionType::BelowRangeRegOnly => format!("Below Range ({reg_symbol} only)"),
            PositionType::BelowRangeOtherOnly => format!("Below Range ({other_symbol} only)"),
            PositionType::AboveRangeOtherOnly => format!("Above Range ({other_symbol} only)"),
            PositionType::AboveRangeRegOnly => format!("Above Range ({reg_symbol} only)"),
            PositionType::InRange => format!("In Range ({reg_symbol}+{other_symbol})"),
        }
    }
}

/// A position expressed in designated-token terms.
#[derive(Clone, Debug, PartialEq)]
pub struct EnrichedPosition {
    /// Position identifier.
    pub id: String,
    /// Owner address.
    pub owner: String,
    /// Whether the designated token is the pool's token0.
    pub reg_is_token0: bool,
    /// Designated token symbol.
    pub reg_symbol: String,
    /// Other token symbol.
    pub other_symbol: String,
    /// Designated-token amount held.
    pub reg_amount: f64,
    /// Other-token amount held.
    pub other_amount: f64,
    /// Other-token amount valued in designated-token units.
    pub reg_equivalent: f64,
    /// Lower range bound, in designated-token price units.
    pub min_price: f64,
    /// Upper range bound, in designated-token price units.
    pub max_price: f64,
    /// Midpoint of the range bounds.
    pub center_price: f64,
    /// `|center_price - current_price|`.
    pub price_distance: f64,
    /// `price_distance / current_price`, or 0 without a positive price.
    pub relative_distance: f64,
    /// Pool price in designated-token units at query time.
    pub current_price: f64,
    /// `min_price <= current_price <= max_price`.
    pub is_active: bool,
    pub position_type: PositionType,
    /// Designated-token sub-score (`reg_amount * 4`).
    pub power_reg: f64,
    /// Equivalent sub-score (`reg_equivalent * 2`).
    pub power_equivalent: f64,
    /// `power_reg + power_equivalent`.
    pub power_total: f64,
}

impl EnrichedPosition {
    pub fn position_type_label(&self) -> String {
        self.position_type.label(&self.reg_symbol, &self.other_symbol)
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_active {
            "Active"
        } else {
            "Inactive"
        }
    }

    /// Extra formula variables describing this position.
    ///
    /// `reg_amount` and `reg_equivalent` travel separately as the two
    /// always-present inputs.
    pub fn scoring_variables(&self) -> Variables {
        Variables::new()
            .with(RELATIVE_DISTANCE, self.relative_distance)
            .with(PRICE_DISTANCE, self.price_distance)
            .with(IS_ACTIVE, self.is_active)
    }
}

/// Non-fatal conditions met while enriching.
#[derive(Clone, Debug, PartialEq)]
pub enum EnrichmentWarning {
    /// Sub-scores exceeded [`SANITY_LIMIT`] and were recomputed from capped amounts.
    ValuesCapped { position_id: String, raw_total: f64 },
    /// Neither pool token carries the designated symbol; token1 was assumed.
    DesignatedTokenMissing { position_id: String, symbol: String },
}

impl fmt::Display for EnrichmentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentWarning::ValuesCapped {
                position_id,
                raw_total,
            } => write!(
                f,
                "potential calculation error for position {position_id} (total {raw_total:e}), values capped"
            ),
            EnrichmentWarning::DesignatedTokenMissing {
                position_id,
                symbol,
            } => write!(
                f,
                "position {position_id} has no {symbol} token, treating token1 as {symbol}"
            ),
        }
    }
}

/// Output of one enrichment pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnrichmentResult {
    /// Enriched positions, in input order.
    pub positions: Vec<EnrichedPosition>,
    /// Pool price in designated-token units, from the first kept position.
    pub current_price: Option<f64>,
    /// Other token symbol, from the first kept position.
    pub other_symbol: Option<String>,
    pub warnings: Vec<EnrichmentWarning>,
}

impl EnrichmentResult {
    /// No position had liquidity. Callers show this as "no active positions",
    /// distinct from a failed fetch.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Converts raw positions into [`EnrichedPosition`]s for one designated token.
#[derive(Clone, Debug)]
pub struct PositionEnricher {
    reg_symbol: String,
}

impl Default for PositionEnricher {
    fn default() -> Self {
        Self::new(DEFAULT_REG_SYMBOL)
    }
}

impl PositionEnricher {
    pub fn new(reg_symbol: impl Into<String>) -> Self {
        Self {
            reg_symbol: reg_symbol.into(),
        }
    }

    pub fn reg_symbol(&self) -> &str {
        &self.reg_symbol
    }

    /// Enrich every position with non-zero liquidity.
    ///
    /// Zero-liquidity positions are skipped silently. An empty result is not
    /// an error.
    #[tracing::instrument(skip_all, fields(positions = positions.len(), reg_symbol = %self.reg_symbol))]
    pub fn enrich(&self, positions: &[RawPosition]) -> EnrichmentResult {
        let mut result = EnrichmentResult::default();

        for raw in positions {
            if raw.liquidity == 0 {
                debug!(position_id = %raw.id, "skipping zero-liquidity position");
                continue;
            }

            let position = self.enrich_one(raw, &mut result.warnings);
            if result.current_price.is_none() {
                result.current_price = Some(position.current_price);
                result.other_symbol = Some(position.other_symbol.clone());
            }
            result.positions.push(position);
        }

        info!(
            enriched = result.positions.len(),
            skipped = positions.len() - result.positions.len(),
            warnings = result.warnings.len(),
            "enrichment pass complete"
        );
        result
    }

    fn enrich_one(&self, raw: &RawPosition, warnings: &mut Vec<EnrichmentWarning>) -> EnrichedPosition {
        let reg_is_token0 = if raw.token0.symbol == self.reg_symbol {
            true
        } else {
            if raw.token1.symbol != self.reg_symbol {
                let warning = EnrichmentWarning::DesignatedTokenMissing {
                    position_id: raw.id.clone(),
                    symbol: self.reg_symbol.clone(),
                };
                warn!(position_id = %raw.id, "{warning}");
                warnings.push(warning);
            }
            false
        };

        let token0_decimals = raw.token0.decimals;
        let token1_decimals = raw.token1.decimals;

        let sqrt_lower = tick_to_sqrt_price_x96(raw.tick_lower.tick_idx);
        let sqrt_upper = tick_to_sqrt_price_x96(raw.tick_upper.tick_idx);
        let sqrt_current = tick_to_sqrt_price_x96(raw.pool.tick);

        let amounts = token_amounts_from_liquidity(
            raw.liquidity,
            sqrt_current,
            sqrt_lower,
            sqrt_upper,
            reg_is_token0,
            token0_decimals,
            token1_decimals,
        );

        let (other_symbol, min_price, max_price, current_price) = if reg_is_token0 {
            let adjustment = 10f64.powi(i32::from(token0_decimals) - i32::from(token1_decimals));
            let (min, max) = ordered(
                raw.tick_lower.price0 * adjustment,
                raw.tick_upper.price0 * adjustment,
            );
            (raw.token1.symbol.clone(), min, max, raw.pool.token1_price)
        } else {
            let adjustment = 10f64.powi(i32::from(token1_decimals) - i32::from(token0_decimals));
            let (min, max) = ordered(
                invert(raw.tick_upper.price1 * adjustment),
                invert(raw.tick_lower.price1 * adjustment),
            );
            (raw.token0.symbol.clone(), min, max, invert(raw.pool.token0_price))
        };

        let reg_equivalent = if current_price > 0.0 {
            amounts.other / current_price
        } else {
            0.0
        };

        let mut power_reg = amounts.reg * REG_MULTIPLIER;
        let mut power_equivalent = reg_equivalent * EQUIVALENT_MULTIPLIER;
        let mut power_total = power_reg + power_equivalent;

        if power_total > SANITY_LIMIT {
            let warning = EnrichmentWarning::ValuesCapped {
                position_id: raw.id.clone(),
                raw_total: power_total,
            };
            warn!(position_id = %raw.id, raw_total = power_total, "{warning}");
            warnings.push(warning);

            power_reg = amounts.reg.min(CAPPED_AMOUNT) * REG_MULTIPLIER;
            power_equivalent = reg_equivalent.min(CAPPED_AMOUNT) * EQUIVALENT_MULTIPLIER;
            power_total = power_reg + power_equivalent;
        }

        let center_price = (min_price + max_price) / 2.0;
        let price_distance = (center_price - current_price).abs();
        let relative_distance = if current_price > 0.0 {
            price_distance / current_price
        } else {
            0.0
        };

        let is_active = min_price <= current_price && current_price <= max_price;

        let position_type = if current_price < min_price {
            if reg_is_token0 {
                PositionType::BelowRangeRegOnly
            } else {
                PositionType::BelowRangeOtherOnly
            }
        } else if current_price > max_price {
            if reg_is_token0 {
                PositionType::AboveRangeOtherOnly
            } else {
                PositionType::AboveRangeRegOnly
            }
        } else {
            PositionType::InRange
        };

        debug!(
            position_id = %raw.id,
            reg_amount = amounts.reg,
            other_amount = amounts.other,
            reg_equivalent,
            power_total,
            is_active,
            "position enriched"
        );

        EnrichedPosition {
            id: raw.id.clone(),
            owner: raw.owner.clone(),
            reg_is_token0,
            reg_symbol: self.reg_symbol.clone(),
            other_symbol,
            reg_amount: amounts.reg,
            other_amount: amounts.other,
            reg_equivalent,
            min_price,
            max_price,
            center_price,
            price_distance,
            relative_distance,
            current_price,
            is_active,
            position_type,
            power_reg,
            power_equivalent,
            power_total,
        }
    }
}

/// `1 / value`, or 0 when the quote is missing or non-positive.
fn invert(value: f64) -> f64 {
    if value > 0.0 {
        1.0 / value
    } else {
        0.0
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
