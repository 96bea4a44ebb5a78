//! How a formula's multiplier varies with the position of a range relative
//! to the current price.
//!
//! ## Math
//!
//! For each sampled center price $p$ in $[\text{min}, \text{max}]$ the formula
//! is evaluated with a fixed unit holding (`reg_amount = 1`,
//! `reg_equivalent = 0.5`) and
//!
//! $$
//! \text{relative\_distance} = \frac{|p - c|}{c}, \qquad
//! \text{price\_distance} = |p - c|
//! $$
//!
//! where $c$ is the current price ($\text{relative\_distance} = 0$ unless
//! $c > 0$). `is_active` is fixed for the whole curve:
//! whether $c$ lies in $[\text{min}, \text{max}]$.

use serde::Serialize;

use crate::enrich::EnrichedPosition;
use crate::scoring::{Formula, Variables, IS_ACTIVE, PRICE_DISTANCE, RELATIVE_DISTANCE};

pub const CURVE_SAMPLES: usize = 100;

/// Sample holding used for every curve point.
pub const CURVE_REG_AMOUNT: f64 = 1.0;
pub const CURVE_REG_EQUIVALENT: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CurvePoint {
    pub price: f64,
    pub multiplier: f64,
}

/// Sample `formula` at `samples` evenly spaced prices from `min_price` to
/// `max_price` inclusive. Points where the formula fails read `0.0`.
pub fn multiplier_curve(
    formula: &Formula,
    min_price: f64,
    max_price: f64,
    current_price: f64,
    samples: usize,
) -> Vec<CurvePoint> {
    let is_active = min_price <= current_price && current_price <= max_price;

    linspace(min_price, max_price, samples)
        .map(|price| {
            let price_distance = (price - current_price).abs();
            let relative_distance = if current_price > 0.0 {
                price_distance / current_price
            } else {
                0.0
            };
            let vars = Variables::new()
                .with(RELATIVE_DISTANCE, relative_distance)
                .with(PRICE_DISTANCE, price_distance)
                .with(IS_ACTIVE, is_active);
            let multiplier = formula
                .try_evaluate(CURVE_REG_AMOUNT, CURVE_REG_EQUIVALENT, &vars)
                .unwrap_or(0.0);
            CurvePoint { price, multiplier }
        })
        .collect()
}

/// Price window for plotting a set of positions: 10% beyond the lowest lower
/// bound and the highest upper bound. `None` for no positions.
pub fn display_range(positions: &[EnrichedPosition]) -> Option<(f64, f64)> {
    let min = positions.iter().map(|p| p.min_price).reduce(f64::min)?;
    let max = positions.iter().map(|p| p.max_price).reduce(f64::max)?;
    Some((min * 0.9, max * 1.1))
}

fn linspace(start: f64, end: f64, samples: usize) -> impl Iterator<Item = f64> {
    let step = if samples > 1 {
        (end - start) / (samples - 1) as f64
    } else {
        0.0
    };
    (0..samples).map(move |i| {
        if samples > 1 && i == samples - 1 {
            end
        } else {
            start + step * i as f64
        }
    })
}
