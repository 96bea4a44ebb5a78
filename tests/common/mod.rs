//! Shared factories for pool positions and subgraph payloads.
//!
//! Prices are derived from ticks the same way the subgraph derives them, so
//! quoted prices and tick math agree.

#![allow(dead_code)]

use pv_data::types::{RawPool, RawPosition, RawTick, RawToken};

/// One REG-sized unit of liquidity for 18-decimal tokens.
pub const LIQUIDITY: u128 = 1_000_000_000_000_000_000_000;

pub fn token(symbol: &str, decimals: u8) -> RawToken {
    RawToken {
        symbol: symbol.to_string(),
        decimals,
    }
}

/// Tick with `price0 = 1.0001^idx` and `price1 = 1 / price0`.
pub fn tick(idx: i32) -> RawTick {
    let price0 = 1.0001f64.powi(idx);
    RawTick {
        tick_idx: idx,
        price0,
        price1: 1.0 / price0,
    }
}

/// REG/USDC position, both tokens 18 decimals, REG as token0.
///
/// The pool quotes `token1Price = 1.0001^current` and
/// `token0Price = 1 / token1Price`.
pub fn reg_position(id: &str, owner: &str, lower: i32, upper: i32, current: i32) -> RawPosition {
    position_with(id, owner, token("REG", 18), token("USDC", 18), lower, upper, current)
}

/// Same range as [`reg_position`] with the token order swapped.
pub fn reg_position_as_token1(id: &str, owner: &str, lower: i32, upper: i32, current: i32) -> RawPosition {
    position_with(id, owner, token("USDC", 18), token("REG", 18), lower, upper, current)
}

pub fn position_with(
    id: &str,
    owner: &str,
    token0: RawToken,
    token1: RawToken,
    lower: i32,
    upper: i32,
    current: i32,
) -> RawPosition {
    let price = 1.0001f64.powi(current);
    RawPosition {
        id: id.to_string(),
        owner: owner.to_string(),
        liquidity: LIQUIDITY,
        tick_lower: tick(lower),
        tick_upper: tick(upper),
        token0: token0.clone(),
        token1: token1.clone(),
        pool: RawPool {
            tick: current,
            liquidity: LIQUIDITY,
            token0_price: 1.0 / price,
            token1_price: price,
            token0,
            token1,
        },
    }
}

/// `GetPositions` response body in the subgraph's wire shape, numbers as
/// strings.
pub fn positions_response(positions: &[RawPosition]) -> String {
    let token_json = |t: &pv_data::types::RawToken| {
        serde_json::json!({ "symbol": t.symbol, "decimals": t.decimals.to_string() })
    };
    let tick_json = |t: &RawTick| {
        serde_json::json!({
            "tickIdx": t.tick_idx.to_string(),
            "price0": t.price0.to_string(),
            "price1": t.price1.to_string(),
        })
    };

    let entries: Vec<serde_json::Value> = positions
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "owner": p.owner,
                "liquidity": p.liquidity.to_string(),
                "tickLower": tick_json(&p.tick_lower),
                "tickUpper": tick_json(&p.tick_upper),
                "token0": token_json(&p.token0),
                "token1": token_json(&p.token1),
                "pool": {
                    "tick": p.pool.tick.to_string(),
                    "liquidity": p.pool.liquidity.to_string(),
                    "token0Price": p.pool.token0_price.to_string(),
                    "token1Price": p.pool.token1_price.to_string(),
                    "token0": token_json(&p.pool.token0),
                    "token1": token_json(&p.pool.token1),
                },
            })
        })
        .collect();

    serde_json::json!({ "data": { "positions": entries } }).to_string()
}
