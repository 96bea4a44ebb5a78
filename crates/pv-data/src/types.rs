//! Type definitions for raw subgraph position records.
//!
//! The subgraph serves `BigInt` and `BigDecimal` values as JSON strings, so
//! numeric fields go through [`string_or_number`] and land as typed values.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// One liquidity position of the pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    /// Position identifier (NFT token id).
    pub id: String,
    /// Owner address (hex text).
    pub owner: String,
    /// Position liquidity.
    #[serde(deserialize_with = "string_or_number")]
    pub liquidity: u128,
    /// Lower range boundary.
    pub tick_lower: RawTick,
    /// Upper range boundary.
    pub tick_upper: RawTick,
    /// The position's token0.
    pub token0: RawToken,
    /// The position's token1.
    pub token1: RawToken,
    /// Pool state at query time.
    pub pool: RawPool,
}

/// A range boundary tick with its quoted prices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTick {
    /// Tick index.
    #[serde(deserialize_with = "string_or_number")]
    pub tick_idx: i32,
    /// token0 price in token1 at this tick (`1.0001^tick`).
    #[serde(deserialize_with = "string_or_number")]
    pub price0: f64,
    /// token1 price in token0 at this tick.
    #[serde(deserialize_with = "string_or_number")]
    pub price1: f64,
}

/// Token symbol and decimals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawToken {
    pub symbol: String,
    #[serde(deserialize_with = "string_or_number")]
    pub decimals: u8,
}

/// Pool state attached to every position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPool {
    /// Current pool tick.
    #[serde(deserialize_with = "string_or_number")]
    pub tick: i32,
    /// In-range pool liquidity.
    #[serde(deserialize_with = "string_or_number")]
    pub liquidity: u128,
    /// token0 priced in token1 units, decimal-adjusted.
    #[serde(deserialize_with = "string_or_number")]
    pub token0_price: f64,
    /// token1 priced in token0 units, decimal-adjusted.
    #[serde(deserialize_with = "string_or_number")]
    pub token1_price: f64,
    pub token0: RawToken,
    pub token1: RawToken,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

/// Deserialize a value sent either as a JSON string or a JSON number.
pub fn string_or_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let text = match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(text) => text,
        StringOrNumber::Number(number) => number.to_string(),
    };
    text.trim().parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITION_JSON: &str = r#"{
        "id": "4242",
        "owner": "0x00000000000000000000000000000000000000aa",
        "liquidity": "123456789012345678901",
        "tickLower": { "tickIdx": "-887220", "price0": "0.0000000000000000000000000000000000000029", "price1": "338492131855223783697272027725323970000" },
        "tickUpper": { "tickIdx": 887220, "price0": "338492131855223783697272027725323970000", "price1": "0.0000000000000000000000000000000000000029" },
        "token0": { "symbol": "REG", "decimals": "18" },
        "token1": { "symbol": "USDC", "decimals": "6" },
        "pool": {
            "tick": "-290000",
            "liquidity": "1000",
            "token0Price": "2.5",
            "token1Price": "0.4",
            "token0": { "symbol": "REG", "decimals": "18" },
            "token1": { "symbol": "USDC", "decimals": 6 },
            "feeTier": "3000"
        }
    }"#;

    #[test]
    fn parses_subgraph_strings_into_numbers() {
        let position: RawPosition = serde_json::from_str(POSITION_JSON).expect("valid position");
        assert_eq!(position.id, "4242");
        assert_eq!(position.liquidity, 123_456_789_012_345_678_901);
        assert_eq!(position.tick_lower.tick_idx, -887_220);
        assert_eq!(position.tick_upper.tick_idx, 887_220);
        assert_eq!(position.token0.decimals, 18);
        assert_eq!(position.pool.token1.decimals, 6);
        assert_eq!(position.pool.tick, -290_000);
        assert!((position.pool.token1_price - 0.4).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_numeric_liquidity() {
        let broken = POSITION_JSON.replace("123456789012345678901", "lots");
        let result: Result<RawPosition, _> = serde_json::from_str(&broken);
        assert!(result.is_err());
    }
}
