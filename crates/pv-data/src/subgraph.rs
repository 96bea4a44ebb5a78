//! # Pool Subgraph Client
//!
//! Fetches the liquidity positions of one pool from a Uniswap V3–style
//! subgraph through The Graph gateway.
//!
//! One request per pool: the query asks for at most
//! [`MAX_POSITIONS_PER_QUERY`] positions with non-zero liquidity. Larger pools
//! come back truncated; pagination is not attempted. A failed request is
//! fatal for the caller and is not retried.

use eyre::{eyre, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::types::RawPosition;

/// The Graph gateway base URL.
pub const GATEWAY_BASE_URL: &str = "https://gateway.thegraph.com/api";

/// Deployment id of the pool subgraph.
pub const SUBGRAPH_ID: &str = "GFvGfWBX47RNnvgwL6SjAAf2mrqrPxF91eA53F4eNegW";

/// Maximum positions returned by a single query.
pub const MAX_POSITIONS_PER_QUERY: usize = 1000;

const REQUEST_TIMEOUT_SECS: u64 = 30;

const POSITIONS_QUERY: &str = r#"
query GetPositions($pool: String!) {
  positions(
    first: 1000
    where: {pool: $pool, liquidity_gt: "0"}
  ) {
    id
    owner
    liquidity
    tickLower {
      tickIdx
      price1
      price0
    }
    tickUpper {
      tickIdx
      price1
      price0
    }
    token0 {
      symbol
      decimals
    }
    token1 {
      symbol
      decimals
    }
    pool {
      tick
      liquidity
      token0Price
      token1Price
      token0 {
        symbol
        decimals
      }
      token1 {
        symbol
        decimals
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<PositionsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct PositionsData {
    positions: Vec<RawPosition>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// HTTP client bound to one subgraph endpoint.
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    url: String,
    http: reqwest::Client,
}

impl SubgraphClient {
    /// Creates a client for a full subgraph URL.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .wrap_err("failed to build HTTP client")?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }

    /// Creates a client for the gateway deployment, authenticated by API key.
    ///
    /// # Errors
    /// Returns error if the key is empty or the HTTP client cannot be built.
    pub fn from_api_key(api_key: &str) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(eyre!("subgraph API key is empty"));
        }
        Self::new(gateway_url(api_key))
    }

    /// Endpoint this client queries.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the non-zero-liquidity positions of `pool_address`.
    ///
    /// The address is lower-cased before querying, matching how the subgraph
    /// stores entity ids.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, timeout, non-2xx status, GraphQL
    /// errors in the response, or a body that does not match the position
    /// shape.
    #[tracing::instrument(skip(self), fields(pool = %pool_address))]
    pub async fn fetch_positions(&self, pool_address: &str) -> Result<Vec<RawPosition>> {
        let pool = pool_address.trim().to_lowercase();
        if pool.is_empty() {
            return Err(eyre!("pool address is empty"));
        }

        let body = serde_json::json!({
            "query": POSITIONS_QUERY,
            "variables": { "pool": pool },
        });

        debug!("querying subgraph positions");
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .wrap_err("subgraph HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(eyre!(
                "subgraph returned HTTP {}: {}",
                status.as_u16(),
                body
            ));
        }

        let text = response
            .text()
            .await
            .wrap_err("failed to read subgraph response body")?;

        let positions = parse_positions_response(&text)?;
        info!(positions = positions.len(), "subgraph fetch complete");
        Ok(positions)
    }
}

/// Gateway URL for the pool subgraph under `api_key`.
pub fn gateway_url(api_key: &str) -> String {
    format!("{GATEWAY_BASE_URL}/{api_key}/subgraphs/id/{SUBGRAPH_ID}")
}

/// Parses a `GetPositions` response body.
///
/// Also accepts a body saved to disk earlier, which is how offline analysis
/// feeds recorded responses back in.
///
/// # Errors
///
/// Returns error if the body is not valid JSON, carries GraphQL errors, or
/// has no `data.positions`.
pub fn parse_positions_response(body: &str) -> Result<Vec<RawPosition>> {
    let response: GraphQlResponse =
        serde_json::from_str(body).wrap_err("failed to parse subgraph response JSON")?;

    if !response.errors.is_empty() {
        let messages: Vec<&str> = response
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect();
        return Err(eyre!("subgraph query failed: {}", messages.join("; ")));
    }

    let data = response
        .data
        .ok_or_else(|| eyre!("subgraph response carried no data"))?;

    if data.positions.len() >= MAX_POSITIONS_PER_QUERY {
        warn!(
            limit = MAX_POSITIONS_PER_QUERY,
            "position query hit the batch limit, result may be partial"
        );
    }

    Ok(data.positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(positions: &str) -> String {
        format!(r#"{{"data":{{"positions":{positions}}}}}"#)
    }

    const ONE_POSITION: &str = r#"[{
        "id": "1",
        "owner": "0xabc",
        "liquidity": "1000",
        "tickLower": { "tickIdx": "-100", "price0": "0.99", "price1": "1.01" },
        "tickUpper": { "tickIdx": "100", "price0": "1.01", "price1": "0.99" },
        "token0": { "symbol": "REG", "decimals": "18" },
        "token1": { "symbol": "USDC", "decimals": "6" },
        "pool": {
            "tick": "0", "liquidity": "1000", "token0Price": "1", "token1Price": "1",
            "token0": { "symbol": "REG", "decimals": "18" },
            "token1": { "symbol": "USDC", "decimals": "6" }
        }
    }]"#;

    #[test]
    fn parses_positions_payload() {
        let positions = parse_positions_response(&response_with(ONE_POSITION)).expect("parses");
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].owner, "0xabc");
        assert_eq!(positions[0].tick_upper.tick_idx, 100);
    }

    #[test]
    fn empty_positions_are_not_an_error() {
        let positions = parse_positions_response(&response_with("[]")).expect("parses");
        assert!(positions.is_empty());
    }

    #[test]
    fn graphql_errors_are_fatal() {
        let body = r#"{"data":null,"errors":[{"message":"indexer unavailable"},{"message":"bad pool"}]}"#;
        let err = parse_positions_response(body).expect_err("must fail");
        let text = format!("{err}");
        assert!(text.contains("indexer unavailable"), "{text}");
        assert!(text.contains("bad pool"), "{text}");
    }

    #[test]
    fn missing_data_is_fatal() {
        assert!(parse_positions_response("{}").is_err());
        assert!(parse_positions_response("not json").is_err());
    }

    #[test]
    fn gateway_url_embeds_key_and_deployment() {
        let url = gateway_url("secret");
        assert_eq!(
            url,
            "https://gateway.thegraph.com/api/secret/subgraphs/id/GFvGfWBX47RNnvgwL6SjAAf2mrqrPxF91eA53F4eNegW"
        );
        assert!(SubgraphClient::from_api_key("   ").is_err());
    }

    #[tokio::test]
    #[ignore] // requires THEGRAPH_API_KEY and network access
    async fn fetches_live_pool_positions() {
        let key = std::env::var("THEGRAPH_API_KEY").expect("THEGRAPH_API_KEY must be set");
        let pool = std::env::var("PV_TEST_POOL").expect("PV_TEST_POOL must be set");
        let client = SubgraphClient::from_api_key(&key).expect("client builds");
        let positions = client.fetch_positions(&pool).await.expect("fetch succeeds");
        assert!(positions.len() <= MAX_POSITIONS_PER_QUERY);
        assert!(positions.iter().all(|p| p.liquidity > 0));
    }
}
