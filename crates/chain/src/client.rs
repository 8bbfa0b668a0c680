//! Cosmos LCD client implementing the `ChainSource` port.
//!
//! Talks to a node's LCD (REST) endpoint and decodes blocks into the narrow
//! shape the pipeline needs: memo, messages, attached inscription payload,
//! gas and fees. The exact wire carrier of the inscription envelope is this
//! adapter's concern; the pipeline only sees [`RawTransaction`].

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, trace};

use meteorite_core::error::{ChainError, ChainResult};
use meteorite_core::ports::{ChainSource, RawBlock, RawTransaction};

/// Configuration for the LCD client.
#[derive(Debug, Clone)]
pub struct LcdClientConfig {
    /// LCD base URL (e.g. "https://rest.cosmos.directory/cosmoshub").
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for LcdClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1317".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// LCD adapter implementing the ChainSource port.
pub struct LcdClient {
    http: reqwest::Client,
    base_url: String,
}

impl LcdClient {
    /// Build a client. Fails only on invalid TLS/client configuration.
    pub fn new(config: LcdClientConfig) -> ChainResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ChainResult<T> {
        let url = format!("{}{}", self.base_url, path);
        trace!(url = %url, "LCD request");

        let response = self.http.get(&url).send().await.map_err(map_reqwest_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::RpcError(format!(
                "{} returned {}: {}",
                path,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ChainError::DecodeError(e.to_string()))
    }

    async fn latest_header(&self) -> ChainResult<HeaderJson> {
        let resp: LatestBlockResponse = self
            .fetch_json("/cosmos/base/tendermint/v1beta1/blocks/latest")
            .await?;
        Ok(resp.block.header)
    }
}

fn map_reqwest_err(e: reqwest::Error) -> ChainError {
    if e.is_timeout() {
        ChainError::Timeout
    } else if e.is_connect() {
        ChainError::ConnectionFailed(e.to_string())
    } else {
        ChainError::RpcError(e.to_string())
    }
}

#[async_trait]
impl ChainSource for LcdClient {
    async fn chain_id(&self) -> ChainResult<String> {
        let header = self.latest_header().await?;
        Ok(header.chain_id)
    }

    async fn latest_height(&self) -> ChainResult<u64> {
        let header = self.latest_header().await?;
        parse_height(&header.height)
    }

    #[instrument(skip(self))]
    async fn block(&self, height: u64) -> ChainResult<RawBlock> {
        let path = format!("/cosmos/tx/v1beta1/txs/block/{}", height);
        let resp: BlockTxsResponse = match self.fetch_json(&path).await {
            Ok(resp) => resp,
            // Nodes answer 400/500 for heights past their tip; both mean
            // "not yet", which the pipeline treats as transient.
            Err(ChainError::RpcError(msg)) if msg.contains("requested block height") => {
                return Err(ChainError::BlockNotAvailable(height));
            }
            Err(e) => return Err(e),
        };

        let block = to_raw_block(height, resp)?;
        debug!(height, txs = block.transactions.len(), "Block fetched");
        Ok(block)
    }

    fn sender_address(&self, tx: &RawTransaction) -> ChainResult<String> {
        resolve_sender(&tx.messages)
    }
}

// =============================================================================
// LCD response shapes
// =============================================================================

#[derive(Debug, Deserialize)]
struct LatestBlockResponse {
    block: BlockJson,
}

#[derive(Debug, Deserialize)]
struct BlockJson {
    header: HeaderJson,
}

#[derive(Debug, Deserialize)]
struct HeaderJson {
    chain_id: String,
    height: String,
    time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct BlockTxsResponse {
    #[serde(default)]
    txs: Vec<TxJson>,
    #[serde(default)]
    tx_responses: Vec<TxResponseJson>,
    block: BlockJson,
}

#[derive(Debug, Deserialize)]
struct TxJson {
    body: TxBodyJson,
    #[serde(default)]
    auth_info: AuthInfoJson,
}

#[derive(Debug, Deserialize)]
struct TxBodyJson {
    #[serde(default)]
    messages: Vec<serde_json::Value>,
    #[serde(default)]
    memo: String,
    #[serde(default)]
    non_critical_extension_options: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthInfoJson {
    #[serde(default)]
    fee: FeeJson,
}

#[derive(Debug, Default, Deserialize)]
struct FeeJson {
    #[serde(default)]
    amount: Vec<CoinJson>,
}

#[derive(Debug, Deserialize)]
struct CoinJson {
    denom: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct TxResponseJson {
    txhash: String,
    #[serde(default)]
    gas_used: String,
}

// =============================================================================
// Decoding helpers
// =============================================================================

fn parse_height(s: &str) -> ChainResult<u64> {
    s.parse()
        .map_err(|_| ChainError::DecodeError(format!("unparseable height '{}'", s)))
}

/// Convert an LCD block-txs response into the pipeline's `RawBlock`.
fn to_raw_block(requested_height: u64, resp: BlockTxsResponse) -> ChainResult<RawBlock> {
    let height = parse_height(&resp.block.header.height)?;
    if height != requested_height {
        return Err(ChainError::RpcError(format!(
            "asked for height {} but node returned {}",
            requested_height, height
        )));
    }

    let mut transactions = Vec::with_capacity(resp.txs.len());
    for (tx, tx_response) in resp.txs.into_iter().zip(resp.tx_responses.into_iter()) {
        let payload = extract_payload(&tx.body.non_critical_extension_options);
        let fees = format_fees(&tx.auth_info.fee.amount);
        let gas_used = tx_response.gas_used.parse().unwrap_or(0);
        let content = serde_json::json!({
            "messages": &tx.body.messages,
            "memo": &tx.body.memo,
        })
        .to_string();

        transactions.push(RawTransaction {
            hash: tx_response.txhash.to_uppercase(),
            memo: tx.body.memo,
            messages: tx.body.messages,
            payload,
            gas_used,
            fees,
            content,
        });
    }

    Ok(RawBlock {
        height,
        time: resp.block.header.time,
        transactions,
    })
}

/// Pull the attached inscription content out of the envelope's extension
/// options. The envelope stores the blob base64-encoded under `data` (newer
/// envelopes) or `grantee` (the original authz-shaped envelope).
fn extract_payload(options: &[serde_json::Value]) -> Option<Vec<u8>> {
    for option in options {
        for key in ["data", "content", "grantee"] {
            if let Some(encoded) = option.get(key).and_then(|v| v.as_str()) {
                if let Ok(bytes) = BASE64.decode(encoded) {
                    if !bytes.is_empty() {
                        return Some(bytes);
                    }
                }
            }
        }
    }
    None
}

/// Resolve the bech32 sender from the first message that carries one.
fn resolve_sender(messages: &[serde_json::Value]) -> ChainResult<String> {
    const SENDER_KEYS: [&str; 5] = [
        "sender",
        "from_address",
        "delegator_address",
        "granter",
        "admin",
    ];

    for message in messages {
        for key in SENDER_KEYS {
            if let Some(addr) = message.get(key).and_then(|v| v.as_str()) {
                if !addr.is_empty() {
                    return Ok(addr.to_string());
                }
            }
        }
    }

    Err(ChainError::DecodeError(
        "no message carries a sender address".to_string(),
    ))
}

/// Format fee coins the way they are persisted, e.g. "1500uatom".
fn format_fees(coins: &[CoinJson]) -> String {
    coins
        .iter()
        .map(|c| format!("{}{}", c.amount, c.denom))
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_response(height: &str) -> BlockTxsResponse {
        serde_json::from_value(json!({
            "txs": [{
                "body": {
                    "messages": [
                        {"@type": "/cosmos.bank.v1beta1.MsgSend",
                         "from_address": "cosmos1sender", "to_address": "cosmos1dest"}
                    ],
                    "memo": "urn:cft20:testchain-1@v1;mint$tic=MARS,amt=10",
                    "non_critical_extension_options": []
                },
                "auth_info": {"fee": {"amount": [{"denom": "uatom", "amount": "1500"}]}}
            }],
            "tx_responses": [{"txhash": "abc123", "gas_used": "78000"}],
            "block": {"header": {
                "chain_id": "testchain-1",
                "height": height,
                "time": "2024-05-01T12:00:00Z"
            }}
        }))
        .unwrap()
    }

    #[test]
    fn decodes_block_txs_response() {
        let block = to_raw_block(42, sample_response("42")).unwrap();
        assert_eq!(block.height, 42);
        assert_eq!(block.transactions.len(), 1);

        let tx = &block.transactions[0];
        assert_eq!(tx.hash, "ABC123");
        assert_eq!(tx.memo, "urn:cft20:testchain-1@v1;mint$tic=MARS,amt=10");
        assert_eq!(tx.fees, "1500uatom");
        assert_eq!(tx.gas_used, 78000);
        assert!(tx.payload.is_none());
    }

    #[test]
    fn rejects_height_mismatch() {
        let err = to_raw_block(42, sample_response("41")).unwrap_err();
        assert!(matches!(err, ChainError::RpcError(_)));
    }

    #[test]
    fn extracts_base64_payload() {
        let blob = BASE64.encode(b"hello inscription");
        let options = vec![json!({"@type": "/x.ExtensionData", "data": blob})];
        assert_eq!(
            extract_payload(&options),
            Some(b"hello inscription".to_vec())
        );

        // Original authz-shaped envelope keeps the blob under "grantee"
        let options = vec![json!({"granter": "bWV0YQ==", "grantee": BASE64.encode(b"img")})];
        assert_eq!(extract_payload(&options), Some(b"img".to_vec()));

        assert_eq!(extract_payload(&[]), None);
    }

    #[test]
    fn resolves_sender_with_key_fallbacks() {
        let msgs = vec![json!({"from_address": "cosmos1abc"})];
        assert_eq!(resolve_sender(&msgs).unwrap(), "cosmos1abc");

        let msgs = vec![json!({"other": 1}), json!({"sender": "cosmos1xyz"})];
        assert_eq!(resolve_sender(&msgs).unwrap(), "cosmos1xyz");

        let msgs = vec![json!({"to_address": "cosmos1dest"})];
        assert!(resolve_sender(&msgs).is_err());
    }

    #[test]
    fn formats_multi_coin_fees() {
        let coins: Vec<CoinJson> = serde_json::from_value(json!([
            {"denom": "uatom", "amount": "1500"},
            {"denom": "uosmo", "amount": "20"}
        ]))
        .unwrap();
        assert_eq!(format_fees(&coins), "1500uatom,20uosmo");
    }
}
