use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::logic::{CallOutput, LedgerQuery};

use super::{ConfirmationSource, ExecutionClient, NetworkError, Receipt, SignedTransaction, TxHash};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

fn decode<R>(response: RpcResponse<R>) -> Result<R, NetworkError> {
    match (response.result, response.error) {
        (_, Some(error)) => Err(NetworkError::Rpc {
            code: error.code,
            message: error.message,
        }),
        (Some(result), None) => Ok(result),
        (None, None) => Err(NetworkError::Transport(
            "response carried neither result nor error".into(),
        )),
    }
}

#[derive(Debug, Serialize)]
struct QueryParams {
    to: Address,
    query: LedgerQuery,
}

/// JSON-RPC 2.0 client for a remote node speaking the `ctk_*` method set.
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
    name: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            name: name.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, NetworkError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc request");
        let params = serde_json::to_value(params)?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": [params],
        });
        let response: RpcResponse<R> = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        decode(response)
    }
}

#[async_trait]
impl ExecutionClient for RpcClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn nonce(&self, account: Address) -> Result<u64, NetworkError> {
        self.call("ctk_getTransactionCount", account).await
    }

    async fn submit(&self, tx: SignedTransaction) -> Result<Receipt, NetworkError> {
        self.call("ctk_sendTransaction", tx).await
    }

    async fn query(&self, to: Address, query: LedgerQuery) -> Result<CallOutput, NetworkError> {
        self.call("ctk_call", QueryParams { to, query }).await
    }

    async fn implementation(&self, proxy: Address) -> Result<Address, NetworkError> {
        self.call("ctk_getImplementation", proxy).await
    }
}

#[async_trait]
impl ConfirmationSource for RpcClient {
    async fn confirmations(&self, tx: TxHash) -> Result<u64, NetworkError> {
        self.call("ctk_getConfirmations", tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_is_decoded() {
        let response: RpcResponse<u64> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":4}"#).unwrap();
        assert_eq!(decode(response).unwrap(), 4);
    }

    #[test]
    fn error_object_wins_over_result() {
        let response: RpcResponse<u64> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#,
        )
        .unwrap();
        match decode(response).unwrap_err() {
            NetworkError::Rpc { code, message } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "nonce too low");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_response_is_a_transport_error() {
        let response: RpcResponse<u64> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(matches!(decode(response), Err(NetworkError::Transport(_))));
    }

    #[test]
    fn query_params_are_tagged() {
        let params = QueryParams {
            to: Address::repeat_byte(0x01),
            query: LedgerQuery::Cap,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["query"]["method"], "cap");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_failure() {
        let client = RpcClient::new("local", "http://127.0.0.1:9").unwrap();
        let err = client.nonce(Address::ZERO).await.unwrap_err();
        assert!(matches!(err, NetworkError::Transport(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::NetworkFailure);
    }
}
