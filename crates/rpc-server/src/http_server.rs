//! JSON-RPC 2.0 over HTTP POST
//!
//! One route (`/`) carries every method; bodies are single requests.

use crate::methods::{
    handle_call_view, handle_find_contract, handle_get_backlog_length, handle_get_balance,
    handle_get_block_info, handle_get_chain_info, handle_get_fee_info, handle_get_health,
    handle_post_request, CallViewParams, PostRequestParams, RpcContext, RpcError,
};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chain_runtime::RuntimeError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// Serves an engine over HTTP
pub struct HttpRpcServer {
    context: Arc<RpcContext>,
}

impl HttpRpcServer {
    pub fn new(context: Arc<RpcContext>) -> Self {
        Self { context }
    }

    /// Router with permissive CORS
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", post(handle_rpc))
            .layer(cors)
            .with_state(self.context)
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, addr: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP RPC server listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Always answers 200; failures travel in the `error` member
async fn handle_rpc(
    State(context): State<Arc<RpcContext>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    if request.jsonrpc != "2.0" {
        tracing::debug!("Request with jsonrpc version '{}'", request.jsonrpc);
    }
    let result = dispatch_method(&context, &request.method, request.params);

    let response = match result {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(e) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: None,
            error: Some(JsonRpcError {
                code: error_code(&e),
                message: e.to_string(),
            }),
        },
    };

    (StatusCode::OK, Json(response))
}

/// Parse an object param
fn object<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let value = match params {
        // a single object may also come wrapped in an array
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    serde_json::from_value(value).map_err(|e| RpcError::InvalidParams(e.to_string()))
}

/// First positional string param
fn first_str(params: &Value, what: &str) -> Result<String, RpcError> {
    params
        .get(0)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| RpcError::InvalidParams(format!("Missing {}", what)))
}

fn to_json<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::InternalError(e.to_string()))
}

/// Method name to handler
fn dispatch_method(ctx: &RpcContext, method: &str, params: Value) -> Result<Value, RpcError> {
    tracing::debug!("RPC method called: {}", method);
    match method {
        "postRequest" => to_json(handle_post_request(ctx, object::<PostRequestParams>(params)?)?),
        "callView" => to_json(handle_call_view(ctx, object::<CallViewParams>(params)?)?),
        "getChainInfo" => to_json(handle_get_chain_info(ctx)?),
        "findContract" => to_json(handle_find_contract(ctx, &first_str(&params, "contract name")?)?),
        "getFeeInfo" => to_json(handle_get_fee_info(ctx, &first_str(&params, "contract name")?)?),
        "getBalance" => to_json(handle_get_balance(ctx, &first_str(&params, "agent id")?)?),
        "getBlockInfo" => to_json(handle_get_block_info(ctx)?),
        "getBacklogLength" => Ok(json!(handle_get_backlog_length(ctx)?)),
        "getHealth" => Ok(json!(handle_get_health(ctx)?)),
        "getVersion" => Ok(json!({
            "chain-node": env!("CARGO_PKG_VERSION"),
            "chainId": ctx.engine.chain_id().to_string(),
        })),
        _ => Err(RpcError::MethodNotFound(method.to_string())),
    }
}

/// Reserved JSON-RPC codes, then -32000.. for chain rejections
fn error_code(error: &RpcError) -> i32 {
    match error {
        RpcError::InvalidParams(_) => -32602,
        RpcError::MethodNotFound(_) => -32601,
        RpcError::InternalError(_) => -32603,
        RpcError::Contract(_) => -32000,
        RpcError::Rejected(RuntimeError::DuplicateRequest(_)) => -32001,
        RpcError::Rejected(_) => -32002,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use chain_runtime::{EngineConfig, ProcessorRegistry};
    use chain_types::codec;
    use tower::ServiceExt;
    use vstate::MemoryDb;

    fn context() -> Arc<RpcContext> {
        let engine = chain_runtime::Engine::new(
            EngineConfig::default(),
            Arc::new(MemoryDb::new()),
            ProcessorRegistry::new().with(inccounter::interface()),
        )
        .unwrap();
        Arc::new(RpcContext {
            engine: Arc::new(engine),
        })
    }

    async fn call(ctx: &Arc<RpcContext>, method: &str, params: Value) -> JsonRpcResponse {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = HttpRpcServer::new(ctx.clone()).router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn owner() -> String {
        EngineConfig::default().chain_owner.to_string()
    }

    #[tokio::test]
    async fn test_chain_info_and_registry() {
        let ctx = context();

        let info = call(&ctx, "getChainInfo", Value::Null).await.result.unwrap();
        assert_eq!(info["contract_count"], 2);
        assert_eq!(info["owner"], owner());

        let found = call(&ctx, "findContract", json!(["accounts"])).await.result.unwrap();
        assert_eq!(found["name"], "accounts");
        let missing = call(&ctx, "findContract", json!(["nothing"])).await;
        assert_eq!(missing.result, Some(Value::Null));

        let block = call(&ctx, "getBlockInfo", Value::Null).await.result.unwrap();
        assert_eq!(block["blockIndex"], 1);
    }

    #[tokio::test]
    async fn test_post_request_and_duplicates() {
        let ctx = context();
        let params = json!({
            "sender": owner(),
            "contract": "root",
            "entryPoint": "deployContract",
            "txId": chain_types::hash_strings(&["rpc"]).to_base58(),
            "args": {
                "programHash": BASE64.encode(inccounter::interface().program_hash.as_bytes()),
                "name": BASE64.encode(codec::encode_string("counter")),
            }
        });

        let posted = call(&ctx, "postRequest", params.clone()).await;
        assert_eq!(posted.result.unwrap()["index"], 0);
        let backlog = call(&ctx, "getBacklogLength", Value::Null).await;
        assert_eq!(backlog.result, Some(json!(1)));

        let again = call(&ctx, "postRequest", params).await;
        assert_eq!(again.error.unwrap().code, -32001);
    }

    #[tokio::test]
    async fn test_call_view() {
        let ctx = context();
        let agent = owner();
        let view = call(
            &ctx,
            "callView",
            json!({
                "contract": "accounts",
                "view": "getBalance",
                "args": {"agentID": BASE64.encode(agent.parse::<chain_types::AgentId>().unwrap().to_bytes())}
            }),
        )
        .await;
        assert!(view.result.unwrap().get("balances").is_some());

        let not_a_view = call(&ctx, "callView", json!({"contract": "root", "view": "init"})).await;
        assert_eq!(not_a_view.error.unwrap().code, -32000);
    }

    #[tokio::test]
    async fn test_errors() {
        let ctx = context();
        assert_eq!(call(&ctx, "nope", Value::Null).await.error.unwrap().code, -32601);
        assert_eq!(call(&ctx, "getBalance", json!([])).await.error.unwrap().code, -32602);
        assert_eq!(
            call(&ctx, "postRequest", json!({"sender": "bogus", "contract": "root", "entryPoint": "init"}))
                .await
                .error
                .unwrap()
                .code,
            -32602
        );
        // not started
        assert_eq!(call(&ctx, "getHealth", Value::Null).await.error.unwrap().code, -32603);
    }
}
