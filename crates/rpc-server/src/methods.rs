//! RPC Methods - JSON-RPC method handlers
//!
//! Binary values (request args, view results) travel as base64; hashes
//! and agent ids use their base58 text forms.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chain_runtime::{Engine, RuntimeError};
use chain_types::{
    AgentId, ColoredBalances, ContractError, Dict, HashValue, Hname, Request, RequestId,
};
use root_contract::{ChainInfo, ContractRecord, FeeInfo};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// RPC context shared across handlers
pub struct RpcContext {
    pub engine: Arc<Engine>,
}

// ============ Request/Response Types ============

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRequestParams {
    /// Agent id text form, e.g. `A/<base58>`
    pub sender: String,
    /// Target contract name
    pub contract: String,
    pub entry_point: String,
    /// Argument name -> base64 value
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    /// Color -> amount
    #[serde(default)]
    pub transfer: ColoredBalances,
    /// Unix seconds
    #[serde(default)]
    pub time_lock: Option<u32>,
    /// Base58 transaction id; random if absent
    #[serde(default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub index: u16,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRequestResponse {
    pub tx_id: String,
    pub index: u16,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallViewParams {
    pub contract: String,
    pub view: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    pub hname: String,
    pub name: String,
    pub description: String,
    pub program_hash: String,
    pub owner_fee: i64,
    pub validator_fee: i64,
    pub creator: AgentId,
}

impl From<ContractRecord> for ContractInfo {
    fn from(record: ContractRecord) -> Self {
        Self {
            hname: record.hname().to_string(),
            program_hash: record.program_hash.to_base58(),
            name: record.name,
            description: record.description,
            owner_fee: record.owner_fee,
            validator_fee: record.validator_fee,
            creator: record.creator,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    pub block_index: Option<u32>,
    pub state_hash: String,
}

fn decode_args(args: &BTreeMap<String, String>) -> Result<Dict, RpcError> {
    args.iter()
        .map(|(k, v)| {
            BASE64
                .decode(v)
                .map(|bytes| (k.clone(), bytes))
                .map_err(|_| RpcError::InvalidParams(format!("arg '{}' is not base64", k)))
        })
        .collect()
}

fn encode_dict(d: &Dict) -> BTreeMap<String, String> {
    d.iter().map(|(k, v)| (k.clone(), BASE64.encode(v))).collect()
}

// ============ RPC Handlers ============

/// Handle postRequest RPC method
pub fn handle_post_request(ctx: &RpcContext, params: PostRequestParams) -> Result<PostRequestResponse, RpcError> {
    let sender: AgentId = params
        .sender
        .parse()
        .map_err(|e| RpcError::InvalidParams(format!("sender: {}", e)))?;
    let tx_id = match &params.tx_id {
        Some(s) => s
            .parse::<HashValue>()
            .map_err(|e| RpcError::InvalidParams(format!("txId: {}", e)))?,
        None => HashValue(rand::random()),
    };
    let args = decode_args(&params.args)?;

    let mut req = Request::new(
        RequestId::new(tx_id, params.index),
        sender,
        Hname::of(&params.contract),
        Hname::of(&params.entry_point),
    )
    .with_args(args)
    .with_transfer(params.transfer);
    if let Some(t) = params.time_lock {
        req = req.with_time_lock(t);
    }

    ctx.engine.post_request(req)?;
    Ok(PostRequestResponse {
        tx_id: tx_id.to_base58(),
        index: params.index,
    })
}

/// Handle callView RPC method
pub fn handle_call_view(ctx: &RpcContext, params: CallViewParams) -> Result<BTreeMap<String, String>, RpcError> {
    let args = decode_args(&params.args)?;
    let result = ctx
        .engine
        .call_view(Hname::of(&params.contract), Hname::of(&params.view), args)?;
    Ok(encode_dict(&result))
}

/// Handle getChainInfo RPC method
pub fn handle_get_chain_info(ctx: &RpcContext) -> Result<ChainInfo, RpcError> {
    Ok(ctx.engine.chain_info()?)
}

/// Handle findContract RPC method
pub fn handle_find_contract(ctx: &RpcContext, name: &str) -> Result<Option<ContractInfo>, RpcError> {
    Ok(ctx.engine.find_contract(Hname::of(name))?.map(ContractInfo::from))
}

/// Handle getFeeInfo RPC method
pub fn handle_get_fee_info(ctx: &RpcContext, name: &str) -> Result<FeeInfo, RpcError> {
    Ok(ctx.engine.fee_info(Hname::of(name))?)
}

/// Handle getBalance RPC method
pub fn handle_get_balance(ctx: &RpcContext, agent: &str) -> Result<ColoredBalances, RpcError> {
    let agent: AgentId = agent
        .parse()
        .map_err(|e| RpcError::InvalidParams(format!("agent id: {}", e)))?;
    Ok(ctx.engine.balance(&agent)?)
}

/// Handle getBlockInfo RPC method
pub fn handle_get_block_info(ctx: &RpcContext) -> Result<BlockInfo, RpcError> {
    Ok(BlockInfo {
        block_index: ctx.engine.block_index(),
        state_hash: ctx.engine.state_hash().to_base58(),
    })
}

/// Handle getBacklogLength RPC method
pub fn handle_get_backlog_length(ctx: &RpcContext) -> Result<usize, RpcError> {
    Ok(ctx.engine.backlog_len())
}

/// Handle getHealth RPC method
pub fn handle_get_health(ctx: &RpcContext) -> Result<String, RpcError> {
    if ctx.engine.is_running() {
        Ok("ok".to_string())
    } else {
        Err(RpcError::InternalError("engine is not running".to_string()))
    }
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Request rejected: {0}")]
    Rejected(#[from] RuntimeError),
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),
}
