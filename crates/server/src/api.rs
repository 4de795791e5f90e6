//! HTTP handlers and JSON views for the ledger API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use notara_core::{Block, Hash, Transaction, TxKind, TxPayload};
use notara_ledger::{Ledger, LedgerError, MempoolError, MineOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub fn router(ledger: Arc<Ledger>) -> Router {
    Router::new()
        .route("/transactions", post(submit_transaction))
        .route("/mempool", get(mempool))
        .route("/mine", post(mine))
        .route("/chain", get(chain))
        .route("/chain/verify", get(verify))
        .route("/proposer", get(proposer))
        .layer(CorsLayer::permissive())
        .with_state(ledger)
}

// ============================== JSON views ==============================

#[derive(Serialize)]
struct TxView {
    id: String,
    kind: TxKind,
    target: String,
    content_hash: String,
    submitted_at: u64,
}

impl From<&Transaction> for TxView {
    fn from(tx: &Transaction) -> Self {
        let (target, content_hash) = match &tx.payload {
            TxPayload::NotarizePost { slug, content_hash } => (slug.clone(), *content_hash),
            TxPayload::NotarizePage { path, content_hash } => (path.clone(), *content_hash),
        };
        Self {
            id: tx.id.to_hex(),
            kind: tx.kind(),
            target,
            content_hash: content_hash.to_hex(),
            submitted_at: tx.submitted_at,
        }
    }
}

#[derive(Serialize)]
struct BlockView {
    height: u64,
    prev_hash: String,
    timestamp: u64,
    block_hash: String,
    signature: String,
    transactions: Vec<TxView>,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            height: block.height,
            prev_hash: block.prev_hash.to_hex(),
            timestamp: block.timestamp,
            block_hash: block.block_hash.to_hex(),
            signature: block.signature.to_hex(),
            transactions: block.transactions.iter().map(TxView::from).collect(),
        }
    }
}

#[derive(Deserialize)]
struct SubmitRequest {
    kind: TxKind,
    /// Post slug or page path, depending on `kind`.
    target: String,
    /// Hex-encoded Blake3 hash of the content being notarized.
    content_hash: String,
}

#[derive(Serialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum MineResponse {
    Sealed { block: BlockView },
    Idle,
}

#[derive(Serialize)]
#[serde(untagged)]
enum VerifyResponse {
    Ok { ok: bool, blocks: u64 },
    Violation { ok: bool, height: u64, reason: String },
}

// ============================== Errors ==============================

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::Mempool(MempoolError::Validation(_)) => StatusCode::BAD_REQUEST,
            LedgerError::Mempool(MempoolError::Duplicate(_)) => StatusCode::CONFLICT,
            LedgerError::AlreadyCommitted(_) => StatusCode::CONFLICT,
            // Tip contention: the caller may retry after the tip stabilizes.
            LedgerError::Mine(_) => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::Key(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

// ============================== Handlers ==============================

async fn submit_transaction(
    State(ledger): State<Arc<Ledger>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let content_hash = Hash::from_hex(&req.content_hash)
        .map_err(|e| ApiError::bad_request(format!("content_hash: {e}")))?;
    let payload = match req.kind {
        TxKind::NotarizePost => TxPayload::NotarizePost {
            slug: req.target,
            content_hash,
        },
        TxKind::NotarizePage => TxPayload::NotarizePage {
            path: req.target,
            content_hash,
        },
    };

    let id = ledger.submit(payload)?;
    Ok(Json(SubmitResponse { id: id.to_hex() }))
}

async fn mempool(State(ledger): State<Arc<Ledger>>) -> Json<Vec<TxView>> {
    Json(ledger.mempool_snapshot().iter().map(TxView::from).collect())
}

async fn mine(State(ledger): State<Arc<Ledger>>) -> Result<Json<MineResponse>, ApiError> {
    match ledger.mine()? {
        MineOutcome::Sealed(block) => Ok(Json(MineResponse::Sealed {
            block: BlockView::from(&block),
        })),
        MineOutcome::Idle => Ok(Json(MineResponse::Idle)),
    }
}

async fn chain(State(ledger): State<Arc<Ledger>>) -> Json<Vec<BlockView>> {
    Json(ledger.chain_snapshot().iter().map(BlockView::from).collect())
}

async fn verify(State(ledger): State<Arc<Ledger>>) -> Result<Json<VerifyResponse>, ApiError> {
    match ledger.verify()? {
        Ok(blocks) => Ok(Json(VerifyResponse::Ok { ok: true, blocks })),
        Err(violation) => Ok(Json(VerifyResponse::Violation {
            ok: false,
            height: violation.height,
            reason: violation.reason.to_string(),
        })),
    }
}

async fn proposer(
    State(ledger): State<Arc<Ledger>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = ledger.proposer_public_key()?;
    Ok(Json(serde_json::json!({ "public_key": key.to_hex() })))
}
