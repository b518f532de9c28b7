use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing, Router};

use crate::node::Node;
use crate::relay::HeaderChainStore;
use crate::token::ValueToken;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("server failed: {0}")]
    Serve(String),
}

mod handlers {
    use super::*;

    use axum::extract;
    use axum::http::StatusCode;
    use axum::Json;

    use crate::account::Signed;
    use crate::call::{Receipt, Txn};
    use crate::node::{NodeError, Status};

    pub async fn status<S, T>(extract::State(node): extract::State<Arc<Node<S, T>>>) -> Json<Status>
    where
        S: HeaderChainStore + Sync + 'static,
        T: ValueToken + Sync + 'static,
    {
        Json(node.status().await)
    }

    pub async fn submit<S, T>(
        extract::State(node): extract::State<Arc<Node<S, T>>>,
        Json(stxn): Json<Signed<Txn>>,
    ) -> Result<Json<Receipt>, (StatusCode, Json<NodeError>)>
    where
        S: HeaderChainStore + Sync + 'static,
        T: ValueToken + Sync + 'static,
    {
        match node.submit(stxn).await {
            Ok(receipt) => Ok(Json(receipt)),
            Err(e @ NodeError::BadSig) => Err((StatusCode::UNAUTHORIZED, Json(e))),
            Err(e @ (NodeError::SmallNonce { .. } | NodeError::BigNonce { .. })) => {
                Err((StatusCode::CONFLICT, Json(e)))
            }
            Err(e) => Err((StatusCode::UNPROCESSABLE_ENTITY, Json(e))),
        }
    }
}

pub fn router<S, T>(node: Arc<Node<S, T>>) -> Router
where
    S: HeaderChainStore + Sync + 'static,
    T: ValueToken + Sync + 'static,
{
    Router::new()
        .route("/", routing::get(handlers::status::<S, T>))
        .route("/submit", routing::post(handlers::submit::<S, T>))
        .with_state(node)
}

pub async fn serve<S, T>(node: Arc<Node<S, T>>, addr: SocketAddr) -> Result<(), AppError>
where
    S: HeaderChainStore + Sync + 'static,
    T: ValueToken + Sync + 'static,
{
    let server = axum::Server::try_bind(&addr).map_err(|e| AppError::Serve(e.to_string()))?;
    tracing::info!(%addr, "listening");
    server
        .serve(router(node).into_make_service())
        .await
        .map_err(|e| AppError::Serve(e.to_string()))
}
