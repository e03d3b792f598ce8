use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Extension, Json};
use serde_json::json;

use crate::dispatch::{self, DispatchOutcome, DispatchRequest};
use crate::error::Result;
use crate::routes;

use super::extract::OperatorSession;
use super::{ConfigExt, DbExt, Router};

pub fn router() -> Router {
    Router::new().route(routes::DISPATCH, post(send))
}

/// Runs one dispatch request. Operator only.
pub async fn send(
    _session: OperatorSession,
    Extension(db): DbExt,
    Extension(config): ConfigExt,
    Json(request): Json<DispatchRequest>,
) -> Result<impl IntoResponse> {
    let outcome = dispatch::execute(&db, &config, &request).await?;

    let body = match outcome {
        DispatchOutcome::Sent {
            count,
            simulated,
            mail_id,
        } => json!({
            "sentCount": count,
            "simulated": simulated,
            "mailId": mail_id,
        }),
        DispatchOutcome::NoRecipients => json!({
            "sentCount": 0,
            "reason": "no_recipients",
        }),
    };

    Ok(Json(body))
}
