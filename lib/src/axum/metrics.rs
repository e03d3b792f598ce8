use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json};

use crate::error::Result;
use crate::{metrics, routes};

use super::extract::OperatorSession;
use super::{ConfigExt, DbExt, Router};

pub fn router() -> Router {
    Router::new().route(routes::METRICS, get(overview))
}

/// Full operator overview: history, charts, web stats, quota.
pub async fn overview(
    _session: OperatorSession,
    Extension(db): DbExt,
    Extension(config): ConfigExt,
) -> Result<impl IntoResponse> {
    let overview = metrics::overview(&db, &config)?;
    Ok(Json(overview))
}
