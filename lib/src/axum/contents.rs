use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json};

use crate::error::Result;
use crate::{content, routes};

use super::{ConfigExt, DbExt, Router};

pub fn router() -> Router {
    Router::new().route(routes::CONTENTS, get(list))
}

/// Public feed of recent content, most popular first.
pub async fn list(
    Extension(db): DbExt,
    Extension(config): ConfigExt,
) -> Result<impl IntoResponse> {
    let items = content::public_feed(
        &db,
        config.dispatch.content_window_hours,
        config.dispatch.feed_limit,
    )?;
    Ok(Json(items))
}
