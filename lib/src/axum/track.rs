use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json};
use url::Url;
use uuid::Uuid;

use crate::error::{Error, ErrorKind, Result};
use crate::{routes, track};

use super::extract::ClientMeta;
use super::{ConfigExt, DbExt, Router};

/// 1x1 transparent GIF served for every open beacon.
pub static PIXEL_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

pub fn router() -> Router {
    Router::new()
        .route(routes::TRACK_OPEN, get(open))
        .route(routes::TRACK_CLICK, get(click))
        .route(routes::TRACK_VIEW, post(view))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OpenParams {
    mail_id: Option<String>,
    sid: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickParams {
    url: String,
    mail_id: Option<String>,
    target: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ViewData {
    path: Option<String>,
    referrer: Option<String>,
}

/// Open pixel. Mail clients prefetch and retry these, so the response is
/// always the GIF no matter what the query string holds.
pub async fn open(
    Extension(db): DbExt,
    Extension(config): ConfigExt,
    ClientMeta(client): ClientMeta,
    params: Option<Query<OpenParams>>,
) -> impl IntoResponse {
    let Query(params) = params.unwrap_or_default();
    match params.mail_id.as_deref().map(Uuid::parse_str) {
        Some(Ok(mail_id)) => {
            if let Err(error) =
                track::record_open(&db, &config, mail_id, params.sid.as_deref(), &client)
            {
                log::warn!("failed to record open for {mail_id}: {error}");
            }
        }
        Some(Err(_)) | None => {
            log::debug!("open beacon without a usable mail id");
        }
    }
    pixel()
}

/// Click redirect. Validates the destination, records the event and
/// forwards the visitor with a 302.
pub async fn click(
    Extension(db): DbExt,
    Extension(config): ConfigExt,
    ClientMeta(client): ClientMeta,
    Query(params): Query<ClickParams>,
) -> Result<impl IntoResponse> {
    let url = Url::parse(&params.url)
        .map_err(|_| Error::new(ErrorKind::BadInput("url is not a valid link".into())))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::new(ErrorKind::BadInput(
            "url must be http or https".into(),
        )));
    }

    let mail_id = params
        .mail_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok());
    if let Err(error) = track::record_click(
        &db,
        &config,
        mail_id,
        params.target.as_deref(),
        url.as_str(),
        &client,
    ) {
        log::warn!("failed to record click on {url}: {error}");
    }

    Ok((StatusCode::FOUND, [(header::LOCATION, url.to_string())]))
}

/// Page view beacon posted by the web frontend.
pub async fn view(
    Extension(db): DbExt,
    Extension(config): ConfigExt,
    ClientMeta(client): ClientMeta,
    data: Option<Json<ViewData>>,
) -> Result<impl IntoResponse> {
    let Json(data) = data.unwrap_or_default();
    track::record_page_view(
        &db,
        &config,
        data.path.as_deref(),
        data.referrer.as_deref(),
        &client,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

fn pixel() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime::IMAGE_GIF.as_ref()),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        PIXEL_GIF.as_slice(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_bytes_are_a_gif() {
        assert_eq!(&PIXEL_GIF[..6], b"GIF89a");
        assert_eq!(PIXEL_GIF[42], 0x3B);
    }
}
