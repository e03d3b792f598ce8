use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json};
use uuid::Uuid;

use crate::crypto::Sealer;
use crate::error::{ErrorKind, Result};
use crate::subscriber::{self, Preferences, Status, Subscriber};
use crate::routes;

use super::extract::OperatorSession;
use super::{ConfigExt, DbExt, Router};

pub fn router() -> Router {
    Router::new()
        .route(routes::SUBSCRIBE, post(subscribe))
        .route(routes::PREFERENCES, post(preferences))
        .route(routes::SUBSCRIBERS, get(list))
        .route(
            routes::SUBSCRIBER,
            axum::routing::patch(patch).delete(delete),
        )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeData {
    email: String,
    #[serde(default)]
    preferences: Preferences,
}

/// Public signup endpoint. Registering an address twice is a no-op that
/// returns the existing id.
pub async fn subscribe(
    Extension(db): DbExt,
    Extension(config): ConfigExt,
    Json(data): Json<SubscribeData>,
) -> Result<impl IntoResponse> {
    let sealer = Sealer::from_config(&config.crypto);
    let subscriber = subscriber::register(&db, &sealer, &data.email, data.preferences)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": subscriber.id })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesData {
    subscriber_id: Uuid,
    #[serde(default)]
    preferences: Preferences,
}

/// Onboarding step: store channel and category choices for a subscriber.
pub async fn preferences(
    Extension(db): DbExt,
    Json(data): Json<PreferencesData>,
) -> Result<impl IntoResponse> {
    subscriber::set_preferences(&db, data.subscriber_id, data.preferences)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list(
    _session: OperatorSession,
    Extension(db): DbExt,
    Extension(config): ConfigExt,
) -> Result<impl IntoResponse> {
    let sealer = Sealer::from_config(&config.crypto);
    Ok(Json(subscriber::masked(&db, &sealer)?))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberPatch {
    is_test: Option<bool>,
    status: Option<Status>,
}

pub async fn patch(
    _session: OperatorSession,
    Extension(db): DbExt,
    Path(id): Path<Uuid>,
    Json(data): Json<SubscriberPatch>,
) -> Result<impl IntoResponse> {
    let found = db.update::<Subscriber, _>(id, |subscriber| {
        if let Some(is_test) = data.is_test {
            subscriber.is_test = is_test;
        }
        if let Some(status) = data.status {
            subscriber.status = status;
        }
    })?;
    if !found {
        return Err(ErrorKind::SubscriberNotFound(id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete(
    _session: OperatorSession,
    Extension(db): DbExt,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let subscriber = db
        .get_opt::<Subscriber>(id)?
        .ok_or(ErrorKind::SubscriberNotFound(id))?;
    db.remove(&subscriber)?;
    Ok(StatusCode::NO_CONTENT)
}
