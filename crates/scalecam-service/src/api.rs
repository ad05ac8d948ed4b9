//! Provider API.
//!
//! An edge device serves its measurements and clips to aggregators:
//!
//! - `GET /?from_ts=&to_ts=&limit=` returns `[[ts, raw, config_id], ...]`,
//!   ascending, with `from_ts` exclusive and `to_ts` inclusive. Timestamps
//!   are microseconds or RFC 3339.
//! - `GET /clips?from=<name>` streams the first clip whose name sorts after
//!   `from`, or answers `204 No Content`.
//! - `GET /api/health` reports liveness.
//!
//! An aggregator can also accept rows pushed by an edge device:
//!
//! - `POST /ingest/{store}` writes a `[[ts, raw, config_id], ...]` body into
//!   the `store`-th configured store in one transaction and answers
//!   `{"written": n}`. A rejected batch is a 400 and writes nothing.
//!
//! Errors are returned as `{"error": "..."}` via [`AppError`].
//!
//! # Example
//!
//! ```ignore
//! use scalecam_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_util::io::ReaderStream;
use tracing::debug;

use scalecam_types::{ClipName, MeasurementRow, Timestamp};

use crate::catchup::walk_clips;
use crate::state::{AppState, IngestState};

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_data))
        .route("/clips", get(get_clip))
        .route("/api/health", get(health))
}

/// Create the aggregator's ingest router.
pub fn ingest_router() -> Router<Arc<IngestState>> {
    Router::new()
        .route("/ingest/{store}", post(ingest))
        .route("/api/health", get(health))
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Raw query parameters, parsed by hand so bad values produce a JSON 400.
#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    pub from_ts: Option<String>,
    pub to_ts: Option<String>,
    pub limit: Option<String>,
}

impl DataQuery {
    fn parse(&self) -> Result<(Option<Timestamp>, Option<Timestamp>, Option<u32>), AppError> {
        let from_ts = parse_ts("from_ts", self.from_ts.as_deref())?;
        let to_ts = parse_ts("to_ts", self.to_ts.as_deref())?;

        let limit = match self.limit.as_deref() {
            None => None,
            Some(s) => match s.trim().parse::<u32>() {
                Ok(0) => return Err(AppError::BadRequest("limit must be positive".to_string())),
                Ok(n) => Some(n),
                Err(e) => {
                    return Err(AppError::BadRequest(format!("Invalid limit '{}': {}", s, e)));
                }
            },
        };

        if let (Some(from), Some(to)) = (from_ts, to_ts)
            && from > to
        {
            return Err(AppError::BadRequest(
                "from_ts must not be after to_ts".to_string(),
            ));
        }

        Ok((from_ts, to_ts, limit))
    }
}

fn parse_ts(field: &str, value: Option<&str>) -> Result<Option<Timestamp>, AppError> {
    value
        .map(|s| {
            Timestamp::parse(s).map_err(|e| AppError::BadRequest(format!("Invalid {}: {}", field, e)))
        })
        .transpose()
}

async fn get_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DataQuery>,
) -> Result<Json<Vec<MeasurementRow>>, AppError> {
    let (from_ts, to_ts, limit) = query.parse()?;
    let rows = state.store.lock().await.range(from_ts, to_ts, limit)?;
    debug!("Serving {} rows", rows.len());
    Ok(Json(rows))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClipQuery {
    pub from: Option<String>,
}

async fn get_clip(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClipQuery>,
) -> Result<Response, AppError> {
    let after = query
        .from
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            ClipName::parse(s).map_err(|e| AppError::BadRequest(format!("Invalid from: {}", e)))
        })
        .transpose()?;

    let Some((name, path)) = next_clip(&state.clip_dir, after.as_ref()).await? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open {}: {}", path.display(), e)))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to stat {}: {}", path.display(), e)))?
        .len();

    debug!("Serving clip {} ({} bytes)", name, length);

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", name),
        ),
        (header::CONTENT_LENGTH, length.to_string()),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// The clip under `dir` with the smallest name greater than `after`.
async fn next_clip(
    dir: &std::path::Path,
    after: Option<&ClipName>,
) -> Result<Option<(ClipName, PathBuf)>, AppError> {
    let mut best: Option<(ClipName, PathBuf)> = None;
    walk_clips(dir, |clip, path| {
        if after.is_some_and(|a| clip <= *a) {
            return;
        }
        if best.as_ref().is_none_or(|(b, _)| clip < *b) {
            best = Some((clip, path));
        }
    })
    .await
    .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", dir.display(), e)))?;
    Ok(best)
}

/// Response to a successful ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub written: usize,
}

async fn ingest(
    State(state): State<Arc<IngestState>>,
    Path(store): Path<String>,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError> {
    let index: usize = store
        .parse()
        .map_err(|_| AppError::NotFound(format!("No store {:?}", store)))?;
    let Some(db) = state.stores.get(index) else {
        return Err(AppError::NotFound(format!(
            "No store {} ({} configured)",
            index,
            state.stores.len()
        )));
    };

    let rows: Vec<MeasurementRow> = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid rows: {}", e)))?;

    let written = db.lock().await.write_all(&rows)?;
    debug!("Ingested {} rows into store {}", written, index);
    Ok(Json(IngestResponse { written }))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Store(scalecam_store::Error),
    Internal(String),
}

impl From<scalecam_store::Error> for AppError {
    fn from(e: scalecam_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Store(e @ scalecam_store::Error::BatchWrite { .. }) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use scalecam_store::Store;
    use tower::ServiceExt;

    fn create_test_state(clip_dir: &std::path::Path) -> Arc<AppState> {
        let mut store = Store::open_in_memory("measurements").unwrap();
        let config_id = store.ensure_config(-10.97, -35_800.0).unwrap();
        let rows: Vec<_> = [10, 20, 30]
            .iter()
            .map(|&ts| MeasurementRow {
                ts: Timestamp::from_micros(ts),
                raw: -40_000,
                config_id,
            })
            .collect();
        store.write_all(&rows).unwrap();
        AppState::new(store, clip_dir)
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn response_body(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn response_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&response_body(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = router().with_state(create_test_state(dir.path()));

        let response = get(app, "/api/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_data_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let app = router().with_state(create_test_state(dir.path()));

        let response = get(app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], 10);
        assert_eq!(rows[0][1], -40_000);
        assert_eq!(rows[0][2], 1);
    }

    #[tokio::test]
    async fn test_data_range_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let app = router().with_state(create_test_state(dir.path()));

        let json = response_json(get(app, "/?from_ts=10&to_ts=30").await).await;
        let ts: Vec<_> = json.as_array().unwrap().iter().map(|r| r[0].as_i64().unwrap()).collect();
        assert_eq!(ts, vec![20, 30]);
    }

    #[tokio::test]
    async fn test_data_limit() {
        let dir = tempfile::tempdir().unwrap();
        let app = router().with_state(create_test_state(dir.path()));

        let json = response_json(get(app, "/?from_ts=10&limit=1").await).await;
        assert_eq!(json, serde_json::json!([[20, -40_000, 1]]));
    }

    #[tokio::test]
    async fn test_data_empty_after_newest() {
        let dir = tempfile::tempdir().unwrap();
        let app = router().with_state(create_test_state(dir.path()));

        let json = response_json(get(app, "/?from_ts=30").await).await;
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_data_rfc3339_bound() {
        let dir = tempfile::tempdir().unwrap();
        let app = router().with_state(create_test_state(dir.path()));

        let json = response_json(get(app, "/?to_ts=1970-01-01T00:00:00.000020Z").await).await;
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_data_bad_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(dir.path());

        for uri in [
            "/?from_ts=yesterday",
            "/?limit=-1",
            "/?limit=0",
            "/?from_ts=30&to_ts=10",
        ] {
            let response = get(router().with_state(state.clone()), uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
            let json = response_json(response).await;
            assert!(json["error"].is_string(), "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_clips_first_and_next() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("2024-01-02")).unwrap();
        std::fs::write(dir.path().join("2024-01-01T120000.h264"), b"one").unwrap();
        std::fs::write(dir.path().join("2024-01-02/2024-01-02T080000.h264"), b"two").unwrap();
        let state = create_test_state(dir.path());

        let response = get(router().with_state(state.clone()), "/clips").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"2024-01-01T120000.h264\""
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "3");
        assert_eq!(response_body(response).await, b"one");

        let response = get(
            router().with_state(state.clone()),
            "/clips?from=2024-01-01T120000.h264",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_body(response).await, b"two");

        let response = get(
            router().with_state(state),
            "/clips?from=2024-01-02T080000.h264",
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_clips_ignores_hidden_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".2024-01-01T120000.h264.part"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let app = router().with_state(create_test_state(dir.path()));

        let response = get(app, "/clips").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_clips_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let app = router().with_state(create_test_state(&dir.path().join("missing")));

        let response = get(app, "/clips").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    fn create_ingest_state() -> Arc<IngestState> {
        let mut store = Store::open_in_memory("cats").unwrap();
        store.ensure_config(-10.97, -35_800.0).unwrap();
        IngestState::new(vec![store])
    }

    async fn post(app: Router, uri: &str, body: &str) -> Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_writes_rows() {
        let state = create_ingest_state();
        let app = ingest_router().with_state(state.clone());

        let response = post(app, "/ingest/0", "[[10, -40000, 1], [20, -39000, 1]]").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await, serde_json::json!({"written": 2}));

        let rows = state.stores[0].lock().await.range(None, None, None).unwrap();
        let ts: Vec<_> = rows.iter().map(|r| r.ts.as_micros()).collect();
        assert_eq!(ts, vec![10, 20]);
        assert_eq!(rows[1].raw, -39_000);
    }

    #[tokio::test]
    async fn test_ingest_rejected_batch_writes_nothing() {
        let state = create_ingest_state();
        let app = ingest_router().with_state(state.clone());

        let response = post(app, "/ingest/0", "[[10, -40000, 1], [20, -39000, 0]]").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("config_id"));

        assert_eq!(state.stores[0].lock().await.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ingest_unknown_store() {
        let state = create_ingest_state();

        for uri in ["/ingest/1", "/ingest/cats"] {
            let response = post(ingest_router().with_state(state.clone()), uri, "[]").await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
            assert!(response_json(response).await["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_ingest_bad_body() {
        let state = create_ingest_state();

        for body in ["not json", "[[10, -40000]]", "{\"ts\": 10}"] {
            let response = post(ingest_router().with_state(state.clone()), "/ingest/0", body).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
            assert!(response_json(response).await["error"].is_string());
        }
        assert_eq!(state.stores[0].lock().await.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clips_rejects_path_in_from() {
        let dir = tempfile::tempdir().unwrap();
        let app = router().with_state(create_test_state(dir.path()));

        let response = get(app, "/clips?from=..%2F2024-01-01T120000.h264").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
