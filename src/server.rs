use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::cli::ServeArgs;
use crate::fax::{FaxClient, RelayOutcome};
use crate::forms::{self, FormField};
use crate::lookup;
use crate::seed;
use crate::storage::{StoragePaths, file_present_nonempty};
use crate::store::{self, ObjectStore};

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    store: Arc<ObjectStore>,
    fax: Arc<FaxClient>,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let paths = StoragePaths::new(&opts.data_dir);
    if !file_present_nonempty(&paths.duckdb_path) {
        return Err(anyhow!(
            "DuckDB not found at {}. Run: pcp-backend seed",
            paths.duckdb_path.display()
        ));
    }

    let mut conn = Connection::open(&paths.duckdb_path)
        .with_context(|| format!("open duckdb at {}", paths.duckdb_path.display()))?;
    if !seed::table_exists(&mut conn, "providers")? {
        return Err(anyhow!(
            "Table providers missing from {}. Run: pcp-backend seed",
            paths.duckdb_path.display()
        ));
    }
    // Databases seeded before the submissions table existed get it here.
    seed::create_submissions_table(&mut conn).context("ensure pcp_submissions")?;

    let fax = FaxClient::new(opts.fax_api_url.clone())?;
    if !fax.is_configured() {
        tracing::warn!("Fax backend not configured; /api/send-fax will return 500");
    }

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        store: Arc::new(ObjectStore::new(&opts.storage_endpoint, &opts.bucket)),
        fax: Arc::new(fax),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/get-form", get(api_get_form))
        .route("/api/get-provider", get(api_get_provider))
        .route("/api/submit-form", post(api_submit_form))
        .route("/api/upload-pdf", post(api_upload_pdf))
        .route("/api/send-fax", post(api_send_fax))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn error_json(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

/// A field counts as provided only when it is present and non-blank after
/// trimming; blank strings get the same 400 as absent keys.
fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
struct GetFormParams {
    insurance: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetFormResponse {
    fields: &'static [FormField],
    #[serde(rename = "pdfFields")]
    pdf_fields: &'static [FormField],
}

async fn api_get_form(Query(p): Query<GetFormParams>) -> impl IntoResponse {
    let fields = forms::template_for(p.insurance.as_deref().unwrap_or(""));
    Json(GetFormResponse {
        fields,
        pdf_fields: forms::PDF_ONLY_FIELDS,
    })
}

#[derive(Debug, Deserialize)]
struct GetProviderParams {
    insurance: Option<String>,
    location: Option<String>,
}

async fn api_get_provider(
    State(st): State<AppState>,
    Query(p): Query<GetProviderParams>,
) -> Response {
    let (Some(insurance), Some(location)) = (present(&p.insurance), present(&p.location)) else {
        return error_json(StatusCode::BAD_REQUEST, "Missing insurance or location");
    };

    let db = st.db.lock().await;
    match lookup::find_provider(&db, insurance, location) {
        Ok(Some(hit)) => Json(hit).into_response(),
        Ok(None) => {
            tracing::warn!("No provider found for insurance={insurance} location={location}");
            error_json(StatusCode::NOT_FOUND, "No provider found")
        }
        Err(e) => {
            tracing::error!("Provider lookup failed: {e:#}");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Database query failed")
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitFormRequest {
    insurance: Option<String>,
    location: Option<String>,
    #[serde(rename = "pdfUrl")]
    pdf_url: Option<String>,
}

async fn api_submit_form(
    State(st): State<AppState>,
    Json(req): Json<SubmitFormRequest>,
) -> Response {
    let (Some(insurance), Some(location), Some(pdf_url)) = (
        present(&req.insurance),
        present(&req.location),
        present(&req.pdf_url),
    ) else {
        return error_json(StatusCode::BAD_REQUEST, "Missing required fields");
    };

    let db = st.db.lock().await;
    match record_submission(&db, insurance, location, pdf_url) {
        Ok(()) => Json(json!({ "message": "Form submitted successfully!" })).into_response(),
        Err(e) => {
            tracing::error!("Failed to save submission: {e:#}");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save submission")
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadPdfRequest {
    insurance: Option<String>,
    location: Option<String>,
    #[serde(rename = "pdfBuffer")]
    pdf_buffer: Option<String>,
}

async fn api_upload_pdf(
    State(st): State<AppState>,
    Json(req): Json<UploadPdfRequest>,
) -> Response {
    use base64::Engine as _;

    let (Some(insurance), Some(location), Some(pdf_buffer)) = (
        present(&req.insurance),
        present(&req.location),
        present(&req.pdf_buffer),
    ) else {
        return error_json(StatusCode::BAD_REQUEST, "Missing required fields");
    };

    let bytes = match base64::engine::general_purpose::STANDARD.decode(pdf_buffer.as_bytes()) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Rejecting PDF payload that is not valid base64: {e}");
            return error_json(StatusCode::BAD_REQUEST, "Invalid PDF payload");
        }
    };

    let object_name = store::object_name_for(insurance, chrono::Utc::now().timestamp_millis());
    let pdf_url = match st.store.upload_pdf(&object_name, bytes).await {
        Ok(url) => url,
        Err(e) => {
            tracing::error!("PDF upload failed: {e:#}");
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload PDF");
        }
    };

    let db = st.db.lock().await;
    if let Err(e) = record_submission(&db, insurance, location, &pdf_url) {
        tracing::error!("Failed to save submission after upload: {e:#}");
        return error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save submission");
    }

    Json(json!({ "message": "Form uploaded successfully!", "pdfUrl": pdf_url })).into_response()
}

fn record_submission(
    conn: &Connection,
    insurance: &str,
    location: &str,
    pdf_url: &str,
) -> anyhow::Result<()> {
    conn.execute(
        r#"
        INSERT INTO pcp_submissions (insurance, location, pdf_url, submitted_at)
        VALUES (?, ?, ?, ?)
    "#,
        duckdb::params![insurance, location, pdf_url, chrono::Utc::now().to_rfc3339()],
    )
    .context("insert pcp_submissions row")?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SendFaxRequest {
    #[serde(rename = "pdfUrl")]
    pdf_url: Option<String>,
}

async fn api_send_fax(State(st): State<AppState>, Json(req): Json<SendFaxRequest>) -> Response {
    let Some(pdf_url) = present(&req.pdf_url) else {
        return error_json(StatusCode::BAD_REQUEST, "PDF URL is required");
    };

    match st.fax.relay(pdf_url).await {
        Ok(RelayOutcome::Sent { message }) => {
            Json(json!({ "success": true, "message": message })).into_response()
        }
        Ok(RelayOutcome::Failed {
            status,
            error,
            details,
        }) => {
            tracing::error!("Fax backend rejected {pdf_url}: {status} {error}");
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(json!({ "success": false, "error": error, "details": details })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Fax relay failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        let mut conn = Connection::open_in_memory().expect("open in-memory duckdb");
        conn.execute(
            r#"
            CREATE TABLE providers (
              provider_name TEXT,
              npi TEXT,
              insurance TEXT,
              location TEXT,
              priority INTEGER
            )
        "#,
            [],
        )
        .expect("create providers");
        conn.execute(
            "INSERT INTO providers VALUES (?, ?, ?, ?, ?)",
            duckdb::params!["Dr. Astoria", "1000000001", "Aetna", "Astoria", 1],
        )
        .expect("insert provider");
        crate::seed::create_submissions_table(&mut conn).expect("create submissions");

        AppState {
            db: Arc::new(Mutex::new(conn)),
            store: Arc::new(ObjectStore::new(
                "https://storage.googleapis.com",
                "pcp-change-forms",
            )),
            fax: Arc::new(FaxClient::new(None).expect("build fax client")),
        }
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn submission_count(st: &AppState) -> i64 {
        let db = st.db.try_lock().expect("db lock");
        let mut stmt = db
            .prepare("SELECT COUNT(*)::BIGINT FROM pcp_submissions")
            .unwrap();
        stmt.query_row([], |row| row.get(0)).unwrap()
    }

    #[tokio::test]
    async fn get_provider_rejects_missing_params() {
        let st = test_state();
        let resp = api_get_provider(
            State(st),
            Query(GetProviderParams {
                insurance: Some("Aetna".to_string()),
                location: None,
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Missing insurance or location");
    }

    #[tokio::test]
    async fn get_provider_rejects_blank_params_like_missing_ones() {
        let st = test_state();
        let resp = api_get_provider(
            State(st),
            Query(GetProviderParams {
                insurance: Some("".to_string()),
                location: Some("Astoria".to_string()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let st = test_state();
        let resp = api_get_provider(
            State(st),
            Query(GetProviderParams {
                insurance: Some("Aetna".to_string()),
                location: Some("   ".to_string()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_provider_miss_returns_404_error_envelope() {
        let st = test_state();
        let resp = api_get_provider(
            State(st),
            Query(GetProviderParams {
                insurance: Some("Humana".to_string()),
                location: Some("Jamaica".to_string()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "No provider found");
    }

    #[tokio::test]
    async fn get_provider_hit_returns_name_and_npi() {
        let st = test_state();
        let resp = api_get_provider(
            State(st),
            Query(GetProviderParams {
                insurance: Some("Aetna".to_string()),
                location: Some("Astoria".to_string()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["provider_name"], "Dr. Astoria");
        assert_eq!(body["npi"], "1000000001");
    }

    #[tokio::test]
    async fn submit_form_rejects_blank_fields_without_recording() {
        let st = test_state();
        let resp = api_submit_form(
            State(st.clone()),
            Json(SubmitFormRequest {
                insurance: Some("".to_string()),
                location: Some("".to_string()),
                pdf_url: Some("".to_string()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Missing required fields");
        assert_eq!(submission_count(&st), 0);
    }

    #[tokio::test]
    async fn submit_form_records_a_row() {
        let st = test_state();
        let resp = api_submit_form(
            State(st.clone()),
            Json(SubmitFormRequest {
                insurance: Some("Aetna".to_string()),
                location: Some("Astoria".to_string()),
                pdf_url: Some("https://example.com/x.pdf".to_string()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(submission_count(&st), 1);
    }

    #[tokio::test]
    async fn upload_pdf_rejects_blank_fields() {
        let st = test_state();
        let resp = api_upload_pdf(
            State(st),
            Json(UploadPdfRequest {
                insurance: Some("Aetna".to_string()),
                location: Some("Astoria".to_string()),
                pdf_buffer: Some("  ".to_string()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Missing required fields");
    }

    #[tokio::test]
    async fn upload_pdf_rejects_invalid_base64() {
        let st = test_state();
        let resp = api_upload_pdf(
            State(st),
            Json(UploadPdfRequest {
                insurance: Some("Aetna".to_string()),
                location: Some("Astoria".to_string()),
                pdf_buffer: Some("not base64!!!".to_string()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Invalid PDF payload");
    }

    #[tokio::test]
    async fn send_fax_rejects_missing_pdf_url() {
        let st = test_state();
        let resp = api_send_fax(State(st), Json(SendFaxRequest { pdf_url: None })).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "PDF URL is required");
    }

    #[test]
    fn submissions_are_recorded_with_a_timestamp() {
        let mut conn = Connection::open_in_memory().expect("open in-memory duckdb");
        crate::seed::create_submissions_table(&mut conn).expect("create submissions");
        record_submission(
            &conn,
            "Healthfirst",
            "Astoria",
            "https://storage.googleapis.com/pcp-change-forms/pcp_forms/x.pdf",
        )
        .expect("record submission");

        let mut stmt = conn
            .prepare("SELECT insurance, location, pdf_url, submitted_at FROM pcp_submissions")
            .unwrap();
        let (insurance, location, pdf_url, submitted_at): (String, String, String, String) = stmt
            .query_row([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap();
        assert_eq!(insurance, "Healthfirst");
        assert_eq!(location, "Astoria");
        assert!(pdf_url.ends_with("x.pdf"));
        // RFC 3339: date, 'T', time.
        assert!(submitted_at.contains('T'), "{submitted_at}");
    }
}
