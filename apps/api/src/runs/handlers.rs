use axum::{
    async_trait,
    extract::{FromRequestParts, Multipart, Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipeline::{run_pipeline, SearchPreferences};
use crate::render::render_pdf;
use crate::runs::export::{file_name, rendered_sections, ExportFormat, ExportSection, RenderedSection};
use crate::runs::upload::{extract_resume_text, ResumeUpload};
use crate::runs::validation::{parse_flag, validate, ResumeSource, RunForm};
use crate::session::{HistoryEntry, HistorySummary, SessionProgress, SESSION_COOKIE};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Session cookie
// ────────────────────────────────────────────────────────────────────────────

/// The browser session a request belongs to. A request without a valid
/// `jobcrew_session` cookie gets a fresh id, issued on the response.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub id: Uuid,
    issued: bool,
}

impl Session {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let existing = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok());

        match existing {
            Some(id) => Session { id, issued: false },
            None => Session {
                id: Uuid::new_v4(),
                issued: true,
            },
        }
    }

    /// Adds `Set-Cookie` when this request started the session.
    pub fn respond(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if self.issued {
            let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", self.id);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }
        response
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Session::from_headers(&parts.headers))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Responses
// ────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EntryResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub preferences: SearchPreferences,
    pub deep_search: bool,
    pub sections: Vec<RenderedSection>,
}

impl From<&HistoryEntry> for EntryResponse {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id,
            created_at: entry.created_at,
            preferences: entry.preferences.clone(),
            deep_search: entry.result.deep_search,
            sections: rendered_sections(&entry.result),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/runs
pub async fn handle_create_run(
    State(state): State<AppState>,
    session: Session,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_run_form(multipart).await?;
    let run = validate(form, &state.config).map_err(|fields| {
        info!("Rejected run with {} invalid field(s)", fields.len());
        AppError::InvalidInput(fields)
    })?;

    let resume_text = match run.resume {
        ResumeSource::Upload(upload) => extract_resume_text(upload).await?,
        ResumeSource::Pasted(text) => text,
    };

    info!(
        "Starting run for topic {:?} (deep search: {})",
        run.preferences.topic, run.preferences.deep_search
    );
    let collaborators = state.collaborators.build(&run.credentials);
    let progress = SessionProgress::new(state.sessions.clone(), session.id);

    let result = match run_pipeline(&run.preferences, &resume_text, &collaborators, &progress).await
    {
        Ok(result) => result,
        Err(e) => {
            state.sessions.set_progress(
                session.id,
                format!("Failed during stage {}: {}", e.stage().number(), e.stage().label()),
            );
            return Err(e.into());
        }
    };
    state.sessions.set_progress(session.id, "Completed");

    let entry = HistoryEntry {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        preferences: run.preferences,
        result,
    };
    let body = EntryResponse::from(&entry);
    state.sessions.append(session.id, entry);
    info!("Run {} completed", body.id);

    Ok(session.respond((StatusCode::CREATED, Json(body))))
}

/// GET /api/v1/progress
pub async fn handle_get_progress(State(state): State<AppState>, session: Session) -> Response {
    let progress = state.sessions.progress(session.id);
    session.respond(Json(json!({ "progress": progress })))
}

/// GET /api/v1/history
pub async fn handle_list_history(State(state): State<AppState>, session: Session) -> Response {
    let history: Vec<HistorySummary> = state.sessions.history(session.id);
    session.respond(Json(history))
}

/// DELETE /api/v1/history
pub async fn handle_clear_history(State(state): State<AppState>, session: Session) -> Response {
    let cleared = state.sessions.clear(session.id);
    info!("Cleared {cleared} history entries");
    session.respond(Json(json!({ "cleared": cleared })))
}

/// GET /api/v1/history/:id
pub async fn handle_get_entry(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<EntryResponse>, AppError> {
    let entry = find_entry(&state, session, id)?;
    Ok(Json(EntryResponse::from(&entry)))
}

/// GET /api/v1/history/:id/export/:section?format=markdown|pdf
pub async fn handle_export(
    State(state): State<AppState>,
    session: Session,
    Path((id, section)): Path<(Uuid, String)>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let section = ExportSection::parse(&section)
        .ok_or_else(|| AppError::NotFound(format!("Unknown export section '{section}'")))?;
    let entry = find_entry(&state, session, id)?;

    let topic = entry.preferences.topic.clone();
    let markdown = section.markdown(&entry.result).to_string();
    let name = file_name(section, &topic, query.format);
    let headers = [
        (CONTENT_TYPE, query.format.content_type().to_string()),
        (CONTENT_DISPOSITION, format!("attachment; filename=\"{name}\"")),
    ];

    let response = match query.format {
        ExportFormat::Markdown => (headers, markdown).into_response(),
        ExportFormat::Pdf => {
            let title = format!("{}: {}", section.title(), topic);
            let bytes = tokio::task::spawn_blocking(move || render_pdf(&title, &markdown))
                .await
                .map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("spawn_blocking failed in PDF render: {e}"))
                })??;
            (headers, bytes).into_response()
        }
    };
    info!("Exported {name}");
    Ok(response)
}

/// Option lists for the form, so the page never hard-codes labels.
pub async fn handle_get_options() -> Json<Value> {
    use crate::pipeline::{ExperienceLevel, SalaryBand, WorkArrangement};

    fn options<T: Copy>(all: &[T], key: fn(T) -> &'static str, label: fn(T) -> &'static str) -> Value {
        all.iter()
            .map(|&v| json!({ "key": key(v), "label": label(v) }))
            .collect()
    }

    Json(json!({
        "work_arrangement": options(WorkArrangement::ALL, WorkArrangement::key, WorkArrangement::label),
        "experience_level": options(ExperienceLevel::ALL, ExperienceLevel::key, ExperienceLevel::label),
        "salary_band": options(SalaryBand::ALL, SalaryBand::key, SalaryBand::label),
    }))
}

fn find_entry(state: &AppState, session: Session, id: Uuid) -> Result<HistoryEntry, AppError> {
    state
        .sessions
        .entry(session.id, id)
        .ok_or_else(|| AppError::NotFound(format!("Run {id} not found")))
}

// ────────────────────────────────────────────────────────────────────────────
// Multipart
// ────────────────────────────────────────────────────────────────────────────

async fn read_run_form(mut multipart: Multipart) -> Result<RunForm, AppError> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        warn!("Malformed run form: {e}");
        AppError::Validation(format!("Malformed form data: {e}"))
    };

    let mut form = RunForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "resume" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(malformed)?;
            form.resume = Some(ResumeUpload {
                file_name,
                content_type,
                bytes,
            });
            continue;
        }

        let value = field.text().await.map_err(malformed)?;
        match name.as_str() {
            "topic" => form.topic = value,
            "work_arrangement" => form.work_arrangement = value,
            "experience_level" => form.experience_level = value,
            "salary_band" => form.salary_band = value,
            "deep_search" => form.deep_search = parse_flag(&value),
            "model_api_key" => form.model_api_key = value,
            "search_api_key" => form.search_api_key = value,
            "resume_text" => form.resume_text = value,
            other => debug!("Ignoring unknown form field {other:?}"),
        }
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::pipeline::testing::{FailingFetcher, FailingSearch, FixedSearch, RecordingModel, RESUME};
    use crate::pipeline::Collaborators;
    use crate::routes::build_router;
    use crate::runs::collaborators::{CollaboratorFactory, Credentials};
    use crate::search::FetchFailure;
    use crate::session::SessionStore;

    const BOUNDARY: &str = "jobcrew-test-boundary";

    struct StubFactory {
        model: RecordingModel,
        failure: FetchFailure,
        search_fails: bool,
        builds: Arc<AtomicUsize>,
    }

    impl CollaboratorFactory for StubFactory {
        fn build(&self, _credentials: &Credentials) -> Collaborators {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Collaborators {
                model: Box::new(self.model.clone()),
                search: if self.search_fails {
                    Box::new(FailingSearch)
                } else {
                    Box::new(FixedSearch::with_postings(2))
                },
                fetcher: Box::new(FailingFetcher::new(self.failure.clone())),
            }
        }
    }

    struct Harness {
        app: Router,
        builds: Arc<AtomicUsize>,
        session: Uuid,
    }

    fn harness(model: RecordingModel) -> Harness {
        harness_with(model, false)
    }

    fn harness_with(model: RecordingModel, search_fails: bool) -> Harness {
        let builds = Arc::new(AtomicUsize::new(0));
        let state = AppState {
            config: Config::for_tests(),
            sessions: SessionStore::default(),
            collaborators: Arc::new(StubFactory {
                model,
                failure: FetchFailure::Forbidden,
                search_fails,
                builds: builds.clone(),
            }),
        };
        Harness {
            app: build_router(state),
            builds,
            session: Uuid::new_v4(),
        }
    }

    fn multipart_body(fields: &[(&str, &str)]) -> Body {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"resume.txt\"\r\nContent-Type: text/plain\r\n\r\n{RESUME}\r\n"
        ));
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Body::from(body)
    }

    fn full_form(deep_search: &str) -> Vec<(&'static str, String)> {
        vec![
            ("topic", "Backend Engineer".to_string()),
            ("work_arrangement", "remote".to_string()),
            ("experience_level", "senior".to_string()),
            ("salary_band", "from130_to160".to_string()),
            ("deep_search", deep_search.to_string()),
            ("model_api_key", "gemini-key".to_string()),
            ("search_api_key", "serper-key".to_string()),
        ]
    }

    impl Harness {
        async fn send(&self, method: &str, uri: &str, body: Body, multipart: bool) -> Response {
            let mut request = Request::builder()
                .method(method)
                .uri(uri)
                .header(COOKIE, format!("{SESSION_COOKIE}={}", self.session));
            if multipart {
                request = request.header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                );
            }
            self.app
                .clone()
                .oneshot(request.body(body).unwrap())
                .await
                .unwrap()
        }

        async fn submit(&self, fields: &[(&'static str, String)]) -> Response {
            let borrowed: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
            self.send("POST", "/api/v1/runs", multipart_body(&borrowed), true)
                .await
        }

        async fn get(&self, uri: &str) -> Response {
            self.send("GET", uri, Body::empty(), false).await
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credential_never_builds_pipeline() {
        let h = harness(RecordingModel::default());
        let mut form = full_form("false");
        form.retain(|(k, _)| *k != "model_api_key");

        let response = h.submit(&form).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["fields"][0]["field"], "model_api_key");
        assert_eq!(body["error"]["fields"].as_array().unwrap().len(), 1);
        assert_eq!(h.builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_run_is_returned_and_recorded() {
        let model = RecordingModel::default();
        let h = harness(model.clone());

        let response = h.submit(&full_form("false")).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;

        let sections = body["sections"].as_array().unwrap();
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0]["section"], "research");
        assert!(sections[0]["html"].as_str().unwrap().contains("<h2>Stage output #1</h2>"));
        assert!(sections[3]["markdown"]
            .as_str()
            .unwrap()
            .starts_with("# Job Search Report: Backend Engineer"));
        assert_eq!(model.recorded().len(), 3);
        // The uploaded résumé reached the gap analysis prompt.
        assert!(model.recorded()[1].task.contains("Jane Doe"));

        let history = json_body(h.get("/api/v1/history").await).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["topic"], "Backend Engineer");
        assert_eq!(history[0]["id"], body["id"]);

        let progress = json_body(h.get("/api/v1/progress").await).await;
        assert_eq!(progress["progress"], "Completed");
    }

    #[tokio::test]
    async fn test_deep_search_with_forbidden_pages_still_succeeds() {
        let h = harness(RecordingModel::default());

        let response = h.submit(&full_form("on")).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        let research = body["sections"][0]["markdown"].as_str().unwrap();
        assert!(research.contains(
            "[Full posting unavailable for https://jobs.example.com/1: 403 Forbidden. Using search snippet only.]"
        ));
        assert!(research.contains("https://jobs.example.com/2: 403 Forbidden"));
        assert_eq!(body["deep_search"], true);
    }

    #[tokio::test]
    async fn test_stage_failure_returns_502_and_records_nothing() {
        let model = RecordingModel::failing_on(2);
        let h = harness(model.clone());

        let response = h.submit(&full_form("false")).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "PIPELINE_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("gap_analysis stage failed"));
        assert_eq!(model.recorded().len(), 2);

        let history = json_body(h.get("/api/v1/history").await).await;
        assert!(history.as_array().unwrap().is_empty());
        let progress = json_body(h.get("/api/v1/progress").await).await;
        assert_eq!(progress["progress"], "Failed during stage 2: Resume Match Analysis");
    }

    #[tokio::test]
    async fn test_search_failure_returns_502_and_records_nothing() {
        let model = RecordingModel::default();
        let h = harness_with(model.clone(), true);

        let response = h.submit(&full_form("on")).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "PIPELINE_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("research stage failed: search error"));
        assert!(model.recorded().is_empty());

        let history = json_body(h.get("/api/v1/history").await).await;
        assert!(history.as_array().unwrap().is_empty());
        let progress = json_body(h.get("/api/v1/progress").await).await;
        assert_eq!(progress["progress"], "Failed during stage 1: Job Opportunities");
    }

    #[tokio::test]
    async fn test_exports_markdown_and_pdf_with_topic_file_names() {
        let h = harness(RecordingModel::default());
        let body = json_body(h.submit(&full_form("false")).await).await;
        let id = body["id"].as_str().unwrap().to_string();

        let response = h.get(&format!("/api/v1/history/{id}/export/research")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"job_list_Backend_Engineer.md\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            body["sections"][0]["markdown"].as_str().unwrap()
        );

        let response = h
            .get(&format!("/api/v1/history/{id}/export/full?format=pdf"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"full_report_Backend_Engineer.pdf\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_unknown_entry_or_section_is_not_found() {
        let h = harness(RecordingModel::default());
        let body = json_body(h.submit(&full_form("false")).await).await;
        let id = body["id"].as_str().unwrap();

        let response = h.get(&format!("/api/v1/history/{id}/export/everything")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = h.get(&format!("/api/v1/history/{}", Uuid::new_v4())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_clear_history_empties_the_session() {
        let h = harness(RecordingModel::default());
        h.submit(&full_form("false")).await;

        let response = h.send("DELETE", "/api/v1/history", Body::empty(), false).await;
        assert_eq!(json_body(response).await["cleared"], 1);

        let history = json_body(h.get("/api/v1/history").await).await;
        assert!(history.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_isolated_between_sessions() {
        let mut h = harness(RecordingModel::default());
        h.submit(&full_form("false")).await;

        h.session = Uuid::new_v4();
        let history = json_body(h.get("/api/v1/history").await).await;
        assert!(history.as_array().unwrap().is_empty());
    }

    #[test]
    fn test_session_cookie_is_reused_or_issued() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={id}")).unwrap(),
        );
        let session = Session::from_headers(&headers);
        assert_eq!(session.id, id);
        assert!(session.respond(StatusCode::OK).headers().get(SET_COOKIE).is_none());

        let fresh = Session::from_headers(&HeaderMap::new());
        let response = fresh.respond(StatusCode::OK);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}={}", fresh.id)));
        assert!(cookie.contains("HttpOnly"));
    }
}
