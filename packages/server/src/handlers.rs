//! HTTP handler functions for the ecosystem map server.

use actix_web::{HttpResponse, http::header, web};
use ecosystem_map_mergin::null_progress;
use ecosystem_map_render::render_html;
use ecosystem_map_service_models::catalog;
use ecosystem_map_session::{RenderOutput, SessionError};

use crate::AppState;
use crate::page::{Notice, NoticeLevel, PageView, ViewParams, render_page};

/// `GET /`
///
/// Renders the dashboard. When data is downloaded, every view runs a full
/// render pass for the selected users.
pub async fn index(
    state: web::Data<AppState>,
    query: web::Query<Vec<(String, String)>>,
) -> HttpResponse {
    let params = ViewParams::from_pairs(&query);
    let mut notices: Vec<Notice> = state.notices.lock().await.drain(..).collect();

    let mut session = state.session.lock().await;
    let downloaded = session.state().is_downloaded();
    let (map_width, map_height) = (session.config().map.width, session.config().map.height);

    let output = if downloaded {
        match session.render(&params.users) {
            Ok(output) => {
                notices.extend(output_notices(&output));
                Some(output)
            }
            Err(e) => {
                notices.push(Notice::new(NoticeLevel::Error, e.to_string()));
                None
            }
        }
    } else {
        None
    };
    drop(session);

    let html = render_page(&PageView {
        downloaded,
        notices: &notices,
        output: output.as_ref(),
        params: &params,
        map_width,
        map_height,
    });

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}

/// `GET /map`
///
/// The standalone Leaflet page embedded by the dashboard.
pub async fn map_page(
    state: web::Data<AppState>,
    query: web::Query<Vec<(String, String)>>,
) -> HttpResponse {
    let params = ViewParams::from_pairs(&query);
    let mut session = state.session.lock().await;
    let (width, height) = (session.config().map.width, session.config().map.height);

    match session.render(&params.users) {
        Ok(output) => match render_html(&output.map.document, width, height) {
            Ok(html) => HttpResponse::Ok()
                .content_type("text/html; charset=utf-8")
                .body(html),
            Err(e) => {
                log::error!("Failed to render map: {e}");
                HttpResponse::InternalServerError().body("Failed to render map")
            }
        },
        Err(e) => error_response(&e),
    }
}

/// `POST /download`
///
/// Downloads the project, then redirects back to the dashboard with a
/// banner describing the outcome.
pub async fn download(state: web::Data<AppState>) -> HttpResponse {
    let mut session = state.session.lock().await;
    let project = session.config().mergin.project.clone();

    let notice = match session.download(null_progress()).await {
        Ok(summary) => Notice::new(
            NoticeLevel::Success,
            format!(
                "Downloaded {project} {} ({} files)",
                summary.version, summary.files
            ),
        ),
        Err(e) => Notice::new(NoticeLevel::Error, e.to_string()),
    };
    drop(session);

    state.notices.lock().await.push(notice);
    redirect_home()
}

/// `POST /refresh`
///
/// Clears the memoized download and load results.
pub async fn refresh(state: web::Data<AppState>) -> HttpResponse {
    state.session.lock().await.refresh();
    redirect_home()
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /api/layers`
///
/// Returns the service layer catalog in display order.
pub async fn layers() -> HttpResponse {
    HttpResponse::Ok().json(catalog())
}

/// `GET /api/features`
///
/// Returns the user-filtered features as a GeoJSON `FeatureCollection`.
pub async fn features(
    state: web::Data<AppState>,
    query: web::Query<Vec<(String, String)>>,
) -> HttpResponse {
    let params = ViewParams::from_pairs(&query);
    let mut session = state.session.lock().await;

    match session.render(&params.users) {
        Ok(output) => HttpResponse::Ok().json(output.filtered.to_feature_collection()),
        Err(e) => error_response(&e),
    }
}

fn output_notices(output: &RenderOutput) -> Vec<Notice> {
    let warnings = output
        .warnings
        .iter()
        .map(|w| Notice::new(NoticeLevel::Warning, w.to_string()));
    let errors = output
        .map
        .errors
        .iter()
        .map(|e| Notice::new(NoticeLevel::Warning, e.to_string()));
    warnings.chain(errors).collect()
}

fn error_response(e: &SessionError) -> HttpResponse {
    let body = serde_json::json!({ "error": e.to_string() });
    match e {
        SessionError::NotDownloaded => HttpResponse::Conflict().json(body),
        SessionError::Download(_) => HttpResponse::BadGateway().json(body),
        SessionError::Load(_) => {
            log::error!("{e}");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn redirect_home() -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .finish()
}
