use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use meter_ledger::{Meter, ReadingWithLocation};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::export;
use crate::ledger::{LedgerError, ReadingLedger};
use crate::photos::{PhotoStore, PhotoStoreError};
use crate::registry::{valid_meter_id, MeterRegistry, RegisterOutcome};

#[derive(Clone)]
pub struct AppState {
    pub registry: MeterRegistry,
    pub ledger: Arc<ReadingLedger>,
    pub photos: Arc<dyn PhotoStore>,
}

/// Failures surfaced to HTTP clients as plain response text.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Ledger(LedgerError::MissingPhoto)
            | ApiError::Ledger(LedgerError::NonMonotonicReading { .. })
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(LedgerError::NotAuthorized) => StatusCode::FORBIDDEN,
            ApiError::Ledger(LedgerError::NotFound(_)) | ApiError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Ledger(LedgerError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        (status, self.to_string()).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(registry_page).post(register_meter))
        .route("/reading", get(meter_ids))
        .route("/save_reading", post(save_reading))
        .route("/view", get(view_readings))
        .route("/export", get(export_csv))
        .route("/delete/:id", get(delete_reading))
        .route("/uploads/:filename", get(serve_photo))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

#[derive(Deserialize)]
struct RegisterForm {
    meter_id: String,
    location: String,
}

#[derive(Deserialize)]
struct DeleteParams {
    user: Option<String>,
}

async fn registry_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let meters = state.registry.list().await.map_err(LedgerError::from)?;
    Ok(Html(render_registry_page(&meters, None)))
}

async fn register_meter(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Html<String>, ApiError> {
    let meter_id = form.meter_id.trim();
    let location = form.location.trim();
    if meter_id.is_empty() || location.is_empty() {
        return Err(ApiError::BadRequest(
            "meter_id and location are required".to_string(),
        ));
    }
    if !valid_meter_id(meter_id) {
        return Err(ApiError::BadRequest(format!("invalid meter id '{meter_id}'")));
    }

    let outcome = state
        .registry
        .register(meter_id, location)
        .await
        .map_err(LedgerError::from)?;
    let notice = match outcome {
        RegisterOutcome::Registered => format!("Meter {meter_id} registered"),
        RegisterOutcome::AlreadyExists => format!("Meter {meter_id} is already registered"),
    };

    let meters = state.registry.list().await.map_err(LedgerError::from)?;
    Ok(Html(render_registry_page(&meters, Some(&notice))))
}

/// Meter identifiers for the reading-entry form.
async fn meter_ids(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let meters = state.registry.list().await.map_err(LedgerError::from)?;
    Ok(Json(meters.into_iter().map(|m| m.meter_id).collect()))
}

async fn save_reading(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<String, ApiError> {
    let mut meter_id = None;
    let mut user = None;
    let mut current = None;
    let mut photo: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "meter_id" => meter_id = Some(text_field(field).await?),
            "user" => user = Some(text_field(field).await?),
            "current" => current = Some(text_field(field).await?),
            "photo" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read photo: {e}")))?;
                photo = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let meter_id = meter_id.ok_or_else(|| missing_field("meter_id"))?;
    let user = user.ok_or_else(|| missing_field("user"))?;
    let current = current.ok_or_else(|| missing_field("current"))?;

    if !valid_meter_id(&meter_id) {
        return Err(ApiError::BadRequest(format!("invalid meter id '{meter_id}'")));
    }
    // `parse` accepts "nan" and "inf"; a reading must be a finite number.
    let closing = current
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ApiError::BadRequest(format!("invalid reading '{current}'")))?;

    let reading = state
        .ledger
        .submit(&meter_id, &user, closing, photo.as_deref())
        .await?;

    Ok(format!(
        "Reading saved for meter {}: consumption {}",
        reading.meter_id, reading.consumption
    ))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart field: {e}")))
}

fn missing_field(name: &str) -> ApiError {
    ApiError::BadRequest(format!("missing field '{name}'"))
}

async fn view_readings(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let rows = state.ledger.list_with_location().await?;
    Ok(Html(render_readings_page(&rows)))
}

async fn export_csv(State(state): State<AppState>) -> Response {
    metrics::counter!("csv_export_requests_total").increment(1);

    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", export::CSV_FILENAME),
        ),
    ];
    (headers, Body::from_stream(state.ledger.export_csv())).into_response()
}

async fn delete_reading(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<DeleteParams>,
) -> Result<String, ApiError> {
    match params.user {
        Some(user) => state.ledger.delete(id, &user).await?,
        None => state.ledger.delete_as_submitter(id).await?,
    }
    Ok(format!("Reading {id} deleted"))
}

async fn serve_photo(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let file = state.photos.open(&filename).await.map_err(|e| match e {
        PhotoStoreError::InvalidFilename(name) => {
            ApiError::BadRequest(format!("invalid photo name '{name}'"))
        }
        PhotoStoreError::NotFound(name) => ApiError::NotFound(format!("photo {name}")),
        PhotoStoreError::Io(e) => ApiError::Ledger(LedgerError::Storage(e.to_string())),
    })?;

    let content_type = if filename.ends_with(".jpg") || filename.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    };

    Ok((
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

fn render_registry_page(meters: &[Meter], notice: Option<&str>) -> String {
    let mut page = String::from(
        "<!DOCTYPE html><html><head><title>Energy Tracker</title></head><body>\
         <h1>Meters</h1>",
    );
    if let Some(notice) = notice {
        page.push_str(&format!("<p>{notice}</p>"));
    }
    page.push_str(
        "<form method=\"post\" action=\"/\">\
         <input name=\"meter_id\" placeholder=\"Meter ID\">\
         <input name=\"location\" placeholder=\"Location\">\
         <button type=\"submit\">Register</button>\
         </form><ul>",
    );
    for meter in meters {
        page.push_str(&format!(
            "<li>{} ({})</li>",
            meter.meter_id, meter.location
        ));
    }
    page.push_str("</ul></body></html>");
    page
}

fn render_readings_page(rows: &[ReadingWithLocation]) -> String {
    let mut page = String::from(
        "<!DOCTYPE html><html><head><title>Readings</title></head><body>\
         <h1>Readings</h1><table border=\"1\">\
         <tr><th>Meter ID</th><th>Location</th><th>Opening</th><th>Closing</th>\
         <th>Consumption</th><th>User</th><th>Date</th><th>Photo</th><th></th></tr>",
    );
    for r in rows {
        let photo = export::photo_basename(&r.photo);
        page.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td>{}</td><td>{}</td>\
             <td><a href=\"/uploads/{photo}\">{photo}</a></td>\
             <td><a href=\"/delete/{}\">delete</a></td></tr>",
            r.meter_id, r.location, r.opening, r.closing, r.consumption, r.user, r.date, r.id
        ));
    }
    page.push_str("</table></body></html>");
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn error_statuses_match_their_kinds() {
        assert_eq!(
            status_of(ApiError::Ledger(LedgerError::MissingPhoto)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::Ledger(LedgerError::NonMonotonicReading {
                opening: 150.0,
                closing: 120.0,
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::BadRequest("nope".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::Ledger(LedgerError::NotAuthorized)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ApiError::Ledger(LedgerError::NotFound(7))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApiError::NotFound("photo x.jpg".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApiError::Ledger(LedgerError::Storage("db gone".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn registry_page_shows_the_form_and_every_meter() {
        let meters = vec![
            Meter {
                meter_id: "M1".to_string(),
                location: "Warehouse A".to_string(),
            },
            Meter {
                meter_id: "M2".to_string(),
                location: "Office".to_string(),
            },
        ];

        let page = render_registry_page(&meters, Some("Meter M2 registered"));
        assert!(page.contains("name=\"meter_id\""));
        assert!(page.contains("name=\"location\""));
        assert!(page.contains("M1 (Warehouse A)"));
        assert!(page.contains("M2 (Office)"));
        assert!(page.contains("Meter M2 registered"));
    }

    #[test]
    fn readings_page_links_photo_basenames_and_deletes() {
        let rows = vec![ReadingWithLocation {
            id: 3,
            meter_id: "M1".to_string(),
            location: "Warehouse A".to_string(),
            opening: 100.0,
            closing: 150.0,
            consumption: 50.0,
            user: "Bob".to_string(),
            date: "02-01-2024 08:00".to_string(),
            photo: "uploads/M1_20240102_080000.jpg".to_string(),
        }];

        let page = render_readings_page(&rows);
        assert!(page.contains("href=\"/uploads/M1_20240102_080000.jpg\""));
        assert!(page.contains("href=\"/delete/3\""));
        assert!(page.contains("<td>50</td>"));
    }
}
