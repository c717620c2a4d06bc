use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};

use super::SharedState;
use crate::api::content_negotiation::{preferred_format, request_locale, ResponseFormat};
use crate::error::Result;
use crate::extractors::ApiJson;
use crate::models::{PatientId, PatientSet};
use crate::repository::FixedLocale;

fn locale_context(state: &SharedState, headers: &HeaderMap) -> FixedLocale {
    FixedLocale(request_locale(headers, &state.default_locale))
}

fn xml_response(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, ResponseFormat::Xml.content_type())],
        body,
    )
        .into_response()
}

/// One patient's clinical record, XML unless JSON is requested.
pub async fn export_record(
    State(state): State<SharedState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<Response> {
    let context = locale_context(&state, &headers);
    let patient_id = PatientId(id);

    match preferred_format(&headers) {
        ResponseFormat::Json => {
            let record = state.assembler.export_record(patient_id, &context).await?;
            Ok(Json(record).into_response())
        }
        ResponseFormat::Xml => {
            let xml = state.assembler.export(patient_id, &context).await?;
            Ok(xml_response(xml))
        }
    }
}

/// The posted patient ids exported under one `<patientset>` root.
pub async fn export_records(
    State(state): State<SharedState>,
    headers: HeaderMap,
    ApiJson(ids): ApiJson<Vec<PatientId>>,
) -> Result<Response> {
    let context = locale_context(&state, &headers);
    let patients: PatientSet = ids.into_iter().collect();
    let xml = state.assembler.export_patient_set(&patients, &context).await?;
    Ok(xml_response(xml))
}
