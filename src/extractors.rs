use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::error_body;

/// JSON body extractor whose rejections use the service's error body.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                let (status, kind, diagnostics) = match rejection {
                    JsonRejection::JsonDataError(err) => (
                        StatusCode::BAD_REQUEST,
                        "invalid-body",
                        format!("Invalid JSON data: {}", err),
                    ),
                    JsonRejection::JsonSyntaxError(err) => (
                        StatusCode::BAD_REQUEST,
                        "invalid-body",
                        format!("Failed to parse the request body as JSON: {}", err),
                    ),
                    JsonRejection::MissingJsonContentType(err) => (
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        "not-supported",
                        format!("Missing JSON Content-Type: {}", err),
                    ),
                    JsonRejection::BytesRejection(err) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "exception",
                        format!("Failed to read request body: {}", err),
                    ),
                    _ => (
                        StatusCode::BAD_REQUEST,
                        "invalid-body",
                        "Failed to parse JSON".to_string(),
                    ),
                };

                Err((status, Json(error_body(kind, &diagnostics))).into_response())
            }
        }
    }
}
