use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// The wire response shape shared by the REST and `/grpc/<service>/<method>`
/// surfaces (§6): `{status, message, data}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope { status: true, message: String::new(), data }
    }
}

impl Envelope<Value> {
    pub fn ok_value(data: impl Serialize) -> Self {
        Envelope { status: true, message: String::new(), data: serde_json::to_value(data).unwrap_or(Value::Null) }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
