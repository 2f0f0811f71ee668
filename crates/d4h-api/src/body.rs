//! JSON request bodies whose rejections use the API error shape.

use axum::{Json, extract::FromRequest};

use crate::error::ApiError;

/// `Json<T>` that answers a malformed body with `invalid_parameter` instead
/// of axum's plain-text rejection.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);
