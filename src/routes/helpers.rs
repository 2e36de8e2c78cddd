//! Shared helpers for HTTP handlers

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

use crate::types::UltimaError;

#[derive(Serialize)]
struct ApiError {
    error: String,
    code: &'static str,
}

/// JSON error response with CORS headers
pub fn error_response(err: &UltimaError) -> Response<Full<Bytes>> {
    let error = ApiError {
        error: err.to_string(),
        code: err.code(),
    };
    let body = serde_json::to_vec(&error).unwrap_or_default();

    let mut builder = Response::builder()
        .status(err.status_code())
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-cache")
        .header("Access-Control-Allow-Origin", "*");

    if let UltimaError::RateLimited { reset_at } = err {
        builder = builder.header("X-RateLimit-Reset", reset_at.to_string());
    }

    builder.body(Full::new(Bytes::from(body))).unwrap_or_else(|_| {
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Full::new(Bytes::from(r#"{"error":"Internal error"}"#)))
            .unwrap()
    })
}

/// JSON success response with CORS headers
pub fn json_response<T: Serialize>(status: StatusCode, data: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(data).unwrap_or_default();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-cache")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(r#"{"error":"Internal error"}"#)))
                .unwrap()
        })
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Read and buffer the full request body
pub async fn read_body(req: Request<Incoming>) -> Result<Bytes, UltimaError> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| UltimaError::BadRequest(format!("Failed to read request body: {}", e)))?;
    Ok(body.to_bytes())
}

/// Read the body and parse it as JSON
pub async fn parse_json_body<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, UltimaError> {
    let bytes = read_body(req).await?;
    if bytes.is_empty() {
        return Err(UltimaError::BadRequest("Request body is required".into()));
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| UltimaError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Parse a URL query string into key/value pairs
pub fn parse_query_params(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            if key.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse a path segment as an ObjectId
pub fn parse_object_id(segment: &str) -> Result<ObjectId, UltimaError> {
    ObjectId::parse_str(segment)
        .map_err(|_| UltimaError::BadRequest(format!("Invalid id '{}'", segment)))
}

/// Pagination from query params, with sane bounds
pub fn pagination(params: &HashMap<String, String>) -> (i64, u64) {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<i64>().ok())
        .map(|v| v.clamp(1, 100))
        .unwrap_or(20);
    let skip = params
        .get("skip")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    (limit, skip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_params() {
        let params = parse_query_params("limit=10&skip=5&flag");
        assert_eq!(params.get("limit").map(String::as_str), Some("10"));
        assert_eq!(params.get("skip").map(String::as_str), Some("5"));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn test_pagination_bounds() {
        let mut params = HashMap::new();
        assert_eq!(pagination(&params), (20, 0));

        params.insert("limit".to_string(), "500".to_string());
        params.insert("skip".to_string(), "30".to_string());
        assert_eq!(pagination(&params), (100, 30));

        params.insert("limit".to_string(), "0".to_string());
        assert_eq!(pagination(&params).0, 1);
    }

    #[test]
    fn test_parse_object_id() {
        assert!(parse_object_id("64b0c0ffee0ddba11ca11ab1").is_ok());
        assert!(parse_object_id("nope").is_err());
    }
}
