//! Test generation and submission routes
//!
//! - POST /api/tests/generate          - Generate (or fetch cached) test
//! - POST /api/tests/submit            - Grade answers, award XP
//! - GET  /api/tests/history           - Attempt history (limit/skip)
//! - GET  /api/tests/history/{node_id} - History scoped to one node
//!
//! All test routes share an hourly per-user rate limit.

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::schemas::{ScoredQuestion, TestAttemptDoc};
use crate::routes::helpers::{
    error_response, json_response, pagination, parse_json_body, parse_object_id,
    parse_query_params,
};
use crate::server::AppState;
use crate::services::DifficultyStage;
use crate::types::UltimaError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    node_ids: Vec<String>,
    #[serde(default)]
    difficulty: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    node_ids: Vec<String>,
    /// Selected option index per question, in question order
    answers: Vec<usize>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    time_spent: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttemptView {
    id: String,
    node_ids: Vec<String>,
    total_score: u32,
    xp_earned: u64,
    difficulty: String,
    questions: Vec<ScoredQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_spent: Option<u32>,
    timestamp: String,
}

impl AttemptView {
    fn from_doc(doc: &TestAttemptDoc) -> Self {
        Self {
            id: doc._id.map(|id| id.to_hex()).unwrap_or_default(),
            node_ids: doc.node_ids.iter().map(|id| id.to_hex()).collect(),
            total_score: doc.total_score,
            xp_earned: doc.xp_earned,
            difficulty: doc.difficulty.clone(),
            questions: doc.questions.clone(),
            time_spent: doc.time_spent,
            timestamp: doc.timestamp.try_to_rfc3339_string().unwrap_or_default(),
        }
    }
}

fn parse_node_ids(raw: &[String]) -> Result<Vec<ObjectId>, UltimaError> {
    raw.iter().map(|id| parse_object_id(id)).collect()
}

fn parse_difficulty(raw: &Option<String>) -> Result<Option<DifficultyStage>, UltimaError> {
    match raw {
        None => Ok(None),
        Some(s) => DifficultyStage::parse(s)
            .map(Some)
            .ok_or_else(|| UltimaError::BadRequest(format!("Unknown difficulty '{}'", s))),
    }
}

/// Handle /api/tests/* requests for an authenticated user
pub async fn handle_tests_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: ObjectId,
) -> Response<Full<Bytes>> {
    route(req, state, user_id)
        .await
        .unwrap_or_else(|e| error_response(&e))
}

async fn route(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: ObjectId,
) -> Result<Response<Full<Bytes>>, UltimaError> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    // Hourly limit covers every test route; a rejected request reaches
    // neither the cache nor the model
    state.test_quota.check_and_consume(&user_id.to_hex())?;

    match (method, path.as_str()) {
        (Method::POST, "/api/tests/generate") => {
            let body: GenerateRequest = parse_json_body(req).await?;
            let node_ids = parse_node_ids(&body.node_ids)?;
            let difficulty = parse_difficulty(&body.difficulty)?;

            let test = state
                .tests
                .generate_test(user_id, &node_ids, difficulty)
                .await?;
            Ok(json_response(StatusCode::OK, &test))
        }

        (Method::POST, "/api/tests/submit") => {
            let body: SubmitRequest = parse_json_body(req).await?;
            let node_ids = parse_node_ids(&body.node_ids)?;
            let difficulty = parse_difficulty(&body.difficulty)?;

            let result = state
                .tests
                .submit_test(user_id, &node_ids, &body.answers, difficulty, body.time_spent)
                .await?;
            Ok(json_response(StatusCode::OK, &result))
        }

        (Method::GET, "/api/tests/history") => {
            let params = parse_query_params(&query);
            let (limit, skip) = pagination(&params);

            let attempts = state.tests.history(user_id, None, limit, skip).await?;
            let views: Vec<AttemptView> = attempts.iter().map(AttemptView::from_doc).collect();
            Ok(json_response(StatusCode::OK, &views))
        }

        (Method::GET, p) if p.starts_with("/api/tests/history/") => {
            let node_id = parse_object_id(p.trim_start_matches("/api/tests/history/"))?;
            let params = parse_query_params(&query);
            let (limit, skip) = pagination(&params);

            let attempts = state
                .tests
                .history(user_id, Some(node_id), limit, skip)
                .await?;
            let views: Vec<AttemptView> = attempts.iter().map(AttemptView::from_doc).collect();
            Ok(json_response(StatusCode::OK, &views))
        }

        _ => Err(UltimaError::NotFound(format!("No route for {}", path))),
    }
}
