//! Project submission and review routes
//!
//! - POST   /api/projects/submit              - Submit a project for AI review
//! - GET    /api/projects/reviews/{node_id}   - Reviews for one node
//! - GET    /api/projects/review/{review_id}  - One review
//! - GET    /api/projects/history             - Full review history
//! - DELETE /api/projects/review/{review_id}  - Delete own review record

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::db::schemas::{ProjectReviewDoc, ReviewResult, SubmissionMetadata};
use crate::routes::helpers::{
    error_response, json_response, pagination, parse_json_body, parse_object_id,
    parse_query_params,
};
use crate::server::AppState;
use crate::services::ProjectSubmission;
use crate::types::UltimaError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewView {
    id: String,
    node_id: String,
    submission_type: String,
    submission_metadata: SubmissionMetadata,
    review: ReviewResult,
    xp_earned: u64,
    timestamp: String,
}

impl ReviewView {
    fn from_doc(doc: &ProjectReviewDoc) -> Self {
        Self {
            id: doc._id.map(|id| id.to_hex()).unwrap_or_default(),
            node_id: doc.node_id.to_hex(),
            submission_type: doc.submission_type.clone(),
            submission_metadata: doc.submission_metadata.clone(),
            review: doc.review_result.clone(),
            xp_earned: doc.xp_earned,
            timestamp: doc.timestamp.try_to_rfc3339_string().unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct DeletedResponse {
    deleted: bool,
}

/// Handle /api/projects/* requests for an authenticated user
pub async fn handle_projects_request(
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

    match (method, path.as_str()) {
        (Method::POST, "/api/projects/submit") => {
            let submission: ProjectSubmission = parse_json_body(req).await?;
            let result = state.reviews.submit_project(user_id, submission).await?;
            Ok(json_response(StatusCode::OK, &result))
        }

        (Method::GET, p) if p.starts_with("/api/projects/reviews/") => {
            let node_id = parse_object_id(p.trim_start_matches("/api/projects/reviews/"))?;
            let reviews = state.reviews.reviews_for_node(user_id, node_id).await?;
            let views: Vec<ReviewView> = reviews.iter().map(ReviewView::from_doc).collect();
            Ok(json_response(StatusCode::OK, &views))
        }

        (Method::GET, p) if p.starts_with("/api/projects/review/") => {
            let review_id = parse_object_id(p.trim_start_matches("/api/projects/review/"))?;
            let review = state.reviews.review_by_id(user_id, review_id).await?;
            Ok(json_response(StatusCode::OK, &ReviewView::from_doc(&review)))
        }

        (Method::DELETE, p) if p.starts_with("/api/projects/review/") => {
            let review_id = parse_object_id(p.trim_start_matches("/api/projects/review/"))?;
            state.reviews.delete_review(user_id, review_id).await?;
            Ok(json_response(StatusCode::OK, &DeletedResponse { deleted: true }))
        }

        (Method::GET, "/api/projects/history") => {
            let params = parse_query_params(&query);
            let (limit, skip) = pagination(&params);

            let reviews = state.reviews.history(user_id, limit, skip).await?;
            let views: Vec<ReviewView> = reviews.iter().map(ReviewView::from_doc).collect();
            Ok(json_response(StatusCode::OK, &views))
        }

        _ => Err(UltimaError::NotFound(format!("No route for {}", path))),
    }
}
