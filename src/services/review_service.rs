//! Project review orchestration
//!
//! A submission flows through validation, the daily quota, the response
//! cache and the AI reviewer, then awards XP and records an immutable
//! review. Upstream failure before the award leaves the node and the
//! audit trail untouched.

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::ai::{extract_json_or, AiBackend, CompletionRequest, Extracted};
use crate::cache::{review_fingerprint, ResponseCache};
use crate::db::schemas::{
    LearningNodeDoc, ProjectReviewDoc, ReviewResult, RubricBreakdown, SubmissionMetadata,
};
use crate::progression::review_experience;
use crate::services::quota::RateLimiter;
use crate::services::stores::{LearningNodeStore, ProjectReviewStore};
use crate::types::UltimaError;

/// Accepted submission types
pub const SUBMISSION_TYPES: [&str; 4] = ["code", "editor", "github", "upload"];

/// Reviewer settings derived from the node's level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewSettings {
    /// Raw model scores are divided by this before clamping
    pub strictness: f64,
    /// Score a submission at this level should typically reach
    pub expected_score: u32,
    /// Whether to run the stronger model
    pub escalate_model: bool,
}

impl ReviewSettings {
    pub fn for_level(level: u32) -> Self {
        let (strictness, expected_score) = match level {
            0..=20 => (1.0, 60),
            21..=50 => (1.2, 70),
            51..=80 => (1.4, 80),
            _ => (1.6, 85),
        };
        Self {
            strictness,
            expected_score,
            escalate_model: level >= 60,
        }
    }

    /// Apply strictness to a raw score, clamped to [0, 100]
    pub fn adjust_score(&self, raw: u32) -> u32 {
        ((raw as f64 / self.strictness).floor() as u32).min(100)
    }
}

/// Review payload as returned by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReview {
    pub score: u32,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub mastery_achieved: bool,
    #[serde(default)]
    pub rubric_breakdown: RawRubric,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRubric {
    #[serde(default)]
    pub correctness: u32,
    #[serde(default)]
    pub architecture: u32,
    #[serde(default)]
    pub readability: u32,
    #[serde(default)]
    pub edge_cases: u32,
    #[serde(default)]
    pub best_practices: u32,
}

/// Neutral review substituted when the model's output cannot be parsed
fn fallback_review() -> RawReview {
    RawReview {
        score: 75,
        strengths: vec!["Submission received and processed".into()],
        weaknesses: vec!["Automated review could not be fully parsed".into()],
        suggestions: vec![],
        mastery_achieved: false,
        rubric_breakdown: RawRubric {
            correctness: 75,
            ..Default::default()
        },
    }
}

/// Incoming submission
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSubmission {
    pub node_id: String,
    pub submission_type: String,
    pub submission_content: String,
    #[serde(default)]
    pub submission_metadata: SubmissionMetadata,
}

/// Response to a reviewed submission
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitProjectResponse {
    pub review_id: String,
    pub review: ReviewResult,
    pub xp_earned: u64,
    pub cached: bool,
    pub quota_remaining: u32,
}

/// Build the rubric-aware review prompt
fn build_review_prompt(
    node: &LearningNodeDoc,
    settings: &ReviewSettings,
    content: &str,
) -> String {
    let rubric_text = node
        .review_rubric
        .as_ref()
        .map(|rubric| format!("\nEvaluation Rubric:\n{}\n", rubric))
        .unwrap_or_default();

    format!(
        "You are an expert code reviewer evaluating a submission for a learning platform.\n\
         \n\
         **Skill:** {}\n\
         **Submission Level:** {} (out of 100)\n\
         **Strictness Factor:** {}x\n\
         {}\n\
         **Code Submission:**\n\
         ```\n{}\n```\n\
         \n\
         Review this submission thoroughly and provide:\n\
         1. Overall score (0-100) - Be strict: level {} should typically score around {}\n\
         2. Key strengths (2-4 items)\n\
         3. Key weaknesses if any (2-4 items)\n\
         4. Specific suggestions for improvement\n\
         5. Whether mastery was achieved (true/false)\n\
         6. Rubric breakdown scores (0-100 for each dimension): correctness,\n\
            architecture, readability, edge cases, best practices\n\
         \n\
         Return your response as valid JSON in this exact format:\n\
         {{\n\
           \"score\": 85,\n\
           \"strengths\": [\"...\"],\n\
           \"weaknesses\": [\"...\"],\n\
           \"suggestions\": [\"...\"],\n\
           \"masteryAchieved\": true,\n\
           \"rubricBreakdown\": {{\n\
             \"correctness\": 90,\n\
             \"architecture\": 80,\n\
             \"readability\": 90,\n\
             \"edgeCases\": 80,\n\
             \"bestPractices\": 90\n\
           }}\n\
         }}\n\
         \n\
         Be critical and fair. The score must reflect the level of work expected at level {}.",
        node.title,
        node.level,
        settings.strictness,
        rubric_text,
        content,
        node.level,
        settings.expected_score,
        node.level,
    )
}

/// Project review service
pub struct ReviewService {
    nodes: Arc<dyn LearningNodeStore>,
    reviews: Arc<dyn ProjectReviewStore>,
    cache: ResponseCache,
    ai: Arc<dyn AiBackend>,
    quota: Arc<RateLimiter>,
    model: String,
    model_strong: String,
    cache_ttl: std::time::Duration,
}

impl ReviewService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nodes: Arc<dyn LearningNodeStore>,
        reviews: Arc<dyn ProjectReviewStore>,
        cache: ResponseCache,
        ai: Arc<dyn AiBackend>,
        quota: Arc<RateLimiter>,
        model: String,
        model_strong: String,
        cache_ttl: std::time::Duration,
    ) -> Self {
        Self {
            nodes,
            reviews,
            cache,
            ai,
            quota,
            model,
            model_strong,
            cache_ttl,
        }
    }

    /// Run a submission through the full review pipeline
    pub async fn submit_project(
        &self,
        user_id: ObjectId,
        submission: ProjectSubmission,
    ) -> Result<SubmitProjectResponse, UltimaError> {
        // Validation first: a rejected submission consumes no quota
        if !SUBMISSION_TYPES.contains(&submission.submission_type.as_str()) {
            return Err(UltimaError::BadRequest(format!(
                "Invalid submission type '{}'",
                submission.submission_type
            )));
        }
        if submission.submission_content.trim().is_empty() {
            return Err(UltimaError::BadRequest(
                "Submission content is required".into(),
            ));
        }
        let node_id = ObjectId::parse_str(&submission.node_id)
            .map_err(|_| UltimaError::BadRequest("Invalid node id".into()))?;

        // Quota before any cache or AI work
        let quota_status = self.quota.check_and_consume(&user_id.to_hex())?;

        let node = self
            .nodes
            .find_owned(user_id, node_id)
            .await?
            .ok_or_else(|| UltimaError::NotFound("Learning node not found".into()))?;

        let settings = ReviewSettings::for_level(node.level);
        let hash = review_fingerprint(
            &submission.node_id,
            &submission.submission_content,
            &submission.submission_type,
        );

        // Cache hit serves the stored review; a parse fallback is served
        // but never cached, so the next identical submission retries
        let (raw, cached, fallback) = match self.cache.find("review", &hash).await? {
            Some(payload) => {
                let raw: RawReview = bson::from_bson(payload).map_err(|e| {
                    UltimaError::Internal(format!("Failed to decode cached review: {}", e))
                })?;
                (raw, true, false)
            }
            None => {
                let model = if settings.escalate_model {
                    &self.model_strong
                } else {
                    &self.model
                };
                let prompt = build_review_prompt(&node, &settings, &submission.submission_content);
                let request = CompletionRequest::new(model.clone(), prompt)
                    .with_temperature(0.5)
                    .with_max_tokens(1500);

                let text = self.ai.complete(request).await?;

                match extract_json_or(&text, fallback_review()) {
                    Extracted::Parsed(raw) => {
                        let payload = bson::to_bson(&raw).map_err(|e| {
                            UltimaError::Internal(format!("Failed to encode review: {}", e))
                        })?;
                        if let Err(e) = self.cache.put("review", &hash, payload, self.cache_ttl).await
                        {
                            warn!(hash = %hash, error = %e, "failed to cache review");
                        }
                        (raw, false, false)
                    }
                    Extracted::Fallback(raw) => {
                        warn!(hash = %hash, "review output unparseable, using fallback");
                        (raw, false, true)
                    }
                }
            }
        };

        let score = settings.adjust_score(raw.score);
        let mastery_achieved = score >= settings.expected_score;
        let xp = review_experience(score, node.level);

        let review_result = ReviewResult {
            score,
            strengths: raw.strengths,
            weaknesses: raw.weaknesses,
            suggestions: raw.suggestions,
            mastery_achieved,
            rubric_breakdown: RubricBreakdown {
                correctness: raw.rubric_breakdown.correctness,
                architecture: raw.rubric_breakdown.architecture,
                readability: raw.rubric_breakdown.readability,
                edge_cases: raw.rubric_breakdown.edge_cases,
                best_practices: raw.rubric_breakdown.best_practices,
            },
            fallback,
        };

        // Award XP, then record the review
        let mut updated = node.clone();
        let mut progress = updated.progress();
        progress.add_experience(xp);
        updated.apply_progress(progress);
        self.nodes.persist(node_id, updated).await?;

        let review = ProjectReviewDoc {
            _id: None,
            metadata: Default::default(),
            user_id,
            node_id,
            submission_type: submission.submission_type,
            submission_content: submission.submission_content,
            submission_metadata: submission.submission_metadata,
            rubric_used: node.review_rubric.clone(),
            review_result: review_result.clone(),
            xp_earned: xp,
            timestamp: DateTime::now(),
        };
        let review_id = self.reviews.record(review).await?;

        info!(
            user = %user_id,
            node = %node_id,
            score,
            xp,
            cached,
            fallback,
            "project review completed"
        );

        Ok(SubmitProjectResponse {
            review_id: review_id.to_hex(),
            review: review_result,
            xp_earned: xp,
            cached,
            quota_remaining: quota_status.remaining(),
        })
    }

    /// Reviews for one node, newest first
    pub async fn reviews_for_node(
        &self,
        user_id: ObjectId,
        node_id: ObjectId,
    ) -> Result<Vec<ProjectReviewDoc>, UltimaError> {
        self.reviews.for_node(user_id, node_id).await
    }

    /// One review by id, scoped to the requesting user
    pub async fn review_by_id(
        &self,
        user_id: ObjectId,
        review_id: ObjectId,
    ) -> Result<ProjectReviewDoc, UltimaError> {
        self.reviews
            .by_id(user_id, review_id)
            .await?
            .ok_or_else(|| UltimaError::NotFound("Review not found".into()))
    }

    /// Full review history, newest first
    pub async fn history(
        &self,
        user_id: ObjectId,
        limit: i64,
        skip: u64,
    ) -> Result<Vec<ProjectReviewDoc>, UltimaError> {
        self.reviews.list(user_id, limit, skip).await
    }

    /// Delete one of the user's own reviews
    pub async fn delete_review(
        &self,
        user_id: ObjectId,
        review_id: ObjectId,
    ) -> Result<(), UltimaError> {
        let deleted = self.reviews.delete(user_id, review_id).await?;
        if deleted == 0 {
            return Err(UltimaError::NotFound("Review not found".into()));
        }
        Ok(())
    }
}
