//! Document schemas for the learning backend

pub mod cached_response;
pub mod container_node;
pub mod learning_node;
pub mod metadata;
pub mod project_review;
pub mod test_attempt;
pub mod user;

pub use cached_response::{CachedResponseDoc, CACHED_RESPONSE_COLLECTION};
pub use container_node::{ContainerNodeDoc, CONTAINER_NODE_COLLECTION};
pub use learning_node::{LearningNodeDoc, LEARNING_NODE_COLLECTION};
pub use metadata::Metadata;
pub use project_review::{
    ProjectReviewDoc, ReviewResult, RubricBreakdown, SubmissionMetadata,
    PROJECT_REVIEW_COLLECTION,
};
pub use test_attempt::{ScoredQuestion, TestAttemptDoc, TEST_ATTEMPT_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};
