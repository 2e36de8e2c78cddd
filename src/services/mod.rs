//! Evaluation orchestration
//!
//! The services tie the progression calculator, the response cache and
//! the AI collaborator together: quota and validation first, cache and
//! model in the middle, XP award and audit record last.

pub mod quota;
pub mod review_service;
pub mod stores;
pub mod test_service;

pub use quota::{QuotaStatus, RateLimiter};
pub use stores::{
    LearningNodeStore, MongoAttemptStore, MongoNodeStore, MongoReviewStore, ProjectReviewStore,
    TestAttemptStore,
};
pub use review_service::{
    ProjectSubmission, RawReview, ReviewService, ReviewSettings, SubmitProjectResponse,
    SUBMISSION_TYPES,
};
pub use test_service::{
    score_answers, DifficultyStage, GeneratedTest, GenerateTestResponse, NodeAward,
    SubmitTestResponse, TestQuestion, TestService,
};
