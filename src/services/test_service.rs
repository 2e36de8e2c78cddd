//! Test generation and grading
//!
//! Tests are generated by the AI collaborator from the covered nodes'
//! titles and descriptions, cached by fingerprint, and graded
//! locally against the cached answer key.

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::ai::{extract_json, AiBackend, CompletionRequest};
use crate::cache::{test_fingerprint, ResponseCache};
use crate::db::schemas::{LearningNodeDoc, ScoredQuestion, TestAttemptDoc};
use crate::services::stores::{LearningNodeStore, TestAttemptStore};
use crate::progression::test_experience;
use crate::types::UltimaError;

/// Difficulty stages by node level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyStage {
    Basic,
    Application,
    Integration,
    Mastery,
}

impl DifficultyStage {
    /// Stage for a node level
    pub fn from_level(level: u32) -> Self {
        match level {
            0..=10 => DifficultyStage::Basic,
            11..=40 => DifficultyStage::Application,
            41..=70 => DifficultyStage::Integration,
            _ => DifficultyStage::Mastery,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyStage::Basic => "basic",
            DifficultyStage::Application => "application",
            DifficultyStage::Integration => "integration",
            DifficultyStage::Mastery => "mastery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(DifficultyStage::Basic),
            "application" => Some(DifficultyStage::Application),
            "integration" => Some(DifficultyStage::Integration),
            "mastery" => Some(DifficultyStage::Mastery),
            _ => None,
        }
    }

    pub fn question_count(&self) -> usize {
        match self {
            DifficultyStage::Basic => 5,
            DifficultyStage::Application => 7,
            DifficultyStage::Integration => 8,
            DifficultyStage::Mastery => 10,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DifficultyStage::Basic => "Basic recall and fundamental concepts",
            DifficultyStage::Application => "Application of concepts to scenarios",
            DifficultyStage::Integration => "Integration of multiple concepts",
            DifficultyStage::Mastery => "Mastery level with edge cases and complex problems",
        }
    }
}

/// One generated question; `correct_answer` indexes into `options`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[serde(default)]
    pub explanation: String,
}

/// A generated test as returned by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTest {
    pub questions: Vec<TestQuestion>,
}

/// Response to a test generation request
#[derive(Debug, Serialize)]
pub struct GenerateTestResponse {
    pub questions: Vec<TestQuestion>,
    pub difficulty: DifficultyStage,
    pub cached: bool,
}

/// XP awarded to one covered node
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAward {
    pub node_id: String,
    pub xp_earned: u64,
    pub level: u32,
    pub total_xp: u64,
}

/// Response to a graded submission
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestResponse {
    pub attempt_id: String,
    pub score: u32,
    pub correct_count: usize,
    pub total_questions: usize,
    pub questions: Vec<ScoredQuestion>,
    pub xp_earned: u64,
    pub node_breakdown: Vec<NodeAward>,
}

/// Grade a submission against the answer key.
///
/// Each answer scores 100 when it matches `correct_answer` and 0
/// otherwise; the overall score is the rounded percentage of correct
/// answers.
pub fn score_answers(questions: &[TestQuestion], answers: &[usize]) -> (Vec<ScoredQuestion>, u32) {
    let mut correct = 0usize;
    let scored: Vec<ScoredQuestion> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let user_answer = answers.get(i).copied();
            let is_correct = user_answer == Some(q.correct_answer);
            if is_correct {
                correct += 1;
            }

            let answer_text = |idx: usize| {
                q.options
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| idx.to_string())
            };

            ScoredQuestion {
                question: q.question.clone(),
                user_answer: user_answer.map(answer_text).unwrap_or_default(),
                correct_answer: answer_text(q.correct_answer),
                score: if is_correct { 100 } else { 0 },
                explanation: q.explanation.clone(),
            }
        })
        .collect();

    let total = if questions.is_empty() {
        0
    } else {
        ((correct as f64 / questions.len() as f64) * 100.0).round() as u32
    };

    (scored, total)
}

/// Build the generation prompt from the covered nodes
fn build_test_prompt(nodes: &[LearningNodeDoc], difficulty: DifficultyStage) -> String {
    let node_descriptions: Vec<String> = nodes
        .iter()
        .map(|n| format!("- **{}** (Level {}): {}", n.title, n.level, n.description))
        .collect();

    format!(
        "You are an expert educator creating an adaptive test for mastering technical skills.\n\
         \n\
         **Learning Nodes:**\n{}\n\
         \n\
         **Difficulty Level:** {}\n\
         **Description:** {}\n\
         **Question Count:** {}\n\
         \n\
         Generate exactly {} multiple-choice questions that test the above concepts at the {} level.\n\
         \n\
         For each question, include:\n\
         - A clear, focused question\n\
         - 4 multiple-choice options\n\
         - The index of the correct answer (0-3)\n\
         - A brief explanation of why the correct answer is right\n\
         \n\
         Return your response as a valid JSON object with this exact structure:\n\
         {{\n\
           \"questions\": [\n\
             {{\n\
               \"question\": \"Question text here?\",\n\
               \"options\": [\"Option 0\", \"Option 1\", \"Option 2\", \"Option 3\"],\n\
               \"correctAnswer\": 0,\n\
               \"explanation\": \"Why option 0 is correct...\"\n\
             }}\n\
           ]\n\
         }}\n\
         \n\
         Ensure the JSON is valid and properly formatted.",
        node_descriptions.join("\n"),
        difficulty.as_str(),
        difficulty.description(),
        difficulty.question_count(),
        difficulty.question_count(),
        difficulty.as_str(),
    )
}

/// Test generation and grading service
pub struct TestService {
    nodes: Arc<dyn LearningNodeStore>,
    attempts: Arc<dyn TestAttemptStore>,
    cache: ResponseCache,
    ai: Arc<dyn AiBackend>,
    model: String,
    cache_ttl: std::time::Duration,
}

impl TestService {
    pub fn new(
        nodes: Arc<dyn LearningNodeStore>,
        attempts: Arc<dyn TestAttemptStore>,
        cache: ResponseCache,
        ai: Arc<dyn AiBackend>,
        model: String,
        cache_ttl: std::time::Duration,
    ) -> Self {
        Self {
            nodes,
            attempts,
            cache,
            ai,
            model,
            cache_ttl,
        }
    }

    /// Fetch nodes owned by the user; every requested id must resolve
    async fn fetch_owned_nodes(
        &self,
        user_id: ObjectId,
        node_ids: &[ObjectId],
    ) -> Result<Vec<LearningNodeDoc>, UltimaError> {
        if node_ids.is_empty() {
            return Err(UltimaError::BadRequest(
                "At least one learning node is required".into(),
            ));
        }

        let nodes = self.nodes.find_owned_many(user_id, node_ids).await?;

        if nodes.len() != node_ids.len() {
            return Err(UltimaError::NotFound(
                "One or more learning nodes not found".into(),
            ));
        }

        Ok(nodes)
    }

    /// Generate (or fetch from cache) a test covering the given nodes
    pub async fn generate_test(
        &self,
        user_id: ObjectId,
        node_ids: &[ObjectId],
        difficulty: Option<DifficultyStage>,
    ) -> Result<GenerateTestResponse, UltimaError> {
        let nodes = self.fetch_owned_nodes(user_id, node_ids).await?;

        // Default difficulty follows the first node's level
        let difficulty = difficulty.unwrap_or_else(|| DifficultyStage::from_level(nodes[0].level));

        let id_strings: Vec<String> = node_ids.iter().map(|id| id.to_hex()).collect();
        let hash = test_fingerprint(&id_strings, difficulty.as_str());

        let ai = self.ai.clone();
        let model = self.model.clone();
        let prompt = build_test_prompt(&nodes, difficulty);

        let (payload, cached) = self
            .cache
            .get_or_compute("test", &hash, self.cache_ttl, || async move {
                let request = CompletionRequest::new(model, prompt)
                    .with_temperature(0.7)
                    .with_max_tokens(2000);
                let text = ai.complete(request).await?;

                // A test that cannot be parsed is an upstream failure;
                // fabricated questions are never cached
                let test: GeneratedTest = extract_json(&text)?;
                if test.questions.is_empty() {
                    return Err(UltimaError::Upstream(
                        "AI returned a test with no questions".into(),
                    ));
                }

                bson::to_bson(&test)
                    .map_err(|e| UltimaError::Internal(format!("Failed to encode test: {}", e)))
            })
            .await?;

        let test: GeneratedTest = bson::from_bson(payload)
            .map_err(|e| UltimaError::Internal(format!("Failed to decode cached test: {}", e)))?;

        info!(
            nodes = node_ids.len(),
            difficulty = difficulty.as_str(),
            cached,
            "test generated"
        );

        Ok(GenerateTestResponse {
            questions: test.questions,
            difficulty,
            cached,
        })
    }

    /// Grade a submission, award XP and record the attempt
    pub async fn submit_test(
        &self,
        user_id: ObjectId,
        node_ids: &[ObjectId],
        answers: &[usize],
        difficulty: Option<DifficultyStage>,
        time_spent: Option<u32>,
    ) -> Result<SubmitTestResponse, UltimaError> {
        if answers.is_empty() {
            return Err(UltimaError::BadRequest("No answers submitted".into()));
        }

        let nodes = self.fetch_owned_nodes(user_id, node_ids).await?;

        // Fetch the answer key; regenerates on cache expiry
        let test = self.generate_test(user_id, node_ids, difficulty).await?;

        if answers.len() != test.questions.len() {
            return Err(UltimaError::BadRequest(format!(
                "Expected {} answers, got {}",
                test.questions.len(),
                answers.len()
            )));
        }

        let (scored, total_score) = score_answers(&test.questions, answers);
        let correct_count = scored.iter().filter(|q| q.score == 100).count();

        // Award XP per node at that node's own level
        let mut xp_earned = 0u64;
        let mut node_breakdown = Vec::with_capacity(nodes.len());
        for mut node in nodes {
            let node_id = node
                ._id
                .ok_or_else(|| UltimaError::Internal("Node without id".into()))?;
            let xp = test_experience(total_score, node.level);

            let mut progress = node.progress();
            progress.add_experience(xp);
            node.apply_progress(progress);

            node_breakdown.push(NodeAward {
                node_id: node_id.to_hex(),
                xp_earned: xp,
                level: node.level,
                total_xp: node.total_xp,
            });

            // Keep going if one node fails to persist; the attempt record
            // still reflects the full award
            if let Err(e) = self.nodes.persist(node_id, node).await {
                error!(node = %node_id, error = %e, "failed to persist XP award");
            }
            xp_earned += xp;
        }

        let attempt = TestAttemptDoc {
            _id: None,
            metadata: Default::default(),
            user_id,
            node_ids: node_ids.to_vec(),
            questions: scored.clone(),
            total_score,
            xp_earned,
            difficulty: test.difficulty.as_str().to_string(),
            time_spent,
            timestamp: DateTime::now(),
        };
        let attempt_id = self.attempts.record(attempt).await?;

        info!(
            user = %user_id,
            score = total_score,
            xp = xp_earned,
            "test submission graded"
        );

        Ok(SubmitTestResponse {
            attempt_id: attempt_id.to_hex(),
            score: total_score,
            correct_count,
            total_questions: test.questions.len(),
            questions: scored,
            xp_earned,
            node_breakdown,
        })
    }

    /// Attempt history, newest first
    pub async fn history(
        &self,
        user_id: ObjectId,
        node_id: Option<ObjectId>,
        limit: i64,
        skip: u64,
    ) -> Result<Vec<TestAttemptDoc>, UltimaError> {
        self.attempts.list(user_id, node_id, limit, skip).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str, correct: usize) -> TestQuestion {
        TestQuestion {
            question: text.into(),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answer: correct,
            explanation: "because".into(),
        }
    }

    #[test]
    fn test_difficulty_stages() {
        assert_eq!(DifficultyStage::from_level(1), DifficultyStage::Basic);
        assert_eq!(DifficultyStage::from_level(10), DifficultyStage::Basic);
        assert_eq!(DifficultyStage::from_level(11), DifficultyStage::Application);
        assert_eq!(DifficultyStage::from_level(40), DifficultyStage::Application);
        assert_eq!(DifficultyStage::from_level(41), DifficultyStage::Integration);
        assert_eq!(DifficultyStage::from_level(70), DifficultyStage::Integration);
        assert_eq!(DifficultyStage::from_level(71), DifficultyStage::Mastery);
        assert_eq!(DifficultyStage::from_level(100), DifficultyStage::Mastery);
    }

    #[test]
    fn test_question_counts() {
        assert_eq!(DifficultyStage::Basic.question_count(), 5);
        assert_eq!(DifficultyStage::Application.question_count(), 7);
        assert_eq!(DifficultyStage::Integration.question_count(), 8);
        assert_eq!(DifficultyStage::Mastery.question_count(), 10);
    }

    #[test]
    fn test_difficulty_roundtrip() {
        for stage in [
            DifficultyStage::Basic,
            DifficultyStage::Application,
            DifficultyStage::Integration,
            DifficultyStage::Mastery,
        ] {
            assert_eq!(DifficultyStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(DifficultyStage::parse("expert"), None);
    }

    #[test]
    fn test_scoring_all_correct() {
        let questions = vec![question("q1", 0), question("q2", 2)];
        let (scored, total) = score_answers(&questions, &[0, 2]);

        assert_eq!(total, 100);
        assert!(scored.iter().all(|q| q.score == 100));
        assert_eq!(scored[1].user_answer, "C");
        assert_eq!(scored[1].correct_answer, "C");
    }

    #[test]
    fn test_scoring_partial() {
        // 2 of 3 correct rounds to 67
        let questions = vec![question("q1", 0), question("q2", 1), question("q3", 3)];
        let (scored, total) = score_answers(&questions, &[0, 1, 0]);

        assert_eq!(total, 67);
        assert_eq!(scored[2].score, 0);
        assert_eq!(scored[2].user_answer, "A");
        assert_eq!(scored[2].correct_answer, "D");
    }

    #[test]
    fn test_scoring_all_wrong() {
        let questions = vec![question("q1", 0), question("q2", 1)];
        let (_, total) = score_answers(&questions, &[3, 3]);
        assert_eq!(total, 0);
    }

    #[test]
    fn test_prompt_mentions_nodes_and_difficulty() {
        let node = LearningNodeDoc::new(
            "Rust lifetimes".into(),
            "Borrow checker fundamentals".into(),
            None,
            ObjectId::new(),
        );
        let prompt = build_test_prompt(&[node], DifficultyStage::Application);

        assert!(prompt.contains("Rust lifetimes"));
        assert!(prompt.contains("Borrow checker fundamentals"));
        assert!(prompt.contains("application"));
        assert!(prompt.contains("exactly 7"));
        assert!(prompt.contains("correctAnswer"));
    }

    #[test]
    fn test_generated_test_parses_model_shape() {
        let text = r#"Here you go:
{"questions": [{"question": "What is ownership?", "options": ["a", "b", "c", "d"], "correctAnswer": 1, "explanation": "moves"}]}"#;
        let test: GeneratedTest = extract_json(text).unwrap();
        assert_eq!(test.questions.len(), 1);
        assert_eq!(test.questions[0].correct_answer, 1);
    }

    mod service {
        use super::*;
        use crate::ai::traits::testing::ScriptedBackend;
        use crate::cache::{MemoryResponseStore, ResponseCache};
        use crate::progression::Progress;
        use crate::services::stores::testing::{MemoryAttemptStore, MemoryNodeStore};
        use std::time::Duration;

        fn service(
            ai: Arc<ScriptedBackend>,
        ) -> (TestService, Arc<MemoryNodeStore>, Arc<MemoryAttemptStore>) {
            let nodes = Arc::new(MemoryNodeStore::new());
            let attempts = Arc::new(MemoryAttemptStore::new());
            let cache = ResponseCache::new(Arc::new(MemoryResponseStore::new()));
            let svc = TestService::new(
                nodes.clone(),
                attempts.clone(),
                cache,
                ai,
                "gpt-4o-mini".into(),
                Duration::from_secs(600),
            );
            (svc, nodes, attempts)
        }

        fn seeded_node(nodes: &MemoryNodeStore, user: ObjectId, total_xp: u64) -> ObjectId {
            let mut node = LearningNodeDoc::new(
                "Rust traits".into(),
                "Dispatch and object safety".into(),
                None,
                user,
            );
            node.apply_progress(Progress::from_total_xp(total_xp));
            nodes.insert(node)
        }

        const TWO_QUESTIONS: &str = r#"{"questions": [
            {"question": "q1", "options": ["a", "b", "c", "d"], "correctAnswer": 0, "explanation": "x"},
            {"question": "q2", "options": ["a", "b", "c", "d"], "correctAnswer": 1, "explanation": "y"}
        ]}"#;

        #[tokio::test]
        async fn test_submit_awards_xp_and_records_attempt() {
            let ai = Arc::new(ScriptedBackend::replying(TWO_QUESTIONS));
            let (svc, nodes, attempts) = service(ai.clone());
            let user = ObjectId::new();
            let node_id = seeded_node(&nodes, user, 500);

            let resp = svc
                .submit_test(user, &[node_id], &[0, 1], Some(DifficultyStage::Basic), None)
                .await
                .unwrap();

            assert_eq!(resp.score, 100);
            assert!(resp.xp_earned > 0);
            assert_eq!(ai.calls(), 1);
            assert_eq!(nodes.total_xp(node_id), 500 + resp.xp_earned);
            assert_eq!(attempts.len(), 1);
        }

        #[tokio::test]
        async fn test_upstream_failure_leaves_xp_and_history_untouched() {
            let ai = Arc::new(ScriptedBackend::failing("model offline"));
            let (svc, nodes, attempts) = service(ai.clone());
            let user = ObjectId::new();
            let node_id = seeded_node(&nodes, user, 500);

            let result = svc
                .submit_test(user, &[node_id], &[0, 1], Some(DifficultyStage::Basic), None)
                .await;

            assert!(matches!(result, Err(UltimaError::Upstream(_))));
            assert_eq!(ai.calls(), 1);
            assert_eq!(nodes.total_xp(node_id), 500);
            assert!(attempts.is_empty());
        }

        #[tokio::test]
        async fn test_foreign_node_is_rejected_before_any_ai_call() {
            let ai = Arc::new(ScriptedBackend::replying(TWO_QUESTIONS));
            let (svc, nodes, _attempts) = service(ai.clone());
            let owner = ObjectId::new();
            let node_id = seeded_node(&nodes, owner, 0);

            let result = svc
                .generate_test(ObjectId::new(), &[node_id], Some(DifficultyStage::Basic))
                .await;

            assert!(matches!(result, Err(UltimaError::NotFound(_))));
            assert_eq!(ai.calls(), 0);
        }
    }
}
