//! Conversational workflow engine.
//!
//! Each turn walks a small state machine:
//!
//! ```text
//! ValidateInput ──invalid──► End (fixed rejection)
//!       │valid
//!       ▼
//! QueryGraph ──known──► End (answer)
//!       │don't know
//!       ▼
//! FitGraph (acquire coverage, best-effort)
//!       ▼
//! QueryGraphRetry ──► End (answer, known or not)
//! ```
//!
//! At most one re-ingestion attempt per turn: a retry that still comes
//! back "don't know" is terminal. Whether an answer means "don't know" is
//! decided by a semantic classifier over the answer text, not by whether
//! the query returned rows.
//!
//! Sessions are keyed by a caller-supplied id; turns within one session
//! serialize on the session's transcript lock.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use schemars::JsonSchema;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domains::chat::audit::AuditRecord;
use crate::domains::ingest::{self, EnrichmentConfig};
use crate::kernel::{extract, ServerDeps};

/// Session used when the caller does not supply one.
pub const DEFAULT_SESSION: &str = "default";

pub const REJECTION_ANSWER: &str = "I can only help with questions about food and restaurants.";
pub const ERROR_ANSWER: &str = "❌ ERROR";

const VALIDITY_INSTRUCTIONS: &str = "Decide whether the user's message is a question about \
    food, dining, or restaurants.";

const CYPHER_INSTRUCTIONS: &str = "You translate questions about restaurants into Cypher read \
    queries. Given the graph schema and a question, return one Cypher statement and nothing else.";

const ANSWER_INSTRUCTIONS: &str = "Answer the user's question using only the provided graph \
    context. If the context does not contain the answer, say that you don't know.";

const DONT_KNOW_INSTRUCTIONS: &str = "Decide whether the assistant's answer amounts to \
    'I don't know'. An answer that does not actually address the question counts as not knowing.";

const CITY_INSTRUCTIONS: &str = "Extract the city or place the user is asking about. \
    Return an empty string if no place is mentioned.";

#[derive(Debug, Deserialize, JsonSchema)]
struct ValidityVerdict {
    valid: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DontKnowVerdict {
    dont_know: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PlaceExtraction {
    city: String,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is outside the food and restaurant domain")]
    ValidationRejected,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    /// Machine-readable code surfaced alongside the user-visible answer.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::ValidationRejected => "validation_rejected",
            ChatError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Validation {
    Unchecked,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    ValidateInput,
    QueryGraph,
    FitGraph,
    QueryGraphRetry,
    End,
}

/// Per-turn workflow state.
struct TurnState {
    validation: Validation,
    routing: Step,
    answer: Option<String>,
}

impl TurnState {
    fn new() -> Self {
        Self {
            validation: Validation::Unchecked,
            routing: Step::ValidateInput,
            answer: None,
        }
    }
}

/// The outcome handed back to the HTTP surface. Always an answer string;
/// `code` is set for rejected or errored turns.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub answer: String,
    pub code: Option<&'static str>,
}

struct GraphAnswer {
    answer: String,
    contexts: Vec<String>,
    dont_know: bool,
}

type Transcript = Arc<Mutex<Vec<Message>>>;

pub struct WorkflowEngine {
    deps: ServerDeps,
    enrichment: EnrichmentConfig,
    sessions: Mutex<HashMap<String, Transcript>>,
}

impl WorkflowEngine {
    pub fn new(deps: ServerDeps, enrichment: EnrichmentConfig) -> Self {
        Self {
            deps,
            enrichment,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Run one conversational turn. Never fails outward: any internal
    /// error becomes the fixed error answer with a machine-readable code.
    pub async fn handle_turn(&self, session_id: &str, message: &str) -> TurnResult {
        let session = self.session(session_id).await;
        // Holding the transcript lock serializes turns within a session.
        let mut transcript = session.lock().await;

        transcript.push(Message {
            role: Role::User,
            content: message.to_string(),
        });

        let result = match self.drive(message).await {
            Ok(answer) => TurnResult { answer, code: None },
            Err(e) => {
                let answer = match &e {
                    ChatError::ValidationRejected => {
                        info!(session = %session_id, "Message rejected as off-topic");
                        REJECTION_ANSWER
                    }
                    ChatError::Internal(cause) => {
                        error!(session = %session_id, error = %cause, "Turn failed");
                        ERROR_ANSWER
                    }
                };
                TurnResult {
                    answer: answer.to_string(),
                    code: Some(e.code()),
                }
            }
        };

        transcript.push(Message {
            role: Role::Assistant,
            content: result.answer.clone(),
        });

        result
    }

    /// Transcript snapshot for a session (empty if the session is new).
    pub async fn transcript(&self, session_id: &str) -> Vec<Message> {
        let session = self.session(session_id).await;
        let transcript = session.lock().await;
        transcript.clone()
    }

    async fn session(&self, session_id: &str) -> Transcript {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    async fn drive(&self, message: &str) -> Result<String, ChatError> {
        let mut state = TurnState::new();
        let mut last_query: Option<GraphAnswer> = None;

        while state.routing != Step::End {
            match state.routing {
                Step::ValidateInput => {
                    let verdict: ValidityVerdict =
                        extract(self.deps.ai.as_ref(), VALIDITY_INSTRUCTIONS, message).await?;

                    if verdict.valid {
                        state.validation = Validation::Valid;
                        state.routing = Step::QueryGraph;
                    } else {
                        state.validation = Validation::Invalid;
                        return Err(ChatError::ValidationRejected);
                    }
                }
                Step::QueryGraph | Step::QueryGraphRetry => {
                    let query = self.query_graph(message).await?;
                    state.answer = Some(query.answer.clone());

                    state.routing = if state.routing == Step::QueryGraph && query.dont_know {
                        Step::FitGraph
                    } else {
                        // A retry is terminal whether or not the graph
                        // still doesn't know.
                        Step::End
                    };
                    last_query = Some(query);
                }
                Step::FitGraph => {
                    self.fit_graph(message).await;
                    state.routing = Step::QueryGraphRetry;
                }
                Step::End => {}
            }
        }

        tracing::debug!(validation = ?state.validation, "Turn state machine finished");

        let answer = state
            .answer
            .ok_or_else(|| anyhow!("workflow ended without an answer"))?;

        if let Some(query) = last_query {
            let record = AuditRecord {
                question: message.to_string(),
                contexts: query.contexts,
                answer: answer.clone(),
            };
            if let Err(e) = self.deps.audit.record(&record).await {
                // The trail is observability, not control flow.
                warn!(error = %e, "Failed to write audit record");
            }
        }

        Ok(answer)
    }

    /// Text-to-query chain: live schema -> Cypher -> rows -> phrased
    /// answer -> don't-know classification.
    async fn query_graph(&self, question: &str) -> Result<GraphAnswer, ChatError> {
        let schema = self.deps.graph.refresh_schema().await?;

        let cypher = self
            .deps
            .ai
            .complete(
                CYPHER_INSTRUCTIONS,
                &format!("Graph schema:\n{}\n\nQuestion: {}", schema, question),
            )
            .await?;

        let rows = self.deps.graph.run_query(cypher.trim()).await?;
        let contexts: Vec<String> = rows.iter().map(|row| row.to_string()).collect();

        let answer = self
            .deps
            .ai
            .complete(
                ANSWER_INSTRUCTIONS,
                &format!(
                    "Graph context:\n{}\n\nQuestion: {}",
                    contexts.join("\n"),
                    question
                ),
            )
            .await?;

        let verdict: DontKnowVerdict = extract(
            self.deps.ai.as_ref(),
            DONT_KNOW_INSTRUCTIONS,
            &format!("Question: {}\nAnswer: {}", question, answer),
        )
        .await?;

        Ok(GraphAnswer {
            answer,
            contexts,
            dont_know: verdict.dont_know,
        })
    }

    /// Best-effort coverage acquisition. Nothing here is fatal - the
    /// workflow re-queries regardless, and that retry may legitimately
    /// still not know.
    async fn fit_graph(&self, message: &str) {
        let place =
            match extract::<PlaceExtraction>(self.deps.ai.as_ref(), CITY_INSTRUCTIONS, message)
                .await
            {
                Ok(extraction) if !extraction.city.trim().is_empty() => extraction.city,
                Ok(_) => {
                    warn!("No place found in message, skipping acquisition");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Place extraction failed, skipping acquisition");
                    return;
                }
            };

        match ingest::acquire(&self.deps, &self.enrichment, &place).await {
            Ok(report) => {
                info!(place = %place, ingested = report.ingested, "Acquisition finished");
            }
            Err(e) => {
                warn!(place = %place, error = %e, "Acquisition failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nominatim_client::{MockPlaceDirectory, NormalizedPlace};
    use tempfile::TempDir;

    use crate::domains::chat::audit::AuditTrail;
    use crate::graph::{GraphStore, MemoryGraphStore, RestaurantRow};
    use crate::kernel::test_dependencies::{MockCompletion, MockFetcher, MockSearch};

    struct Fixture {
        engine: WorkflowEngine,
        graph: Arc<MemoryGraphStore>,
        ai: Arc<MockCompletion>,
        directory: Arc<MockPlaceDirectory>,
        audit_dir: TempDir,
    }

    fn fixture(ai: MockCompletion, directory: MockPlaceDirectory) -> Fixture {
        let graph = Arc::new(MemoryGraphStore::new());
        let ai = Arc::new(ai);
        let directory = Arc::new(directory);
        let audit_dir = TempDir::new().unwrap();

        let deps = ServerDeps::new(
            graph.clone(),
            ai.clone(),
            Arc::new(MockSearch::new()),
            Arc::new(MockFetcher::new()),
            directory.clone(),
            Arc::new(AuditTrail::new(audit_dir.path())),
        );

        Fixture {
            engine: WorkflowEngine::new(deps, EnrichmentConfig::default()),
            graph,
            ai,
            directory,
            audit_dir,
        }
    }

    fn audit_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_graph() {
        let ai = MockCompletion::new().with_response("food, dining", r#"{"valid": false}"#);
        let fx = fixture(ai, MockPlaceDirectory::new());

        let result = fx.engine.handle_turn(DEFAULT_SESSION, "How do I file taxes?").await;

        assert_eq!(result.answer, REJECTION_ANSWER);
        assert_eq!(result.code, Some("validation_rejected"));
        assert!(!fx.ai.was_asked("Cypher"));
        assert!(fx.directory.calls().is_empty());
        assert_eq!(audit_count(&fx.audit_dir), 0);
    }

    #[tokio::test]
    async fn known_answer_skips_acquisition() {
        let ai = MockCompletion::new()
            .with_response("food, dining", r#"{"valid": true}"#)
            .with_response("Cypher", "MATCH (r:Restaurant) RETURN r")
            .with_response("graph context", "Studencka serves pierogi.")
            .with_response("amounts to", r#"{"dont_know": false}"#);
        let fx = fixture(ai, MockPlaceDirectory::new());
        fx.graph
            .upsert_restaurants(&[RestaurantRow {
                name: "Studencka".to_string(),
                ..Default::default()
            }])
            .await
            .unwrap();

        let result = fx
            .engine
            .handle_turn(DEFAULT_SESSION, "What does Studencka serve?")
            .await;

        assert_eq!(result.answer, "Studencka serves pierogi.");
        assert_eq!(result.code, None);
        assert!(fx.directory.calls().is_empty());
        assert_eq!(audit_count(&fx.audit_dir), 1);
    }

    #[tokio::test]
    async fn dont_know_triggers_exactly_one_acquisition() {
        let ai = MockCompletion::new()
            .with_response("food, dining", r#"{"valid": true}"#)
            .with_response("Cypher", "MATCH (r:Restaurant) RETURN r")
            .with_response("graph context", "I don't know.")
            .with_response("graph context", "Sushi Zen is the best in Warszawa.")
            .with_response("amounts to", r#"{"dont_know": true}"#)
            .with_response("amounts to", r#"{"dont_know": false}"#)
            .with_response("Extract the city", r#"{"city": "Warszawa"}"#);
        let directory = MockPlaceDirectory::new().with_places(
            "Warszawa",
            vec![NormalizedPlace {
                name: "Sushi Zen".to_string(),
                city: "Warszawa".to_string(),
                country: "Polska".to_string(),
                place_rank: Some(30),
            }],
        );
        let fx = fixture(ai, directory);

        let result = fx
            .engine
            .handle_turn(DEFAULT_SESSION, "Best sushi in Warszawa?")
            .await;

        assert_eq!(result.answer, "Sushi Zen is the best in Warszawa.");
        assert_eq!(result.code, None);
        assert_eq!(fx.directory.calls(), vec!["Warszawa"]);
        assert_eq!(fx.graph.count_by_label("Restaurant").await.unwrap(), 1);
        assert_eq!(audit_count(&fx.audit_dir), 1);
    }

    #[tokio::test]
    async fn retry_that_still_does_not_know_is_terminal() {
        let ai = MockCompletion::new()
            .with_response("food, dining", r#"{"valid": true}"#)
            .with_response("Cypher", "MATCH (r:Restaurant) RETURN r")
            .with_response("graph context", "I don't know.")
            .with_response("graph context", "Still no idea.")
            .with_response("amounts to", r#"{"dont_know": true}"#)
            .with_response("Extract the city", r#"{"city": "Radom"}"#);
        let fx = fixture(ai, MockPlaceDirectory::new());

        let result = fx
            .engine
            .handle_turn(DEFAULT_SESSION, "Best kebab in Radom?")
            .await;

        // Second dont_know verdict replays the first (true) - the retry
        // must not loop back into acquisition.
        assert_eq!(result.answer, "Still no idea.");
        assert_eq!(result.code, None);
        assert_eq!(fx.directory.calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_city_extraction_is_non_fatal() {
        let ai = MockCompletion::new()
            .with_response("food, dining", r#"{"valid": true}"#)
            .with_response("Cypher", "MATCH (r:Restaurant) RETURN r")
            .with_response("graph context", "I don't know.")
            .with_response("amounts to", r#"{"dont_know": true}"#)
            .with_response("Extract the city", r#"{"city": ""}"#);
        let fx = fixture(ai, MockPlaceDirectory::new());

        let result = fx.engine.handle_turn(DEFAULT_SESSION, "Any good pierogi?").await;

        assert_eq!(result.answer, "I don't know.");
        assert_eq!(result.code, None);
        assert!(fx.directory.calls().is_empty());
    }

    #[tokio::test]
    async fn internal_failure_becomes_fixed_error_answer() {
        // Validity passes but nothing else is scripted, so the Cypher
        // completion errors out.
        let ai = MockCompletion::new().with_response("food, dining", r#"{"valid": true}"#);
        let fx = fixture(ai, MockPlaceDirectory::new());

        let result = fx.engine.handle_turn(DEFAULT_SESSION, "Best sushi?").await;

        assert_eq!(result.answer, ERROR_ANSWER);
        assert_eq!(result.code, Some("internal_error"));
        assert_eq!(audit_count(&fx.audit_dir), 0);
    }

    #[tokio::test]
    async fn sessions_keep_independent_transcripts() {
        let ai = MockCompletion::new().with_response("food, dining", r#"{"valid": false}"#);
        let fx = fixture(ai, MockPlaceDirectory::new());

        fx.engine.handle_turn("alice", "off topic one").await;
        fx.engine.handle_turn("alice", "off topic two").await;
        fx.engine.handle_turn("bob", "off topic three").await;

        let alice = fx.engine.transcript("alice").await;
        assert_eq!(alice.len(), 4);
        assert_eq!(alice[0].role, Role::User);
        assert_eq!(alice[1].role, Role::Assistant);
        assert_eq!(fx.engine.transcript("bob").await.len(), 2);
    }
}
