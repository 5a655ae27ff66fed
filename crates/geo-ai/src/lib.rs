use async_trait::async_trait;
use thiserror::Error;

use geo_scene::ViewConfig;

mod groq;
pub mod prompt;
mod session;

pub use groq::{DEFAULT_MODEL, GROQ_API_URL, GroqClient};
pub use prompt::{SYSTEM_PROMPT, build_user_prompt};
pub use session::{ApplyOutcome, DiagramSession};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("request to the model backend failed: {0}")]
    Transport(String),
    #[error("model backend returned status {0}")]
    Status(u16),
    #[error("model response did not contain any content")]
    MissingContent,
}

/// One generation request as the model boundary sees it: free-text input and
/// optionally the prior statement sequence a continuation builds on.
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    pub system_prompt: &'a str,
    pub user_input: &'a str,
    pub prior_source: Option<&'a str>,
}

#[async_trait]
pub trait LanguageModel {
    async fn generate(&mut self, request: ModelRequest<'_>) -> Result<String, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model returned no usable result")]
    EmptyResult,
}

/// What one generation cycle produced. A validation failure is a recoverable
/// outcome, not an error: the previous diagram is kept and `source` is the
/// last-known-good sequence so the shown code matches the shown diagram.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub promoted: bool,
    pub source: Option<String>,
    pub validation_error: Option<String>,
    pub object_count: usize,
}

/// Orchestrates one generation cycle: continuation extraction, the model
/// round trip, and the safe-apply protocol. Callers must not overlap cycles;
/// the web layer serializes turns behind a mutex.
pub struct DiagramEngine<M> {
    model: M,
    session: DiagramSession,
    system_prompt: String,
}

impl<M: LanguageModel> DiagramEngine<M> {
    pub fn new(model: M, view: ViewConfig) -> Self {
        Self {
            model,
            session: DiagramSession::new(view),
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn session(&self) -> &DiagramSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DiagramSession {
        &mut self.session
    }

    pub fn reset(&mut self) {
        self.session.clear();
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub async fn run_turn(
        &mut self,
        input: &str,
        continue_mode: bool,
    ) -> Result<TurnReport, EngineError> {
        let prior = if continue_mode {
            let source = self.session.continuation_source();
            (!source.is_empty()).then_some(source)
        } else {
            None
        };

        let raw = self
            .model
            .generate(ModelRequest {
                system_prompt: &self.system_prompt,
                user_input: input,
                prior_source: prior.as_deref(),
            })
            .await?;
        if raw.trim().is_empty() {
            return Err(EngineError::EmptyResult);
        }

        let report = match self.session.apply_candidate(&raw) {
            ApplyOutcome::Promoted { object_count } => TurnReport {
                promoted: true,
                source: self.session.shown_source().map(str::to_string),
                validation_error: None,
                object_count,
            },
            ApplyOutcome::RolledBack { error, restored } => TurnReport {
                promoted: false,
                source: restored,
                validation_error: Some(error.to_string()),
                object_count: self.session.scene().map_or(0, geo_scene::Scene::len),
            },
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};

    use async_trait::async_trait;
    use geo_scene::ViewConfig;

    use super::{DiagramEngine, EngineError, LanguageModel, ModelError, ModelRequest};

    #[derive(Debug, Clone)]
    struct RequestLog {
        input: String,
        prior_source: Option<String>,
    }

    #[derive(Default)]
    struct ScriptedModel {
        responses: BTreeMap<String, VecDeque<String>>,
        logs: Vec<RequestLog>,
        fail_with: Option<ModelError>,
    }

    impl ScriptedModel {
        fn with_response(mut self, input: &str, response: &str) -> Self {
            self.responses
                .entry(input.to_string())
                .or_default()
                .push_back(response.to_string());
            self
        }

        fn failing(error: ModelError) -> Self {
            Self {
                fail_with: Some(error),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&mut self, request: ModelRequest<'_>) -> Result<String, ModelError> {
            self.logs.push(RequestLog {
                input: request.user_input.to_string(),
                prior_source: request.prior_source.map(str::to_string),
            });

            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }

            let queue = self
                .responses
                .get_mut(request.user_input)
                .ok_or_else(|| {
                    ModelError::Transport(format!(
                        "no scripted response for '{}'",
                        request.user_input
                    ))
                })?;
            queue.pop_front().ok_or_else(|| {
                ModelError::Transport(format!(
                    "no remaining scripted responses for '{}'",
                    request.user_input
                ))
            })
        }
    }

    fn engine(model: ScriptedModel) -> DiagramEngine<ScriptedModel> {
        DiagramEngine::new(model, ViewConfig::default())
    }

    const SEGMENT: &str = "A = point(0, 0) { name: \"A\" }\n\
                           B = point(6, 0) { name: \"B\" }\n\
                           AB = segment(A, B)";

    #[tokio::test]
    async fn turn_promotes_a_valid_generation() {
        let model = ScriptedModel::default()
            .with_response("segment AB", &format!("```\n{SEGMENT}\n```"));
        let mut engine = engine(model);

        let report = engine
            .run_turn("segment AB", false)
            .await
            .expect("turn should succeed");

        assert!(report.promoted);
        assert_eq!(report.source.as_deref(), Some(SEGMENT));
        assert_eq!(report.validation_error, None);
        assert_eq!(report.object_count, 3);
        assert_eq!(engine.session().scene().expect("scene").len(), 3);
    }

    #[tokio::test]
    async fn failed_validation_is_a_recoverable_report() {
        let model = ScriptedModel::default()
            .with_response("segment AB", SEGMENT)
            .with_response("nonsense", "s = segment(A, X)");
        let mut engine = engine(model);

        engine
            .run_turn("segment AB", false)
            .await
            .expect("first turn should succeed");
        let report = engine
            .run_turn("nonsense", false)
            .await
            .expect("validation failure must not be an error");

        assert!(!report.promoted);
        assert_eq!(report.source.as_deref(), Some(SEGMENT));
        let message = report.validation_error.expect("validation error");
        assert!(message.contains("unknown variable"), "{message}");
        assert_eq!(engine.session().scene().expect("scene").len(), 3);
        assert_eq!(engine.session().shown_source(), Some(SEGMENT));
    }

    #[tokio::test]
    async fn continuation_passes_extracted_prior_source() {
        let model = ScriptedModel::default()
            .with_response("segment AB", SEGMENT)
            .with_response("add C", &format!("{SEGMENT}\nC = point(3, 5) {{ name: \"C\" }}"));
        let mut engine = engine(model);

        engine
            .run_turn("segment AB", false)
            .await
            .expect("first turn should succeed");
        engine
            .run_turn("add C", true)
            .await
            .expect("continuation should succeed");

        let model = engine.into_model();
        assert_eq!(model.logs[0].prior_source, None);
        let prior = model.logs[1].prior_source.as_deref().expect("prior source");
        assert!(prior.contains("A = point(0, 0)"), "{prior}");
        assert!(prior.contains("segment(A, B)"), "{prior}");
    }

    #[tokio::test]
    async fn continuation_without_a_diagram_sends_no_prior_source() {
        let model = ScriptedModel::default().with_response("first", SEGMENT);
        let mut engine = engine(model);

        engine
            .run_turn("first", true)
            .await
            .expect("turn should succeed");
        assert_eq!(engine.into_model().logs[0].prior_source, None);
    }

    #[tokio::test]
    async fn empty_payload_is_an_empty_result_error() {
        let model = ScriptedModel::default().with_response("anything", "   \n");
        let mut engine = engine(model);

        let err = engine.run_turn("anything", false).await.unwrap_err();
        assert_eq!(err, EngineError::EmptyResult);
        assert!(engine.session().scene().is_none());
    }

    #[tokio::test]
    async fn transport_failure_propagates_without_scene_mutation() {
        let model = ScriptedModel::failing(ModelError::Status(503));
        let mut engine = engine(model);

        let err = engine.run_turn("anything", false).await.unwrap_err();
        assert_eq!(err, EngineError::Model(ModelError::Status(503)));
        assert!(engine.session().scene().is_none());
    }

    #[tokio::test]
    async fn reset_clears_the_session() {
        let model = ScriptedModel::default().with_response("segment AB", SEGMENT);
        let mut engine = engine(model);

        engine
            .run_turn("segment AB", false)
            .await
            .expect("turn should succeed");
        engine.reset();

        assert!(engine.session().scene().is_none());
        assert_eq!(engine.session().shown_source(), None);
    }
}
