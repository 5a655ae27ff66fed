use geo_dsl::{ScriptError, apply_program, extract_source, parse_program, strip_code_fences};
use geo_scene::{Scene, ViewConfig};

/// Outcome of one safe-apply cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Promoted { object_count: usize },
    RolledBack {
        error: ScriptError,
        /// Last-known-good source to re-display so the shown code and the
        /// shown diagram stay consistent.
        restored: Option<String>,
    },
}

/// Session-scoped state of one diagram: the visible scene, the statement
/// sequence that built it, and the view it is rendered into. A candidate
/// sequence is always proven against a detached scratch scene before the
/// visible scene is touched, so a bad generation can never destroy a working
/// diagram.
#[derive(Debug)]
pub struct DiagramSession {
    view: ViewConfig,
    visible: Option<Scene>,
    last_good: Option<String>,
}

impl DiagramSession {
    pub fn new(view: ViewConfig) -> Self {
        Self {
            view,
            visible: None,
            last_good: None,
        }
    }

    pub fn view(&self) -> &ViewConfig {
        &self.view
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.visible.as_ref()
    }

    /// Mutable access to the visible scene for direct manipulation (moving
    /// points, dragging labels, deleting objects).
    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.visible.as_mut()
    }

    pub fn shown_source(&self) -> Option<&str> {
        self.last_good.as_deref()
    }

    /// Validates a raw generated payload against a scratch scene and only
    /// promotes it on success. On failure the previous visible scene and
    /// last-known-good sequence are untouched.
    pub fn apply_candidate(&mut self, raw: &str) -> ApplyOutcome {
        let cleaned = strip_code_fences(raw);

        let program = match parse_program(cleaned) {
            Ok(program) => program,
            Err(error) => return self.rolled_back(error),
        };

        let mut scratch = Scene::detached();
        if let Err(error) = apply_program(&program, &mut scratch) {
            return self.rolled_back(error);
        }
        drop(scratch);

        let mut fresh = Scene::attached(self.view.clone());
        if let Err(error) = apply_program(&program, &mut fresh) {
            // The payload just validated against the scratch scene, so this
            // only fires if construction stopped being deterministic. The
            // old scene is still intact either way.
            return self.rolled_back(error);
        }
        fresh.enable_label_dragging();

        let object_count = fresh.len();
        // The previous visible scene is torn down only here, after the new
        // one is fully constructed.
        self.visible = Some(fresh);
        self.last_good = Some(cleaned.to_string());
        tracing::info!(objects = object_count, "promoted new scene");
        ApplyOutcome::Promoted { object_count }
    }

    /// The statement sequence a continuation request should build on:
    /// serialized from the live scene (capturing manual edits), falling back
    /// to the last-known-good source when extraction yields nothing. Invoked
    /// lazily, only when a continuation is about to be sent.
    pub fn continuation_source(&self) -> String {
        let Some(scene) = &self.visible else {
            return self.last_good.clone().unwrap_or_default();
        };

        let extracted = extract_source(scene);
        if extracted.is_empty() {
            self.last_good.clone().unwrap_or_default()
        } else {
            extracted
        }
    }

    pub fn clear(&mut self) {
        self.visible = None;
        self.last_good = None;
    }

    fn rolled_back(&self, error: ScriptError) -> ApplyOutcome {
        tracing::warn!(%error, "candidate rejected, keeping previous scene");
        ApplyOutcome::RolledBack {
            error,
            restored: self.last_good.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use geo_scene::ViewConfig;

    use super::{ApplyOutcome, DiagramSession};

    const TRIANGLE: &str = "A = point(0, 0) { name: \"A\" }\n\
                            B = point(6, 0) { name: \"B\" }\n\
                            C = point(3, 5) { name: \"C\" }\n\
                            AB = segment(A, B)\n\
                            BC = segment(B, C)\n\
                            CA = segment(C, A)";

    fn session() -> DiagramSession {
        DiagramSession::new(ViewConfig::default())
    }

    #[test]
    fn promotion_installs_scene_and_remembers_source() {
        let mut session = session();
        let outcome = session.apply_candidate(TRIANGLE);

        assert_eq!(outcome, ApplyOutcome::Promoted { object_count: 6 });
        assert_eq!(session.shown_source(), Some(TRIANGLE));
        let scene = session.scene().expect("scene should be visible");
        assert_eq!(scene.len(), 6);
        assert!(scene.view().is_some());
    }

    #[test]
    fn failed_validation_keeps_scene_and_source_untouched() {
        let mut session = session();
        session.apply_candidate(TRIANGLE);
        let before = session.scene().expect("visible scene").objects().to_vec();

        let outcome = session.apply_candidate("A = point(0, 0)\ns = segment(A, X)");

        let ApplyOutcome::RolledBack { error, restored } = outcome else {
            panic!("expected rollback");
        };
        assert!(error.to_string().contains("unknown variable 'X'"));
        assert_eq!(restored.as_deref(), Some(TRIANGLE));
        assert_eq!(session.shown_source(), Some(TRIANGLE));
        assert_eq!(session.scene().expect("visible scene").objects(), &before[..]);
    }

    #[test]
    fn failed_first_candidate_leaves_session_empty() {
        let mut session = session();
        let outcome = session.apply_candidate("s = segment(A, B)");

        let ApplyOutcome::RolledBack { restored, .. } = outcome else {
            panic!("expected rollback");
        };
        assert_eq!(restored, None);
        assert!(session.scene().is_none());
        assert_eq!(session.shown_source(), None);
    }

    #[test]
    fn fenced_payload_is_stripped_before_validation() {
        let mut session = session();
        let fenced = format!("```geo\n{TRIANGLE}\n```");
        let outcome = session.apply_candidate(&fenced);

        assert!(matches!(outcome, ApplyOutcome::Promoted { .. }));
        assert_eq!(session.shown_source(), Some(TRIANGLE));
    }

    #[test]
    fn parse_failure_rolls_back_like_a_validation_fault() {
        let mut session = session();
        session.apply_candidate(TRIANGLE);

        let outcome = session.apply_candidate("A = point(0, 0) {");
        assert!(matches!(outcome, ApplyOutcome::RolledBack { .. }));
        assert_eq!(session.scene().expect("visible scene").len(), 6);
    }

    #[test]
    fn fence_only_payload_cannot_blank_the_diagram() {
        let mut session = session();
        session.apply_candidate(TRIANGLE);

        let outcome = session.apply_candidate("```\n```");
        assert!(matches!(outcome, ApplyOutcome::RolledBack { .. }));
        assert_eq!(session.scene().expect("visible scene").len(), 6);
        assert_eq!(session.shown_source(), Some(TRIANGLE));
    }

    #[test]
    fn continuation_serializes_live_scene_with_manual_edits() {
        let mut session = session();
        session.apply_candidate("A = point(0, 0) { name: \"A\" }\nB = point(6, 0) { name: \"B\" }");

        let scene = session.scene_mut().expect("visible scene");
        let a = scene.objects()[0].id;
        scene.move_point(a, 1.0, 2.0).expect("move should succeed");

        let continuation = session.continuation_source();
        assert!(continuation.contains("A = point(1, 2)"), "{continuation}");
        assert!(continuation.contains("B = point(6, 0)"), "{continuation}");
    }

    #[test]
    fn continuation_falls_back_to_last_good_when_extraction_is_empty() {
        let mut session = session();
        let scaffolding_only = "h = point(1, 1) { visible: false }";
        session.apply_candidate(scaffolding_only);

        assert_eq!(session.continuation_source(), scaffolding_only);
    }

    #[test]
    fn continuation_is_empty_for_a_fresh_session() {
        assert_eq!(session().continuation_source(), "");
    }

    #[test]
    fn clear_resets_scene_and_history() {
        let mut session = session();
        session.apply_candidate(TRIANGLE);
        session.clear();

        assert!(session.scene().is_none());
        assert_eq!(session.shown_source(), None);
        assert_eq!(session.continuation_source(), "");
    }

    #[test]
    fn promotion_enables_label_dragging_on_labeled_objects() {
        let mut session = session();
        session.apply_candidate(TRIANGLE);

        let scene = session.scene().expect("visible scene");
        for object in scene.objects() {
            assert_eq!(object.label_draggable, object.label().is_some());
        }
    }
}
