use async_trait::async_trait;
use parking_lot::Mutex;

use crate::actions::error::ActionError;
use crate::actions::types::{ActionResult, RowData};

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmPrompt {
    pub title: String,
    pub message: String,
    pub confirm_text: String,
    pub cancel_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditForm {
    pub title: String,
    pub fields: RowData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Submitted(RowData),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailView {
    pub title: String,
    pub fields: RowData,
}

/// The surface a handler talks to when it needs a human: a dialog, a form, a
/// detail pane. Each call suspends until the user answers; there is no timeout.
#[async_trait]
pub trait UserInteraction: Send + Sync {
    /// Resolves `true` on confirm, `false` on cancel or dismiss
    async fn confirm(&self, prompt: ConfirmPrompt) -> bool;

    async fn edit(&self, form: EditForm) -> EditOutcome;

    /// Resolves when the view is closed
    async fn view(&self, view: DetailView);
}

/// Where one interactive execution currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingUserInput,
    Confirmed,
    Applying,
    Cancelled,
    Resolved,
}

impl Phase {
    fn can_move_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, AwaitingUserInput)
                | (Idle, Applying)
                | (AwaitingUserInput, Confirmed)
                | (AwaitingUserInput, Cancelled)
                | (Confirmed, Applying)
                | (Confirmed, Resolved)
                | (Applying, Resolved)
                | (Cancelled, Resolved)
                | (Idle, Resolved)
        )
    }
}

/// One in-flight interactive execution. `resolve` consumes it, so a result is
/// produced exactly once.
#[derive(Debug)]
pub struct Interaction {
    action: String,
    phase: Phase,
}

impl Interaction {
    pub fn begin(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, next: Phase) {
        if !self.phase.can_move_to(next) {
            tracing::warn!(
                "{} interaction: unexpected transition {:?} -> {:?}",
                self.action,
                self.phase,
                next
            );
        }
        tracing::trace!("{} interaction: {:?} -> {:?}", self.action, self.phase, next);
        self.phase = next;
    }

    pub async fn confirm(&mut self, surface: &dyn UserInteraction, prompt: ConfirmPrompt) -> bool {
        self.transition(Phase::AwaitingUserInput);
        let confirmed = surface.confirm(prompt).await;
        self.transition(if confirmed { Phase::Confirmed } else { Phase::Cancelled });
        confirmed
    }

    pub async fn edit(&mut self, surface: &dyn UserInteraction, form: EditForm) -> EditOutcome {
        self.transition(Phase::AwaitingUserInput);
        let outcome = surface.edit(form).await;
        self.transition(match outcome {
            EditOutcome::Submitted(_) => Phase::Confirmed,
            EditOutcome::Cancelled => Phase::Cancelled,
        });
        outcome
    }

    /// Closing a view counts as confirmation
    pub async fn view(&mut self, surface: &dyn UserInteraction, view: DetailView) {
        self.transition(Phase::AwaitingUserInput);
        surface.view(view).await;
        self.transition(Phase::Confirmed);
    }

    pub fn applying(&mut self) {
        self.transition(Phase::Applying);
    }

    pub fn resolve(mut self, result: ActionResult) -> ActionResult {
        self.transition(Phase::Resolved);
        result
    }

    /// Resolve with the outcome of the apply step; an error becomes a failure result
    pub fn settle(self, outcome: Result<ActionResult, ActionError>) -> ActionResult {
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Error applying {} action: {}", self.action, e);
                ActionResult::failure(format!("Error executing {} action", self.action)).with_error(e.to_string())
            }
        };
        self.resolve(result)
    }
}

/// Non-interactive surface: answers every prompt the same way. Used by the CLI
/// (`--yes`) and tests; records the titles it was shown.
#[derive(Debug, Default)]
pub struct AutoInteraction {
    approve: bool,
    edit_patch: Option<RowData>,
    shown: Mutex<Vec<String>>,
}

impl AutoInteraction {
    pub fn approving() -> Self {
        Self {
            approve: true,
            ..Default::default()
        }
    }

    pub fn declining() -> Self {
        Self::default()
    }

    /// Approve, and submit edit forms with these fields changed
    pub fn editing(patch: RowData) -> Self {
        Self {
            approve: true,
            edit_patch: Some(patch),
            ..Default::default()
        }
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().clone()
    }
}

#[async_trait]
impl UserInteraction for AutoInteraction {
    async fn confirm(&self, prompt: ConfirmPrompt) -> bool {
        self.shown.lock().push(prompt.title);
        self.approve
    }

    async fn edit(&self, form: EditForm) -> EditOutcome {
        self.shown.lock().push(form.title);
        if !self.approve {
            return EditOutcome::Cancelled;
        }
        let mut fields = form.fields;
        if let Some(patch) = &self.edit_patch {
            for (k, v) in patch {
                fields.insert(k.clone(), v.clone());
            }
        }
        EditOutcome::Submitted(fields)
    }

    async fn view(&self, view: DetailView) {
        self.shown.lock().push(view.title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> ConfirmPrompt {
        ConfirmPrompt {
            title: "Confirm Delete".into(),
            message: "Sure?".into(),
            confirm_text: "Delete".into(),
            cancel_text: "Cancel".into(),
        }
    }

    #[tokio::test]
    async fn confirm_path_walks_the_phases() {
        let surface = AutoInteraction::approving();
        let mut interaction = Interaction::begin("delete");
        assert_eq!(interaction.phase(), Phase::Idle);

        assert!(interaction.confirm(&surface, prompt()).await);
        assert_eq!(interaction.phase(), Phase::Confirmed);
        interaction.applying();
        assert_eq!(interaction.phase(), Phase::Applying);

        let result = interaction.resolve(ActionResult::ok("done"));
        assert!(result.success);
        assert_eq!(surface.shown(), vec!["Confirm Delete".to_string()]);
    }

    #[test]
    fn apply_error_settles_as_failure() {
        let mut interaction = Interaction::begin("archive");
        interaction.applying();
        let result = interaction.settle(Err(ActionError::MissingContext("updateData".into())));
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Error executing archive action"));
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn cancel_path() {
        let surface = AutoInteraction::declining();
        let mut interaction = Interaction::begin("delete");
        assert!(!interaction.confirm(&surface, prompt()).await);
        assert_eq!(interaction.phase(), Phase::Cancelled);
    }

    #[tokio::test]
    async fn editing_surface_applies_patch() {
        let mut patch = RowData::new();
        patch.insert("name".into(), "Renamed".into());
        let surface = AutoInteraction::editing(patch);

        let mut fields = RowData::new();
        fields.insert("id".into(), "1".into());
        fields.insert("name".into(), "Old".into());

        match surface.edit(EditForm { title: "Edit Old".into(), fields }).await {
            EditOutcome::Submitted(f) => {
                assert_eq!(f["name"], "Renamed");
                assert_eq!(f["id"], "1");
            }
            EditOutcome::Cancelled => panic!("expected submit"),
        }
    }
}
