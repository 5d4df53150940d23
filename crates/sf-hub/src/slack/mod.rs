//! # Slack Surface
//!
//! Inbound slash commands and interaction payloads, typed. The HTTP entry
//! points live in [`handlers`]; long-running work triggered by a submission
//! runs as a [`jobs::Job`] after Slack has been acknowledged.

pub mod client;
pub mod forms;
pub mod handlers;
pub mod jobs;
pub mod signature;
pub mod views;

use serde::Deserialize;
use std::collections::HashMap;

/// Form body of a slash command.
#[derive(Debug, Clone, Deserialize)]
pub struct SlashCommand {
    pub command: String,
    pub user_id: String,
    pub trigger_id: String,
}

/// Form body of an interaction request: one JSON-encoded `payload` field.
#[derive(Debug, Deserialize)]
pub struct InteractionForm {
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interaction {
    BlockActions(BlockActions),
    ViewSubmission(ViewSubmission),
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackUser {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockActions {
    pub trigger_id: String,
    pub user: SlackUser,
    #[serde(default)]
    pub view: Option<ViewRef>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    pub action_id: String,
}

/// The open view an action came from.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewRef {
    pub id: String,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewSubmission {
    pub user: SlackUser,
    pub view: SubmittedView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedView {
    pub callback_id: String,
    #[serde(default)]
    pub private_metadata: String,
    #[serde(default)]
    pub state: ViewState,
}

/// `view.state.values`: block id → action id → element value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewState {
    #[serde(default)]
    pub values: HashMap<String, HashMap<String, ElementValue>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementValue {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub selected_option: Option<SelectedOption>,
    #[serde(default)]
    pub selected_options: Option<Vec<SelectedOption>>,
    #[serde(default)]
    pub selected_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectedOption {
    pub value: String,
}

impl ViewState {
    fn element(&self, (block, action): views::field::Field) -> Option<&ElementValue> {
        self.values.get(block)?.get(action)
    }

    /// Trimmed text input; blank counts as absent.
    pub fn text(&self, field: views::field::Field) -> Option<&str> {
        self.element(field)?
            .value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn selected(&self, field: views::field::Field) -> Option<&str> {
        self.element(field)?
            .selected_option
            .as_ref()
            .map(|o| o.value.as_str())
    }

    /// Values of a multi-select or checkbox group; empty when nothing is picked.
    pub fn selected_many(&self, field: views::field::Field) -> Vec<&str> {
        self.element(field)
            .and_then(|e| e.selected_options.as_ref())
            .map(|opts| opts.iter().map(|o| o.value.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn date(&self, field: views::field::Field) -> Option<&str> {
        self.element(field)?.selected_date.as_deref()
    }
}
