//! # Slack Handlers
//!
//! `POST /slack/commands` opens the main menu; `POST /slack/interactions`
//! receives button clicks and modal submissions. Submissions are answered
//! with a `response_action` and any warehouse work is handed to
//! [`jobs::spawn`].

use super::forms::{
    AckColumnsForm, CrafterChoice, Delivery, FormError, LqsKind, QueryCrafterForm,
    QueryFinderForm, QueryShaperForm, ReportForm,
};
use super::jobs::{self, Job};
use super::views::{self, callback, field, menu};
use super::{BlockActions, Interaction, InteractionForm, SlashCommand, ViewSubmission};
use crate::error::HubError;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Serialize;
use serde_json::Value;
use sf_core::{pqm_link, ReportRequest};
use std::collections::HashMap;
use std::sync::Arc;

/// Body of a view submission reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "response_action", rename_all = "snake_case")]
pub enum ViewResponse {
    /// Close every view in the stack.
    Clear,
    /// Replace the submitted view.
    Update { view: Value },
    /// Keep the view open and flag the offending blocks.
    Errors { errors: HashMap<String, String> },
}

/// What a submission resolves to: an optional `response_action` (none
/// means close just this view) and optional follow-up work.
#[derive(Debug)]
pub struct Reply {
    pub response: Option<ViewResponse>,
    pub job: Option<Job>,
}

impl Reply {
    fn close() -> Self {
        Self {
            response: None,
            job: None,
        }
    }

    fn update(view: Value) -> Self {
        Self {
            response: Some(ViewResponse::Update { view }),
            job: None,
        }
    }

    fn run(job: Job) -> Self {
        Self {
            response: Some(ViewResponse::Clear),
            job: Some(job),
        }
    }
}

pub async fn slash_command(
    State(state): State<Arc<AppState>>,
    Form(command): Form<SlashCommand>,
) -> (StatusCode, String) {
    tracing::info!("{} from {}", command.command, command.user_id);
    match state
        .chat
        .open_view(&command.trigger_id, views::main_menu())
        .await
    {
        Ok(()) => (StatusCode::OK, String::new()),
        Err(e) => {
            let e = HubError::from(e);
            tracing::error!("Failed to open main menu for {}: {}", command.user_id, e);
            (StatusCode::OK, e.user_message())
        }
    }
}

pub async fn interactions(
    State(state): State<Arc<AppState>>,
    Form(form): Form<InteractionForm>,
) -> Response {
    let interaction: Interaction = match serde_json::from_str(&form.payload) {
        Ok(interaction) => interaction,
        Err(e) => {
            tracing::warn!("Undecodable interaction payload: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match interaction {
        Interaction::BlockActions(actions) => {
            block_actions(&state, &actions).await;
            StatusCode::OK.into_response()
        }
        Interaction::ViewSubmission(submission) => {
            let user_id = submission.user.id.clone();
            let reply = match submission_reply(&submission) {
                Ok(reply) => reply,
                Err(FormError::Metadata(e)) => {
                    tracing::warn!("Dropping submission from {}: {}", user_id, e);
                    Reply {
                        response: Some(ViewResponse::Clear),
                        job: None,
                    }
                }
                Err(e) => {
                    tracing::debug!("Rejected {} from {}: {}", submission.view.callback_id, user_id, e);
                    Reply {
                        response: Some(ViewResponse::Errors {
                            errors: e.to_view_errors(),
                        }),
                        job: None,
                    }
                }
            };
            if let Some(job) = reply.job {
                jobs::spawn(state.clone(), user_id, job);
            }
            match reply.response {
                Some(response) => Json(response).into_response(),
                None => StatusCode::OK.into_response(),
            }
        }
        Interaction::Unsupported => StatusCode::OK.into_response(),
    }
}

async fn block_actions(state: &AppState, actions: &BlockActions) {
    for action in &actions.actions {
        let result = match action.action_id.as_str() {
            menu::REPORT => {
                state
                    .chat
                    .open_view(&actions.trigger_id, views::report_modal())
                    .await
            }
            menu::QUERY_CRAFTER => {
                state
                    .chat
                    .open_view(&actions.trigger_id, views::home_modal())
                    .await
            }
            id @ (menu::RELEVANT_TICKET | menu::QUERY_FINDER) => {
                let Some(view) = actions.view.as_ref() else {
                    tracing::warn!("{} clicked outside a view", id);
                    continue;
                };
                let next = if id == menu::RELEVANT_TICKET {
                    views::relevant_ticket()
                } else {
                    views::query_finder_modal()
                };
                state
                    .chat
                    .update_view(&view.id, view.hash.as_deref(), next)
                    .await
            }
            // Selects and radio buttons inside modals report here too.
            other => {
                tracing::debug!("Ignoring action {}", other);
                continue;
            }
        };
        if let Err(e) = result {
            tracing::error!(
                "Action {} from {} failed: {}",
                action.action_id,
                actions.user.id,
                e
            );
        }
    }
}

/// Route a submission by its callback id.
pub fn submission_reply(submission: &ViewSubmission) -> Result<Reply, FormError> {
    let view = &submission.view;
    let state = &view.state;
    match view.callback_id.as_str() {
        callback::REPORT => Ok(Reply::run(Job::TicketReport(ReportForm::parse(state)?.report))),
        callback::QUERY_FINDER => Ok(Reply::run(Job::QueryFinder(
            QueryFinderForm::parse(state)?.finder,
        ))),
        callback::HOME => Ok(Reply::update(match CrafterChoice::parse(state)? {
            CrafterChoice::QueryShaper => views::query_shaper_modal(),
            CrafterChoice::LqsGenerator => views::lqs_generator_modal(),
        })),
        callback::QUERY_SHAPER => Ok(Reply::run(Job::PlacementFilter(QueryShaperForm::parse(
            state,
        )?))),
        callback::LQS_GENERATOR => {
            let form = QueryCrafterForm::parse(state)?;
            if form.kind == LqsKind::Ack {
                return Ok(Reply::update(views::ack_columns_modal(&form.to_metadata()?)));
            }
            deliver(form.delivery, form.report(None)?)
        }
        callback::ACK_COLUMNS => {
            let form = AckColumnsForm::parse(state, &view.private_metadata)?;
            deliver(form.crafter.delivery, form.report()?)
        }
        other => {
            tracing::debug!("Closing view {}", other);
            Ok(Reply::close())
        }
    }
}

fn deliver(delivery: Delivery, report: ReportRequest) -> Result<Reply, FormError> {
    match delivery {
        Delivery::Run => Ok(Reply::run(Job::Lqs(report))),
        Delivery::ShowQuery => {
            let sql = report.render().map_err(|e| FormError::Invalid {
                block: field::LQS_QUERY_TYPE.0,
                message: e.to_string(),
            })?;
            let link = report.placement().map(pqm_link).unwrap_or_default();
            Ok(Reply::update(views::query_result_modal(&sql, &link)))
        }
    }
}
