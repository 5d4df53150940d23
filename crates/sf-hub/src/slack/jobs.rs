//! # Background Jobs
//!
//! Work started by a modal submission. Slack expects the submission to be
//! acknowledged within three seconds, so anything that touches the
//! warehouse runs here, after the reply, and reports back by DM.

use super::forms::QueryShaperForm;
use super::views;
use crate::error::HubError;
use crate::export::link_message;
use crate::warehouse::QueryOutput;
use crate::AppState;
use sf_core::report::{QueryFinder, TicketReport};
use sf_core::{pqm_link, PlacementFilterQuery, PlacementId, ReportQuery, ReportRequest};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const PLEASE_WAIT: &str = "Please Wait While Query is executing....";
pub const REPORT_READY: &str = "Your report is ready. Click the link to download.";
pub const QUERY_GENERATED: &str = "Query Generated Successfully";
pub const QUERIES_READY: &str =
    "Your requested queries are ready. Click the link below to download the results.";
const NO_RESULTS: &str = "No results found.";

#[derive(Debug, Clone)]
pub enum Job {
    /// Resolve a placement's criteria tree into a WHERE clause.
    PlacementFilter(QueryShaperForm),
    /// Run a generated LQS query and post its result.
    Lqs(ReportRequest),
    TicketReport(TicketReport),
    QueryFinder(QueryFinder),
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlacementFilter(_) => "placement_filter",
            Self::Lqs(_) => "lqs",
            Self::TicketReport(_) => "ticket_report",
            Self::QueryFinder(_) => "query_finder",
        }
    }
}

pub fn empty_tree_message(placement_id: PlacementId) -> String {
    format!(
        "Placement {} has no targeting criteria to filter on.",
        placement_id
    )
}

pub fn lqs_started_message(report: &ReportRequest) -> String {
    format!("You selected {}! Running the query...", report.title())
}

pub fn lqs_summary(output: &QueryOutput) -> String {
    output
        .headline()
        .unwrap_or_else(|| NO_RESULTS.to_string())
}

pub fn spawn(state: Arc<AppState>, user_id: String, job: Job) -> JoinHandle<()> {
    tokio::spawn(run(state, user_id, job))
}

/// Run one job to completion. Failures are logged and the user gets a
/// short reply instead of silence.
pub async fn run(state: Arc<AppState>, user_id: String, job: Job) {
    let job_id = Uuid::new_v4();
    let name = job.name();
    tracing::info!("Job {} ({}) started for {}", job_id, name, user_id);

    let channel = match state.chat.open_dm(&user_id).await {
        Ok(channel) => channel,
        Err(e) => {
            tracing::error!("Job {} ({}): cannot open DM with {}: {}", job_id, name, user_id, e);
            return;
        }
    };

    match execute(&state, &channel, job).await {
        Ok(()) => tracing::info!("Job {} ({}) finished", job_id, name),
        Err(e) => {
            tracing::error!("Job {} ({}) failed: {}", job_id, name, e);
            if let Err(post) = state.chat.post_message(&channel, &e.user_message()).await {
                tracing::error!("Job {} ({}): failure reply not delivered: {}", job_id, name, post);
            }
        }
    }
}

async fn execute(state: &AppState, channel: &str, job: Job) -> Result<(), HubError> {
    match job {
        Job::PlacementFilter(form) => {
            tracing::info!(
                "Query Shaper: placement {}, network {:?}, {} column(s), range {:?}",
                form.placement_id,
                form.network_id,
                form.columns.len(),
                form.range
            );
            state.chat.post_message(channel, PLEASE_WAIT).await?;
            let resolution = state.resolve(form.placement_id).await?;
            match PlacementFilterQuery::from_resolution(form.placement_id, &resolution) {
                Some(query) => {
                    state.chat.post_message(channel, &query.message()).await?;
                    state.chat.post_message(channel, QUERY_GENERATED).await?;
                }
                None => {
                    state
                        .chat
                        .post_message(channel, &empty_tree_message(form.placement_id))
                        .await?;
                }
            }
        }
        Job::Lqs(report) => {
            let sql = report.render()?;
            state
                .chat
                .post_message(channel, &lqs_started_message(&report))
                .await?;
            let output = state.warehouse_for(report.engine()).execute(&sql).await?;
            if output.rows.len() > 1 {
                let file = state.export(output, sql).await?;
                state
                    .chat
                    .post_message(channel, &link_message(QUERIES_READY, &file.url, "Download Queries"))
                    .await?;
            } else {
                let link = report.placement().map(pqm_link).unwrap_or_default();
                let summary = lqs_summary(&output);
                state
                    .chat
                    .post_blocks(
                        channel,
                        "Query executed successfully.",
                        views::query_executed_blocks(&summary, &link),
                    )
                    .await?;
            }
        }
        Job::TicketReport(report) => {
            export_and_link(state, channel, &report, REPORT_READY, "Download Report").await?;
        }
        Job::QueryFinder(finder) => {
            export_and_link(state, channel, &finder, QUERIES_READY, "Download Queries").await?;
        }
    }
    Ok(())
}

async fn export_and_link(
    state: &AppState,
    channel: &str,
    query: &(dyn ReportQuery + Sync),
    message: &str,
    label: &str,
) -> Result<(), HubError> {
    let sql = query.sql()?;
    state.chat.post_message(channel, PLEASE_WAIT).await?;
    let output = state.warehouse_for(query.engine()).execute(&sql).await?;
    let file = state.export(output, sql).await?;
    tracing::info!("{}: {} row(s) exported", query.title(), file.rows);
    state
        .chat
        .post_message(channel, &link_message(message, &file.url, label))
        .await?;
    Ok(())
}
