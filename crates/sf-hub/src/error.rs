use crate::export::ExportError;
use crate::slack::client::ChatError;
use crate::slack::forms::FormError;
use crate::warehouse::WarehouseError;
use axum::http::StatusCode;
use sf_core::{ReportError, ResolveError};
use thiserror::Error;

/// Reply posted in chat whenever a job fails for a reason the user cannot fix.
pub const GENERIC_FAILURE: &str =
    "An error occurred while processing your request. Please try again later.";

#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl HubError {
    /// Text safe to show a Slack user. Input problems are echoed back;
    /// everything else collapses to the generic reply.
    pub fn user_message(&self) -> String {
        match self {
            Self::Form(e) => e.to_string(),
            Self::Report(e) => e.to_string(),
            Self::Resolve(ResolveError::EmptyValueSet { node_id, type_id }) => format!(
                "Criteria node {} ({}) has no values, so no filter was generated.",
                node_id, type_id
            ),
            _ => GENERIC_FAILURE.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Form(_) | Self::Report(_) => StatusCode::BAD_REQUEST,
            Self::Resolve(ResolveError::Upstream { .. }) | Self::Warehouse(_) | Self::Chat(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Resolve(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Export(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<HubError> for (StatusCode, String) {
    fn from(e: HubError) -> Self {
        (e.status(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_internal_failures() {
        let e = HubError::Warehouse(WarehouseError::Query("line 1: syntax error".into()));
        assert_eq!(e.user_message(), GENERIC_FAILURE);
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);

        let e = HubError::Report(ReportError::NoKeywords);
        assert_eq!(e.user_message(), "query finder needs at least one keyword");
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_empty_value_set_is_explained() {
        let e = HubError::Resolve(ResolveError::EmptyValueSet {
            node_id: 9,
            type_id: "COUNTRY".into(),
        });
        assert_eq!(e.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(e.user_message().contains("Criteria node 9 (COUNTRY)"));
    }
}
