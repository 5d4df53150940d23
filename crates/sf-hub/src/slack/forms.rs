//! Typed modal submissions. Every field is validated here, and a failure
//! names the block it belongs to so Slack can show the error inline.

use super::views::{self, field, field::Field};
use super::ViewState;
use serde::{Deserialize, Serialize};
use sf_core::report::{
    AckColumn, AckReport, AdRequestCount, Organization, QueryFinder, TicketColumn,
    TicketPriority, TicketReport, TransactionsQuery,
};
use sf_core::{DateRange, NetworkId, PlacementId, ReportRequest, SqlIdentifier};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("This field is required.")]
    MissingField(&'static str),
    #[error("{message}")]
    Invalid { block: &'static str, message: String },
    #[error("form state could not be restored: {0}")]
    Metadata(String),
}

impl FormError {
    pub fn block_id(&self) -> Option<&'static str> {
        match self {
            Self::MissingField(block) | Self::Invalid { block, .. } => Some(block),
            Self::Metadata(_) => None,
        }
    }

    /// The `errors` map of a `response_action: errors` reply.
    pub fn to_view_errors(&self) -> HashMap<String, String> {
        self.block_id()
            .map(|block| HashMap::from([(block.to_string(), self.to_string())]))
            .unwrap_or_default()
    }
}

fn invalid(field: Field, err: impl std::fmt::Display) -> FormError {
    FormError::Invalid {
        block: field.0,
        message: err.to_string(),
    }
}

fn required_text(state: &ViewState, field: Field) -> Result<&str, FormError> {
    state.text(field).ok_or(FormError::MissingField(field.0))
}

fn parse_text<T>(state: &ViewState, field: Field) -> Result<T, FormError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    required_text(state, field)?
        .parse()
        .map_err(|e| invalid(field, e))
}

fn parse_optional_text<T>(state: &ViewState, field: Field) -> Result<Option<T>, FormError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    state
        .text(field)
        .map(|raw| raw.parse().map_err(|e| invalid(field, e)))
        .transpose()
}

/// Parse every selected option; at least one is required.
fn parse_many<T>(state: &ViewState, field: Field) -> Result<Vec<T>, FormError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let picked = state.selected_many(field);
    if picked.is_empty() {
        return Err(FormError::MissingField(field.0));
    }
    picked
        .into_iter()
        .map(|v| v.parse().map_err(|e| invalid(field, e)))
        .collect()
}

fn date_range(state: &ViewState) -> Result<DateRange, FormError> {
    let start = state
        .date(field::START_DATE)
        .ok_or(FormError::MissingField(field::START_DATE.0))?;
    let end = state
        .date(field::END_DATE)
        .ok_or(FormError::MissingField(field::END_DATE.0))?;
    DateRange::parse(start, end).map_err(|e| invalid(field::END_DATE, e))
}

fn optional_date_range(state: &ViewState) -> Result<Option<DateRange>, FormError> {
    match (state.date(field::START_DATE), state.date(field::END_DATE)) {
        (None, None) => Ok(None),
        _ => date_range(state).map(Some),
    }
}

/// Ticket report modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportForm {
    pub report: TicketReport,
}

impl ReportForm {
    pub fn parse(state: &ViewState) -> Result<Self, FormError> {
        Ok(Self {
            report: TicketReport {
                columns: parse_many::<TicketColumn>(state, field::REPORT_COLUMNS)?,
                organizations: parse_many::<Organization>(state, field::ORGANIZATIONS)?,
                priorities: parse_many::<TicketPriority>(state, field::PRIORITIES)?,
                range: date_range(state)?,
            },
        })
    }
}

/// Query Shaper modal. Only the placement drives the generated filter; the
/// other fields are validated and logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryShaperForm {
    pub placement_id: PlacementId,
    pub network_id: Option<NetworkId>,
    pub columns: Vec<SqlIdentifier>,
    pub range: Option<DateRange>,
}

impl QueryShaperForm {
    pub fn parse(state: &ViewState) -> Result<Self, FormError> {
        let columns = state
            .selected_many(field::SHAPER_COLUMNS)
            .into_iter()
            .map(|c| c.parse::<SqlIdentifier>().map_err(|e| invalid(field::SHAPER_COLUMNS, e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            placement_id: parse_text(state, field::SHAPER_PLACEMENT)?,
            network_id: parse_optional_text(state, field::SHAPER_NETWORK)?,
            columns,
            range: optional_date_range(state)?,
        })
    }
}

/// Choice made on the Query Crafter home modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrafterChoice {
    QueryShaper,
    LqsGenerator,
}

impl CrafterChoice {
    pub fn parse(state: &ViewState) -> Result<Self, FormError> {
        match state.selected(field::CRAFTER_CHOICE) {
            Some(views::CHOICE_SHAPER) => Ok(Self::QueryShaper),
            Some(views::CHOICE_LQS) => Ok(Self::LqsGenerator),
            Some(other) => Err(invalid(field::CRAFTER_CHOICE, format!("unknown choice '{}'", other))),
            None => Err(FormError::MissingField(field::CRAFTER_CHOICE.0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LqsKind {
    AdRequest,
    Transactions,
    Ack,
}

impl FromStr for LqsKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ad_request" => Ok(Self::AdRequest),
            "transactions" => Ok(Self::Transactions),
            "ack" => Ok(Self::Ack),
            other => Err(format!("unknown query type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    ShowQuery,
    Run,
}

/// LQS generator modal. Survives the ACK column step as `private_metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCrafterForm {
    pub placement_id: PlacementId,
    pub network_id: NetworkId,
    pub kind: LqsKind,
    pub range: DateRange,
    pub delivery: Delivery,
}

impl QueryCrafterForm {
    pub fn parse(state: &ViewState) -> Result<Self, FormError> {
        let kind = state
            .selected(field::LQS_QUERY_TYPE)
            .ok_or(FormError::MissingField(field::LQS_QUERY_TYPE.0))?
            .parse::<LqsKind>()
            .map_err(|e| invalid(field::LQS_QUERY_TYPE, e))?;
        let delivery = match state.selected(field::LQS_DELIVERY) {
            Some(views::DELIVERY_SHOW) => Delivery::ShowQuery,
            Some(views::DELIVERY_RUN) => Delivery::Run,
            Some(other) => return Err(invalid(field::LQS_DELIVERY, format!("unknown option '{}'", other))),
            None => return Err(FormError::MissingField(field::LQS_DELIVERY.0)),
        };
        Ok(Self {
            placement_id: parse_text(state, field::LQS_PLACEMENT)?,
            network_id: parse_text(state, field::LQS_NETWORK)?,
            kind,
            range: date_range(state)?,
            delivery,
        })
    }

    pub fn to_metadata(&self) -> Result<String, FormError> {
        serde_json::to_string(self).map_err(|e| FormError::Metadata(e.to_string()))
    }

    pub fn from_metadata(raw: &str) -> Result<Self, FormError> {
        serde_json::from_str(raw).map_err(|e| FormError::Metadata(e.to_string()))
    }

    /// The report to render. ACK needs its columns from the second step.
    pub fn report(&self, ack_columns: Option<Vec<AckColumn>>) -> Result<ReportRequest, FormError> {
        let Self {
            placement_id,
            network_id,
            range,
            ..
        } = self.clone();
        Ok(match self.kind {
            LqsKind::AdRequest => ReportRequest::AdRequestCount(AdRequestCount {
                placement_id,
                network_id,
                range,
            }),
            LqsKind::Transactions => ReportRequest::Transactions(TransactionsQuery {
                placement_id,
                network_id,
                range,
            }),
            LqsKind::Ack => ReportRequest::Ack(AckReport {
                placement_id,
                network_id,
                range,
                columns: ack_columns.ok_or(FormError::MissingField(field::ACK_COLUMNS.0))?,
            }),
        })
    }
}

/// Second ACK step: the picked columns plus the carried first step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckColumnsForm {
    pub crafter: QueryCrafterForm,
    pub columns: Vec<AckColumn>,
}

impl AckColumnsForm {
    pub fn parse(state: &ViewState, private_metadata: &str) -> Result<Self, FormError> {
        Ok(Self {
            crafter: QueryCrafterForm::from_metadata(private_metadata)?,
            columns: parse_many(state, field::ACK_COLUMNS)?,
        })
    }

    pub fn report(&self) -> Result<ReportRequest, FormError> {
        self.crafter.report(Some(self.columns.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFinderForm {
    pub finder: QueryFinder,
}

impl QueryFinderForm {
    pub fn parse(state: &ViewState) -> Result<Self, FormError> {
        let raw = required_text(state, field::FINDER_KEYWORDS)?;
        let finder = QueryFinder::parse(raw).map_err(|e| invalid(field::FINDER_KEYWORDS, e))?;
        Ok(Self { finder })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::slack::{ElementValue, SelectedOption};
    use pretty_assertions::assert_eq;

    /// Builder for submitted view states.
    #[derive(Default)]
    pub(crate) struct StateBuilder(ViewState);

    impl StateBuilder {
        fn put(mut self, (block, action): Field, value: ElementValue) -> Self {
            self.0
                .values
                .entry(block.to_string())
                .or_default()
                .insert(action.to_string(), value);
            self
        }

        pub(crate) fn text(self, field: Field, value: &str) -> Self {
            self.put(
                field,
                ElementValue {
                    value: Some(value.to_string()),
                    ..Default::default()
                },
            )
        }

        pub(crate) fn select(self, field: Field, value: &str) -> Self {
            self.put(
                field,
                ElementValue {
                    selected_option: Some(SelectedOption {
                        value: value.to_string(),
                    }),
                    ..Default::default()
                },
            )
        }

        pub(crate) fn many(self, field: Field, values: &[&str]) -> Self {
            self.put(
                field,
                ElementValue {
                    selected_options: Some(
                        values
                            .iter()
                            .map(|v| SelectedOption {
                                value: v.to_string(),
                            })
                            .collect(),
                    ),
                    ..Default::default()
                },
            )
        }

        pub(crate) fn dates(self, start: &str, end: &str) -> Self {
            self.put(
                field::START_DATE,
                ElementValue {
                    selected_date: Some(start.to_string()),
                    ..Default::default()
                },
            )
            .put(
                field::END_DATE,
                ElementValue {
                    selected_date: Some(end.to_string()),
                    ..Default::default()
                },
            )
        }

        pub(crate) fn build(self) -> ViewState {
            self.0
        }
    }

    pub(crate) fn lqs_state(kind: &str, delivery: &str) -> ViewState {
        StateBuilder::default()
            .text(field::LQS_PLACEMENT, "777")
            .text(field::LQS_NETWORK, "506")
            .select(field::LQS_QUERY_TYPE, kind)
            .select(field::LQS_DELIVERY, delivery)
            .dates("2024-02-01", "2024-02-29")
            .build()
    }

    #[test]
    fn test_report_form_parses_codes() {
        let state = StateBuilder::default()
            .many(field::REPORT_COLUMNS, &["option_a", "option_c"])
            .many(field::ORGANIZATIONS, &["org_2"])
            .many(field::PRIORITIES, &["all"])
            .dates("2024-01-01", "2024-01-02")
            .build();
        let form = ReportForm::parse(&state).unwrap();
        assert_eq!(form.report.columns, vec![TicketColumn::Id, TicketColumn::Status]);
        assert_eq!(form.report.organizations, vec![Organization::FoxNetworksGroup]);
    }

    #[test]
    fn test_report_form_missing_and_invalid_fields() {
        let state = StateBuilder::default()
            .many(field::REPORT_COLUMNS, &["option_z"])
            .build();
        let err = ReportForm::parse(&state).unwrap_err();
        assert_eq!(err.block_id(), Some("selected_columns_block"));

        let state = StateBuilder::default()
            .many(field::REPORT_COLUMNS, &["option_a"])
            .build();
        assert_eq!(
            ReportForm::parse(&state).unwrap_err(),
            FormError::MissingField("organization_block")
        );
    }

    #[test]
    fn test_shaper_form_requires_valid_placement() {
        let state = StateBuilder::default()
            .text(field::SHAPER_PLACEMENT, "12ab")
            .build();
        let err = QueryShaperForm::parse(&state).unwrap_err();
        assert_eq!(err.block_id(), Some("placement_id_input"));
        assert_eq!(
            err.to_view_errors().get("placement_id_input").map(String::as_str),
            Some("'12ab' is not a valid placement id (expected a positive integer)")
        );

        let state = StateBuilder::default()
            .text(field::SHAPER_PLACEMENT, "12")
            .build();
        let form = QueryShaperForm::parse(&state).unwrap();
        assert_eq!(form.placement_id.get(), 12);
        assert_eq!(form.network_id, None);
        assert_eq!(form.range, None);
    }

    #[test]
    fn test_shaper_form_half_date_range_is_missing() {
        let state = StateBuilder::default()
            .text(field::SHAPER_PLACEMENT, "12")
            .put(
                field::START_DATE,
                ElementValue {
                    selected_date: Some("2024-01-01".into()),
                    ..Default::default()
                },
            )
            .build();
        assert_eq!(
            QueryShaperForm::parse(&state).unwrap_err(),
            FormError::MissingField("end_date_block")
        );
    }

    #[test]
    fn test_crafter_choice() {
        let state = StateBuilder::default()
            .select(field::CRAFTER_CHOICE, views::CHOICE_LQS)
            .build();
        assert_eq!(CrafterChoice::parse(&state).unwrap(), CrafterChoice::LqsGenerator);
        assert!(CrafterChoice::parse(&ViewState::default()).is_err());
    }

    #[test]
    fn test_lqs_form_round_trips_through_metadata() {
        let form = QueryCrafterForm::parse(&lqs_state("ack", views::DELIVERY_SHOW)).unwrap();
        assert_eq!(form.kind, LqsKind::Ack);
        assert_eq!(form.delivery, Delivery::ShowQuery);

        let metadata = form.to_metadata().unwrap();
        let state = StateBuilder::default()
            .many(field::ACK_COLUMNS, &["request_time", "Impressions"])
            .build();
        let ack = AckColumnsForm::parse(&state, &metadata).unwrap();
        assert_eq!(ack.crafter, form);

        let ReportRequest::Ack(report) = ack.report().unwrap() else {
            panic!("expected an ACK report");
        };
        assert_eq!(report.columns, vec![AckColumn::RequestTime, AckColumn::Impressions]);
    }

    #[test]
    fn test_ack_step_with_lost_metadata() {
        let state = StateBuilder::default()
            .many(field::ACK_COLUMNS, &["request_time"])
            .build();
        assert!(matches!(
            AckColumnsForm::parse(&state, ""),
            Err(FormError::Metadata(_))
        ));
    }

    #[test]
    fn test_lqs_ack_report_without_columns_is_missing() {
        let form = QueryCrafterForm::parse(&lqs_state("ack", views::DELIVERY_RUN)).unwrap();
        assert_eq!(
            form.report(None).unwrap_err(),
            FormError::MissingField("ack_columns_block")
        );
        let form = QueryCrafterForm::parse(&lqs_state("transactions", views::DELIVERY_RUN)).unwrap();
        assert!(matches!(form.report(None).unwrap(), ReportRequest::Transactions(_)));
    }

    #[test]
    fn test_finder_form() {
        let state = StateBuilder::default()
            .text(field::FINDER_KEYWORDS, "placement_id, profile")
            .build();
        assert_eq!(QueryFinderForm::parse(&state).unwrap().finder.keywords.len(), 2);

        let state = StateBuilder::default()
            .text(field::FINDER_KEYWORDS, "drop table;")
            .build();
        assert_eq!(
            QueryFinderForm::parse(&state).unwrap_err().block_id(),
            Some("columns_input_block")
        );
    }
}
