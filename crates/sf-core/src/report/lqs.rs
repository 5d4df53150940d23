//! LQS generator queries over the `fw.default` Presto tables.

use super::{ReportError, ReportQuery};
use crate::params::{DateRange, NetworkId, PlacementId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Total first ad requests for a placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdRequestCount {
    pub placement_id: PlacementId,
    pub network_id: NetworkId,
    pub range: DateRange,
}

impl ReportQuery for AdRequestCount {
    fn title(&self) -> &'static str {
        "Ad Request Count"
    }

    fn sql(&self) -> Result<String, ReportError> {
        let Self {
            placement_id,
            network_id,
            range,
        } = self;
        Ok(format!(
            "SELECT count(1) AS \"Total Ad Requests\"
FROM fw.default.transaction
WHERE request_event_date >= TIMESTAMP '{start} 00:00:00'
AND request_event_date <= TIMESTAMP '{end} 23:59:59'
AND transaction__request__is_first_request = true
AND video_cro_network_id IN ({network_id})
AND cardinality(array_intersect(transaction__request__advertisements__placement_id, ARRAY[{placement_id}])) > 0
ORDER BY \"Total Ad Requests\" DESC
LIMIT 10000",
            start = range.start(),
            end = range.end(),
        ))
    }
}

/// First-request counts per transaction, bucketed in network-local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionsQuery {
    pub placement_id: PlacementId,
    pub network_id: NetworkId,
    pub range: DateRange,
}

impl ReportQuery for TransactionsQuery {
    fn title(&self) -> &'static str {
        "Transactions"
    }

    fn sql(&self) -> Result<String, ReportError> {
        let Self {
            placement_id,
            network_id,
            range,
        } = self;
        Ok(format!(
            "SELECT
    date_format(utc_timestamp_to_local(request_event_date, timezone_of_network({network_id})), '%Y-%m-%d %H:%i:%s') AS \"Date Time\",
    transaction_id AS \"Transaction ID\",
    count(1) AS \"Total Ad Requests\"
FROM fw.default.transaction
WHERE request_event_date >= TIMESTAMP '{start} 00:00:00'
AND request_event_date <= TIMESTAMP '{end} 23:59:59'
AND transaction__request__is_first_request = true
AND cardinality(array_intersect(transaction__request__advertisements__placement_id, ARRAY[{placement_id}])) > 0
GROUP BY 1, 2
ORDER BY \"Total Ad Requests\" DESC
LIMIT 10000",
            start = range.start(),
            end = range.end(),
        ))
    }
}

/// Selectable ACK report columns. Declaration order is select order:
/// dimensions first, then measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AckColumn {
    #[serde(rename = "request_time")]
    RequestTime,
    #[serde(rename = "advertisement_placement_id")]
    PlacementId,
    #[serde(rename = "profile")]
    Profile,
    #[serde(rename = "select_ads")]
    SelectAds,
    #[serde(rename = "fallback_ads")]
    FallbackAds,
    #[serde(rename = "Impressions")]
    Impressions,
    #[serde(rename = "ack_ratio")]
    AckRatio,
}

impl AckColumn {
    pub const ALL: [AckColumn; 7] = [
        Self::RequestTime,
        Self::PlacementId,
        Self::Profile,
        Self::SelectAds,
        Self::FallbackAds,
        Self::Impressions,
        Self::AckRatio,
    ];

    /// Form option value.
    pub fn key(self) -> &'static str {
        match self {
            Self::RequestTime => "request_time",
            Self::PlacementId => "advertisement_placement_id",
            Self::Profile => "profile",
            Self::SelectAds => "select_ads",
            Self::FallbackAds => "fallback_ads",
            Self::Impressions => "Impressions",
            Self::AckRatio => "ack_ratio",
        }
    }

    pub fn is_dimension(self) -> bool {
        matches!(self, Self::RequestTime | Self::PlacementId | Self::Profile)
    }

    fn select_expr(self, network_id: NetworkId) -> String {
        match self {
            Self::RequestTime => format!(
                "date_format(utc_to_networklocal(request_event_date, {network_id}), '%Y-%m-%d') request_time"
            ),
            Self::PlacementId => "advertisement__placement_id".to_string(),
            Self::Profile => "advertisement__request__context__profile_id profile".to_string(),
            Self::SelectAds => {
                "count_if(advertisement__request__is_first_request) select_ads".to_string()
            }
            Self::FallbackAds => "count_if(((bitwise_and(advertisement__flags, 32) > 0) AND advertisement__request__is_first_request)) fallback_ads".to_string(),
            Self::Impressions => "sum(ad_impression) Impressions".to_string(),
            Self::AckRatio => "((1E0 * sum(ad_impression)) / count_if(advertisement__request__is_first_request)) ack_ratio".to_string(),
        }
    }
}

impl FromStr for AckColumn {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.key() == s.trim())
            .ok_or_else(|| ReportError::UnknownOption {
                what: "ack column",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for AckColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Ad acknowledgement report with user-picked columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckReport {
    pub placement_id: PlacementId,
    pub network_id: NetworkId,
    pub range: DateRange,
    pub columns: Vec<AckColumn>,
}

impl ReportQuery for AckReport {
    fn title(&self) -> &'static str {
        "ACK"
    }

    fn sql(&self) -> Result<String, ReportError> {
        let columns: BTreeSet<AckColumn> = self.columns.iter().copied().collect();
        if columns.is_empty() {
            return Err(ReportError::NoColumns("ACK"));
        }
        let network_id = self.network_id;

        let select = columns
            .iter()
            .map(|c| c.select_expr(network_id))
            .collect::<Vec<_>>()
            .join(",\n");
        let mut sql = format!(
            "SELECT\n{select}\nFROM fw.default.advertisement\n\
             WHERE ((request_event_date >= networklocal_to_utc(TIMESTAMP '{start} 00:00:00', {network_id})) \
             AND (request_event_date <= networklocal_to_utc(TIMESTAMP '{end} 23:59:59', {network_id})) \
             AND (advertisement__placement_id = {placement_id}))",
            start = self.range.start(),
            end = self.range.end(),
            placement_id = self.placement_id,
        );

        // Dimensions are selected first, so they occupy ordinals 1..=n.
        let dimensions = columns.iter().filter(|c| c.is_dimension()).count();
        if dimensions > 0 {
            let ordinals = (1..=dimensions)
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!("\nGROUP BY {ordinals}"));
        }
        if columns.contains(&AckColumn::RequestTime) {
            sql.push_str("\nORDER BY request_time ASC");
        }
        Ok(sql)
    }
}
