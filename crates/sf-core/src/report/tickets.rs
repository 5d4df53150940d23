//! Zendesk support ticket report.

use super::{sql_literal, Engine, ReportError, ReportQuery};
use crate::params::DateRange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Generates the option-code lookup shared by the ticket enums.
macro_rules! option_codes {
    ($ty:ident, $what:literal, { $($variant:ident => $code:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Form option value.
            pub fn code(self) -> &'static str {
                match self {
                    $($ty::$variant => $code),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ReportError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($code => Ok($ty::$variant),)+
                    other => Err(ReportError::UnknownOption {
                        what: $what,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TicketColumn {
    #[serde(rename = "option_a")]
    Id,
    #[serde(rename = "option_b")]
    Priority,
    #[serde(rename = "option_c")]
    Status,
    #[serde(rename = "option_d")]
    Subject,
    #[serde(rename = "option_e")]
    DateOpen,
    #[serde(rename = "option_f")]
    DateClosed,
}

option_codes!(TicketColumn, "ticket column", {
    Id => "option_a",
    Priority => "option_b",
    Status => "option_c",
    Subject => "option_d",
    DateOpen => "option_e",
    DateClosed => "option_f",
});

impl TicketColumn {
    pub fn label(self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Priority => "Priority",
            Self::Status => "Status",
            Self::Subject => "Subject",
            Self::DateOpen => "Date open",
            Self::DateClosed => "Date closed",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Self::Id => "t.id",
            Self::Priority => "t.priority",
            Self::Status => "t.status",
            Self::Subject => "t.subject",
            Self::DateOpen => "t.created_at",
            // Zendesk has no closed-at column; last update is the closest.
            Self::DateClosed => "t.updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Organization {
    #[serde(rename = "org_1")]
    NbcUniversal,
    #[serde(rename = "org_2")]
    FoxNetworksGroup,
    #[serde(rename = "org_3")]
    CharterCommunications,
    #[serde(rename = "org_4")]
    Paramount,
    #[serde(rename = "org_5")]
    ViacomUs,
    #[serde(rename = "org_6")]
    AlticeUsa,
    #[serde(rename = "org_7")]
    BritishSkyBroadcasting,
    #[serde(rename = "org_8")]
    WarnerBrothersDiscovery,
    #[serde(rename = "org_9")]
    Channel4,
    #[serde(rename = "org_10")]
    Abc,
}

option_codes!(Organization, "organization", {
    NbcUniversal => "org_1",
    FoxNetworksGroup => "org_2",
    CharterCommunications => "org_3",
    Paramount => "org_4",
    ViacomUs => "org_5",
    AlticeUsa => "org_6",
    BritishSkyBroadcasting => "org_7",
    WarnerBrothersDiscovery => "org_8",
    Channel4 => "org_9",
    Abc => "org_10",
});

impl Organization {
    /// Organization name as stored in Zendesk.
    pub fn name(self) -> &'static str {
        match self {
            Self::NbcUniversal => "NBC Universal",
            Self::FoxNetworksGroup => "Fox Networks Group",
            Self::CharterCommunications => "Charter Communications",
            Self::Paramount => "Paramount",
            Self::ViacomUs => "Viacom US",
            Self::AlticeUsa => "Altice USA",
            Self::BritishSkyBroadcasting => "British Sky Broadcasting",
            Self::WarnerBrothersDiscovery => "Warner Brothers Discovery",
            Self::Channel4 => "Channel 4",
            Self::Abc => "ABC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    All,
    Urgent,
    High,
    Medium,
    Low,
}

option_codes!(TicketPriority, "priority", {
    All => "all",
    Urgent => "urgent",
    High => "high",
    Medium => "medium",
    Low => "low",
});

impl TicketPriority {
    pub fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Urgent => "Urgent",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

/// Tickets opened in a date range for a set of organizations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketReport {
    pub columns: Vec<TicketColumn>,
    pub organizations: Vec<Organization>,
    /// Empty, or containing [`TicketPriority::All`], means no priority filter.
    #[serde(default)]
    pub priorities: Vec<TicketPriority>,
    pub range: DateRange,
}

impl ReportQuery for TicketReport {
    fn title(&self) -> &'static str {
        "Ticket Report"
    }

    fn engine(&self) -> Engine {
        Engine::Snowflake
    }

    fn sql(&self) -> Result<String, ReportError> {
        let columns: BTreeSet<TicketColumn> = self.columns.iter().copied().collect();
        if columns.is_empty() {
            return Err(ReportError::NoColumns("ticket"));
        }
        let organizations: BTreeSet<Organization> = self.organizations.iter().copied().collect();
        if organizations.is_empty() {
            return Err(ReportError::NoOrganizations);
        }

        let select = columns
            .iter()
            .map(|c| format!("{} AS \"{}\"", c.source(), c.label()))
            .collect::<Vec<_>>()
            .join(", ");
        let names = organizations
            .iter()
            .map(|o| sql_literal(o.name()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT {select}
FROM FW_OPERATIONAL_DATA.FIVETRAN_ZENDESK_SUPPORT.TICKET t
JOIN FW_OPERATIONAL_DATA.FIVETRAN_ZENDESK_SUPPORT.ORGANIZATION o
ON t.organization_id = o.id
WHERE o.name IN ({names})"
        );

        let priorities: BTreeSet<TicketPriority> = self.priorities.iter().copied().collect();
        if !priorities.is_empty() && !priorities.contains(&TicketPriority::All) {
            let list = priorities
                .iter()
                .map(|p| sql_literal(p.code()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!("\nAND t.priority IN ({list})"));
        }
        sql.push_str(&format!(
            "\nAND DATE(t.created_at) BETWEEN DATE '{}' AND DATE '{}'",
            self.range.start(),
            self.range.end()
        ));
        Ok(sql)
    }
}
