//! # Criteria Catalog
//!
//! Static mapping from a criteria type (`COUNTRY`, `POSTAL_CODE`, ...) to
//! the warehouse column(s) its predicate applies to and the predicate
//! [`Shape`]. Built once at process start and shared read-only.
//!
//! An unknown type is [`CatalogError::NotFound`]. Callers treat that as
//! "this node contributes no predicate", never as a fatal error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// How a criteria type renders its predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// `col IN (...)` / `col NOT IN (...)` over a scalar column.
    ScalarIn,
    /// `cardinality(array_intersect(col, ARRAY[...])) > 0` / `= 0` over an
    /// array column.
    ArrayIntersect,
    /// Two scalar columns: `a IN (...) OR b IN (...)` when inclusive,
    /// `a NOT IN (...) AND b NOT IN (...)` when negated.
    Asset,
}

impl Shape {
    /// Number of target columns the shape renders.
    pub fn column_count(self) -> usize {
        match self {
            Self::ScalarIn | Self::ArrayIntersect => 1,
            Self::Asset => 2,
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScalarIn => write!(f, "scalar_in"),
            Self::ArrayIntersect => write!(f, "array_intersect"),
            Self::Asset => write!(f, "asset"),
        }
    }
}

/// Predicate template metadata for one criteria type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaTypeSpec {
    pub type_id: String,
    pub shape: Shape,
    pub target_columns: Vec<String>,
}

impl CriteriaTypeSpec {
    pub fn new(type_id: &str, shape: Shape, target_columns: &[&str]) -> Self {
        Self {
            type_id: type_id.to_string(),
            shape,
            target_columns: target_columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Check the column list against the shape.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.target_columns.is_empty() || self.target_columns.iter().any(|c| c.trim().is_empty())
        {
            return Err(CatalogError::NoColumns(self.type_id.clone()));
        }
        let expected = self.shape.column_count();
        if self.target_columns.len() != expected {
            return Err(CatalogError::ColumnArity {
                type_id: self.type_id.clone(),
                shape: self.shape,
                expected,
                actual: self.target_columns.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown criteria type '{0}'")]
    NotFound(String),
    #[error("criteria type '{0}' is defined more than once")]
    DuplicateType(String),
    #[error("criteria type '{0}' has no target columns")]
    NoColumns(String),
    #[error("criteria type '{type_id}' has shape {shape} which needs {expected} column(s), got {actual}")]
    ColumnArity {
        type_id: String,
        shape: Shape,
        expected: usize,
        actual: usize,
    },
}

use Shape::{ArrayIntersect, Asset, ScalarIn};

/// Every criteria type the targeting tables are known to carry.
const BUILTIN: &[(&str, Shape, &[&str])] = &[
    ("COUNTRY", ScalarIn, &["transaction__request__visitor__country_id"]),
    ("STATE", ScalarIn, &["transaction__request__visitor__state_id"]),
    ("CITY", ScalarIn, &["transaction__request__visitor__city_id"]),
    ("DMA", ScalarIn, &["transaction__request__visitor__dma_code_id"]),
    (
        "USER_AGENT_DEVICE",
        ScalarIn,
        &["transaction__request__visitor__user_agent_device_id"],
    ),
    (
        "STANDARD_PUBLISHER",
        ScalarIn,
        &["transaction__request__context__standard_publisher_id"],
    ),
    (
        "STANDARD_APP",
        ScalarIn,
        &["transaction__request__context__standard_app_id"],
    ),
    (
        "STANDARD_SITE_DOMAIN",
        ScalarIn,
        &["transaction__request__context__standard_site_domain_id"],
    ),
    (
        "STANDARD_SUBSCRIPTION_MODEL",
        ScalarIn,
        &["transaction__request__context__standard_content_subscription_model_id"],
    ),
    (
        "STANDARD_CONTENT_CREDENTIAL_STATUS",
        ScalarIn,
        &["transaction__request__context__standard_content_credential_status_id"],
    ),
    (
        "STANDARD_OPERATOR",
        ScalarIn,
        &["transaction__request__visitor__standard_operator_id"],
    ),
    (
        "DAY_PART",
        ScalarIn,
        &["transaction__request__context__standard_content_daypart_id"],
    ),
    (
        "STANDARD_OS",
        ScalarIn,
        &["transaction__request__visitor__platform_os_id"],
    ),
    (
        "STANDARD_CONTENT_CHANNEL",
        ScalarIn,
        &["transaction__request__context__standard_channel_id"],
    ),
    (
        "SITE_SECTION",
        ScalarIn,
        &["transaction__request__context__site_section_id"],
    ),
    ("ASSET", Asset, &["video_cro_asset_id", "distributor_asset_id"]),
    (
        "POSTAL_CODE",
        ArrayIntersect,
        &["transaction__request__visitor__postal_code_id"],
    ),
    (
        "POSTAL_CODE_PACKAGE",
        ArrayIntersect,
        &["transaction__request__visitor__postal_code_package__postal_code_package_id"],
    ),
    (
        "AUDIENCE_ITEM",
        ArrayIntersect,
        &["transaction__request__audience_item__audience_item_id"],
    ),
    (
        "STANDARD_DEVICE",
        ArrayIntersect,
        &["transaction__request__visitor__standard_device_type_ids"],
    ),
    (
        "STANDARD_GENRE",
        ArrayIntersect,
        &["transaction__request__context__standard_genre_ids"],
    ),
    (
        "STREAM_MODE",
        ArrayIntersect,
        &["transaction__request__context__stream_mode_ids"],
    ),
    (
        "MKPL_LISTING",
        ArrayIntersect,
        &["transaction__request__slots__listing_id"],
    ),
    (
        "AUCTION_NETWORK",
        ArrayIntersect,
        &["transaction__request__auction_network_contexts__auction_network_id"],
    ),
    (
        "DEVICE_TYPE",
        ArrayIntersect,
        &["transaction__request__visitor__standard_device_type_ids"],
    ),
    (
        "STANDARD_IAB_CATEGORY",
        ArrayIntersect,
        &["transaction__request__context__standard_iab_category_ids"],
    ),
    (
        "ASSET_GROUP",
        ArrayIntersect,
        &["transaction__request__inventory_group__group_id"],
    ),
    (
        "SITE_SECTION_GROUP",
        ArrayIntersect,
        &["transaction__request__inventory_group__group_id"],
    ),
    (
        "STANDARD_ENVIRONMENT",
        ScalarIn,
        &["transaction__request__visitor__standard_environment_id"],
    ),
    (
        "ENDPOINT_OWNER",
        ScalarIn,
        &["transaction__request__context__standard_endpoint_owner_id"],
    ),
    (
        "IP_ENABLED_AUDIENCE",
        ScalarIn,
        &["transaction__request__context__ip_enabled_audience_id"],
    ),
    (
        "INVENTORY_LOCATION",
        ScalarIn,
        &["transaction__request__context__inventory_location_id"],
    ),
    (
        "STANDARD_CONTENT_TERRITORY",
        ScalarIn,
        &["transaction__request__context__standard_content_territory_id"],
    ),
    (
        "STANDARD_CONTENT_DAYPART",
        ScalarIn,
        &["transaction__request__context__standard_content_daypart_id"],
    ),
    ("ISP", ScalarIn, &["transaction__request__visitor__isp_id"]),
    (
        "STANDARD_CONTENT_LANGUAGE",
        ArrayIntersect,
        &["transaction__request__context__standard_language_ids"],
    ),
    (
        "INVENTORY_OWNER",
        ArrayIntersect,
        &["transaction__request__slots__carriage_inventory_owner_id"],
    ),
    (
        "INVENTORY_PACKAGE",
        ArrayIntersect,
        &["transaction__request__slots__network__network_execution_ctx__inventory_package_ids"],
    ),
    (
        "INVENTORY_SOURCE",
        ScalarIn,
        &["transaction__request__bidding_context__bid_request__inventory_source"],
    ),
    (
        "STANDARD_CONTENT_RATING",
        ScalarIn,
        &["transaction__request__context__content_rating_id"],
    ),
    (
        "STANDARD_CONTENT_FORM",
        ScalarIn,
        &["transaction__request__context__content_form_id"],
    ),
    (
        "TV_NETWORK",
        ScalarIn,
        &["transaction__request__context__tv_network_id"],
    ),
];

/// Read-only criteria type table, keyed by `type_id`.
#[derive(Debug, Clone)]
pub struct Catalog {
    specs: BTreeMap<String, CriteriaTypeSpec>,
}

impl Catalog {
    /// The built-in table.
    pub fn builtin() -> Self {
        let specs = BUILTIN
            .iter()
            .map(|(type_id, shape, columns)| {
                (
                    type_id.to_string(),
                    CriteriaTypeSpec::new(type_id, *shape, columns),
                )
            })
            .collect();
        Self { specs }
    }

    /// Build a catalog from an arbitrary list, validating every entry.
    pub fn from_specs(
        specs: impl IntoIterator<Item = CriteriaTypeSpec>,
    ) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for spec in specs {
            spec.validate()?;
            if map.contains_key(&spec.type_id) {
                return Err(CatalogError::DuplicateType(spec.type_id));
            }
            map.insert(spec.type_id.clone(), spec);
        }
        Ok(Self { specs: map })
    }

    /// Layer extra entries over this catalog. An entry whose `type_id`
    /// already exists replaces it; duplicates within `overrides` are rejected.
    pub fn with_overrides(
        mut self,
        overrides: impl IntoIterator<Item = CriteriaTypeSpec>,
    ) -> Result<Self, CatalogError> {
        let overrides = Self::from_specs(overrides)?;
        for (type_id, spec) in overrides.specs {
            if self.specs.insert(type_id.clone(), spec).is_some() {
                tracing::info!("Criteria type '{}' overridden by configuration", type_id);
            }
        }
        Ok(self)
    }

    pub fn lookup(&self, type_id: &str) -> Result<&CriteriaTypeSpec, CatalogError> {
        self.specs
            .get(type_id)
            .ok_or_else(|| CatalogError::NotFound(type_id.to_string()))
    }

    /// Entries in `type_id` order.
    pub fn iter(&self) -> impl Iterator<Item = &CriteriaTypeSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
