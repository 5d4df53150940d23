//! In-memory stand-ins for Slack, the warehouse and the criteria source.

use crate::config::HubConfig;
use crate::export::Exporter;
use crate::slack::client::{ChatClient, ChatError};
use crate::slack::signature::SignatureVerifier;
use crate::warehouse::{QueryOutput, Warehouse, WarehouseError};
use crate::AppState;
use serde_json::Value;
use sf_core::{
    Catalog, CriteriaRow, CriteriaSource, EmptyValuePolicy, PlacementId, Relation, Resolver,
    SourceError,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatCall {
    OpenView { trigger_id: String, view: Value },
    UpdateView { view_id: String, hash: Option<String>, view: Value },
    Message { channel: String, text: String },
    Blocks { channel: String, text: String, blocks: Value },
}

#[derive(Default)]
pub struct FakeChat {
    pub calls: Mutex<Vec<ChatCall>>,
}

impl FakeChat {
    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Message { text, .. } | ChatCall::Blocks { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ChatCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl ChatClient for FakeChat {
    async fn open_view(&self, trigger_id: &str, view: Value) -> Result<(), ChatError> {
        self.record(ChatCall::OpenView {
            trigger_id: trigger_id.into(),
            view,
        });
        Ok(())
    }

    async fn update_view(
        &self,
        view_id: &str,
        hash: Option<&str>,
        view: Value,
    ) -> Result<(), ChatError> {
        self.record(ChatCall::UpdateView {
            view_id: view_id.into(),
            hash: hash.map(str::to_string),
            view,
        });
        Ok(())
    }

    async fn open_dm(&self, user_id: &str) -> Result<String, ChatError> {
        Ok(format!("D-{}", user_id))
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatError> {
        self.record(ChatCall::Message {
            channel: channel.into(),
            text: text.into(),
        });
        Ok(())
    }

    async fn post_blocks(&self, channel: &str, text: &str, blocks: Value) -> Result<(), ChatError> {
        self.record(ChatCall::Blocks {
            channel: channel.into(),
            text: text.into(),
            blocks,
        });
        Ok(())
    }
}

/// Answers every statement with the same output, or fails when `output`
/// is `None`.
#[derive(Default)]
pub struct FakeWarehouse {
    pub output: Option<QueryOutput>,
    pub executed: Mutex<Vec<String>>,
}

impl FakeWarehouse {
    pub fn answering(output: QueryOutput) -> Self {
        Self {
            output: Some(output),
            executed: Mutex::default(),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Warehouse for FakeWarehouse {
    async fn execute(&self, sql: &str) -> Result<QueryOutput, WarehouseError> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.output
            .clone()
            .ok_or_else(|| WarehouseError::Query("warehouse unavailable".into()))
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub trees: HashMap<u64, Vec<CriteriaRow>>,
}

impl CriteriaSource for FakeSource {
    fn fetch_criteria_rows(&self, placement_id: PlacementId) -> Result<Vec<CriteriaRow>, SourceError> {
        Ok(self.trees.get(&placement_id.get()).cloned().unwrap_or_default())
    }
}

pub fn row(node_id: i64, type_id: &str, value: &str) -> CriteriaRow {
    CriteriaRow {
        node_id,
        node_name: format!("node {}", node_id),
        criteria_type_id: Some(type_id.to_string()),
        relation: Relation::And,
        negative: false,
        value: Some(value.to_string()),
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub chat: Arc<FakeChat>,
    /// Presto stand-in.
    pub warehouse: Arc<FakeWarehouse>,
    /// Snowflake stand-in; fails every statement unless built with output.
    pub operational: Arc<FakeWarehouse>,
}

pub fn harness(export_dir: &Path, source: FakeSource, warehouse: FakeWarehouse) -> Harness {
    build(export_dir, source, warehouse, FakeWarehouse::default(), None)
}

pub fn operational_harness(export_dir: &Path, operational: FakeWarehouse) -> Harness {
    build(
        export_dir,
        FakeSource::default(),
        FakeWarehouse::default(),
        operational,
        None,
    )
}

pub fn signed_harness(export_dir: &Path, verifier: SignatureVerifier) -> Harness {
    build(
        export_dir,
        FakeSource::default(),
        FakeWarehouse::default(),
        FakeWarehouse::default(),
        Some(verifier),
    )
}

fn build(
    export_dir: &Path,
    source: FakeSource,
    warehouse: FakeWarehouse,
    operational: FakeWarehouse,
    signature: Option<SignatureVerifier>,
) -> Harness {
    let chat = Arc::new(FakeChat::default());
    let warehouse = Arc::new(warehouse);
    let operational = Arc::new(operational);
    let resolver = Resolver::new(
        Arc::new(Catalog::builtin()),
        Arc::new(source),
        EmptyValuePolicy::Fail,
    );
    let state = Arc::new(AppState {
        config: HubConfig::default(),
        resolver: Arc::new(resolver),
        warehouse: warehouse.clone(),
        operational: operational.clone(),
        chat: chat.clone(),
        exporter: Exporter::new(export_dir, "https://bot.example.com"),
        signature,
        start_time: Instant::now(),
    });
    Harness {
        state,
        chat,
        warehouse,
        operational,
    }
}
