// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! External collaborators of the router, referenced by interface only:
//! the SQL planner, the tablet RPC client and the name-server client.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common_types::{
    datum::{Datum, DatumKind},
    schema::{self, ColumnSchema, Schema},
};

use crate::GenericError;

pub type PlannerRef = Arc<dyn Planner>;
pub type TabletClientRef = Arc<dyn TabletClient>;
pub type MetaClientRef = Arc<dyn MetaClient>;

/// Metadata of one table version resolved through the name server.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub tid: u32,
    pub name: String,
    pub partition_num: u32,
    pub columns: Vec<ColumnInfo>,
    /// Secondary index dimensions; each put fans out one dimension key per
    /// index.
    pub indexes: Vec<IndexInfo>,
    /// Index of the time column.
    pub ts_index: usize,
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DatumKind,
    pub is_nullable: bool,
    /// Declared default, taken by inserts that omit the column.
    pub default_value: Option<Datum>,
}

#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub idx_id: u32,
    /// Index of the indexed column in the table schema.
    pub column_index: usize,
}

impl TableInfo {
    pub fn to_schema(&self) -> schema::Result<Schema> {
        Schema::new(
            self.columns
                .iter()
                .map(|c| ColumnSchema::new(c.name.clone(), c.data_type, c.is_nullable))
                .collect(),
        )
    }
}

/// Output of planning a SQL in request mode.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub input_schema: Arc<Schema>,
    pub output_schema: Arc<Schema>,
    pub dependent_tables: Vec<String>,
    /// The plan's primary data provider.
    pub main_table: String,
}

/// Table dependency set of a batch-mode plan. An empty set marks a const
/// query that any tablet can serve.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub dependent_tables: Vec<String>,
    /// Set when the plan has more than one dependency.
    pub main_table: Option<String>,
}

/// One cell of a parsed INSERT statement.
#[derive(Debug, Clone)]
pub enum InsertValue {
    /// A `?` bound per row through the insert row builder.
    Placeholder,
    Null,
    Literal(Datum),
}

/// A parsed INSERT statement.
#[derive(Debug, Clone)]
pub struct InsertStmt {
    pub table: String,
    /// Explicit column list, empty when the statement has none.
    pub columns: Vec<String>,
    pub values: Vec<InsertValue>,
}

/// Client-side SQL planner.
pub trait Planner: Send + Sync {
    fn plan_request(&self, db: &str, sql: &str) -> Result<RequestPlan, GenericError>;

    fn plan_query(&self, db: &str, sql: &str) -> Result<QueryPlan, GenericError>;

    fn plan_insert(&self, db: &str, sql: &str) -> Result<InsertStmt, GenericError>;
}

/// RPC client of one tablet server.
#[async_trait]
pub trait TabletClient: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn query(&self, req: pb_types::QueryRequest)
        -> Result<pb_types::QueryResponse, GenericError>;

    async fn batch_query(
        &self,
        req: pb_types::BatchQueryRequest,
    ) -> Result<pb_types::BatchQueryResponse, GenericError>;

    async fn put(&self, req: pb_types::PutRequest) -> Result<pb_types::PutResponse, GenericError>;

    async fn call_procedure(
        &self,
        db: &str,
        name: &str,
        input_row: Bytes,
        timeout_ms: u64,
        is_debug: bool,
    ) -> Result<pb_types::QueryResponse, GenericError>;
}

/// Name-server client: table and procedure metadata, tablet discovery.
pub trait MetaClient: Send + Sync {
    fn table_info(&self, db: &str, table: &str) -> Option<Arc<TableInfo>>;

    /// Tablets owning the table's partitions, indexed by partition id.
    fn table_tablets(&self, db: &str, table: &str) -> Vec<TabletClientRef>;

    /// The tablet serving queries over the table.
    fn table_owner(&self, db: &str, table: &str) -> Option<TabletClientRef>;

    /// Any healthy tablet, for const queries.
    fn any_tablet(&self) -> Option<TabletClientRef>;

    fn procedure_info(&self, db: &str, name: &str) -> Option<pb_types::ProcedureInfo>;

    fn create_procedure(&self, info: pb_types::ProcedureInfo) -> Result<(), GenericError>;

    /// Re-pull the cluster metadata, returns false when the pull failed.
    fn refresh(&self) -> bool;
}
