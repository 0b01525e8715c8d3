// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! The cluster router translates SQL calls into segment puts or RPC to the
//! tablet owning the target partition.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use common_types::{
    datum::{Datum, DatumKind, Date},
    time::Timestamp,
};
use log::warn;
use serde::Deserialize;
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use tokio::sync::oneshot;

use crate::{
    client::{InsertValue, MetaClientRef, PlannerRef, TableInfo, TabletClientRef},
    plan_cache::{CachedPlan, PlanCache},
    result_set::{self, BatchResultSet, ResultSetSql},
    row_builder::{self, SqlInsertRow, SqlRequestRow, SqlRequestRowBatch},
    schema_adapter::schema_to_pb,
    GenericError,
};

#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
pub enum Error {
    #[snafu(display("Failed to plan sql, sql:{}, err:{}", sql, source))]
    PlanError { sql: String, source: GenericError },

    #[snafu(display(
        "Table not found, db:{}, table:{}.\nBacktrace:\n{}",
        db,
        table,
        backtrace
    ))]
    TableNotFound {
        db: String,
        table: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Invalid table schema, table:{}, err:{}", table, source))]
    BadSchema {
        table: String,
        source: common_types::schema::Error,
    },

    #[snafu(display("Invalid insert statement, {}.\nBacktrace:\n{}", reason, backtrace))]
    InsertShape { reason: String, backtrace: Backtrace },

    #[snafu(display(
        "Unsupported default value coercion, column:{}, expect:{}, given:{}.\nBacktrace:\n{}",
        column,
        expect,
        given,
        backtrace
    ))]
    TypeMismatch {
        column: String,
        expect: DatumKind,
        given: DatumKind,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "Null value for non-nullable column, column:{}.\nBacktrace:\n{}",
        column,
        backtrace
    ))]
    NotNull { column: String, backtrace: Backtrace },

    #[snafu(display(
        "Insert is not prepared, call get_insert_row first, sql:{}.\nBacktrace:\n{}",
        sql,
        backtrace
    ))]
    NotPrepared { sql: String, backtrace: Backtrace },

    #[snafu(display(
        "No tablet serves the target, db:{}, table:{}.\nBacktrace:\n{}",
        db,
        table,
        backtrace
    ))]
    NoTablet {
        db: String,
        table: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Rpc failed, err:{}", source))]
    RpcError { source: GenericError },

    #[snafu(display(
        "Put was rejected by the tablet, pid:{}, code:{}, msg:{}.\nBacktrace:\n{}",
        pid,
        code,
        msg,
        backtrace
    ))]
    PutFailed {
        pid: u32,
        code: i32,
        msg: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to build row, err:{}", source))]
    BuildRow { source: row_builder::Error },

    #[snafu(display("Failed to read result set, err:{}", source))]
    ResultSet { source: result_set::Error },

    #[snafu(display(
        "Procedure not found, db:{}, name:{}.\nBacktrace:\n{}",
        db,
        name,
        backtrace
    ))]
    ProcedureNotFound {
        db: String,
        name: String,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "Procedure already exists, db:{}, name:{}.\nBacktrace:\n{}",
        db,
        name,
        backtrace
    ))]
    DuplicateProcedure {
        db: String,
        name: String,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "Procedure parameter mismatches the inferred input schema, expect:{}, given:{}.\nBacktrace:\n{}",
        expect,
        given,
        backtrace
    ))]
    ParameterMismatch {
        expect: String,
        given: String,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

pub const DEFAULT_SQL_CACHE_SIZE: usize = 50;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Capacity of the per-database plan cache.
    pub max_sql_cache_size: usize,
    /// Forward debug flags to the tablets.
    pub enable_debug: bool,
    /// Timeout of procedure calls without an explicit one.
    pub request_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_sql_cache_size: DEFAULT_SQL_CACHE_SIZE,
            enable_debug: false,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

/// Client-side router of one cluster.
pub struct ClusterRouter {
    planner: PlannerRef,
    meta: MetaClientRef,
    cache: PlanCache,
    config: RouterConfig,
    runtime: Arc<tokio::runtime::Runtime>,
}

impl ClusterRouter {
    pub fn new(
        planner: PlannerRef,
        meta: MetaClientRef,
        config: RouterConfig,
        runtime: Arc<tokio::runtime::Runtime>,
    ) -> Self {
        let cache = PlanCache::new(config.max_sql_cache_size);
        Self {
            planner,
            meta,
            cache,
            config,
            runtime,
        }
    }

    /// Plan `sql` in request mode and return a builder keyed by the plan's
    /// input schema.
    pub fn get_request_row(&self, db: &str, sql: &str) -> Result<SqlRequestRow> {
        if let Some(plan) = self.cache.get(db, sql) {
            if let CachedPlan::Request { input_schema } = plan.as_ref() {
                return Ok(SqlRequestRow::new(input_schema.clone()));
            }
        }
        let plan = self
            .planner
            .plan_request(db, sql)
            .context(PlanError { sql })?;
        let input_schema = plan.input_schema.clone();
        self.cache.put(
            db,
            sql,
            Arc::new(CachedPlan::Request {
                input_schema: input_schema.clone(),
            }),
        );
        Ok(SqlRequestRow::new(input_schema))
    }

    /// Parse an INSERT and return a builder pre-populated with defaults
    /// for every column the statement covers.
    pub fn get_insert_row(&self, db: &str, sql: &str) -> Result<SqlInsertRow> {
        if let Some(plan) = self.cache.get(db, sql) {
            if let CachedPlan::Insert {
                table_info,
                schema,
                default_map,
                ..
            } = plan.as_ref()
            {
                return Ok(SqlInsertRow::new(
                    table_info.clone(),
                    schema.clone(),
                    default_map,
                ));
            }
        }

        let stmt = self
            .planner
            .plan_insert(db, sql)
            .context(PlanError { sql })?;
        let table_info = self.meta.table_info(db, &stmt.table).context(TableNotFound {
            db,
            table: stmt.table.clone(),
        })?;
        let schema = Arc::new(table_info.to_schema().context(BadSchema {
            table: stmt.table.clone(),
        })?);

        // Map table column index -> position in the VALUES list.
        let column_map = build_column_map(&table_info, &stmt.columns)?;
        let expect_values = if stmt.columns.is_empty() {
            table_info.columns.len()
        } else {
            stmt.columns.len()
        };
        ensure!(
            stmt.values.len() >= expect_values,
            InsertShape {
                reason: format!(
                    "insert value number less than column number, expect:{}, given:{}",
                    expect_values,
                    stmt.values.len()
                ),
            }
        );
        ensure!(
            stmt.values.len() <= expect_values,
            InsertShape {
                reason: format!(
                    "insert value number exceeds column number, expect:{}, given:{}",
                    expect_values,
                    stmt.values.len()
                ),
            }
        );

        let mut default_str_len = 0u32;
        let default_map = Arc::new(build_default_map(
            &table_info,
            &column_map,
            &stmt.values,
            &mut default_str_len,
        )?);

        let row = SqlInsertRow::new(table_info.clone(), schema.clone(), &default_map);
        self.cache.put(
            db,
            sql,
            Arc::new(CachedPlan::Insert {
                table_info,
                schema,
                default_map,
                default_str_len,
            }),
        );
        Ok(row)
    }

    fn tablet_for_query(&self, db: &str, sql: &str) -> Result<TabletClientRef> {
        let plan = self
            .planner
            .plan_query(db, sql)
            .context(PlanError { sql })?;
        // Const query: any tablet can serve it. One dependency: its owner.
        // Several dependencies: the owner of the plan's main table.
        let (client, table) = if plan.dependent_tables.is_empty() {
            (self.meta.any_tablet(), "<any>".to_string())
        } else if plan.dependent_tables.len() == 1 {
            let table = plan.dependent_tables[0].clone();
            (self.meta.table_owner(db, &table), table)
        } else {
            let table = plan
                .main_table
                .clone()
                .unwrap_or_else(|| plan.dependent_tables[0].clone());
            (self.meta.table_owner(db, &table), table)
        };
        client.context(NoTablet { db, table })
    }

    /// Execute `sql` on the owning tablet and wrap the response in a
    /// result set. A non-zero server code is surfaced through the result
    /// set, not as an error.
    pub fn execute_sql(&self, db: &str, sql: &str, row: Option<&SqlRequestRow>) -> Result<ResultSetSql> {
        let client = self.tablet_for_query(db, sql)?;
        let input_row = match row {
            Some(row) => row.build().context(BuildRow)?,
            None => Bytes::new(),
        };
        let request = pb_types::QueryRequest {
            db: db.to_string(),
            sql: sql.to_string(),
            input_row,
            is_debug: self.config.enable_debug,
        };
        let response = self
            .runtime
            .block_on(client.query(request))
            .context(RpcError)?;
        if response.code != pb_types::CODE_OK {
            warn!(
                "query was rejected by tablet, db:{}, sql:{}, code:{}, msg:{}",
                db, sql, response.code, response.msg
            );
        }
        ResultSetSql::new(response).context(ResultSet)
    }

    /// Batch-request form of [Self::execute_sql].
    pub fn execute_batch(
        &self,
        db: &str,
        sql: &str,
        batch: &SqlRequestRowBatch,
    ) -> Result<BatchResultSet> {
        let client = self.tablet_for_query(db, sql)?;
        let request = batch.to_request(db, sql, self.config.enable_debug);
        let response = self
            .runtime
            .block_on(client.batch_query(request))
            .context(RpcError)?;
        BatchResultSet::new(response).context(ResultSet)
    }

    /// Put every row into the tablets owning its partitions.
    ///
    /// Failures are fail-fast: the first partition that fails aborts the
    /// batch.
    pub fn execute_insert(&self, db: &str, sql: &str, rows: &[SqlInsertRow]) -> Result<()> {
        let plan = self.cache.get(db, sql).context(NotPrepared { sql })?;
        let table_info = match plan.as_ref() {
            CachedPlan::Insert { table_info, .. } => table_info.clone(),
            CachedPlan::Request { .. } => return NotPrepared { sql }.fail(),
        };
        let tablets = self.meta.table_tablets(db, &table_info.name);
        ensure!(
            !tablets.is_empty(),
            NoTablet {
                db,
                table: table_info.name.clone(),
            }
        );

        for row in rows {
            let value = row.build().context(BuildRow)?;
            let time = row.time().context(BuildRow)?;
            for (pid, dimensions) in row.dimensions().context(BuildRow)? {
                let client = tablets.get(pid as usize).context(NoTablet {
                    db,
                    table: table_info.name.clone(),
                })?;
                let request = pb_types::PutRequest {
                    tid: table_info.tid,
                    pid,
                    time,
                    dimensions,
                    value: value.clone(),
                };
                let response = self
                    .runtime
                    .block_on(client.put(request))
                    .context(RpcError)?;
                if response.code != pb_types::CODE_OK {
                    warn!(
                        "put was rejected by tablet, db:{}, table:{}, pid:{}, code:{}, msg:{}",
                        db, table_info.name, pid, response.code, response.msg
                    );
                    return PutFailed {
                        pid,
                        code: response.code,
                        msg: response.msg,
                    }
                    .fail();
                }
            }
        }
        Ok(())
    }

    fn procedure_tablet(&self, db: &str, name: &str) -> Result<(pb_types::ProcedureInfo, TabletClientRef)> {
        let info = self
            .meta
            .procedure_info(db, name)
            .context(ProcedureNotFound { db, name })?;
        let client = self
            .meta
            .table_owner(db, &info.main_table)
            .context(NoTablet {
                db,
                table: info.main_table.clone(),
            })?;
        Ok((info, client))
    }

    /// Call a stored procedure and block for its result set.
    pub fn call_procedure(
        &self,
        db: &str,
        name: &str,
        row: &SqlRequestRow,
        timeout_ms: Option<u64>,
    ) -> Result<ResultSetSql> {
        let (_, client) = self.procedure_tablet(db, name)?;
        let input_row = row.build().context(BuildRow)?;
        let timeout_ms = timeout_ms.unwrap_or(self.config.request_timeout_ms);
        let response = self
            .runtime
            .block_on(client.call_procedure(db, name, input_row, timeout_ms, self.config.enable_debug))
            .context(RpcError)?;
        ResultSetSql::new(response).context(ResultSet)
    }

    /// Call a stored procedure asynchronously; the returned handle resolves
    /// to the result set.
    pub fn call_procedure_async(
        &self,
        db: &str,
        name: &str,
        row: &SqlRequestRow,
        timeout_ms: Option<u64>,
    ) -> Result<QueryFuture> {
        let (_, client) = self.procedure_tablet(db, name)?;
        let input_row = row.build().context(BuildRow)?;
        let timeout_ms = timeout_ms.unwrap_or(self.config.request_timeout_ms);
        let is_debug = self.config.enable_debug;
        let db = db.to_string();
        let name = name.to_string();

        let (tx, rx) = oneshot::channel();
        self.runtime.spawn(async move {
            let result = client
                .call_procedure(&db, &name, input_row, timeout_ms, is_debug)
                .await;
            // The receiver may be gone, nothing to do then.
            let _ = tx.send(result);
        });
        Ok(QueryFuture { rx, received: None })
    }

    /// Plan `sql` in request mode, check the declared input parameters
    /// against the inferred input schema and register the procedure with
    /// the name server.
    pub fn create_procedure(
        &self,
        db: &str,
        name: &str,
        sql: &str,
        input_params: &[(String, DatumKind)],
    ) -> Result<()> {
        ensure!(
            self.meta.procedure_info(db, name).is_none(),
            DuplicateProcedure { db, name }
        );
        let plan = self
            .planner
            .plan_request(db, sql)
            .context(PlanError { sql })?;

        ensure!(
            input_params.len() == plan.input_schema.num_columns(),
            ParameterMismatch {
                expect: format!("{} parameter(s)", plan.input_schema.num_columns()),
                given: format!("{} parameter(s)", input_params.len()),
            }
        );
        for (index, (param_name, param_type)) in input_params.iter().enumerate() {
            let column = plan.input_schema.column(index);
            ensure!(
                param_name == &column.name,
                ParameterMismatch {
                    expect: column.name.clone(),
                    given: param_name.clone(),
                }
            );
            ensure!(
                *param_type == column.data_type,
                TypeMismatch {
                    column: column.name.clone(),
                    expect: column.data_type,
                    given: *param_type,
                }
            );
        }

        let info = pb_types::ProcedureInfo {
            db_name: db.to_string(),
            sp_name: name.to_string(),
            sql: sql.to_string(),
            input_schema: Some(schema_to_pb(&plan.input_schema)),
            output_schema: Some(schema_to_pb(&plan.output_schema)),
            tables: plan.dependent_tables,
            main_table: plan.main_table,
        };
        self.meta.create_procedure(info).context(RpcError)
    }

    pub fn show_procedure(&self, db: &str, name: &str) -> Result<pb_types::ProcedureInfo> {
        self.meta
            .procedure_info(db, name)
            .context(ProcedureNotFound { db, name })
    }

    /// Re-pull the cluster metadata and drop every cached plan.
    pub fn refresh_catalog(&self) -> bool {
        let ok = self.meta.refresh();
        if ok {
            self.cache.clear();
        }
        ok
    }
}

fn build_column_map(table_info: &TableInfo, columns: &[String]) -> Result<HashMap<usize, usize>> {
    let mut column_map = HashMap::with_capacity(columns.len());
    for (position, name) in columns.iter().enumerate() {
        let index = table_info
            .columns
            .iter()
            .position(|column| &column.name == name)
            .context(InsertShape {
                reason: format!("can't find column {} in table {}", name, table_info.name),
            })?;
        ensure!(
            column_map.insert(index, position).is_none(),
            InsertShape {
                reason: format!("duplicate column of {}", name),
            }
        );
    }
    Ok(column_map)
}

fn build_default_map(
    table_info: &TableInfo,
    column_map: &HashMap<usize, usize>,
    values: &[InsertValue],
    default_str_len: &mut u32,
) -> Result<HashMap<usize, Datum>> {
    let explicit_columns = !column_map.is_empty();
    let mut default_map = HashMap::new();
    for (index, column) in table_info.columns.iter().enumerate() {
        let position = if explicit_columns {
            column_map.get(&index).copied()
        } else if index < values.len() {
            Some(index)
        } else {
            None
        };

        let Some(position) = position else {
            // Omitted column: declared default, else null.
            match &column.default_value {
                Some(datum) => {
                    if let Some(payload) = datum.as_str() {
                        *default_str_len += payload.len() as u32;
                    }
                    default_map.insert(index, datum.clone());
                }
                None => {
                    ensure!(column.is_nullable, NotNull { column: column.name.clone() });
                    default_map.insert(index, Datum::Null);
                }
            }
            continue;
        };

        match &values[position] {
            InsertValue::Placeholder => {}
            InsertValue::Null => {
                ensure!(column.is_nullable, NotNull { column: column.name.clone() });
                default_map.insert(index, Datum::Null);
            }
            InsertValue::Literal(datum) => {
                let coerced =
                    coerce_default(datum, column.data_type).context(TypeMismatch {
                        column: column.name.clone(),
                        expect: column.data_type,
                        given: datum.kind(),
                    })?;
                if let Some(payload) = coerced.as_str() {
                    *default_str_len += payload.len() as u32;
                }
                default_map.insert(index, coerced);
            }
        }
    }
    Ok(default_map)
}

/// The fixed widening table of insert literal defaults. Anything outside
/// it is a type mismatch.
fn coerce_default(datum: &Datum, target: DatumKind) -> Option<Datum> {
    match (datum, target) {
        (Datum::Boolean(v), DatumKind::Boolean) => Some(Datum::Boolean(*v)),
        (Datum::Int16(v), DatumKind::Int16) => Some(Datum::Int16(*v)),
        (Datum::Int16(v), DatumKind::Int32) => Some(Datum::Int32(*v as i32)),
        (Datum::Int16(v), DatumKind::Int64) => Some(Datum::Int64(*v as i64)),
        (Datum::Int16(v), DatumKind::Float) => Some(Datum::Float(*v as f32)),
        (Datum::Int16(v), DatumKind::Double) => Some(Datum::Double(*v as f64)),
        (Datum::Int32(v), DatumKind::Int32) => Some(Datum::Int32(*v)),
        (Datum::Int32(v), DatumKind::Int64) => Some(Datum::Int64(*v as i64)),
        (Datum::Int32(v), DatumKind::Float) => Some(Datum::Float(*v as f32)),
        (Datum::Int32(v), DatumKind::Double) => Some(Datum::Double(*v as f64)),
        (Datum::Int64(v), DatumKind::Int64) => Some(Datum::Int64(*v)),
        (Datum::Float(v), DatumKind::Float) => Some(Datum::Float(*v)),
        (Datum::Float(v), DatumKind::Double) => Some(Datum::Double(*v as f64)),
        (Datum::Double(v), DatumKind::Double) => Some(Datum::Double(*v)),
        (Datum::Timestamp(v), DatumKind::Timestamp) => Some(Datum::Timestamp(*v)),
        (Datum::Int16(v), DatumKind::Timestamp) => {
            Some(Datum::Timestamp(Timestamp::new(*v as i64)))
        }
        (Datum::Int32(v), DatumKind::Timestamp) => {
            Some(Datum::Timestamp(Timestamp::new(*v as i64)))
        }
        (Datum::Int64(v), DatumKind::Timestamp) => Some(Datum::Timestamp(Timestamp::new(*v))),
        (Datum::Date(v), DatumKind::Date) => Some(Datum::Date(*v)),
        (Datum::Varchar(v), DatumKind::Date) | (Datum::String(v), DatumKind::Date) => {
            parse_date(v).map(Datum::Date)
        }
        (Datum::Varchar(v), DatumKind::Varchar) => Some(Datum::Varchar(v.clone())),
        (Datum::Varchar(v), DatumKind::String) => Some(Datum::String(v.clone())),
        (Datum::String(v), DatumKind::String) => Some(Datum::String(v.clone())),
        (Datum::String(v), DatumKind::Varchar) => Some(Datum::Varchar(v.clone())),
        _ => None,
    }
}

/// Parse a `YYYY-MM-DD` literal into a packed date.
fn parse_date(raw: &str) -> Option<Date> {
    let mut parts = raw.split('-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?.parse::<u32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Date::new(year, month, day).ok()
}

/// Handle of an asynchronous procedure call.
pub struct QueryFuture {
    rx: oneshot::Receiver<std::result::Result<pb_types::QueryResponse, GenericError>>,
    received: Option<std::result::Result<pb_types::QueryResponse, GenericError>>,
}

impl QueryFuture {
    /// Whether the underlying RPC completed, without blocking.
    pub fn is_done(&mut self) -> bool {
        if self.received.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(result) => {
                self.received = Some(result);
                true
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.received = Some(Err("rpc task was dropped".into()));
                true
            }
        }
    }

    /// Block until the RPC completes and wrap the response.
    ///
    /// Must not be called from inside the router's runtime.
    pub fn get_result_set(self) -> Result<ResultSetSql> {
        let result = match self.received {
            Some(result) => result,
            None => match self.rx.blocking_recv() {
                Ok(result) => result,
                Err(_) => Err("rpc task was dropped".into()),
            },
        };
        let response = result.context(RpcError)?;
        ResultSetSql::new(response).context(ResultSet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_widening() {
        let cases = vec![
            (Datum::Int16(3), DatumKind::Int32, Some(Datum::Int32(3))),
            (Datum::Int16(3), DatumKind::Int64, Some(Datum::Int64(3))),
            (Datum::Int16(3), DatumKind::Float, Some(Datum::Float(3.0))),
            (Datum::Int16(3), DatumKind::Double, Some(Datum::Double(3.0))),
            (Datum::Int32(9), DatumKind::Int64, Some(Datum::Int64(9))),
            (Datum::Int32(9), DatumKind::Float, Some(Datum::Float(9.0))),
            (Datum::Int32(9), DatumKind::Double, Some(Datum::Double(9.0))),
            (Datum::Float(1.5), DatumKind::Double, Some(Datum::Double(1.5))),
            // Narrowing and cross-type coercions are rejected.
            (Datum::Int64(1), DatumKind::Int32, None),
            (Datum::Double(1.5), DatumKind::Float, None),
            (Datum::Varchar("x".to_string()), DatumKind::Int32, None),
            (Datum::Boolean(true), DatumKind::Int32, None),
        ];
        for (datum, target, expect) in cases {
            assert_eq!(coerce_default(&datum, target), expect, "target:{target}");
        }
    }

    #[test]
    fn test_coerce_timestamp_from_numbers() {
        for datum in [Datum::Int16(5), Datum::Int32(5), Datum::Int64(5)] {
            assert_eq!(
                coerce_default(&datum, DatumKind::Timestamp),
                Some(Datum::Timestamp(Timestamp::new(5)))
            );
        }
        assert_eq!(
            coerce_default(&Datum::Varchar("5".to_string()), DatumKind::Timestamp),
            None
        );
    }

    #[test]
    fn test_coerce_date_from_literal() {
        let coerced = coerce_default(
            &Datum::Varchar("2020-05-27".to_string()),
            DatumKind::Date,
        )
        .unwrap();
        match coerced {
            Datum::Date(date) => {
                assert_eq!(date.year(), 2020);
                assert_eq!(date.month(), 5);
                assert_eq!(date.day(), 27);
            }
            _ => panic!("not a date"),
        }

        for bad in ["1899-01-01", "2020-13-01", "2020-01-32", "2020-01", "x-y-z", "2020-01-01-01"] {
            assert!(
                coerce_default(&Datum::Varchar(bad.to_string()), DatumKind::Date).is_none(),
                "literal:{bad}"
            );
        }
    }
}
