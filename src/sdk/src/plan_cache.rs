// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Per-database bounded LRU cache of planned SQL artifacts.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use common_types::{datum::Datum, schema::Schema};
use parking_lot::Mutex;

use crate::client::TableInfo;

/// A planned SQL artifact, inserted on first use and reused until evicted.
/// Entries are never invalidated here; schema evolution rebuilds the whole
/// cache through a catalog refresh.
#[derive(Debug)]
pub enum CachedPlan {
    /// A request-mode plan: the input schema the request row binds to.
    Request { input_schema: Arc<Schema> },
    /// A planned INSERT: table metadata, schema, per-column default
    /// constants and the total byte length of literal string defaults.
    Insert {
        table_info: Arc<TableInfo>,
        schema: Arc<Schema>,
        default_map: Arc<HashMap<usize, Datum>>,
        default_str_len: u32,
    },
}

/// Two-level map `database -> bounded LRU<sql, plan>` behind a spinning
/// mutex.
pub struct PlanCache {
    capacity: usize,
    dbs: Mutex<HashMap<String, LruPlans>>,
}

impl PlanCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            dbs: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, db: &str, sql: &str) -> Option<Arc<CachedPlan>> {
        let mut dbs = self.dbs.lock();
        dbs.get_mut(db)?.get(sql)
    }

    pub fn put(&self, db: &str, sql: &str, plan: Arc<CachedPlan>) {
        let mut dbs = self.dbs.lock();
        dbs.entry(db.to_string())
            .or_insert_with(|| LruPlans::new(self.capacity))
            .put(sql, plan);
    }

    /// Drop every cached plan, the catalog-refresh path.
    pub fn clear(&self) {
        self.dbs.lock().clear();
    }
}

struct LruPlans {
    capacity: usize,
    plans: HashMap<String, Arc<CachedPlan>>,
    /// Keys ordered oldest-used first.
    recency: VecDeque<String>,
}

impl LruPlans {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            plans: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    fn get(&mut self, sql: &str) -> Option<Arc<CachedPlan>> {
        let plan = self.plans.get(sql)?.clone();
        self.touch(sql);
        Some(plan)
    }

    fn put(&mut self, sql: &str, plan: Arc<CachedPlan>) {
        if self.plans.insert(sql.to_string(), plan).is_some() {
            self.touch(sql);
        } else {
            self.recency.push_back(sql.to_string());
        }
        while self.plans.len() > self.capacity {
            if let Some(oldest) = self.recency.pop_front() {
                self.plans.remove(&oldest);
            }
        }
    }

    fn touch(&mut self, sql: &str) {
        if let Some(pos) = self.recency.iter().position(|key| key == sql) {
            let key = self.recency.remove(pos).unwrap();
            self.recency.push_back(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_plan() -> Arc<CachedPlan> {
        let schema = Schema::new(vec![common_types::schema::ColumnSchema::new(
            "a",
            common_types::datum::DatumKind::Int32,
            false,
        )])
        .unwrap();
        Arc::new(CachedPlan::Request {
            input_schema: Arc::new(schema),
        })
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = PlanCache::new(2);
        cache.put("db", "sql1", request_plan());
        cache.put("db", "sql2", request_plan());

        // Touch sql1 so sql2 is the eviction victim.
        assert!(cache.get("db", "sql1").is_some());
        cache.put("db", "sql3", request_plan());

        assert!(cache.get("db", "sql1").is_some());
        assert!(cache.get("db", "sql2").is_none());
        assert!(cache.get("db", "sql3").is_some());
    }

    #[test]
    fn test_per_db_isolation() {
        let cache = PlanCache::new(1);
        cache.put("db1", "sql", request_plan());
        cache.put("db2", "sql", request_plan());

        assert!(cache.get("db1", "sql").is_some());
        assert!(cache.get("db2", "sql").is_some());
        assert!(cache.get("db3", "sql").is_none());
    }

    #[test]
    fn test_clear() {
        let cache = PlanCache::new(4);
        cache.put("db", "sql", request_plan());
        cache.clear();
        assert!(cache.get("db", "sql").is_none());
    }
}
