// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Client-side cluster router of the feature serving engine.
//!
//! SQL is planned on the client, execution is pushed to the tablet owning
//! the target table partition. The router owns the per-database plan
//! cache, builds request/insert rows, decomposes inserts across
//! partitions and dispatches stored procedure calls.

pub mod client;
pub mod plan_cache;
pub mod result_set;
pub mod router;
pub mod row_builder;
pub mod schema_adapter;


/// Boxed error from an external collaborator (planner, RPC, name server).
pub type GenericError = Box<dyn std::error::Error + Send + Sync>;
