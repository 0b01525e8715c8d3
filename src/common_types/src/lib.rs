// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Common types of the feature serving engine: column schema, datums and
//! the contiguous row encoding shared by storage, RPC and query paths.

pub mod bitset;
pub mod datum;
pub mod row;
pub mod schema;
pub mod time;
