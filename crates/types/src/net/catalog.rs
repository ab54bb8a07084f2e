// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Table and tablet metadata calls served by the leader master.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{AppStatus, MasterError};
use crate::macros::master_responses;
use crate::{HostPort, RaftRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    #[default]
    Int64,
    Float,
    Double,
    String,
    Binary,
    UnixtimeMicros,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub is_key: bool,
    pub is_nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnSchema>,
}

impl Schema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Identifies a table either by id or by name. If both are set, they must agree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableIdentifier {
    pub table_id: Option<String>,
    pub table_name: Option<String>,
}

impl TableIdentifier {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            table_id: None,
            table_name: Some(name.into()),
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            table_id: Some(id.into()),
            table_name: None,
        }
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.table_name, &self.table_id) {
            (Some(name), Some(id)) => write!(f, "{name} [id={id}]"),
            (Some(name), None) => f.write_str(name),
            (None, Some(id)) => write!(f, "[id={id}]"),
            (None, None) => f.write_str("<unidentified table>"),
        }
    }
}

/// Addresses of a tablet server hosting a replica.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TsInfo {
    pub permanent_uuid: String,
    pub rpc_addresses: Vec<HostPort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplicaLocation {
    pub ts_info: TsInfo,
    pub role: RaftRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabletLocations {
    pub tablet_id: String,
    pub partition_key_start: Vec<u8>,
    pub partition_key_end: Vec<u8>,
    pub replicas: Vec<ReplicaLocation>,
}

// -- CreateTable

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub name: String,
    pub schema: Schema,
    pub num_replicas: Option<i32>,
    /// Split keys which define the initial range partitions.
    pub split_rows: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateTableResponse {
    pub error: Option<MasterError>,
    pub table_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IsCreateTableDoneRequest {
    pub table: TableIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IsCreateTableDoneResponse {
    pub error: Option<MasterError>,
    pub done: bool,
}

// -- DeleteTable

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteTableRequest {
    pub table: TableIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteTableResponse {
    pub error: Option<MasterError>,
}

// -- AlterTable

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlterTableStep {
    AddColumn(ColumnSchema),
    DropColumn { name: String },
    RenameColumn { old_name: String, new_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlterTableRequest {
    pub table: TableIdentifier,
    pub new_table_name: Option<String>,
    pub alter_schema_steps: Vec<AlterTableStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlterTableResponse {
    pub error: Option<MasterError>,
    pub table_id: Option<String>,
    pub schema_version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IsAlterTableDoneRequest {
    pub table: TableIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IsAlterTableDoneResponse {
    pub error: Option<MasterError>,
    pub schema_version: Option<u32>,
    pub done: bool,
}

// -- ListTables

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListTablesRequest {
    /// Only tables whose name contains this substring are returned.
    pub name_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListTablesEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListTablesResponse {
    pub error: Option<MasterError>,
    pub tables: Vec<ListTablesEntry>,
}

// -- Locations and schema

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetTableLocationsRequest {
    pub table: TableIdentifier,
    pub partition_key_start: Option<Vec<u8>>,
    pub partition_key_end: Option<Vec<u8>>,
    pub max_returned_locations: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetTableLocationsResponse {
    pub error: Option<MasterError>,
    pub tablet_locations: Vec<TabletLocations>,
    /// How long the client may cache the returned locations.
    pub ttl_millis: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetTableSchemaRequest {
    pub table: TableIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetTableSchemaResponse {
    pub error: Option<MasterError>,
    pub schema: Option<Schema>,
    pub num_replicas: Option<i32>,
    pub table_id: Option<String>,
    pub table_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetTabletLocationsRequest {
    pub tablet_ids: Vec<String>,
}

/// Failure to resolve one of the requested tablet ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletLocationsError {
    pub tablet_id: String,
    pub status: AppStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetTabletLocationsResponse {
    pub error: Option<MasterError>,
    pub tablet_locations: Vec<TabletLocations>,
    pub errors: Vec<TabletLocationsError>,
}

master_responses!(
    CreateTableResponse,
    IsCreateTableDoneResponse,
    DeleteTableResponse,
    AlterTableResponse,
    IsAlterTableDoneResponse,
    ListTablesResponse,
    GetTableLocationsResponse,
    GetTableSchemaResponse,
    GetTabletLocationsResponse,
);
