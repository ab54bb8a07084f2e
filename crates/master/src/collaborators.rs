// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Interfaces of the components the master service delegates to. Their implementations (table
//! storage, leader election, certificate and token cryptography) live outside of this crate.

use async_trait::async_trait;
use bytes::Bytes;

use tessera_types::HostPort;
use tessera_types::net::catalog::{
    AlterTableRequest, AlterTableResponse, CreateTableRequest, CreateTableResponse,
    DeleteTableRequest, DeleteTableResponse, GetTableLocationsRequest, GetTableLocationsResponse,
    GetTableSchemaRequest, GetTableSchemaResponse, IsAlterTableDoneRequest,
    IsAlterTableDoneResponse, IsCreateTableDoneRequest, IsCreateTableDoneResponse,
    ListTablesRequest, ListTablesResponse, TabletLocations,
};
use tessera_types::net::heartbeat::{TabletReport, TabletReportUpdates};
use tessera_types::net::registration::{ServerEntry, ServerRegistration};
use tessera_types::security::SignedToken;

use crate::authz::RemoteUser;
use crate::error::{CatalogError, SecurityError, TopologyError};
use crate::ts_registry::TsDescriptor;

/// The catalog manager owns tables and tablets.
///
/// Calls which receive the response may record a precise structured error on it before failing.
/// Failures without such an error are reported to the caller as `UNKNOWN_ERROR`.
#[async_trait]
pub trait CatalogManager: Send + Sync + 'static {
    async fn process_tablet_report(
        &self,
        ts: &TsDescriptor,
        report: &TabletReport,
        updates: &mut TabletReportUpdates,
    ) -> Result<(), CatalogError>;

    async fn create_table(
        &self,
        req: &CreateTableRequest,
        resp: &mut CreateTableResponse,
        user: &RemoteUser,
    ) -> Result<(), CatalogError>;

    async fn is_create_table_done(
        &self,
        req: &IsCreateTableDoneRequest,
        resp: &mut IsCreateTableDoneResponse,
    ) -> Result<(), CatalogError>;

    async fn delete_table(
        &self,
        req: &DeleteTableRequest,
        resp: &mut DeleteTableResponse,
        user: &RemoteUser,
    ) -> Result<(), CatalogError>;

    async fn alter_table(
        &self,
        req: &AlterTableRequest,
        resp: &mut AlterTableResponse,
        user: &RemoteUser,
    ) -> Result<(), CatalogError>;

    async fn is_alter_table_done(
        &self,
        req: &IsAlterTableDoneRequest,
        resp: &mut IsAlterTableDoneResponse,
    ) -> Result<(), CatalogError>;

    async fn list_tables(
        &self,
        req: &ListTablesRequest,
        resp: &mut ListTablesResponse,
    ) -> Result<(), CatalogError>;

    async fn get_table_locations(
        &self,
        req: &GetTableLocationsRequest,
        resp: &mut GetTableLocationsResponse,
    ) -> Result<(), CatalogError>;

    async fn get_table_schema(
        &self,
        req: &GetTableSchemaRequest,
        resp: &mut GetTableSchemaResponse,
    ) -> Result<(), CatalogError>;

    async fn get_tablet_locations(&self, tablet_id: &str) -> Result<TabletLocations, CatalogError>;
}

/// This master's view of the master quorum.
#[async_trait]
pub trait MasterTopology: Send + Sync + 'static {
    /// All masters of the quorum including this one.
    async fn list_masters(&self) -> Result<Vec<ServerEntry>, TopologyError>;

    /// RPC addresses of all masters of the quorum.
    async fn master_addresses(&self) -> Result<Vec<HostPort>, TopologyError>;

    async fn registration(&self) -> Result<ServerRegistration, TopologyError>;
}

#[async_trait]
pub trait CertAuthority: Send + Sync + 'static {
    /// Signs the DER-encoded CSR on behalf of `user` and returns the DER-encoded certificate.
    async fn sign_server_csr(&self, csr_der: &[u8], user: &RemoteUser)
    -> Result<Bytes, SecurityError>;

    fn ca_cert_der(&self) -> Bytes;
}

#[async_trait]
pub trait TokenSigner: Send + Sync + 'static {
    async fn generate_authn_token(&self, username: &str) -> Result<SignedToken, SecurityError>;
}
