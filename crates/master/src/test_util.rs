// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! In-memory collaborators and a ready to use master environment for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tonic::Request;

use tessera_types::config::{MasterOptions, MasterOptionsBuilder};
use tessera_types::errors::{AppStatus, AppStatusCode, MasterError, MasterErrorCode};
use tessera_types::net::catalog::{
    AlterTableRequest, AlterTableResponse, AlterTableStep, ColumnSchema, CreateTableRequest,
    CreateTableResponse, DataType, DeleteTableRequest, DeleteTableResponse,
    GetTableLocationsRequest, GetTableLocationsResponse, GetTableSchemaRequest,
    GetTableSchemaResponse, IsAlterTableDoneRequest, IsAlterTableDoneResponse,
    IsCreateTableDoneRequest, IsCreateTableDoneResponse, ListTablesEntry, ListTablesRequest,
    ListTablesResponse, Schema, TableIdentifier, TabletLocations,
};
use tessera_types::net::heartbeat::{
    ReportedTabletUpdate, TabletReport, TabletReportUpdates, TsHeartbeatRequest,
    TsToMasterCommon,
};
use tessera_types::net::registration::{ServerEntry, ServerRegistration};
use tessera_types::security::SignedToken;
use tessera_types::{HostPort, NodeInstance, RaftRole};

use crate::authz::{AuthenticationType, RemoteUser};
use crate::bootstrap::BootstrapCoordinator;
use crate::collaborators::{CatalogManager, CertAuthority, MasterTopology, TokenSigner};
use crate::error::{CatalogError, SecurityError, TopologyError};
use crate::forwarder::CatalogForwarder;
use crate::heartbeat::HeartbeatProcessor;
use crate::leadership::{CatalogStatus, LeadershipState};
use crate::service::{MasterDependencies, MasterServiceHandler};
use crate::token_verifier::TokenVerifier;
use crate::ts_registry::{TsDescriptor, TsRegistry};

pub const SERVICE_PRINCIPAL: &str = "tessera";
pub const SUPERUSER: &str = "admin";

pub fn test_schema() -> Schema {
    Schema {
        columns: vec![
            ColumnSchema {
                name: "key".to_owned(),
                data_type: DataType::Int64,
                is_key: true,
                is_nullable: false,
            },
            ColumnSchema {
                name: "value".to_owned(),
                data_type: DataType::String,
                is_key: false,
                is_nullable: true,
            },
        ],
    }
}

pub fn test_registration(host: &str) -> ServerRegistration {
    ServerRegistration {
        rpc_addresses: vec![HostPort::new(host, 7050)],
        http_addresses: vec![HostPort::new(host, 8050)],
        software_version: Some("tessera 0.3.0".to_owned()),
        ..Default::default()
    }
}

pub fn service_user() -> RemoteUser {
    RemoteUser::new(SERVICE_PRINCIPAL, AuthenticationType::ClientCertificate)
}

/// Wraps `message` into a request authenticated as `user`.
pub fn request_as<T>(message: T, user: RemoteUser) -> Request<T> {
    let mut request = Request::new(message);
    request.extensions_mut().insert(user);
    request
}

/// Heartbeat of a tablet server which is already registered.
pub fn bare_heartbeat(instance: &NodeInstance) -> TsHeartbeatRequest {
    TsHeartbeatRequest {
        common: TsToMasterCommon {
            ts_instance: instance.clone(),
        },
        ..Default::default()
    }
}

/// First heartbeat of a tablet server after start-up.
pub fn registering_heartbeat(instance: &NodeInstance, host: &str) -> TsHeartbeatRequest {
    TsHeartbeatRequest {
        registration: Some(test_registration(host)),
        ..bare_heartbeat(instance)
    }
}

#[derive(Debug)]
struct TableEntry {
    id: String,
    name: String,
    schema: Schema,
    num_replicas: i32,
    schema_version: u32,
    tablets: Vec<TabletLocations>,
}

#[derive(Debug, Default)]
struct CatalogState {
    next_id: u64,
    tables: Vec<TableEntry>,
}

impl CatalogState {
    fn find(&self, table: &TableIdentifier) -> Option<usize> {
        self.tables.iter().position(|entry| {
            table.table_id.as_ref().is_none_or(|id| *id == entry.id)
                && table.table_name.as_ref().is_none_or(|name| *name == entry.name)
                && (table.table_id.is_some() || table.table_name.is_some())
        })
    }
}

fn table_not_found(table: &TableIdentifier) -> (MasterError, CatalogError) {
    let message = format!("the table does not exist: {table}");
    (
        MasterError::new(
            MasterErrorCode::TableNotFound,
            AppStatus::new(AppStatusCode::NotFound, message.clone()),
        ),
        CatalogError::NotFound(message),
    )
}

/// Catalog manager keeping tables in memory. Every table gets one tablet per range partition.
#[derive(Debug, Default)]
pub struct MockCatalogManager {
    state: Mutex<CatalogState>,
    calls: AtomicUsize,
    reports: Mutex<Vec<(String, TabletReport)>>,
    fail_reports: AtomicBool,
}

impl MockCatalogManager {
    /// Number of calls which reached the catalog manager.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state
            .lock()
            .tables
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn tablet_ids(&self, table_name: &str) -> Vec<String> {
        self.state
            .lock()
            .tables
            .iter()
            .filter(|entry| entry.name == table_name)
            .flat_map(|entry| entry.tablets.iter().map(|tablet| tablet.tablet_id.clone()))
            .collect()
    }

    /// Tablet reports received so far, with the uuid of the reporting server.
    pub fn reports(&self) -> Vec<(String, TabletReport)> {
        self.reports.lock().clone()
    }

    pub fn fail_reports(&self, fail: bool) {
        self.fail_reports.store(fail, Ordering::Relaxed);
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn with_table<R>(
        &self,
        table: &TableIdentifier,
        error: &mut Option<MasterError>,
        f: impl FnOnce(&mut TableEntry) -> R,
    ) -> Result<R, CatalogError> {
        let mut state = self.state.lock();
        match state.find(table) {
            Some(idx) => Ok(f(&mut state.tables[idx])),
            None => {
                let (master_error, err) = table_not_found(table);
                *error = Some(master_error);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl CatalogManager for MockCatalogManager {
    async fn process_tablet_report(
        &self,
        ts: &TsDescriptor,
        report: &TabletReport,
        updates: &mut TabletReportUpdates,
    ) -> Result<(), CatalogError> {
        self.record_call();
        if self.fail_reports.load(Ordering::Relaxed) {
            return Err(CatalogError::InvalidArgument(format!(
                "corrupt tablet report #{}",
                report.sequence_number
            )));
        }
        updates.tablets = report
            .updated_tablets
            .iter()
            .map(|tablet| ReportedTabletUpdate {
                tablet_id: tablet.tablet_id.clone(),
                state_msg: None,
            })
            .collect();
        self.reports
            .lock()
            .push((ts.permanent_uuid().to_owned(), report.clone()));
        Ok(())
    }

    async fn create_table(
        &self,
        req: &CreateTableRequest,
        resp: &mut CreateTableResponse,
        _user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        self.record_call();
        if req.schema.columns.is_empty() {
            return Err(CatalogError::InvalidArgument(
                "schema must have at least one column".to_owned(),
            ));
        }

        let mut state = self.state.lock();
        if state.tables.iter().any(|entry| entry.name == req.name) {
            let message = format!("table {} already exists", req.name);
            resp.error = Some(MasterError::new(
                MasterErrorCode::TableAlreadyPresent,
                AppStatus::new(AppStatusCode::AlreadyPresent, message.clone()),
            ));
            return Err(CatalogError::AlreadyPresent(message));
        }

        state.next_id += 1;
        let id = format!("table-{}", state.next_id);
        let mut bounds = vec![Vec::new()];
        bounds.extend(req.split_rows.iter().cloned());
        bounds.push(Vec::new());
        let tablets = bounds
            .windows(2)
            .enumerate()
            .map(|(idx, window)| TabletLocations {
                tablet_id: format!("{id}-tablet-{idx}"),
                partition_key_start: window[0].clone(),
                partition_key_end: window[1].clone(),
                replicas: Vec::new(),
            })
            .collect();

        state.tables.push(TableEntry {
            id: id.clone(),
            name: req.name.clone(),
            schema: req.schema.clone(),
            num_replicas: req.num_replicas.unwrap_or(3),
            schema_version: 0,
            tablets,
        });
        resp.table_id = Some(id);
        Ok(())
    }

    async fn is_create_table_done(
        &self,
        req: &IsCreateTableDoneRequest,
        resp: &mut IsCreateTableDoneResponse,
    ) -> Result<(), CatalogError> {
        self.record_call();
        self.with_table(&req.table, &mut resp.error, |_| ())?;
        resp.done = true;
        Ok(())
    }

    async fn delete_table(
        &self,
        req: &DeleteTableRequest,
        resp: &mut DeleteTableResponse,
        _user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        self.record_call();
        let id = self.with_table(&req.table, &mut resp.error, |entry| entry.id.clone())?;
        self.state.lock().tables.retain(|entry| entry.id != id);
        Ok(())
    }

    async fn alter_table(
        &self,
        req: &AlterTableRequest,
        resp: &mut AlterTableResponse,
        _user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        self.record_call();
        let (id, version) = self.with_table(&req.table, &mut resp.error, |entry| {
            if let Some(new_name) = &req.new_table_name {
                entry.name = new_name.clone();
            }
            for step in &req.alter_schema_steps {
                match step {
                    AlterTableStep::AddColumn(column) => entry.schema.columns.push(column.clone()),
                    AlterTableStep::DropColumn { name } => {
                        entry.schema.columns.retain(|column| column.name != *name)
                    }
                    AlterTableStep::RenameColumn { old_name, new_name } => {
                        for column in &mut entry.schema.columns {
                            if column.name == *old_name {
                                column.name = new_name.clone();
                            }
                        }
                    }
                }
            }
            entry.schema_version += 1;
            (entry.id.clone(), entry.schema_version)
        })?;
        resp.table_id = Some(id);
        resp.schema_version = Some(version);
        Ok(())
    }

    async fn is_alter_table_done(
        &self,
        req: &IsAlterTableDoneRequest,
        resp: &mut IsAlterTableDoneResponse,
    ) -> Result<(), CatalogError> {
        self.record_call();
        let version = self.with_table(&req.table, &mut resp.error, |entry| entry.schema_version)?;
        resp.schema_version = Some(version);
        resp.done = true;
        Ok(())
    }

    async fn list_tables(
        &self,
        req: &ListTablesRequest,
        resp: &mut ListTablesResponse,
    ) -> Result<(), CatalogError> {
        self.record_call();
        resp.tables = self
            .state
            .lock()
            .tables
            .iter()
            .filter(|entry| {
                req.name_filter
                    .as_ref()
                    .is_none_or(|filter| entry.name.contains(filter.as_str()))
            })
            .map(|entry| ListTablesEntry {
                id: entry.id.clone(),
                name: entry.name.clone(),
            })
            .collect();
        Ok(())
    }

    async fn get_table_locations(
        &self,
        req: &GetTableLocationsRequest,
        resp: &mut GetTableLocationsResponse,
    ) -> Result<(), CatalogError> {
        self.record_call();
        let tablets = self.with_table(&req.table, &mut resp.error, |entry| entry.tablets.clone())?;
        let limit = req.max_returned_locations.map_or(usize::MAX, |max| max as usize);
        resp.tablet_locations = tablets.into_iter().take(limit).collect();
        resp.ttl_millis = Some(60_000);
        Ok(())
    }

    async fn get_table_schema(
        &self,
        req: &GetTableSchemaRequest,
        resp: &mut GetTableSchemaResponse,
    ) -> Result<(), CatalogError> {
        self.record_call();
        let (id, name, schema, num_replicas) =
            self.with_table(&req.table, &mut resp.error, |entry| {
                (
                    entry.id.clone(),
                    entry.name.clone(),
                    entry.schema.clone(),
                    entry.num_replicas,
                )
            })?;
        resp.table_id = Some(id);
        resp.table_name = Some(name);
        resp.schema = Some(schema);
        resp.num_replicas = Some(num_replicas);
        Ok(())
    }

    async fn get_tablet_locations(&self, tablet_id: &str) -> Result<TabletLocations, CatalogError> {
        self.record_call();
        self.state
            .lock()
            .tables
            .iter()
            .flat_map(|entry| entry.tablets.iter())
            .find(|tablet| tablet.tablet_id == tablet_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("unknown tablet {tablet_id}")))
    }
}

/// Fixed quorum of three masters.
#[derive(Debug, Default)]
pub struct StaticTopology {
    fail: AtomicBool,
}

impl StaticTopology {
    pub fn master_addresses() -> Vec<HostPort> {
        ["m1.local", "m2.local", "m3.local"]
            .into_iter()
            .map(|host| HostPort::new(host, 7051))
            .collect()
    }

    pub fn fail_requests(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    fn check(&self) -> Result<(), TopologyError> {
        if self.fail.load(Ordering::Relaxed) {
            Err(TopologyError::Unavailable(
                "consensus configuration not loaded".to_owned(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MasterTopology for StaticTopology {
    async fn list_masters(&self) -> Result<Vec<ServerEntry>, TopologyError> {
        self.check()?;
        Ok(Self::master_addresses()
            .into_iter()
            .enumerate()
            .map(|(idx, address)| ServerEntry {
                instance_id: Some(NodeInstance::new(format!("master-{}", idx + 1), 1)),
                registration: Some(ServerRegistration {
                    rpc_addresses: vec![address],
                    ..Default::default()
                }),
                role: if idx == 0 {
                    RaftRole::Leader
                } else {
                    RaftRole::Follower
                },
                error: None,
            })
            .collect())
    }

    async fn master_addresses(&self) -> Result<Vec<HostPort>, TopologyError> {
        self.check()?;
        Ok(Self::master_addresses())
    }

    async fn registration(&self) -> Result<ServerRegistration, TopologyError> {
        self.check()?;
        Ok(ServerRegistration {
            rpc_addresses: vec![HostPort::new("m1.local", 7051)],
            http_addresses: vec![HostPort::new("m1.local", 8051)],
            software_version: Some("tessera 0.3.0".to_owned()),
            ..Default::default()
        })
    }
}

/// Certificate authority which "signs" a CSR by prefixing it.
#[derive(Debug)]
pub struct MockCertAuthority {
    pub ca_cert: Bytes,
    signed: AtomicUsize,
}

impl Default for MockCertAuthority {
    fn default() -> Self {
        Self {
            ca_cert: Bytes::from_static(b"test-ca-cert"),
            signed: AtomicUsize::new(0),
        }
    }
}

impl MockCertAuthority {
    pub fn signed(&self) -> usize {
        self.signed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CertAuthority for MockCertAuthority {
    async fn sign_server_csr(
        &self,
        csr_der: &[u8],
        user: &RemoteUser,
    ) -> Result<Bytes, SecurityError> {
        if csr_der.is_empty() {
            return Err(SecurityError::InvalidCsr("empty CSR".to_owned()));
        }
        self.signed.fetch_add(1, Ordering::Relaxed);
        let mut cert = format!("signed-for-{}:", user.username).into_bytes();
        cert.extend_from_slice(csr_der);
        Ok(Bytes::from(cert))
    }

    fn ca_cert_der(&self) -> Bytes {
        self.ca_cert.clone()
    }
}

#[derive(Debug, Default)]
pub struct MockTokenSigner {
    issued: AtomicUsize,
    fail: AtomicBool,
}

impl MockTokenSigner {
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn fail_next_tokens(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl TokenSigner for MockTokenSigner {
    async fn generate_authn_token(&self, username: &str) -> Result<SignedToken, SecurityError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(SecurityError::NoSigningKey);
        }
        self.issued.fetch_add(1, Ordering::Relaxed);
        Ok(SignedToken {
            token_data: Bytes::from(format!("token-for-{username}")),
            signature: Bytes::from_static(b"signature"),
            signing_key_seq_num: 1,
        })
    }
}

/// A master wired to in-memory collaborators.
pub struct TestMasterEnv {
    pub options: MasterOptions,
    pub self_instance: NodeInstance,
    pub leadership: LeadershipState,
    pub registry: Arc<TsRegistry>,
    pub verifier: Arc<TokenVerifier>,
    pub catalog: Arc<MockCatalogManager>,
    pub topology: Arc<StaticTopology>,
    pub cert_authority: Arc<MockCertAuthority>,
    pub token_signer: Arc<MockTokenSigner>,
}

impl TestMasterEnv {
    pub fn default_options() -> MasterOptionsBuilder {
        let mut builder = MasterOptionsBuilder::default();
        builder
            .superuser_acl(vec![SUPERUSER.to_owned()])
            .service_acl(vec![SERVICE_PRINCIPAL.to_owned()]);
        builder
    }

    pub fn new(status: CatalogStatus, options: MasterOptions) -> Self {
        Self {
            options,
            self_instance: NodeInstance::new("master-1", 1),
            leadership: LeadershipState::new(status),
            registry: Arc::new(TsRegistry::default()),
            verifier: Arc::new(TokenVerifier::default()),
            catalog: Arc::new(MockCatalogManager::default()),
            topology: Arc::new(StaticTopology::default()),
            cert_authority: Arc::new(MockCertAuthority::default()),
            token_signer: Arc::new(MockTokenSigner::default()),
        }
    }

    fn with_default_options(status: CatalogStatus) -> Self {
        let options = Self::default_options()
            .build()
            .expect("valid test options");
        Self::new(status, options)
    }

    pub fn leader() -> Self {
        Self::with_default_options(CatalogStatus::ready_leader())
    }

    pub fn follower() -> Self {
        Self::with_default_options(CatalogStatus::initialized_follower())
    }

    pub fn uninitialized() -> Self {
        Self::with_default_options(CatalogStatus::default())
    }

    pub fn leader_with_lookup_latency(latency: Duration) -> Self {
        Self::with_lookup_latency(CatalogStatus::ready_leader(), latency)
    }

    pub fn follower_with_lookup_latency(latency: Duration) -> Self {
        Self::with_lookup_latency(CatalogStatus::initialized_follower(), latency)
    }

    fn with_lookup_latency(status: CatalogStatus, latency: Duration) -> Self {
        let options = Self::default_options()
            .inject_latency_on_tablet_lookups(latency.into())
            .build()
            .expect("valid test options");
        Self::new(status, options)
    }

    pub fn dependencies(&self) -> MasterDependencies {
        MasterDependencies {
            self_instance: self.self_instance.clone(),
            leadership: self.leadership.clone(),
            registry: Arc::clone(&self.registry),
            verifier: Arc::clone(&self.verifier),
            catalog: self.catalog.clone(),
            topology: self.topology.clone(),
            cert_authority: self.cert_authority.clone(),
            token_signer: self.token_signer.clone(),
        }
    }

    pub fn service(&self) -> MasterServiceHandler {
        MasterServiceHandler::new(&self.options, self.dependencies())
    }

    pub fn heartbeat_processor(&self) -> HeartbeatProcessor {
        HeartbeatProcessor::new(
            self.leadership.clone(),
            Arc::clone(&self.registry),
            self.catalog.clone(),
            self.cert_authority.clone(),
            Arc::clone(&self.verifier),
            self.self_instance.clone(),
            self.options.non_leader_masters_propagate_tsk,
        )
    }

    pub fn bootstrap(&self) -> BootstrapCoordinator {
        BootstrapCoordinator::new(
            self.leadership.clone(),
            self.topology.clone(),
            self.cert_authority.clone(),
            self.token_signer.clone(),
            self.self_instance.clone(),
        )
    }

    pub fn forwarder(&self) -> CatalogForwarder {
        CatalogForwarder::new(
            self.leadership.clone(),
            self.catalog.clone(),
            self.options.inject_latency_on_tablet_lookups(),
        )
    }
}
