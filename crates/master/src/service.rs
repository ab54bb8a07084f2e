// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use async_trait::async_trait;
use tonic::{Request, Response, Status};
use tracing::instrument;

use tessera_types::NodeInstance;
use tessera_types::config::MasterOptions;
use tessera_types::net::catalog::{
    AlterTableRequest, AlterTableResponse, CreateTableRequest, CreateTableResponse,
    DeleteTableRequest, DeleteTableResponse, GetTableLocationsRequest, GetTableLocationsResponse,
    GetTableSchemaRequest, GetTableSchemaResponse, GetTabletLocationsRequest,
    GetTabletLocationsResponse, IsAlterTableDoneRequest, IsAlterTableDoneResponse,
    IsCreateTableDoneRequest, IsCreateTableDoneResponse, ListTablesRequest, ListTablesResponse,
};
use tessera_types::net::heartbeat::{TsHeartbeatRequest, TsHeartbeatResponse};
use tessera_types::net::master::{
    ConnectToMasterRequest, ConnectToMasterResponse, GetMasterRegistrationRequest,
    GetMasterRegistrationResponse, ListMastersRequest, ListMastersResponse,
    ListTabletServersEntry, ListTabletServersRequest, ListTabletServersResponse, PingRequest,
    PingResponse,
};

use crate::authz::{Authorizer, CLIENT, CLIENT_OR_SERVICE, SERVICE};
use crate::bootstrap::BootstrapCoordinator;
use crate::collaborators::{CatalogManager, CertAuthority, MasterTopology, TokenSigner};
use crate::features::FeatureSet;
use crate::forwarder::{CatalogCall, CatalogForwarder};
use crate::heartbeat::HeartbeatProcessor;
use crate::leadership::LeadershipState;
use crate::metric_definitions;
use crate::token_verifier::TokenVerifier;
use crate::ts_registry::TsRegistry;

/// The rpcs served by a master.
///
/// Failures a caller is expected to inspect are reported in the `error` field of the response.
/// An `Err` status means the call as a whole failed.
#[async_trait]
pub trait MasterSvc: Send + Sync + 'static {
    async fn ping(&self, request: Request<PingRequest>) -> Result<Response<PingResponse>, Status>;

    async fn ts_heartbeat(
        &self,
        request: Request<TsHeartbeatRequest>,
    ) -> Result<Response<TsHeartbeatResponse>, Status>;

    async fn list_tablet_servers(
        &self,
        request: Request<ListTabletServersRequest>,
    ) -> Result<Response<ListTabletServersResponse>, Status>;

    async fn list_masters(
        &self,
        request: Request<ListMastersRequest>,
    ) -> Result<Response<ListMastersResponse>, Status>;

    async fn get_master_registration(
        &self,
        request: Request<GetMasterRegistrationRequest>,
    ) -> Result<Response<GetMasterRegistrationResponse>, Status>;

    async fn connect_to_master(
        &self,
        request: Request<ConnectToMasterRequest>,
    ) -> Result<Response<ConnectToMasterResponse>, Status>;

    async fn create_table(
        &self,
        request: Request<CreateTableRequest>,
    ) -> Result<Response<CreateTableResponse>, Status>;

    async fn is_create_table_done(
        &self,
        request: Request<IsCreateTableDoneRequest>,
    ) -> Result<Response<IsCreateTableDoneResponse>, Status>;

    async fn delete_table(
        &self,
        request: Request<DeleteTableRequest>,
    ) -> Result<Response<DeleteTableResponse>, Status>;

    async fn alter_table(
        &self,
        request: Request<AlterTableRequest>,
    ) -> Result<Response<AlterTableResponse>, Status>;

    async fn is_alter_table_done(
        &self,
        request: Request<IsAlterTableDoneRequest>,
    ) -> Result<Response<IsAlterTableDoneResponse>, Status>;

    async fn list_tables(
        &self,
        request: Request<ListTablesRequest>,
    ) -> Result<Response<ListTablesResponse>, Status>;

    async fn get_table_locations(
        &self,
        request: Request<GetTableLocationsRequest>,
    ) -> Result<Response<GetTableLocationsResponse>, Status>;

    async fn get_table_schema(
        &self,
        request: Request<GetTableSchemaRequest>,
    ) -> Result<Response<GetTableSchemaResponse>, Status>;

    async fn get_tablet_locations(
        &self,
        request: Request<GetTabletLocationsRequest>,
    ) -> Result<Response<GetTabletLocationsResponse>, Status>;
}

/// Everything a master service needs from the rest of the process.
pub struct MasterDependencies {
    pub self_instance: NodeInstance,
    pub leadership: LeadershipState,
    pub registry: Arc<TsRegistry>,
    pub verifier: Arc<TokenVerifier>,
    pub catalog: Arc<dyn CatalogManager>,
    pub topology: Arc<dyn MasterTopology>,
    pub cert_authority: Arc<dyn CertAuthority>,
    pub token_signer: Arc<dyn TokenSigner>,
}

/// Svc handler for the master rpcs.
pub struct MasterServiceHandler {
    authorizer: Authorizer,
    features: FeatureSet,
    registry: Arc<TsRegistry>,
    heartbeats: HeartbeatProcessor,
    bootstrap: BootstrapCoordinator,
    forwarder: CatalogForwarder,
}

impl MasterServiceHandler {
    pub fn new(options: &MasterOptions, deps: MasterDependencies) -> Self {
        metric_definitions::describe_metrics();

        let heartbeats = HeartbeatProcessor::new(
            deps.leadership.clone(),
            Arc::clone(&deps.registry),
            Arc::clone(&deps.catalog),
            Arc::clone(&deps.cert_authority),
            deps.verifier,
            deps.self_instance.clone(),
            options.non_leader_masters_propagate_tsk,
        );
        let bootstrap = BootstrapCoordinator::new(
            deps.leadership.clone(),
            deps.topology,
            deps.cert_authority,
            deps.token_signer,
            deps.self_instance,
        );
        let forwarder = CatalogForwarder::new(
            deps.leadership,
            deps.catalog,
            options.inject_latency_on_tablet_lookups(),
        );

        Self {
            authorizer: Authorizer::new(options),
            features: FeatureSet::new(options),
            registry: deps.registry,
            heartbeats,
            bootstrap,
            forwarder,
        }
    }

    /// Whether this master supports the feature with the given numeric id.
    pub fn supports_feature(&self, feature_id: u32) -> bool {
        self.features.supports(feature_id)
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    async fn forward<C: CatalogCall>(
        &self,
        request: Request<C>,
    ) -> Result<Response<C::Response>, Status> {
        let user = self.authorizer.authorize(&request, CLIENT)?;
        let resp = self.forwarder.forward(request.get_ref(), &user).await;
        Ok(Response::new(resp))
    }
}

#[async_trait]
impl MasterSvc for MasterServiceHandler {
    async fn ping(&self, request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        self.authorizer.authorize(&request, CLIENT_OR_SERVICE)?;
        Ok(Response::new(PingResponse::default()))
    }

    #[instrument(level = "debug", skip_all, fields(instance = %request.get_ref().common.ts_instance))]
    async fn ts_heartbeat(
        &self,
        request: Request<TsHeartbeatRequest>,
    ) -> Result<Response<TsHeartbeatResponse>, Status> {
        // only tablet servers may heartbeat, heartbeats can have certificates signed
        let user = self.authorizer.authorize(&request, SERVICE)?;
        let resp = self.heartbeats.heartbeat(request.get_ref(), &user).await?;
        Ok(Response::new(resp))
    }

    async fn list_tablet_servers(
        &self,
        request: Request<ListTabletServersRequest>,
    ) -> Result<Response<ListTabletServersResponse>, Status> {
        self.authorizer.authorize(&request, CLIENT_OR_SERVICE)?;
        let servers = self
            .registry
            .snapshot()
            .into_iter()
            .map(|ts| ListTabletServersEntry {
                instance_id: ts.instance().clone(),
                registration: ts.registration().clone(),
                millis_since_heartbeat: ts.millis_since_heartbeat(),
            })
            .collect();
        Ok(Response::new(ListTabletServersResponse {
            error: None,
            servers,
        }))
    }

    async fn list_masters(
        &self,
        request: Request<ListMastersRequest>,
    ) -> Result<Response<ListMastersResponse>, Status> {
        self.authorizer.authorize(&request, CLIENT_OR_SERVICE)?;
        Ok(Response::new(self.bootstrap.list_masters().await))
    }

    async fn get_master_registration(
        &self,
        request: Request<GetMasterRegistrationRequest>,
    ) -> Result<Response<GetMasterRegistrationResponse>, Status> {
        self.authorizer.authorize(&request, CLIENT_OR_SERVICE)?;
        Ok(Response::new(self.bootstrap.get_master_registration().await))
    }

    async fn connect_to_master(
        &self,
        request: Request<ConnectToMasterRequest>,
    ) -> Result<Response<ConnectToMasterResponse>, Status> {
        let user = self.authorizer.authorize(&request, CLIENT_OR_SERVICE)?;
        Ok(Response::new(self.bootstrap.connect_to_master(&user).await))
    }

    async fn create_table(
        &self,
        request: Request<CreateTableRequest>,
    ) -> Result<Response<CreateTableResponse>, Status> {
        self.forward(request).await
    }

    async fn is_create_table_done(
        &self,
        request: Request<IsCreateTableDoneRequest>,
    ) -> Result<Response<IsCreateTableDoneResponse>, Status> {
        self.forward(request).await
    }

    async fn delete_table(
        &self,
        request: Request<DeleteTableRequest>,
    ) -> Result<Response<DeleteTableResponse>, Status> {
        self.forward(request).await
    }

    async fn alter_table(
        &self,
        request: Request<AlterTableRequest>,
    ) -> Result<Response<AlterTableResponse>, Status> {
        self.forward(request).await
    }

    async fn is_alter_table_done(
        &self,
        request: Request<IsAlterTableDoneRequest>,
    ) -> Result<Response<IsAlterTableDoneResponse>, Status> {
        self.forward(request).await
    }

    async fn list_tables(
        &self,
        request: Request<ListTablesRequest>,
    ) -> Result<Response<ListTablesResponse>, Status> {
        self.forward(request).await
    }

    async fn get_table_locations(
        &self,
        request: Request<GetTableLocationsRequest>,
    ) -> Result<Response<GetTableLocationsResponse>, Status> {
        self.forward(request).await
    }

    async fn get_table_schema(
        &self,
        request: Request<GetTableSchemaRequest>,
    ) -> Result<Response<GetTableSchemaResponse>, Status> {
        self.forward(request).await
    }

    async fn get_tablet_locations(
        &self,
        request: Request<GetTabletLocationsRequest>,
    ) -> Result<Response<GetTabletLocationsResponse>, Status> {
        self.forward(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use test_log::test;
    use tonic::Code;

    use tessera_types::errors::MasterErrorCode;
    use tessera_types::net::catalog::TableIdentifier;

    use crate::authz::{AuthenticationType, RemoteUser};
    use crate::test_util::{
        SUPERUSER, TestMasterEnv, registering_heartbeat, request_as, service_user, test_schema,
    };

    fn client() -> RemoteUser {
        RemoteUser::new("alice", AuthenticationType::Kerberos)
    }

    #[test(tokio::test)]
    async fn ping_requires_a_known_role() -> anyhow::Result<()> {
        let env = TestMasterEnv::follower();
        let service = env.service();

        service
            .ping(request_as(PingRequest::default(), service_user()))
            .await?;
        service.ping(request_as(PingRequest::default(), client())).await?;

        let status = service.ping(Request::new(PingRequest::default())).await.unwrap_err();
        assert_that!(status.code(), eq(Code::Unauthenticated));
        Ok(())
    }

    #[test(tokio::test)]
    async fn superuser_cannot_heartbeat() {
        let env = TestMasterEnv::leader();
        let superuser = RemoteUser::new(SUPERUSER, AuthenticationType::Kerberos);
        let instance = NodeInstance::new("ts-1", 1);

        let status = env
            .service()
            .ts_heartbeat(request_as(
                registering_heartbeat(&instance, "ts-1.local"),
                superuser,
            ))
            .await
            .unwrap_err();
        assert_that!(status.code(), eq(Code::PermissionDenied));
        assert_that!(env.registry.is_empty(), eq(true));
    }

    #[test(tokio::test)]
    async fn tablet_servers_cannot_create_tables() {
        let env = TestMasterEnv::leader();
        let status = env
            .service()
            .create_table(request_as(
                CreateTableRequest {
                    name: "metrics".to_owned(),
                    schema: test_schema(),
                    ..Default::default()
                },
                service_user(),
            ))
            .await
            .unwrap_err();
        assert_that!(status.code(), eq(Code::PermissionDenied));
        assert_that!(env.catalog.calls(), eq(0));
    }

    #[test(tokio::test)]
    async fn create_table_on_follower_returns_structured_error() -> anyhow::Result<()> {
        let env = TestMasterEnv::follower();
        let resp = env
            .service()
            .create_table(request_as(
                CreateTableRequest {
                    name: "metrics".to_owned(),
                    schema: test_schema(),
                    ..Default::default()
                },
                client(),
            ))
            .await?
            .into_inner();

        assert_that!(
            resp.error.map(|e| e.code),
            some(eq(MasterErrorCode::NotTheLeader))
        );
        assert_that!(env.catalog.table_names(), empty());
        Ok(())
    }

    #[test(tokio::test)]
    async fn every_catalog_call_is_gated_on_follower() -> anyhow::Result<()> {
        let env = TestMasterEnv::follower();
        let service = env.service();
        let table = TableIdentifier::by_name("metrics");

        let errors = [
            service
                .is_create_table_done(request_as(
                    IsCreateTableDoneRequest {
                        table: table.clone(),
                    },
                    client(),
                ))
                .await?
                .into_inner()
                .error,
            service
                .delete_table(request_as(
                    DeleteTableRequest {
                        table: table.clone(),
                    },
                    client(),
                ))
                .await?
                .into_inner()
                .error,
            service
                .alter_table(request_as(
                    AlterTableRequest {
                        table: table.clone(),
                        ..Default::default()
                    },
                    client(),
                ))
                .await?
                .into_inner()
                .error,
            service
                .is_alter_table_done(request_as(
                    IsAlterTableDoneRequest {
                        table: table.clone(),
                    },
                    client(),
                ))
                .await?
                .into_inner()
                .error,
            service
                .list_tables(request_as(ListTablesRequest::default(), client()))
                .await?
                .into_inner()
                .error,
            service
                .get_table_locations(request_as(
                    GetTableLocationsRequest {
                        table: table.clone(),
                        ..Default::default()
                    },
                    client(),
                ))
                .await?
                .into_inner()
                .error,
            service
                .get_table_schema(request_as(GetTableSchemaRequest { table }, client()))
                .await?
                .into_inner()
                .error,
            service
                .get_tablet_locations(request_as(
                    GetTabletLocationsRequest {
                        tablet_ids: vec!["t-1".to_owned()],
                    },
                    client(),
                ))
                .await?
                .into_inner()
                .error,
        ];

        for error in errors {
            assert_that!(
                error.map(|e| e.code),
                some(eq(MasterErrorCode::NotTheLeader))
            );
        }
        assert_that!(env.catalog.calls(), eq(0));
        Ok(())
    }

    #[test(tokio::test)]
    async fn list_tablet_servers_without_servers_is_empty() -> anyhow::Result<()> {
        let env = TestMasterEnv::uninitialized();
        let resp = env
            .service()
            .list_tablet_servers(request_as(ListTabletServersRequest::default(), client()))
            .await?
            .into_inner();

        assert_that!(resp.error, none());
        assert_that!(resp.servers, empty());
        Ok(())
    }

    #[test(tokio::test)]
    async fn list_tablet_servers_reports_registered_servers() -> anyhow::Result<()> {
        let env = TestMasterEnv::follower();
        let service = env.service();
        for uuid in ["ts-2", "ts-1"] {
            service
                .ts_heartbeat(request_as(
                    registering_heartbeat(&NodeInstance::new(uuid, 1), &format!("{uuid}.local")),
                    service_user(),
                ))
                .await?;
        }

        let resp = service
            .list_tablet_servers(request_as(ListTabletServersRequest::default(), client()))
            .await?
            .into_inner();
        let uuids: Vec<_> = resp
            .servers
            .iter()
            .map(|entry| entry.instance_id.permanent_uuid.as_str())
            .collect();
        assert_that!(uuids, elements_are![eq("ts-1"), eq("ts-2")]);
        assert_that!(
            resp.servers[0].registration.rpc_addresses[0].host,
            eq("ts-1.local")
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn concurrent_heartbeats_register_every_server() -> anyhow::Result<()> {
        let env = TestMasterEnv::leader();
        let service = env.service();

        let heartbeats = (0..16).map(|idx| {
            let instance = NodeInstance::new(format!("ts-{idx}"), 1);
            service.ts_heartbeat(request_as(
                registering_heartbeat(&instance, &format!("ts-{idx}.local")),
                service_user(),
            ))
        });
        for result in futures::future::join_all(heartbeats).await {
            let resp = result?.into_inner();
            assert_that!(resp.leader_master, eq(true));
            assert_that!(resp.needs_reregister, eq(false));
        }
        assert_that!(env.registry.len(), eq(16));
        Ok(())
    }

    #[test(tokio::test)]
    async fn connect_to_master_uses_caller_identity() -> anyhow::Result<()> {
        let env = TestMasterEnv::leader();
        let resp = env
            .service()
            .connect_to_master(request_as(ConnectToMasterRequest::default(), client()))
            .await?
            .into_inner();

        assert_that!(
            resp.authn_token.map(|token| token.token_data),
            some(eq(bytes::Bytes::from_static(b"token-for-alice")))
        );
        Ok(())
    }

    #[test]
    fn feature_support_follows_options() {
        let env = TestMasterEnv::new(
            crate::leadership::CatalogStatus::ready_leader(),
            TestMasterEnv::default_options()
                .support_connect_to_master_rpc(false)
                .build()
                .unwrap(),
        );
        let service = env.service();
        assert_that!(service.supports_feature(1), eq(true));
        assert_that!(service.supports_feature(3), eq(false));
        assert_that!(service.features().unsupported(&[2, 3]), elements_are![eq(3)]);
    }
}
