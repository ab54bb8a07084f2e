// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Forwards the table and tablet metadata calls to the catalog manager.
//!
//! All calls share [`CatalogForwarder::forward`]: the leader gate, the delegation and the
//! normalization of delegate failures. Failures are always reported in the response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::histogram;
use tokio::time::Instant;
use tracing::{debug, trace};

use tessera_types::net::HasMasterError;
use tessera_types::net::catalog::{
    AlterTableRequest, AlterTableResponse, CreateTableRequest, CreateTableResponse,
    DeleteTableRequest, DeleteTableResponse, GetTableLocationsRequest, GetTableLocationsResponse,
    GetTableSchemaRequest, GetTableSchemaResponse, GetTabletLocationsRequest,
    GetTabletLocationsResponse, IsAlterTableDoneRequest, IsAlterTableDoneResponse,
    IsCreateTableDoneRequest, IsCreateTableDoneResponse, ListTablesRequest, ListTablesResponse,
    TabletLocationsError,
};

use crate::authz::RemoteUser;
use crate::collaborators::CatalogManager;
use crate::error::{AppError, CatalogError};
use crate::leadership::LeadershipState;
use crate::metric_definitions::MASTER_CATALOG_CALL_DURATION;
use crate::normalizer::check_resp_error_or_set_unknown;

/// A metadata call which is answered by the catalog manager.
#[async_trait]
pub trait CatalogCall: Send + Sync {
    type Response: HasMasterError + Default + Send;

    const NAME: &'static str;

    /// Location lookups are subject to the injected lookup latency.
    const IS_LOCATION_LOOKUP: bool = false;

    async fn delegate(
        &self,
        catalog: &dyn CatalogManager,
        resp: &mut Self::Response,
        user: &RemoteUser,
    ) -> Result<(), CatalogError>;
}

pub struct CatalogForwarder {
    leadership: LeadershipState,
    catalog: Arc<dyn CatalogManager>,
    lookup_latency: Option<Duration>,
}

impl CatalogForwarder {
    pub fn new(
        leadership: LeadershipState,
        catalog: Arc<dyn CatalogManager>,
        lookup_latency: Option<Duration>,
    ) -> Self {
        Self {
            leadership,
            catalog,
            lookup_latency,
        }
    }

    pub async fn forward<C: CatalogCall>(&self, call: &C, user: &RemoteUser) -> C::Response {
        let mut resp = C::Response::default();

        let lease = self.leadership.lease().await;
        if !lease.check_initialized_and_leader(&mut resp) {
            return resp;
        }

        if C::IS_LOCATION_LOOKUP {
            if let Some(latency) = self.lookup_latency {
                debug!(call = C::NAME, ?latency, "Injecting latency into location lookup");
                tokio::time::sleep(latency).await;
            }
        }

        let start = Instant::now();
        let result = call.delegate(self.catalog.as_ref(), &mut resp, user).await;
        histogram!(MASTER_CATALOG_CALL_DURATION, "call" => C::NAME).record(start.elapsed());
        trace!(call = C::NAME, ok = result.is_ok(), "Catalog call completed");

        check_resp_error_or_set_unknown(result, &mut resp);
        resp
    }
}

#[async_trait]
impl CatalogCall for CreateTableRequest {
    type Response = CreateTableResponse;
    const NAME: &'static str = "create_table";

    async fn delegate(
        &self,
        catalog: &dyn CatalogManager,
        resp: &mut Self::Response,
        user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        catalog.create_table(self, resp, user).await
    }
}

#[async_trait]
impl CatalogCall for IsCreateTableDoneRequest {
    type Response = IsCreateTableDoneResponse;
    const NAME: &'static str = "is_create_table_done";

    async fn delegate(
        &self,
        catalog: &dyn CatalogManager,
        resp: &mut Self::Response,
        _user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        catalog.is_create_table_done(self, resp).await
    }
}

#[async_trait]
impl CatalogCall for DeleteTableRequest {
    type Response = DeleteTableResponse;
    const NAME: &'static str = "delete_table";

    async fn delegate(
        &self,
        catalog: &dyn CatalogManager,
        resp: &mut Self::Response,
        user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        catalog.delete_table(self, resp, user).await
    }
}

#[async_trait]
impl CatalogCall for AlterTableRequest {
    type Response = AlterTableResponse;
    const NAME: &'static str = "alter_table";

    async fn delegate(
        &self,
        catalog: &dyn CatalogManager,
        resp: &mut Self::Response,
        user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        catalog.alter_table(self, resp, user).await
    }
}

#[async_trait]
impl CatalogCall for IsAlterTableDoneRequest {
    type Response = IsAlterTableDoneResponse;
    const NAME: &'static str = "is_alter_table_done";

    async fn delegate(
        &self,
        catalog: &dyn CatalogManager,
        resp: &mut Self::Response,
        _user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        catalog.is_alter_table_done(self, resp).await
    }
}

#[async_trait]
impl CatalogCall for ListTablesRequest {
    type Response = ListTablesResponse;
    const NAME: &'static str = "list_tables";

    async fn delegate(
        &self,
        catalog: &dyn CatalogManager,
        resp: &mut Self::Response,
        _user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        catalog.list_tables(self, resp).await
    }
}

#[async_trait]
impl CatalogCall for GetTableLocationsRequest {
    type Response = GetTableLocationsResponse;
    const NAME: &'static str = "get_table_locations";
    const IS_LOCATION_LOOKUP: bool = true;

    async fn delegate(
        &self,
        catalog: &dyn CatalogManager,
        resp: &mut Self::Response,
        _user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        catalog.get_table_locations(self, resp).await
    }
}

#[async_trait]
impl CatalogCall for GetTableSchemaRequest {
    type Response = GetTableSchemaResponse;
    const NAME: &'static str = "get_table_schema";

    async fn delegate(
        &self,
        catalog: &dyn CatalogManager,
        resp: &mut Self::Response,
        _user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        catalog.get_table_schema(self, resp).await
    }
}

#[async_trait]
impl CatalogCall for GetTabletLocationsRequest {
    type Response = GetTabletLocationsResponse;
    const NAME: &'static str = "get_tablet_locations";
    const IS_LOCATION_LOOKUP: bool = true;

    /// Every tablet is resolved on its own. A failed tablet is reported next to the locations of
    /// the others.
    async fn delegate(
        &self,
        catalog: &dyn CatalogManager,
        resp: &mut Self::Response,
        _user: &RemoteUser,
    ) -> Result<(), CatalogError> {
        for tablet_id in &self.tablet_ids {
            match catalog.get_tablet_locations(tablet_id).await {
                Ok(locations) => resp.tablet_locations.push(locations),
                Err(err) => {
                    debug!(%tablet_id, %err, "Unable to resolve tablet locations");
                    resp.errors.push(TabletLocationsError {
                        tablet_id: tablet_id.clone(),
                        status: err.to_app_status(),
                    });
                }
            }
        }
        Ok(())
    }
}
