// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Cluster discovery and bootstrap calls.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::{AppStatus, MasterError};
use crate::macros::master_responses;
use crate::net::registration::{ServerEntry, ServerRegistration};
use crate::security::SignedToken;
use crate::{HostPort, NodeInstance, RaftRole};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PingRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PingResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListTabletServersRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListTabletServersEntry {
    pub instance_id: NodeInstance,
    pub registration: ServerRegistration,
    pub millis_since_heartbeat: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListTabletServersResponse {
    pub error: Option<MasterError>,
    pub servers: Vec<ListTabletServersEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListMastersRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListMastersResponse {
    pub error: Option<MasterError>,
    pub masters: Vec<ServerEntry>,
    /// Mirror of `error.status` kept for clients which predate the structured error.
    pub deprecated_error: Option<AppStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetMasterRegistrationRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetMasterRegistrationResponse {
    pub error: Option<MasterError>,
    pub instance_id: Option<NodeInstance>,
    pub registration: Option<ServerRegistration>,
    pub role: Option<RaftRole>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectToMasterRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectToMasterResponse {
    pub error: Option<MasterError>,
    pub role: Option<RaftRole>,
    pub ca_cert_der: Vec<Bytes>,
    pub authn_token: Option<SignedToken>,
    pub master_addrs: Vec<HostPort>,
}

master_responses!(
    ListTabletServersResponse,
    ListMastersResponse,
    GetMasterRegistrationResponse,
    ConnectToMasterResponse,
);
