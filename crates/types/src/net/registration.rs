// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::{Deserialize, Serialize};

use crate::errors::AppStatus;
use crate::time::MillisSinceEpoch;
use crate::{HostPort, NodeInstance, RaftRole};

/// Registration info of a server: where it can be reached and what it runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerRegistration {
    pub rpc_addresses: Vec<HostPort>,
    pub http_addresses: Vec<HostPort>,
    pub software_version: Option<String>,
    pub https_enabled: bool,
    pub start_time: Option<MillisSinceEpoch>,
}

/// A master peer as reported by `ListMasters`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerEntry {
    pub instance_id: Option<NodeInstance>,
    pub registration: Option<ServerRegistration>,
    pub role: RaftRole,
    /// Set if the peer could not be contacted.
    pub error: Option<AppStatus>,
}
