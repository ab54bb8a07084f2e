// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::NodeInstance;
use crate::errors::{AppStatus, MasterError};
use crate::macros::master_responses;
use crate::net::registration::ServerRegistration;
use crate::security::TokenSigningPublicKey;

/// Fields common to every message sent by a tablet server to the master.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TsToMasterCommon {
    pub ts_instance: NodeInstance,
}

/// State of one tablet replica as seen by the reporting tablet server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportedTablet {
    pub tablet_id: String,
    pub schema_version: Option<u32>,
    pub error: Option<AppStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabletReport {
    /// An incremental report only carries tablets which changed since the previous one.
    pub is_incremental: bool,
    pub updated_tablets: Vec<ReportedTablet>,
    pub sequence_number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportedTabletUpdate {
    pub tablet_id: String,
    pub state_msg: Option<String>,
}

/// The master's reaction to a tablet report.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabletReportUpdates {
    pub tablets: Vec<ReportedTabletUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TsHeartbeatRequest {
    pub common: TsToMasterCommon,
    /// Sent on the first heartbeat after start-up and whenever the master asks to re-register.
    pub registration: Option<ServerRegistration>,
    pub num_live_tablets: Option<i32>,
    pub tablet_report: Option<TabletReport>,
    /// DER-encoded certificate signing request.
    pub csr_der: Option<Bytes>,
    /// Highest token signing key sequence number the tablet server knows of.
    pub latest_tsk_seq_num: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TsHeartbeatResponse {
    pub error: Option<MasterError>,
    pub master_instance: Option<NodeInstance>,
    pub leader_master: bool,
    pub needs_reregister: bool,
    pub needs_full_tablet_report: bool,
    pub tablet_report: Option<TabletReportUpdates>,
    pub signed_cert_der: Option<Bytes>,
    pub ca_cert_der: Vec<Bytes>,
    pub tsks: Vec<TokenSigningPublicKey>,
}

master_responses!(TsHeartbeatResponse);
