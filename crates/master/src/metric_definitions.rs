// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use metrics::{Unit, describe_counter, describe_histogram};

pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_REREGISTER: &str = "reregister";
pub const OUTCOME_FAILED: &str = "failed";
pub const OUTCOME_REJECTED: &str = "rejected";

/// dimensioned by "outcome" (OUTCOME_*)
pub const MASTER_HEARTBEATS: &str = "tessera.master.heartbeats.total";
pub const MASTER_TS_REGISTRATIONS: &str = "tessera.master.ts_registrations.total";
/// dimensioned by "reason"
pub const MASTER_GATE_REJECTIONS: &str = "tessera.master.gate_rejections.total";
pub const MASTER_CERTS_SIGNED: &str = "tessera.master.certs_signed.total";
pub const MASTER_AUTHN_TOKENS_ISSUED: &str = "tessera.master.authn_tokens_issued.total";
/// dimensioned by "call"
pub const MASTER_CATALOG_CALL_DURATION: &str = "tessera.master.catalog_call.duration.seconds";

pub fn describe_metrics() {
    describe_counter!(
        MASTER_HEARTBEATS,
        Unit::Count,
        "Number of tablet server heartbeats, dimensioned by outcome"
    );
    describe_counter!(
        MASTER_TS_REGISTRATIONS,
        Unit::Count,
        "Number of tablet server (re-)registrations"
    );
    describe_counter!(
        MASTER_GATE_REJECTIONS,
        Unit::Count,
        "Number of calls rejected by the leadership gate, dimensioned by reason"
    );
    describe_counter!(
        MASTER_CERTS_SIGNED,
        Unit::Count,
        "Number of tablet server certificates signed"
    );
    describe_counter!(
        MASTER_AUTHN_TOKENS_ISSUED,
        Unit::Count,
        "Number of authentication tokens issued to connecting clients"
    );
    describe_histogram!(
        MASTER_CATALOG_CALL_DURATION,
        Unit::Seconds,
        "Time spent in the catalog manager per forwarded call"
    );
}
