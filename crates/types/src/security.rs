// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Public material exchanged by the master to bootstrap trust in the cluster.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::time::MillisSinceEpoch;

/// Public part of a token signing key (TSK).
///
/// Keys are identified by a monotonically increasing sequence number. Workers remember the
/// highest sequence number they know of and send it with every heartbeat so the master only
/// needs to ship the keys they are missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSigningPublicKey {
    pub key_seq_num: i64,
    pub public_key_der: Bytes,
    pub expire_unix_epoch_seconds: i64,
}

impl TokenSigningPublicKey {
    pub fn is_expired_at(&self, now: MillisSinceEpoch) -> bool {
        i64::try_from(now.as_secs()).unwrap_or(i64::MAX) >= self.expire_unix_epoch_seconds
    }
}

/// A token together with the signature of the key that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignedToken {
    pub token_data: Bytes,
    pub signature: Bytes,
    pub signing_key_seq_num: i64,
}
