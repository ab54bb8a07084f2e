// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;
use tracing::debug;

use tessera_types::security::TokenSigningPublicKey;
use tessera_types::time::MillisSinceEpoch;

/// Public parts of the token signing keys. Keys are rotated in by the token signer and exported
/// to tablet servers through heartbeats.
#[derive(Debug, Default)]
pub struct TokenVerifier {
    keys: RwLock<BTreeMap<i64, TokenSigningPublicKey>>,
}

impl TokenVerifier {
    pub fn add_keys(&self, keys: impl IntoIterator<Item = TokenSigningPublicKey>) {
        let mut guard = self.keys.write();
        for key in keys {
            debug!(key_seq_num = key.key_seq_num, "Adding token signing key");
            guard.insert(key.key_seq_num, key);
        }
    }

    /// Keys with a sequence number above `after_seq_num` which have not expired, ordered by
    /// sequence number.
    pub fn export_keys(&self, after_seq_num: i64) -> Vec<TokenSigningPublicKey> {
        self.export_keys_at(after_seq_num, MillisSinceEpoch::now())
    }

    pub fn export_keys_at(
        &self,
        after_seq_num: i64,
        now: MillisSinceEpoch,
    ) -> Vec<TokenSigningPublicKey> {
        self.keys
            .read()
            .range((Bound::Excluded(after_seq_num), Bound::Unbounded))
            .map(|(_, key)| key)
            .filter(|key| !key.is_expired_at(now))
            .cloned()
            .collect()
    }

    pub fn latest_seq_num(&self) -> Option<i64> {
        self.keys.read().last_key_value().map(|(seq, _)| *seq)
    }
}
