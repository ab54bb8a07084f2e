// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use super::InvalidConfigurationError;

/// # Master service options
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct MasterOptions {
    /// # Injected tablet lookup latency
    ///
    /// Time the master sleeps before answering tablet and table location lookups. Only meant
    /// for testing client behavior against slow masters. `0s` disables the injection.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub inject_latency_on_tablet_lookups: humantime::Duration,

    /// # Support ConnectToMaster
    ///
    /// Whether the ConnectToMaster feature is advertised to clients. Disabling it lets tests
    /// exercise the fallback path of older clients.
    pub support_connect_to_master_rpc: bool,

    /// # Non-leader masters propagate token signing keys
    ///
    /// Whether a non-leader master sends the public parts of its token signing keys in
    /// heartbeat responses. Only for test scenarios, production relies on the leader alone.
    pub non_leader_masters_propagate_tsk: bool,

    /// # Superuser ACL
    ///
    /// Users allowed to perform administrative operations. `*` allows everybody.
    pub superuser_acl: Vec<String>,

    /// # User ACL
    ///
    /// Users allowed to access the cluster as clients. `*` allows everybody.
    pub user_acl: Vec<String>,

    /// # Service ACL
    ///
    /// Service principals allowed to act as tablet servers.
    pub service_acl: Vec<String>,
}

impl MasterOptions {
    pub fn inject_latency_on_tablet_lookups(&self) -> Option<Duration> {
        let latency: Duration = self.inject_latency_on_tablet_lookups.into();
        (!latency.is_zero()).then_some(latency)
    }

    pub fn validate(&self) -> Result<(), InvalidConfigurationError> {
        for (name, acl) in [
            ("superuser-acl", &self.superuser_acl),
            ("user-acl", &self.user_acl),
            ("service-acl", &self.service_acl),
        ] {
            if acl.iter().any(|entry| entry.trim().is_empty()) {
                return Err(InvalidConfigurationError::EmptyAclEntry(name));
            }
        }
        Ok(())
    }
}

impl Default for MasterOptions {
    fn default() -> Self {
        Self {
            inject_latency_on_tablet_lookups: Duration::ZERO.into(),
            support_connect_to_master_rpc: true,
            non_leader_masters_propagate_tsk: false,
            superuser_acl: Vec::new(),
            user_acl: vec!["*".to_owned()],
            service_acl: vec!["tessera".to_owned()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    #[test]
    fn latency_injection_is_disabled_by_default() {
        let options = MasterOptions::default();
        assert_that!(options.inject_latency_on_tablet_lookups(), none());
        assert_that!(options.support_connect_to_master_rpc, eq(true));
        assert_that!(options.non_leader_masters_propagate_tsk, eq(false));
    }

    #[test]
    fn builder_overrides_defaults() {
        let options = MasterOptionsBuilder::default()
            .inject_latency_on_tablet_lookups(Duration::from_millis(250).into())
            .build()
            .unwrap();
        assert_that!(
            options.inject_latency_on_tablet_lookups(),
            some(eq(Duration::from_millis(250)))
        );
        assert_that!(options.user_acl, elements_are![eq("*")]);
    }

    #[test]
    fn reject_empty_acl_entries() {
        let options = MasterOptionsBuilder::default()
            .service_acl(vec!["tessera".to_owned(), " ".to_owned()])
            .build()
            .unwrap();
        assert_that!(
            options.validate(),
            err(displays_as(contains_substring("service-acl")))
        );
    }
}
