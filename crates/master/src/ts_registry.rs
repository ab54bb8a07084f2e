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

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::counter;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::info;

use tessera_types::NodeInstance;
use tessera_types::errors::AppStatusCode;
use tessera_types::net::registration::ServerRegistration;

use crate::error::AppError;
use crate::metric_definitions::MASTER_TS_REGISTRATIONS;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown tablet server {0}")]
    NotFound(String),
    #[error(
        "tablet server {uuid} is registered with instance seqno {registered}, heartbeat was sent by seqno {requested}"
    )]
    SeqnoMismatch {
        uuid: String,
        registered: i64,
        requested: i64,
    },
    #[error(
        "stale registration for tablet server {uuid}: instance seqno {requested} is older than the registered {registered}"
    )]
    StaleInstance {
        uuid: String,
        registered: i64,
        requested: i64,
    },
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),
}

impl RegistryError {
    /// Whether the tablet server has to register (again) before its heartbeats are accepted.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::NotFound(_) | RegistryError::SeqnoMismatch { .. }
        )
    }
}

impl AppError for RegistryError {
    fn app_status_code(&self) -> AppStatusCode {
        match self {
            RegistryError::NotFound(_) | RegistryError::SeqnoMismatch { .. } => {
                AppStatusCode::NotFound
            }
            RegistryError::StaleInstance { .. } => AppStatusCode::AlreadyPresent,
            RegistryError::InvalidRegistration(_) => AppStatusCode::InvalidArgument,
        }
    }
}

/// Advisory state refreshed by every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftState {
    pub last_heartbeat: Instant,
    pub num_live_replicas: i32,
    /// Whether a full tablet report was processed since the last registration.
    pub has_tablet_report: bool,
}

/// A registered tablet server. The registration is immutable; a re-registration installs a new
/// descriptor.
#[derive(Debug)]
pub struct TsDescriptor {
    instance: NodeInstance,
    registration: ServerRegistration,
    soft_state: Mutex<SoftState>,
}

impl TsDescriptor {
    fn new(instance: NodeInstance, registration: ServerRegistration) -> Self {
        Self {
            instance,
            registration,
            soft_state: Mutex::new(SoftState {
                last_heartbeat: Instant::now(),
                num_live_replicas: 0,
                has_tablet_report: false,
            }),
        }
    }

    pub fn permanent_uuid(&self) -> &str {
        &self.instance.permanent_uuid
    }

    pub fn instance(&self) -> &NodeInstance {
        &self.instance
    }

    pub fn registration(&self) -> &ServerRegistration {
        &self.registration
    }

    pub fn soft_state(&self) -> SoftState {
        *self.soft_state.lock()
    }

    /// Records a heartbeat along with the live replica count it reported.
    pub fn update_heartbeat(&self, num_live_replicas: i32) {
        let mut soft_state = self.soft_state.lock();
        soft_state.last_heartbeat = Instant::now();
        soft_state.num_live_replicas = num_live_replicas;
    }

    pub fn set_has_tablet_report(&self, has_tablet_report: bool) {
        self.soft_state.lock().has_tablet_report = has_tablet_report;
    }

    pub fn millis_since_heartbeat(&self) -> u64 {
        let elapsed = self.soft_state.lock().last_heartbeat.elapsed();
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Tablet servers known to this master, keyed by permanent uuid.
#[derive(Debug, Default)]
pub struct TsRegistry {
    servers: DashMap<String, Arc<TsDescriptor>>,
}

impl TsRegistry {
    /// Registers a tablet server, replacing an existing registration of the same or an older
    /// instance. The soft state of a replaced descriptor is discarded.
    pub fn register(
        &self,
        instance: &NodeInstance,
        registration: &ServerRegistration,
    ) -> Result<Arc<TsDescriptor>, RegistryError> {
        if instance.permanent_uuid.is_empty() {
            return Err(RegistryError::InvalidRegistration(
                "missing permanent uuid".to_owned(),
            ));
        }
        if registration.rpc_addresses.is_empty() {
            return Err(RegistryError::InvalidRegistration(format!(
                "tablet server {instance} did not advertise any rpc address"
            )));
        }

        let descriptor = Arc::new(TsDescriptor::new(instance.clone(), registration.clone()));
        match self.servers.entry(instance.permanent_uuid.clone()) {
            Entry::Occupied(mut entry) => {
                let registered = entry.get().instance.instance_seqno;
                if registered > instance.instance_seqno {
                    return Err(RegistryError::StaleInstance {
                        uuid: instance.permanent_uuid.clone(),
                        registered,
                        requested: instance.instance_seqno,
                    });
                }
                entry.insert(Arc::clone(&descriptor));
                info!(%instance, "Re-registered tablet server");
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&descriptor));
                info!(%instance, "Registered new tablet server");
            }
        }
        counter!(MASTER_TS_REGISTRATIONS).increment(1);

        Ok(descriptor)
    }

    /// Finds the descriptor registered by exactly this instance of the tablet server.
    pub fn lookup(&self, instance: &NodeInstance) -> Result<Arc<TsDescriptor>, RegistryError> {
        let descriptor = self
            .get(&instance.permanent_uuid)
            .ok_or_else(|| RegistryError::NotFound(instance.permanent_uuid.clone()))?;

        let registered = descriptor.instance.instance_seqno;
        if registered != instance.instance_seqno {
            return Err(RegistryError::SeqnoMismatch {
                uuid: instance.permanent_uuid.clone(),
                registered,
                requested: instance.instance_seqno,
            });
        }
        Ok(descriptor)
    }

    pub fn get(&self, permanent_uuid: &str) -> Option<Arc<TsDescriptor>> {
        self.servers
            .get(permanent_uuid)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Point in time view of all registered tablet servers, ordered by uuid.
    pub fn snapshot(&self) -> Vec<Arc<TsDescriptor>> {
        let mut servers: Vec<_> = self
            .servers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        servers.sort_by(|a, b| a.permanent_uuid().cmp(b.permanent_uuid()));
        servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use googletest::prelude::*;
    use tessera_types::HostPort;
    use test_log::test;

    fn registration(host: &str) -> ServerRegistration {
        ServerRegistration {
            rpc_addresses: vec![HostPort::new(host, 7050)],
            software_version: Some("tessera 0.3.0".to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn lookup_unknown_server_is_not_found() {
        let registry = TsRegistry::default();
        let err = registry.lookup(&NodeInstance::new("ts-1", 1)).unwrap_err();
        assert_that!(err.is_not_found(), eq(true));
        assert_that!(registry.is_empty(), eq(true));
    }

    #[test(tokio::test(start_paused = true))]
    async fn heartbeat_updates_soft_state_only() {
        let registry = TsRegistry::default();
        let instance = NodeInstance::new("ts-1", 1);
        registry.register(&instance, &registration("ts-1.local")).unwrap();

        tokio::time::advance(Duration::from_millis(300)).await;
        let descriptor = registry.lookup(&instance).unwrap();
        assert_that!(descriptor.millis_since_heartbeat(), eq(300));

        descriptor.update_heartbeat(12);
        assert_that!(descriptor.millis_since_heartbeat(), eq(0));
        assert_that!(descriptor.soft_state().num_live_replicas, eq(12));

        descriptor.update_heartbeat(3);
        assert_that!(descriptor.soft_state().num_live_replicas, eq(3));
        assert_that!(descriptor.registration(), eq(&registration("ts-1.local")));
    }

    #[test]
    fn re_registration_replaces_descriptor() {
        let registry = TsRegistry::default();
        let instance = NodeInstance::new("ts-1", 1);
        let first = registry.register(&instance, &registration("old.local")).unwrap();
        first.update_heartbeat(5);
        first.set_has_tablet_report(true);

        let restarted = NodeInstance::new("ts-1", 2);
        registry.register(&restarted, &registration("new.local")).unwrap();

        assert_that!(registry.len(), eq(1));
        let current = registry.lookup(&restarted).unwrap();
        assert_that!(current.registration(), eq(&registration("new.local")));
        assert_that!(current.soft_state().num_live_replicas, eq(0));
        assert_that!(current.soft_state().has_tablet_report, eq(false));

        // heartbeats of the previous incarnation have to register again
        let err = registry.lookup(&instance).unwrap_err();
        assert_that!(err.is_not_found(), eq(true));
    }

    #[test]
    fn stale_instance_cannot_register() {
        let registry = TsRegistry::default();
        registry
            .register(&NodeInstance::new("ts-1", 5), &registration("a.local"))
            .unwrap();

        let err = registry
            .register(&NodeInstance::new("ts-1", 4), &registration("b.local"))
            .unwrap_err();
        assert_that!(err.is_not_found(), eq(false));
        assert_that!(err.app_status_code(), eq(AppStatusCode::AlreadyPresent));
        assert_that!(
            registry.get("ts-1").unwrap().registration(),
            eq(&registration("a.local"))
        );
    }

    #[test]
    fn registration_without_rpc_address_is_rejected() {
        let registry = TsRegistry::default();
        let err = registry
            .register(&NodeInstance::new("ts-1", 1), &ServerRegistration::default())
            .unwrap_err();
        assert_that!(err, displays_as(contains_substring("rpc address")));
    }

    #[test]
    fn snapshot_is_ordered_by_uuid() {
        let registry = TsRegistry::default();
        for uuid in ["ts-c", "ts-a", "ts-b"] {
            registry
                .register(&NodeInstance::new(uuid, 1), &registration(uuid))
                .unwrap();
        }
        let uuids: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|ts| ts.permanent_uuid().to_owned())
            .collect();
        assert_that!(uuids, elements_are![eq("ts-a"), eq("ts-b"), eq("ts-c")]);
    }
}
