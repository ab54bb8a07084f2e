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

use bytes::Bytes;
use metrics::counter;
use tonic::Status;
use tracing::{debug, info, warn};

use tessera_types::NodeInstance;
use tessera_types::net::HasMasterError;
use tessera_types::net::heartbeat::{TabletReportUpdates, TsHeartbeatRequest, TsHeartbeatResponse};

use crate::authz::{AuthenticationType, RemoteUser};
use crate::collaborators::{CatalogManager, CertAuthority};
use crate::error::{AppError, SecurityError};
use crate::leadership::LeadershipState;
use crate::metric_definitions::{
    MASTER_CERTS_SIGNED, MASTER_HEARTBEATS, OUTCOME_FAILED, OUTCOME_OK, OUTCOME_REJECTED,
    OUTCOME_REREGISTER,
};
use crate::token_verifier::TokenVerifier;
use crate::ts_registry::TsRegistry;

/// Handles tablet server heartbeats: registration, soft state, tablet reports, certificate
/// signing and token signing key propagation.
pub struct HeartbeatProcessor {
    leadership: LeadershipState,
    registry: Arc<TsRegistry>,
    catalog: Arc<dyn CatalogManager>,
    cert_authority: Arc<dyn CertAuthority>,
    verifier: Arc<TokenVerifier>,
    self_instance: NodeInstance,
    non_leader_propagates_tsk: bool,
}

impl HeartbeatProcessor {
    pub fn new(
        leadership: LeadershipState,
        registry: Arc<TsRegistry>,
        catalog: Arc<dyn CatalogManager>,
        cert_authority: Arc<dyn CertAuthority>,
        verifier: Arc<TokenVerifier>,
        self_instance: NodeInstance,
        non_leader_propagates_tsk: bool,
    ) -> Self {
        Self {
            leadership,
            registry,
            catalog,
            cert_authority,
            verifier,
            self_instance,
            non_leader_propagates_tsk,
        }
    }

    pub async fn heartbeat(
        &self,
        req: &TsHeartbeatRequest,
        user: &RemoteUser,
    ) -> Result<TsHeartbeatResponse, Status> {
        let mut resp = TsHeartbeatResponse::default();
        let result = self.process(req, user, &mut resp).await;
        let outcome = match &result {
            Err(_) => OUTCOME_FAILED,
            Ok(()) if resp.has_error() => OUTCOME_REJECTED,
            Ok(()) if resp.needs_reregister => OUTCOME_REREGISTER,
            Ok(()) => OUTCOME_OK,
        };
        counter!(MASTER_HEARTBEATS, "outcome" => outcome).increment(1);
        result.map(|()| resp)
    }

    async fn process(
        &self,
        req: &TsHeartbeatRequest,
        user: &RemoteUser,
        resp: &mut TsHeartbeatResponse,
    ) -> Result<(), Status> {
        let lease = self.leadership.lease().await;
        if !lease.check_initialized(resp) {
            return Ok(());
        }
        let is_leader = lease.is_leader();
        let instance = &req.common.ts_instance;

        resp.master_instance = Some(self.self_instance.clone());
        resp.leader_master = is_leader;

        let descriptor = match &req.registration {
            Some(registration) => {
                let descriptor = self
                    .registry
                    .register(instance, registration)
                    .map_err(|err| {
                        warn!(%instance, %user, %err, "Unable to register tablet server");
                        err.to_status_with_context(&format!(
                            "Unable to register tserver ({user})"
                        ))
                    })?;
                // a fresh registration has no tablets on record yet
                if is_leader && !descriptor.soft_state().has_tablet_report {
                    resp.needs_full_tablet_report = true;
                }
                descriptor
            }
            None => match self.registry.lookup(instance) {
                Ok(descriptor) => descriptor,
                Err(err) if err.is_not_found() => {
                    info!(%instance, %err, "Got heartbeat from unknown tablet server, asking it to re-register");
                    resp.needs_reregister = true;
                    resp.needs_full_tablet_report = is_leader;
                    return Ok(());
                }
                Err(err) => {
                    warn!(%instance, %err, "Unable to look up tablet server for heartbeat");
                    return Err(err.to_status_with_context(&format!(
                        "Unable to lookup tserver ({user})"
                    )));
                }
            },
        };

        // an absent count means the server hosts no live replicas
        let num_live_tablets = req.num_live_tablets.unwrap_or(0);
        descriptor.update_heartbeat(num_live_tablets);
        debug!(%instance, num_live_tablets, "Processed tablet server heartbeat");

        if is_leader {
            if let Some(report) = &req.tablet_report {
                let mut updates = TabletReportUpdates::default();
                self.catalog
                    .process_tablet_report(&descriptor, report, &mut updates)
                    .await
                    .map_err(|err| {
                        warn!(%instance, %err, "Failed to process tablet report");
                        err.to_status_with_context("Failed to process tablet report")
                    })?;
                if !report.is_incremental {
                    descriptor.set_has_tablet_report(true);
                    resp.needs_full_tablet_report = false;
                }
                resp.tablet_report = Some(updates);
            }

            if let Some(csr_der) = &req.csr_der {
                let cert = self.sign_csr(csr_der, user).await.map_err(|err| {
                    warn!(%instance, %user, %err, "Unable to sign tablet server certificate");
                    err.to_status_with_context("invalid CSR")
                })?;
                info!(%instance, %user, "Signed X509 certificate for tablet server");
                counter!(MASTER_CERTS_SIGNED).increment(1);
                resp.signed_cert_der = Some(cert);
                resp.ca_cert_der = vec![self.cert_authority.ca_cert_der()];
            }
        }

        if let Some(latest_tsk_seq_num) = req.latest_tsk_seq_num {
            if is_leader || self.non_leader_propagates_tsk {
                resp.tsks = self.verifier.export_keys(latest_tsk_seq_num);
            }
        }

        Ok(())
    }

    async fn sign_csr(&self, csr_der: &[u8], user: &RemoteUser) -> Result<Bytes, SecurityError> {
        if user.authenticated_by == AuthenticationType::Unauthenticated {
            return Err(SecurityError::NotAuthorized {
                user: user.username.clone(),
                reason: "certificates are only signed for authenticated tablet servers".to_owned(),
            });
        }
        self.cert_authority.sign_server_csr(csr_der, user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use test_log::test;
    use tonic::Code;

    use tessera_types::errors::MasterErrorCode;
    use tessera_types::net::heartbeat::{ReportedTablet, TabletReport};
    use tessera_types::security::TokenSigningPublicKey;

    use crate::leadership::CatalogStatus;
    use crate::test_util::{
        TestMasterEnv, bare_heartbeat, registering_heartbeat, service_user, test_registration,
    };

    fn signing_keys() -> Vec<TokenSigningPublicKey> {
        (1..=3)
            .map(|seq| TokenSigningPublicKey {
                key_seq_num: seq,
                public_key_der: Bytes::from(format!("public-key-{seq}")),
                expire_unix_epoch_seconds: i64::MAX,
            })
            .collect()
    }

    fn full_report(tablets: &[&str]) -> TabletReport {
        TabletReport {
            is_incremental: false,
            updated_tablets: tablets
                .iter()
                .map(|id| ReportedTablet {
                    tablet_id: (*id).to_owned(),
                    ..Default::default()
                })
                .collect(),
            sequence_number: 0,
        }
    }

    #[test(tokio::test)]
    async fn unknown_server_on_leader_must_register_with_full_report() {
        let env = TestMasterEnv::leader();
        let resp = env
            .heartbeat_processor()
            .heartbeat(&bare_heartbeat(&NodeInstance::new("W1", 1)), &service_user())
            .await
            .unwrap();

        assert_that!(resp.error, none());
        assert_that!(resp.needs_reregister, eq(true));
        assert_that!(resp.needs_full_tablet_report, eq(true));
        assert_that!(resp.leader_master, eq(true));
        assert_that!(resp.master_instance, some(eq(env.self_instance.clone())));
    }

    #[test(tokio::test)]
    async fn unknown_server_on_follower_must_register_without_report() {
        let env = TestMasterEnv::follower();
        let resp = env
            .heartbeat_processor()
            .heartbeat(&bare_heartbeat(&NodeInstance::new("W1", 1)), &service_user())
            .await
            .unwrap();

        assert_that!(resp.needs_reregister, eq(true));
        assert_that!(resp.needs_full_tablet_report, eq(false));
        assert_that!(resp.leader_master, eq(false));
    }

    #[test(tokio::test)]
    async fn uninitialized_catalog_rejects_heartbeats() {
        let env = TestMasterEnv::uninitialized();
        let resp = env
            .heartbeat_processor()
            .heartbeat(
                &registering_heartbeat(&NodeInstance::new("W1", 1), "w1.local"),
                &service_user(),
            )
            .await
            .unwrap();

        assert_that!(
            resp.error.map(|e| e.code),
            some(eq(MasterErrorCode::CatalogManagerNotInitialized))
        );
        assert_that!(resp.master_instance, none());
        assert_that!(env.registry.is_empty(), eq(true));
    }

    #[test(tokio::test)]
    async fn bare_heartbeat_refreshes_soft_state_only() {
        let env = TestMasterEnv::follower();
        let processor = env.heartbeat_processor();
        let instance = NodeInstance::new("W1", 1);

        processor
            .heartbeat(&registering_heartbeat(&instance, "w1.local"), &service_user())
            .await
            .unwrap();

        let mut heartbeat = bare_heartbeat(&instance);
        heartbeat.num_live_tablets = Some(7);
        let resp = processor.heartbeat(&heartbeat, &service_user()).await.unwrap();
        assert_that!(resp.needs_reregister, eq(false));

        let descriptor = env.registry.lookup(&instance).unwrap();
        assert_that!(descriptor.soft_state().num_live_replicas, eq(7));
        assert_that!(descriptor.registration(), eq(&test_registration("w1.local")));
    }

    #[test(tokio::test)]
    async fn missing_live_tablet_count_resets_it_to_zero() {
        let env = TestMasterEnv::follower();
        let processor = env.heartbeat_processor();
        let instance = NodeInstance::new("W1", 1);

        let mut first = registering_heartbeat(&instance, "w1.local");
        first.num_live_tablets = Some(5);
        processor.heartbeat(&first, &service_user()).await.unwrap();

        processor
            .heartbeat(&bare_heartbeat(&instance), &service_user())
            .await
            .unwrap();
        assert_that!(
            env.registry.lookup(&instance).unwrap().soft_state().num_live_replicas,
            eq(0)
        );
    }

    #[test(tokio::test)]
    async fn re_registration_resets_live_replica_count() {
        let env = TestMasterEnv::follower();
        let processor = env.heartbeat_processor();
        let instance = NodeInstance::new("W1", 1);

        let mut first = registering_heartbeat(&instance, "w1.local");
        first.num_live_tablets = Some(4);
        processor.heartbeat(&first, &service_user()).await.unwrap();
        assert_that!(
            env.registry.lookup(&instance).unwrap().soft_state().num_live_replicas,
            eq(4)
        );

        processor
            .heartbeat(&registering_heartbeat(&instance, "w1-new.local"), &service_user())
            .await
            .unwrap();

        let descriptor = env.registry.lookup(&instance).unwrap();
        assert_that!(descriptor.soft_state().num_live_replicas, eq(0));
        assert_that!(descriptor.registration(), eq(&test_registration("w1-new.local")));
        assert_that!(env.registry.len(), eq(1));
    }

    #[test(tokio::test)]
    async fn restarted_server_is_asked_to_register_again() {
        let env = TestMasterEnv::leader();
        let processor = env.heartbeat_processor();
        processor
            .heartbeat(
                &registering_heartbeat(&NodeInstance::new("W1", 1), "w1.local"),
                &service_user(),
            )
            .await
            .unwrap();

        let resp = processor
            .heartbeat(&bare_heartbeat(&NodeInstance::new("W1", 2)), &service_user())
            .await
            .unwrap();
        assert_that!(resp.needs_reregister, eq(true));
    }

    #[test(tokio::test)]
    async fn stale_registration_fails_the_call() {
        let env = TestMasterEnv::leader();
        let processor = env.heartbeat_processor();
        processor
            .heartbeat(
                &registering_heartbeat(&NodeInstance::new("W1", 3), "w1.local"),
                &service_user(),
            )
            .await
            .unwrap();

        let status = processor
            .heartbeat(
                &registering_heartbeat(&NodeInstance::new("W1", 2), "w1.local"),
                &service_user(),
            )
            .await
            .unwrap_err();
        assert_that!(status.code(), eq(Code::AlreadyExists));
        assert_that!(status.message(), contains_substring("Unable to register tserver"));
    }

    #[test(tokio::test)]
    async fn leader_processes_tablet_reports() {
        let env = TestMasterEnv::leader();
        let processor = env.heartbeat_processor();
        let instance = NodeInstance::new("W1", 1);

        let resp = processor
            .heartbeat(&registering_heartbeat(&instance, "w1.local"), &service_user())
            .await
            .unwrap();
        assert_that!(resp.needs_full_tablet_report, eq(true));

        let mut heartbeat = bare_heartbeat(&instance);
        heartbeat.tablet_report = Some(full_report(&["t-1", "t-2"]));
        let resp = processor.heartbeat(&heartbeat, &service_user()).await.unwrap();

        let updates = resp.tablet_report.unwrap();
        assert_that!(updates.tablets.len(), eq(2));
        assert_that!(resp.needs_full_tablet_report, eq(false));
        assert_that!(env.catalog.reports().len(), eq(1));
        assert_that!(
            env.registry.lookup(&instance).unwrap().soft_state().has_tablet_report,
            eq(true)
        );
    }

    #[test(tokio::test)]
    async fn full_report_with_registration_satisfies_leader() {
        let env = TestMasterEnv::leader();
        let instance = NodeInstance::new("W1", 1);
        let mut heartbeat = registering_heartbeat(&instance, "w1.local");
        heartbeat.tablet_report = Some(full_report(&["t-1"]));

        let resp = env
            .heartbeat_processor()
            .heartbeat(&heartbeat, &service_user())
            .await
            .unwrap();

        assert_that!(resp.tablet_report, some(anything()));
        assert_that!(resp.needs_full_tablet_report, eq(false));
        assert_that!(
            env.registry.lookup(&instance).unwrap().soft_state().has_tablet_report,
            eq(true)
        );
    }

    #[test(tokio::test)]
    async fn follower_ignores_tablet_reports_and_csrs() {
        let env = TestMasterEnv::follower();
        let instance = NodeInstance::new("W1", 1);
        let mut heartbeat = registering_heartbeat(&instance, "w1.local");
        heartbeat.tablet_report = Some(full_report(&["t-1"]));
        heartbeat.csr_der = Some(Bytes::from_static(b"csr"));

        let resp = env
            .heartbeat_processor()
            .heartbeat(&heartbeat, &service_user())
            .await
            .unwrap();

        assert_that!(resp.tablet_report, none());
        assert_that!(resp.signed_cert_der, none());
        assert_that!(resp.ca_cert_der, empty());
        assert_that!(env.catalog.calls(), eq(0));
        assert_that!(env.cert_authority.signed(), eq(0));
    }

    #[test(tokio::test)]
    async fn failed_tablet_report_fails_the_call() {
        let env = TestMasterEnv::leader();
        env.catalog.fail_reports(true);
        let mut heartbeat = registering_heartbeat(&NodeInstance::new("W1", 1), "w1.local");
        heartbeat.tablet_report = Some(full_report(&["t-1"]));

        let status = env
            .heartbeat_processor()
            .heartbeat(&heartbeat, &service_user())
            .await
            .unwrap_err();
        assert_that!(status.code(), eq(Code::InvalidArgument));
        assert_that!(
            status.message(),
            contains_substring("Failed to process tablet report")
        );
    }

    #[test(tokio::test)]
    async fn leader_signs_csr() {
        let env = TestMasterEnv::leader();
        let mut heartbeat = registering_heartbeat(&NodeInstance::new("W1", 1), "w1.local");
        heartbeat.csr_der = Some(Bytes::from_static(b"csr"));

        let resp = env
            .heartbeat_processor()
            .heartbeat(&heartbeat, &service_user())
            .await
            .unwrap();

        assert_that!(
            resp.signed_cert_der,
            some(eq(Bytes::from_static(b"signed-for-tessera:csr")))
        );
        assert_that!(
            resp.ca_cert_der,
            elements_are![eq(env.cert_authority.ca_cert.clone())]
        );
    }

    #[test(tokio::test)]
    async fn invalid_csr_fails_the_call() {
        let env = TestMasterEnv::leader();
        let mut heartbeat = registering_heartbeat(&NodeInstance::new("W1", 1), "w1.local");
        heartbeat.csr_der = Some(Bytes::new());

        let status = env
            .heartbeat_processor()
            .heartbeat(&heartbeat, &service_user())
            .await
            .unwrap_err();
        assert_that!(status.code(), eq(Code::InvalidArgument));
        assert_that!(status.message(), contains_substring("invalid CSR"));
    }

    #[test(tokio::test)]
    async fn unauthenticated_servers_get_no_certificate() {
        let env = TestMasterEnv::leader();
        let mut heartbeat = registering_heartbeat(&NodeInstance::new("W1", 1), "w1.local");
        heartbeat.csr_der = Some(Bytes::from_static(b"csr"));
        let user = RemoteUser::new("tessera", AuthenticationType::Unauthenticated);

        let status = env
            .heartbeat_processor()
            .heartbeat(&heartbeat, &user)
            .await
            .unwrap_err();
        assert_that!(status.code(), eq(Code::PermissionDenied));
        assert_that!(env.cert_authority.signed(), eq(0));
    }

    #[test(tokio::test)]
    async fn leader_exports_keys_above_watermark() {
        let env = TestMasterEnv::leader();
        env.verifier.add_keys(signing_keys());
        let mut heartbeat = registering_heartbeat(&NodeInstance::new("W1", 1), "w1.local");
        heartbeat.latest_tsk_seq_num = Some(1);

        let resp = env
            .heartbeat_processor()
            .heartbeat(&heartbeat, &service_user())
            .await
            .unwrap();

        let exported: Vec<_> = resp.tsks.iter().map(|key| key.key_seq_num).collect();
        assert_that!(exported, elements_are![eq(2), eq(3)]);
    }

    #[test(tokio::test)]
    async fn follower_exports_keys_only_when_configured() {
        let mut heartbeat = registering_heartbeat(&NodeInstance::new("W1", 1), "w1.local");
        heartbeat.latest_tsk_seq_num = Some(0);

        let env = TestMasterEnv::follower();
        env.verifier.add_keys(signing_keys());
        let resp = env
            .heartbeat_processor()
            .heartbeat(&heartbeat, &service_user())
            .await
            .unwrap();
        assert_that!(resp.tsks, empty());

        let env = TestMasterEnv::new(
            CatalogStatus::initialized_follower(),
            TestMasterEnv::default_options()
                .non_leader_masters_propagate_tsk(true)
                .build()
                .unwrap(),
        );
        env.verifier.add_keys(signing_keys());
        let resp = env
            .heartbeat_processor()
            .heartbeat(&heartbeat, &service_user())
            .await
            .unwrap();
        assert_that!(resp.tsks.len(), eq(3));
    }
}
