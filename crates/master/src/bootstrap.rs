// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Calls through which clients and tablet servers discover the master quorum and obtain the
//! credentials to talk to it.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use tessera_types::NodeInstance;
use tessera_types::errors::MasterError;
use tessera_types::net::master::{
    ConnectToMasterResponse, GetMasterRegistrationResponse, ListMastersResponse,
};

use crate::authz::{AuthenticationType, RemoteUser};
use crate::collaborators::{CertAuthority, MasterTopology, TokenSigner};
use crate::error::AppError;
use crate::leadership::LeadershipState;
use crate::metric_definitions::MASTER_AUTHN_TOKENS_ISSUED;
use crate::normalizer::check_resp_error_or_set_unknown;

const TOKEN_WARNING_INTERVAL: Duration = Duration::from_secs(1);

/// Lets at most one event through per interval.
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    last_logged: Mutex<Option<Instant>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: Mutex::new(None),
        }
    }

    pub fn should_log(&self) -> bool {
        let now = Instant::now();
        let mut last_logged = self.last_logged.lock();
        match *last_logged {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                *last_logged = Some(now);
                true
            }
        }
    }
}

pub struct BootstrapCoordinator {
    leadership: LeadershipState,
    topology: Arc<dyn MasterTopology>,
    cert_authority: Arc<dyn CertAuthority>,
    token_signer: Arc<dyn TokenSigner>,
    self_instance: NodeInstance,
    token_warnings: LogThrottle,
}

impl BootstrapCoordinator {
    pub fn new(
        leadership: LeadershipState,
        topology: Arc<dyn MasterTopology>,
        cert_authority: Arc<dyn CertAuthority>,
        token_signer: Arc<dyn TokenSigner>,
        self_instance: NodeInstance,
    ) -> Self {
        Self {
            leadership,
            topology,
            cert_authority,
            token_signer,
            self_instance,
            token_warnings: LogThrottle::new(TOKEN_WARNING_INTERVAL),
        }
    }

    /// Lists the master quorum. Failures are reported in the response, including the legacy
    /// error field older clients look at.
    pub async fn list_masters(&self) -> ListMastersResponse {
        let mut resp = ListMastersResponse::default();
        match self.topology.list_masters().await {
            Ok(masters) => resp.masters = masters,
            Err(err) => {
                warn!(%err, "Unable to list masters");
                let status = err.to_app_status();
                resp.deprecated_error = Some(status.clone());
                resp.error = Some(MasterError::unknown(status));
            }
        }
        resp
    }

    pub async fn get_master_registration(&self) -> GetMasterRegistrationResponse {
        // identity is reported even if the catalog is not ready, it helps diagnose a cluster
        let mut resp = GetMasterRegistrationResponse {
            instance_id: Some(self.self_instance.clone()),
            ..Default::default()
        };

        let lease = self.leadership.lease().await;
        if !lease.check_initialized(&mut resp) {
            return resp;
        }

        let result = self
            .topology
            .registration()
            .await
            .map(|registration| resp.registration = Some(registration));
        check_resp_error_or_set_unknown(result, &mut resp);
        resp.role = Some(lease.role());
        resp
    }

    pub async fn connect_to_master(&self, user: &RemoteUser) -> ConnectToMasterResponse {
        let mut resp = ConnectToMasterResponse::default();
        let lease = self.leadership.lease().await;
        if !lease.check_initialized(&mut resp) {
            return resp;
        }
        resp.role = Some(lease.role());

        match self.topology.master_addresses().await {
            Ok(addresses) => resp.master_addrs = addresses,
            Err(err) => warn!(%err, "Unable to get the addresses of the masters"),
        }

        if lease.is_leader() {
            resp.ca_cert_der = vec![self.cert_authority.ca_cert_der()];

            if user.authenticated_by != AuthenticationType::AuthnToken {
                match self.token_signer.generate_authn_token(&user.username).await {
                    Ok(token) => {
                        debug!(%user, key_seq_num = token.signing_key_seq_num, "Issued authn token");
                        counter!(MASTER_AUTHN_TOKENS_ISSUED).increment(1);
                        resp.authn_token = Some(token);
                    }
                    Err(err) => {
                        if self.token_warnings.should_log() {
                            warn!(%user, %err, "Unable to generate signed token");
                        }
                    }
                }
            }
        }

        resp
    }
}
