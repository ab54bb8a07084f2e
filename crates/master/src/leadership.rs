// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Gate which decides whether this master may answer a call.
//!
//! Calls hold a [`LeaderSharedLease`] for their whole duration. Leadership transitions need the
//! exclusive side of the same lock, so a call never observes a role change half way through.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{debug, info};

use tessera_types::RaftRole;
use tessera_types::errors::{AppStatus, AppStatusCode, MasterError, MasterErrorCode};
use tessera_types::net::HasMasterError;

use crate::metric_definitions::MASTER_GATE_REJECTIONS;

/// Authority state published by the catalog manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStatus {
    pub initialized: bool,
    pub role: RaftRole,
    /// Set once an elected leader has loaded the catalog and may serve requests.
    pub leader_ready: bool,
}

impl CatalogStatus {
    pub fn initialized_follower() -> Self {
        Self {
            initialized: true,
            role: RaftRole::Follower,
            leader_ready: false,
        }
    }

    pub fn ready_leader() -> Self {
        Self {
            initialized: true,
            role: RaftRole::Leader,
            leader_ready: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("catalog manager is not yet initialized")]
    NotInitialized,
    #[error("master is not the leader (role: {0})")]
    NotLeader(RaftRole),
    #[error("leader not yet ready to serve requests")]
    LeaderNotReady,
}

impl GateError {
    pub fn to_master_error(&self) -> MasterError {
        let (code, status_code) = match self {
            GateError::NotInitialized => (
                MasterErrorCode::CatalogManagerNotInitialized,
                AppStatusCode::ServiceUnavailable,
            ),
            GateError::NotLeader(_) => (MasterErrorCode::NotTheLeader, AppStatusCode::IllegalState),
            GateError::LeaderNotReady => (
                MasterErrorCode::NotTheLeader,
                AppStatusCode::ServiceUnavailable,
            ),
        };
        MasterError::new(code, AppStatus::new(status_code, self.to_string()))
    }

    fn reason(&self) -> &'static str {
        match self {
            GateError::NotInitialized => "not-initialized",
            GateError::NotLeader(_) => "not-leader",
            GateError::LeaderNotReady => "leader-not-ready",
        }
    }
}

/// Shared handle to the catalog authority state.
#[derive(Debug, Clone, Default)]
pub struct LeadershipState {
    inner: Arc<RwLock<CatalogStatus>>,
}

impl LeadershipState {
    pub fn new(status: CatalogStatus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(status)),
        }
    }

    /// Acquires a shared lease. Waits only while a transition is in progress.
    pub async fn lease(&self) -> LeaderSharedLease {
        LeaderSharedLease {
            guard: Arc::clone(&self.inner).read_owned().await,
        }
    }

    /// Applies a leadership transition. New leases are held back until it completes.
    pub async fn transition(&self, update: impl FnOnce(&mut CatalogStatus)) {
        let mut status = self.inner.write().await;
        let previous = *status;
        update(&mut status);
        let current = *status;
        if previous != current {
            info!(from = ?previous, to = ?current, "Catalog authority state changed");
        }
    }

    pub async fn mark_initialized(&self) {
        self.transition(|status| status.initialized = true).await
    }

    /// Records an election win. The catalog is loaded separately, see [`Self::mark_leader_ready`].
    pub async fn become_leader(&self) {
        self.transition(|status| {
            status.role = RaftRole::Leader;
            status.leader_ready = false;
        })
        .await
    }

    pub async fn mark_leader_ready(&self) {
        self.transition(|status| status.leader_ready = status.role == RaftRole::Leader)
            .await
    }

    pub async fn become_follower(&self) {
        self.transition(|status| {
            status.role = RaftRole::Follower;
            status.leader_ready = false;
        })
        .await
    }
}

/// Read lease on the catalog authority state, released on drop.
#[derive(Debug)]
pub struct LeaderSharedLease {
    guard: OwnedRwLockReadGuard<CatalogStatus>,
}

impl LeaderSharedLease {
    pub fn role(&self) -> RaftRole {
        self.guard.role
    }

    pub fn is_initialized(&self) -> bool {
        self.guard.initialized
    }

    /// True if this master is an initialized leader which is ready to serve.
    pub fn is_leader(&self) -> bool {
        self.leader_status().is_ok()
    }

    pub fn catalog_status(&self) -> Result<(), GateError> {
        if self.guard.initialized {
            Ok(())
        } else {
            Err(GateError::NotInitialized)
        }
    }

    pub fn leader_status(&self) -> Result<(), GateError> {
        self.catalog_status()?;
        if self.guard.role != RaftRole::Leader {
            return Err(GateError::NotLeader(self.guard.role));
        }
        if !self.guard.leader_ready {
            return Err(GateError::LeaderNotReady);
        }
        Ok(())
    }

    /// Returns false and records the failure on `resp` if the catalog is not initialized.
    pub fn check_initialized<R: HasMasterError>(&self, resp: &mut R) -> bool {
        Self::record(self.catalog_status(), resp)
    }

    /// Returns false and records the failure on `resp` unless this master is a ready leader.
    pub fn check_initialized_and_leader<R: HasMasterError>(&self, resp: &mut R) -> bool {
        Self::record(self.leader_status(), resp)
    }

    fn record<R: HasMasterError>(status: Result<(), GateError>, resp: &mut R) -> bool {
        match status {
            Ok(()) => true,
            Err(err) => {
                debug!(%err, "Rejecting call at the leadership gate");
                counter!(MASTER_GATE_REJECTIONS, "reason" => err.reason()).increment(1);
                resp.set_error(err.to_master_error());
                false
            }
        }
    }
}
