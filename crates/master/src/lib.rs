// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

pub mod authz;
mod bootstrap;
pub mod collaborators;
mod error;
mod features;
mod forwarder;
mod heartbeat;
mod leadership;
pub mod metric_definitions;
mod normalizer;
mod service;
#[cfg(any(test, feature = "test-util"))]
pub mod test_util;
mod token_verifier;
mod ts_registry;

pub use bootstrap::{BootstrapCoordinator, LogThrottle};
pub use error::{AppError, CatalogError, SecurityError, TopologyError};
pub use features::{FeatureSet, MasterFeature};
pub use forwarder::{CatalogCall, CatalogForwarder};
pub use heartbeat::HeartbeatProcessor;
pub use leadership::{CatalogStatus, GateError, LeaderSharedLease, LeadershipState};
pub use normalizer::check_resp_error_or_set_unknown;
pub use service::{MasterDependencies, MasterServiceHandler, MasterSvc};
pub use token_verifier::TokenVerifier;
pub use ts_registry::{RegistryError, SoftState, TsDescriptor, TsRegistry};
