// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod master;

pub use master::*;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum InvalidConfigurationError {
    #[error("empty entry in '{0}': ACL entries must be user names or '*'")]
    EmptyAclEntry(&'static str),
}

/// # Tessera configuration file
///
/// Configuration for a tessera master process.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    pub master: MasterOptions,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), InvalidConfigurationError> {
        self.master.validate()
    }
}
