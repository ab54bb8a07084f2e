// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tessera_types::config::MasterOptions;

/// Optional master behaviors which clients negotiate by numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::FromRepr)]
#[repr(u32)]
pub enum MasterFeature {
    Unknown = 0,
    RangePartitionBounds = 1,
    AddDropRangePartitions = 2,
    ConnectToMaster = 3,
}

#[derive(Debug, Clone, Copy)]
pub struct FeatureSet {
    connect_to_master: bool,
}

impl FeatureSet {
    pub fn new(options: &MasterOptions) -> Self {
        Self {
            connect_to_master: options.support_connect_to_master_rpc,
        }
    }

    pub fn supports(&self, feature_id: u32) -> bool {
        match MasterFeature::from_repr(feature_id) {
            Some(MasterFeature::RangePartitionBounds | MasterFeature::AddDropRangePartitions) => {
                true
            }
            Some(MasterFeature::ConnectToMaster) => self.connect_to_master,
            Some(MasterFeature::Unknown) | None => false,
        }
    }

    /// The required features of a call which this master does not support.
    pub fn unsupported(&self, required: &[u32]) -> Vec<u32> {
        required
            .iter()
            .copied()
            .filter(|feature_id| !self.supports(*feature_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use tessera_types::config::MasterOptionsBuilder;

    #[test]
    fn advertised_features() {
        let features = FeatureSet::new(&MasterOptions::default());
        assert_that!(features.supports(1), eq(true));
        assert_that!(features.supports(2), eq(true));
        assert_that!(features.supports(3), eq(true));
        assert_that!(features.supports(0), eq(false));
        assert_that!(features.supports(42), eq(false));
    }

    #[test]
    fn connect_to_master_follows_configuration() {
        let features = FeatureSet::new(
            &MasterOptionsBuilder::default()
                .support_connect_to_master_rpc(false)
                .build()
                .unwrap(),
        );
        assert_that!(features.supports(MasterFeature::ConnectToMaster as u32), eq(false));
        assert_that!(features.unsupported(&[1, 3, 7]), elements_are![eq(3), eq(7)]);
    }
}
