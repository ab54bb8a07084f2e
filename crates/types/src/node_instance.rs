// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a running server process.
///
/// The `permanent_uuid` is generated once when the server's data directories are created and
/// survives restarts. The `instance_seqno` is bumped on every start, which lets peers tell a
/// restarted process apart from one that merely missed a few heartbeats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodeInstance {
    pub permanent_uuid: String,
    pub instance_seqno: i64,
}

impl NodeInstance {
    pub fn new(permanent_uuid: impl Into<String>, instance_seqno: i64) -> Self {
        Self {
            permanent_uuid: permanent_uuid.into(),
            instance_seqno,
        }
    }
}

impl fmt::Display for NodeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.permanent_uuid, self.instance_seqno)
    }
}

/// A resolvable network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Role of a replica in a consensus configuration, as reported by the catalog.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RaftRole {
    #[default]
    UnknownRole,
    Follower,
    Leader,
    Learner,
    NonParticipant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use std::str::FromStr;

    #[test]
    fn display_formats() {
        assert_that!(
            NodeInstance::new("ts-1", 7).to_string(),
            eq("ts-1:7")
        );
        assert_that!(HostPort::new("m1.local", 7051).to_string(), eq("m1.local:7051"));
    }

    #[test]
    fn raft_role_round_trips_through_strings() {
        assert_that!(RaftRole::Leader.to_string(), eq("LEADER"));
        assert_that!(RaftRole::from_str("FOLLOWER"), ok(eq(RaftRole::Follower)));
    }
}
