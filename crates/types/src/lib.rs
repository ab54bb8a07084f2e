// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! This crate contains the core types shared by the tessera master and its peers: node
//! identities, the wire messages of the master service, structured error codes and the
//! configuration layer.

mod macros;

pub mod config;
pub mod config_loader;
pub mod errors;
pub mod net;
pub mod security;
pub mod time;

mod node_instance;

pub use node_instance::*;
