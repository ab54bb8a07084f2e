// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Request and response messages of the master service.

pub mod catalog;
pub mod heartbeat;
pub mod master;
pub mod registration;

use crate::errors::MasterError;

/// Responses which report failures through an embedded, structured [`MasterError`] rather
/// than through a failed rpc.
pub trait HasMasterError {
    fn error(&self) -> Option<&MasterError>;

    fn set_error(&mut self, error: MasterError);

    fn has_error(&self) -> bool {
        self.error().is_some()
    }
}
