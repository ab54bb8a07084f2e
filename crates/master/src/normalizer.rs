// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tessera_types::errors::MasterError;
use tessera_types::net::HasMasterError;

use crate::error::AppError;

/// Makes sure a failed delegation leaves a machine readable error on the response. An error the
/// delegate already recorded is kept as is, otherwise the failure is recorded as `UNKNOWN_ERROR`.
pub fn check_resp_error_or_set_unknown<R, E>(result: Result<(), E>, resp: &mut R)
where
    R: HasMasterError,
    E: AppError,
{
    if let Err(err) = result {
        if !resp.has_error() {
            resp.set_error(MasterError::unknown(err.to_app_status()));
        }
    }
}
