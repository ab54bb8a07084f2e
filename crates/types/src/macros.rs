// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Helper macros for tessera-types crate.

// Implements `HasMasterError` for response messages which carry an `error: Option<MasterError>`
// field.
macro_rules! master_responses {
    ($($typename:ty),+ $(,)?) => {
        $(
            #[automatically_derived]
            impl $crate::net::HasMasterError for $typename {
                fn error(&self) -> Option<&$crate::errors::MasterError> {
                    self.error.as_ref()
                }

                fn set_error(&mut self, error: $crate::errors::MasterError) {
                    self.error = Some(error);
                }
            }
        )+
    };
}

pub(crate) use master_responses;
