// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tessera_types::errors::{AppStatus, AppStatusCode, GenericError};
use tonic::Status;

/// Errors which can be reported to callers, either embedded in a response or as a failed rpc.
pub trait AppError: std::error::Error {
    fn app_status_code(&self) -> AppStatusCode;

    fn to_app_status(&self) -> AppStatus {
        AppStatus::new(self.app_status_code(), self.to_string())
    }

    /// Converts into a transport level failure whose message is prefixed with `context`.
    fn to_status_with_context(&self, context: &str) -> Status {
        Status::new(
            self.app_status_code().grpc_code(),
            format!("{context}: {self}"),
        )
    }
}

/// Failures returned by the catalog manager.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already present: {0}")]
    AlreadyPresent(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("internal error: {0}")]
    Internal(GenericError),
}

impl AppError for CatalogError {
    fn app_status_code(&self) -> AppStatusCode {
        match self {
            CatalogError::NotFound(_) => AppStatusCode::NotFound,
            CatalogError::AlreadyPresent(_) => AppStatusCode::AlreadyPresent,
            CatalogError::InvalidArgument(_) => AppStatusCode::InvalidArgument,
            CatalogError::IllegalState(_) => AppStatusCode::IllegalState,
            CatalogError::ServiceUnavailable(_) => AppStatusCode::ServiceUnavailable,
            CatalogError::NotAuthorized(_) => AppStatusCode::NotAuthorized,
            CatalogError::Internal(_) => AppStatusCode::RuntimeError,
        }
    }
}

/// Failures of the certificate authority and the token signer.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("{0}")]
    InvalidCsr(String),
    #[error("{user} is not authorized: {reason}")]
    NotAuthorized { user: String, reason: String },
    #[error("no token signing key available")]
    NoSigningKey,
    #[error("internal error: {0}")]
    Internal(GenericError),
}

impl AppError for SecurityError {
    fn app_status_code(&self) -> AppStatusCode {
        match self {
            SecurityError::InvalidCsr(_) => AppStatusCode::InvalidArgument,
            SecurityError::NotAuthorized { .. } => AppStatusCode::NotAuthorized,
            SecurityError::NoSigningKey => AppStatusCode::IllegalState,
            SecurityError::Internal(_) => AppStatusCode::RuntimeError,
        }
    }
}

/// Failures to resolve this master's view of its peers.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("unable to resolve master addresses: {0}")]
    Resolution(String),
    #[error("consensus configuration unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(GenericError),
}

impl AppError for TopologyError {
    fn app_status_code(&self) -> AppStatusCode {
        match self {
            TopologyError::Resolution(_) => AppStatusCode::NetworkError,
            TopologyError::Unavailable(_) => AppStatusCode::ServiceUnavailable,
            TopologyError::Internal(_) => AppStatusCode::RuntimeError,
        }
    }
}
