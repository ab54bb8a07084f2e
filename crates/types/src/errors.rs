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
use tonic::Code;

/// Error type which abstracts away the actual [`std::error::Error`] type. Use this type
/// if you don't know the actual error type or if it is not important.
pub type GenericError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Application level status code carried inside response messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatusCode {
    UnknownError,
    Ok,
    NotFound,
    Corruption,
    NotSupported,
    InvalidArgument,
    IoError,
    AlreadyPresent,
    RuntimeError,
    NetworkError,
    IllegalState,
    NotAuthorized,
    Aborted,
    RemoteError,
    ServiceUnavailable,
    TimedOut,
    Uninitialized,
    ConfigurationError,
    Incomplete,
    EndOfFile,
}

impl AppStatusCode {
    /// The gRPC code used when a failure with this status travels as a transport failure.
    pub fn grpc_code(&self) -> Code {
        match self {
            AppStatusCode::Ok => Code::Ok,
            AppStatusCode::NotFound => Code::NotFound,
            AppStatusCode::AlreadyPresent => Code::AlreadyExists,
            AppStatusCode::InvalidArgument | AppStatusCode::Corruption => Code::InvalidArgument,
            AppStatusCode::NotSupported => Code::Unimplemented,
            AppStatusCode::IllegalState | AppStatusCode::Uninitialized => {
                Code::FailedPrecondition
            }
            AppStatusCode::NotAuthorized => Code::PermissionDenied,
            AppStatusCode::Aborted => Code::Aborted,
            AppStatusCode::ServiceUnavailable | AppStatusCode::NetworkError => Code::Unavailable,
            AppStatusCode::TimedOut => Code::DeadlineExceeded,
            AppStatusCode::EndOfFile | AppStatusCode::Incomplete => Code::OutOfRange,
            AppStatusCode::UnknownError => Code::Unknown,
            AppStatusCode::IoError
            | AppStatusCode::RuntimeError
            | AppStatusCode::RemoteError
            | AppStatusCode::ConfigurationError => Code::Internal,
        }
    }
}

/// A status as embedded in a response message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    pub code: AppStatusCode,
    pub message: String,
}

impl AppStatus {
    pub fn new(code: AppStatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == AppStatusCode::Ok
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<&AppStatus> for tonic::Status {
    fn from(value: &AppStatus) -> Self {
        tonic::Status::new(value.code.grpc_code(), value.message.clone())
    }
}

/// Master specific error codes. They tell a client what to do next (e.g. find the new leader)
/// while [`AppStatus`] describes what went wrong.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MasterErrorCode {
    UnknownError,
    InvalidSchema,
    TableNotFound,
    TableAlreadyPresent,
    TooManyTablets,
    CatalogManagerNotInitialized,
    NotTheLeader,
    ReplicationFactorTooHigh,
    IllegalReplicationFactor,
    TabletNotRunning,
    EvenReplicationFactor,
}

/// Structured error embedded in master responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterError {
    pub code: MasterErrorCode,
    pub status: AppStatus,
}

impl MasterError {
    pub fn new(code: MasterErrorCode, status: AppStatus) -> Self {
        Self { code, status }
    }

    pub fn unknown(status: AppStatus) -> Self {
        Self::new(MasterErrorCode::UnknownError, status)
    }
}

impl fmt::Display for MasterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.status, self.code)
    }
}
