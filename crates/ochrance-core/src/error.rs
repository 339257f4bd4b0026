// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub type OchranceResult<T> = Result<T, OchranceError>;

#[derive(Debug, Error)]
pub enum OchranceError {
    #[error("invalid argument")]
    InvalidArgument,

    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("digest length {got} does not match {expected} for algorithm")]
    DigestLength { expected: usize, got: usize },

    #[error("not found")]
    NotFound,

    #[error("block vector and metadata vector lengths differ")]
    LengthMismatch,

    #[error("internal error")]
    Internal,
}
