// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.


use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("Unexpected status {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// A stored literal that is not well formed for its expected type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    #[error("Payload is not valid UTF-8")]
    Utf8,

    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: String,
    },

    #[error("Ragged nested list at depth {depth}")]
    Ragged { depth: usize },

    #[error("Non-finite number in literal")]
    NonFinite,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Parameter '{key}' holds a non-finite value")]
    NonFinite { key: String },

    #[error("Parameter '{key}' has shape {shape:?}, which a nested list cannot carry")]
    UnrepresentableShape { key: String, shape: Vec<usize> },

    #[error("Serialisation failed: {0}")]
    Serialisation(String),
}

/// Two contributions that cannot be combined element by element.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeMismatch {
    #[error("Parameter keys differ (missing {missing:?}, unexpected {unexpected:?})")]
    Keys {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Shape of '{key}' differs: expected {expected:?}, found {found:?}")]
    Shape {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Vector length differs: expected {expected}, found {found}")]
    Length { expected: usize, found: usize },

    #[error("Shape {shape:?} needs {expected} values, found {found}")]
    Data {
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Incompatible model state: {0}")]
    State(#[from] ShapeMismatch),

    #[error("Training step failed: {0}")]
    Training(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),
}
