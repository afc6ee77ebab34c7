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


//! Shared vocabulary of the federated agent: the data model, the literal
//! codec used to move model states through the knowledge store, and the
//! contracts the coordination engine expects from its collaborators.

pub mod codec;
pub mod contracts;
pub mod error;
pub mod tensor;
pub mod types;

pub use codec::{decode_gradient, decode_model_state, encode_gradient, encode_model_state};
pub use contracts::{
    Binding, ContributionKind, FeedTransport, Learner, StoreTransport, TrainOutcome,
};
pub use error::{DecodeError, EncodeError, ModelError, ShapeMismatch, TransportError};
pub use tensor::Tensor;
pub use types::{
    Contribution, FeedMessage, FeedRequest, FeedbackScore, GradientVector, GroupLink, ModelState,
};
