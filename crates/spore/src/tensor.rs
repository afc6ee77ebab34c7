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


use crate::error::{DecodeError, ShapeMismatch};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Dense row-major array of `f64`. A tensor with an empty shape is a scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ShapeMismatch> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(ShapeMismatch::Data {
                shape,
                expected,
                found: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product::<usize>();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Whether the nested-list form keeps the full shape. An empty list
    /// carries no inner dimensions, so only the last dimension may be 0.
    pub fn is_list_representable(&self) -> bool {
        self.shape
            .split_last()
            .map_or(true, |(_, outer)| !outer.contains(&0))
    }

    /// Parses a nested numeric list (or a bare number for a scalar).
    ///
    /// The list must be rectangular and hold only finite numbers; booleans,
    /// strings and nulls are rejected rather than coerced.
    pub fn from_nested(value: &Value) -> Result<Self, DecodeError> {
        let mut shape = Vec::new();
        let mut cursor = value;
        while let Value::Array(items) = cursor {
            shape.push(items.len());
            match items.first() {
                Some(first) => cursor = first,
                None => break,
            }
        }

        let mut data = Vec::with_capacity(shape.iter().product());
        fill(value, &shape, 0, &mut data)?;
        Ok(Self { shape, data })
    }

    pub fn to_nested(&self) -> Value {
        nested_value(&self.shape, &self.data)
    }
}

fn fill(value: &Value, dims: &[usize], depth: usize, out: &mut Vec<f64>) -> Result<(), DecodeError> {
    match (dims.split_first(), value) {
        (None, Value::Number(n)) => {
            let v = n.as_f64().ok_or(DecodeError::NonFinite)?;
            if !v.is_finite() {
                return Err(DecodeError::NonFinite);
            }
            out.push(v);
            Ok(())
        }
        (None, Value::Array(_)) => Err(DecodeError::Ragged { depth }),
        (Some((&len, rest)), Value::Array(items)) => {
            if items.len() != len {
                return Err(DecodeError::Ragged { depth });
            }
            items
                .iter()
                .try_for_each(|item| fill(item, rest, depth + 1, out))
        }
        (Some(_), Value::Number(_)) => Err(DecodeError::Ragged { depth }),
        (_, other) => Err(DecodeError::Unexpected {
            expected: "number or list",
            found: kind_of(other).to_string(),
        }),
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn nested_value(shape: &[usize], data: &[f64]) -> Value {
    match shape.split_first() {
        None => data
            .first()
            .and_then(|v| serde_json::Number::from_f64(*v))
            .map_or(Value::Null, Value::Number),
        Some((&len, rest)) => {
            let stride = rest.iter().product::<usize>();
            Value::Array(
                (0..len)
                    .map(|i| nested_value(rest, &data[i * stride..(i + 1) * stride]))
                    .collect(),
            )
        }
    }
}

struct Nested<'a> {
    shape: &'a [usize],
    data: &'a [f64],
}

impl Serialize for Nested<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.shape.split_first() {
            None => serializer.serialize_f64(self.data.first().copied().unwrap_or(0.0)),
            Some((&len, rest)) => {
                let stride = rest.iter().product::<usize>();
                let mut seq = serializer.serialize_seq(Some(len))?;
                for i in 0..len {
                    seq.serialize_element(&Nested {
                        shape: rest,
                        data: &self.data[i * stride..(i + 1) * stride],
                    })?;
                }
                seq.end()
            }
        }
    }
}

impl Serialize for Tensor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Nested {
            shape: &self.shape,
            data: &self.data,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tensor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_nested(&value).map_err(serde::de::Error::custom)
    }
}
