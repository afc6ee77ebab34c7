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


//! Literal encoding shared with every other agent writing to the store.
//!
//! A model state travels as `base64(json({name: nested_list}))` and a
//! gradient as the bare list text. The JSON text mirrors Python's
//! `json.dumps` output (`", "` and `": "` separators, `repr` floats, ASCII
//! escapes) so that literals written here are byte-identical to those
//! written by existing peers.

use crate::error::{DecodeError, EncodeError};
use crate::tensor::{kind_of, Tensor};
use crate::types::{GradientVector, ModelState};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::io;

pub fn encode_model_state(state: &ModelState) -> Result<String, EncodeError> {
    if let Some((key, _)) = state.iter().find(|(_, t)| !t.is_finite()) {
        return Err(EncodeError::NonFinite { key: key.clone() });
    }
    if let Some((key, tensor)) = state.iter().find(|(_, t)| !t.is_list_representable()) {
        return Err(EncodeError::UnrepresentableShape {
            key: key.clone(),
            shape: tensor.shape().to_vec(),
        });
    }
    let json = to_python_json(state)?;
    Ok(STANDARD.encode(json.as_bytes()))
}

pub fn decode_model_state(literal: &str) -> Result<ModelState, DecodeError> {
    let bytes = STANDARD
        .decode(literal.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)?;
    let value: Value = serde_json::from_str(&text).map_err(|e| DecodeError::Json(e.to_string()))?;
    let Value::Object(entries) = value else {
        return Err(DecodeError::Unexpected {
            expected: "object of parameter lists",
            found: kind_of(&value).to_string(),
        });
    };
    entries
        .into_iter()
        .map(|(name, nested)| Tensor::from_nested(&nested).map(|t| (name, t)))
        .collect()
}

pub fn encode_gradient(gradient: &GradientVector) -> Result<String, EncodeError> {
    if gradient.as_slice().iter().any(|v| !v.is_finite()) {
        return Err(EncodeError::NonFinite {
            key: "gradient".to_string(),
        });
    }
    to_python_json(&gradient.as_slice())
}

/// Accepts only a flat list of finite numbers.
pub fn decode_gradient(literal: &str) -> Result<GradientVector, DecodeError> {
    let value: Value =
        serde_json::from_str(literal.trim()).map_err(|e| DecodeError::Json(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(DecodeError::Unexpected {
            expected: "list of numbers",
            found: kind_of(&value).to_string(),
        });
    };
    items
        .iter()
        .map(|item| match item {
            Value::Number(n) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or(DecodeError::NonFinite),
            other => Err(DecodeError::Unexpected {
                expected: "number",
                found: kind_of(other).to_string(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(GradientVector::new)
}

fn to_python_json<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodeError> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PythonFormatter);
    value
        .serialize(&mut ser)
        .map_err(|e| EncodeError::Serialisation(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| EncodeError::Serialisation(e.to_string()))
}

/// Float text as produced by Python's `repr`.
pub fn python_float_repr(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 || (1e-4..1e16).contains(&magnitude) {
        return format!("{value:?}");
    }
    let text = format!("{value:e}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

struct PythonFormatter;

impl Formatter for PythonFormatter {
    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(python_float_repr(value).as_bytes())
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                let mut tmp = [0u8; 1];
                writer.write_all(ch.encode_utf8(&mut tmp).as_bytes())?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(name: &str, tensor: Tensor) -> ModelState {
        std::iter::once((name.to_string(), tensor)).collect()
    }

    #[test]
    fn float_repr_matches_python() {
        assert_eq!(python_float_repr(1.0), "1.0");
        assert_eq!(python_float_repr(0.1), "0.1");
        assert_eq!(python_float_repr(-2.5), "-2.5");
        assert_eq!(python_float_repr(0.0001), "0.0001");
        assert_eq!(python_float_repr(0.00001), "1e-05");
        assert_eq!(python_float_repr(1.5e-7), "1.5e-07");
        assert_eq!(python_float_repr(1e16), "1e+16");
        assert_eq!(python_float_repr(1e15), "1000000000000000.0");
        assert_eq!(python_float_repr(2.5e300), "2.5e+300");
    }

    #[test]
    fn state_json_uses_python_separators() {
        let state = single("w", Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap());
        let literal = encode_model_state(&state).unwrap();
        let json = String::from_utf8(STANDARD.decode(literal).unwrap()).unwrap();
        assert_eq!(json, r#"{"w": [[1.0, 2.0], [3.0, 4.0]]}"#);
    }

    #[test]
    fn decodes_literal_written_by_python_peer() {
        // base64 of {"fc.bias": [0.5], "fc.weight": [[1, 2]]}
        let literal = STANDARD.encode(r#"{"fc.bias": [0.5], "fc.weight": [[1, 2]]}"#);
        let state = decode_model_state(&literal).unwrap();
        assert_eq!(state.get("fc.weight").unwrap().shape(), &[1, 2]);
        assert_eq!(state.get("fc.bias").unwrap().data(), &[0.5]);
    }

    #[test]
    fn non_ascii_keys_are_escaped() {
        let state = single("gewicht_é", Tensor::scalar(1.0));
        let json = String::from_utf8(STANDARD.decode(encode_model_state(&state).unwrap()).unwrap())
            .unwrap();
        assert_eq!(json, r#"{"gewicht_\u00e9": 1.0}"#);
        assert_eq!(decode_model_state(&STANDARD.encode(json)).unwrap(), state);
    }

    #[test]
    fn rejects_non_finite_on_encode() {
        let state = single("w", Tensor::vector(vec![f64::NAN]));
        assert!(matches!(
            encode_model_state(&state),
            Err(EncodeError::NonFinite { .. })
        ));
    }

    #[test]
    fn empty_inner_dimensions_are_rejected_on_encode() {
        let state = single("w", Tensor::new(vec![0, 3], vec![]).unwrap());
        assert_eq!(
            encode_model_state(&state),
            Err(EncodeError::UnrepresentableShape {
                key: "w".into(),
                shape: vec![0, 3],
            })
        );
    }

    #[test]
    fn empty_last_dimension_round_trips() {
        let state = single("w", Tensor::new(vec![2, 0], vec![]).unwrap());
        let literal = encode_model_state(&state).unwrap();
        assert_eq!(decode_model_state(&literal).unwrap(), state);
    }

    #[test]
    fn malformed_state_literals_fail_closed() {
        assert!(matches!(decode_model_state("***"), Err(DecodeError::Base64(_))));
        assert!(matches!(
            decode_model_state(&STANDARD.encode("__import__('os')")),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_model_state(&STANDARD.encode("[1, 2]")),
            Err(DecodeError::Unexpected { .. })
        ));
        assert!(matches!(
            decode_model_state(&STANDARD.encode(r#"{"w": [[1], [2, 3]]}"#)),
            Err(DecodeError::Ragged { .. })
        ));
    }

    #[test]
    fn gradient_literal_is_python_list_text() {
        let g = GradientVector::new(vec![0.1, -0.25, 3.0]);
        assert_eq!(encode_gradient(&g).unwrap(), "[0.1, -0.25, 3.0]");
        assert_eq!(decode_gradient("[0.1, -0.25, 3]").unwrap().as_slice(), &[0.1, -0.25, 3.0]);
    }

    #[test]
    fn gradient_decoding_rejects_anything_but_numbers() {
        assert!(decode_gradient("__import__('os').system('rm -rf /')").is_err());
        assert!(decode_gradient("[1, [2]]").is_err());
        assert!(decode_gradient("[1, true]").is_err());
        assert!(decode_gradient(r#"{"g": 1}"#).is_err());
        assert!(decode_gradient("[1, 2").is_err());
    }
}
