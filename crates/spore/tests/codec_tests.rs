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


use proptest::prelude::*;
use spore::{
    decode_gradient, decode_model_state, encode_gradient, encode_model_state, EncodeError,
    GradientVector, ModelState, Tensor,
};

fn finite() -> impl Strategy<Value = f64> {
    prop_oneof![
        -1.0e6f64..1.0e6,
        proptest::num::f64::NORMAL,
        Just(0.0),
        Just(-0.0),
        Just(1e-5),
        Just(1e16),
    ]
}

fn tensor() -> impl Strategy<Value = Tensor> {
    prop::collection::vec(0usize..4, 0..4).prop_flat_map(|shape| {
        let len = shape.iter().product::<usize>();
        prop::collection::vec(finite(), len).prop_map(move |data| {
            Tensor::new(shape.clone(), data).expect("length matches shape")
        })
    })
}

fn representable_tensor() -> impl Strategy<Value = Tensor> {
    tensor().prop_filter("only the last dimension may be empty", Tensor::is_list_representable)
}

fn model_state() -> impl Strategy<Value = ModelState> {
    prop::collection::btree_map("[a-z][a-z0-9_.]{0,8}", representable_tensor(), 0..5)
        .prop_map(|entries| entries.into_iter().collect())
}

proptest! {
    #[test]
    fn model_state_survives_the_store(state in model_state()) {
        let literal = encode_model_state(&state).unwrap();
        prop_assert_eq!(decode_model_state(&literal).unwrap(), state);
    }

    #[test]
    fn empty_inner_dimension_is_refused(tensor in tensor()) {
        let representable = tensor.is_list_representable();
        let state: ModelState = [("w".to_string(), tensor)].into_iter().collect();
        match encode_model_state(&state) {
            Ok(literal) => {
                prop_assert!(representable);
                prop_assert_eq!(decode_model_state(&literal).unwrap(), state);
            }
            Err(EncodeError::UnrepresentableShape { .. }) => prop_assert!(!representable),
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }

    #[test]
    fn gradient_survives_the_store(values in prop::collection::vec(finite(), 0..16)) {
        let gradient = GradientVector::new(values);
        let literal = encode_gradient(&gradient).unwrap();
        prop_assert_eq!(decode_gradient(&literal).unwrap(), gradient);
    }
}

#[test]
fn encoding_is_deterministic() {
    let state: ModelState = [
        ("b".to_string(), Tensor::vector(vec![0.5])),
        ("a".to_string(), Tensor::vector(vec![1.0, 2.0])),
    ]
    .into_iter()
    .collect();
    assert_eq!(
        encode_model_state(&state).unwrap(),
        encode_model_state(&state.clone()).unwrap()
    );
}
