/*
 * SPDX-FileCopyrightText: Copyright (c) 2023 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: MIT
 *
 * Permission is hereby granted, free of charge, to any person obtaining a
 * copy of this software and associated documentation files (the "Software"),
 * to deal in the Software without restriction, including without limitation
 * the rights to use, copy, modify, merge, publish, distribute, sublicense,
 * and/or sell copies of the Software, and to permit persons to whom the
 * Software is furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
 * THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
 * DEALINGS IN THE SOFTWARE.
 */

// jsonmap.rs
// Typed lookups into parsed RIBCL nodes and REST bodies. `context` names
// where the map came from (an iLO URL or a RIBCL command) for error messages.

use std::any::type_name;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::IloError;

// JsonMap abstracts over a JSON object and a Value that may hold one,
// so REST bodies can be walked without unwrapping them first.
pub trait JsonMap {
    fn get_value(&self, key: &str) -> Option<&Value>;

    fn remove_value(&mut self, key: &str) -> Option<Value>;
}

impl JsonMap for Map<String, Value> {
    fn get_value(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }

    fn remove_value(&mut self, key: &str) -> Option<Value> {
        self.remove(key)
    }
}

impl JsonMap for Value {
    fn get_value(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|m| m.get(key))
    }

    fn remove_value(&mut self, key: &str) -> Option<Value> {
        self.as_object_mut().and_then(|m| m.remove(key))
    }
}

fn missing_key_error(key: &str, context: &str) -> IloError {
    IloError::MissingKey {
        key: key.to_string(),
        url: context.to_string(),
    }
}

fn invalid_type_error(key: &str, expected_type: &str, context: &str) -> IloError {
    IloError::InvalidKeyType {
        key: key.to_string(),
        expected_type: expected_type.to_string(),
        url: context.to_string(),
    }
}

pub fn get_value<'a, M: JsonMap + ?Sized>(
    map: &'a M,
    key: &str,
    context: &str,
) -> Result<&'a Value, IloError> {
    map.get_value(key)
        .ok_or_else(|| missing_key_error(key, context))
}

pub fn get_str<'a, M: JsonMap + ?Sized>(
    map: &'a M,
    key: &str,
    context: &str,
) -> Result<&'a str, IloError> {
    get_value(map, key, context)?
        .as_str()
        .ok_or_else(|| invalid_type_error(key, "string", context))
}

pub fn get_array<'a, M: JsonMap + ?Sized>(
    map: &'a M,
    key: &str,
    context: &str,
) -> Result<&'a Vec<Value>, IloError> {
    get_value(map, key, context)?
        .as_array()
        .ok_or_else(|| invalid_type_error(key, "array", context))
}

pub fn get_bool<M: JsonMap + ?Sized>(map: &M, key: &str, context: &str) -> Result<bool, IloError> {
    get_value(map, key, context)?
        .as_bool()
        .ok_or_else(|| invalid_type_error(key, "boolean", context))
}

pub fn get_i64<M: JsonMap + ?Sized>(map: &M, key: &str, context: &str) -> Result<i64, IloError> {
    get_value(map, key, context)?
        .as_i64()
        .ok_or_else(|| invalid_type_error(key, "integer", context))
}

/// Walks nested objects, e.g. `["Oem", "Hp", "Battery"]`. The error names
/// the full dotted path.
pub fn get_path<'a, M: JsonMap + ?Sized>(
    map: &'a M,
    path: &[&str],
    context: &str,
) -> Result<&'a Value, IloError> {
    let Some((first, rest)) = path.split_first() else {
        return Err(missing_key_error("", context));
    };
    let mut current = get_value(map, first, context)?;
    for (i, key) in rest.iter().enumerate() {
        let dotted = path[..=i + 1].join(".");
        current = current
            .get(key)
            .ok_or_else(|| missing_key_error(&dotted, context))?;
    }
    Ok(current)
}

pub fn get_path_str<'a, M: JsonMap + ?Sized>(
    map: &'a M,
    path: &[&str],
    context: &str,
) -> Result<&'a str, IloError> {
    get_path(map, path, context)?
        .as_str()
        .ok_or_else(|| invalid_type_error(&path.join("."), "string", context))
}

// extract removes a key from a map and deserializes the value to type T.
pub fn extract<T, M: JsonMap + ?Sized>(
    map: &mut M,
    key: &str,
    context: &str,
) -> Result<T, IloError>
where
    T: DeserializeOwned,
{
    let json = map
        .remove_value(key)
        .ok_or_else(|| missing_key_error(key, context))?;
    serde_json::from_value::<T>(json)
        .map_err(|_| invalid_type_error(key, type_name::<T>(), context))
}
