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

// Message registries turn the terse MessageIDs of an extended error into the
// text the iLO would show. Registries are fetched from the controller on
// first use and kept for the lifetime of the client.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, OnceLock, PoisonError},
};

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::IloError;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct RegistryMessage {
    pub message: String,
    #[serde(default)]
    pub number_of_args: usize,
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Default)]
struct Registries {
    loaded: HashMap<String, HashMap<String, RegistryMessage>>,
    // Names we already tried to fetch, so a missing registry costs one lookup.
    attempted: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MessageRegistries {
    inner: Mutex<Registries>,
}

impl MessageRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a registry document (anything with a `Messages` object).
    pub fn insert(&self, name: &str, registry: &Value) -> Result<(), IloError> {
        let messages = registry
            .get("Messages")
            .cloned()
            .ok_or_else(|| IloError::MissingKey {
                key: "Messages".to_string(),
                url: format!("registry {name}"),
            })?;
        let messages: HashMap<String, RegistryMessage> =
            serde_json::from_value(messages).map_err(|e| IloError::JsonDeserializeError {
                url: format!("registry {name}"),
                body: registry.to_string(),
                source: e,
            })?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.attempted.insert(name.to_string());
        inner.loaded.insert(name.to_string(), messages);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .loaded
            .contains_key(name)
    }

    /// Renders with whatever registries are already loaded.
    pub fn render(&self, extended_error: &Value) -> Vec<String> {
        self.render_with(extended_error, |_| None)
    }

    /// Renders an extended error, one string per message entry. `load` is
    /// asked once per unknown registry name for the registry document.
    pub fn render_with<F>(&self, extended_error: &Value, mut load: F) -> Vec<String>
    where
        F: FnMut(&str) -> Option<Value>,
    {
        let entries = extended_error_entries(extended_error);
        let mut messages = Vec::with_capacity(entries.len());
        for (message_id, args) in entries {
            let registry = message_id.split('.').next().unwrap_or_default();
            let key = message_id.rsplit('.').next().unwrap_or_default();
            self.ensure_loaded(registry, &mut load);
            match self.lookup(registry, key) {
                Some(template) => messages.push(render_message(&message_id, &template, &args)),
                None => messages.push(message_id),
            }
        }
        messages
    }

    fn ensure_loaded<F>(&self, name: &str, load: &mut F)
    where
        F: FnMut(&str) -> Option<Value>,
    {
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if !inner.attempted.insert(name.to_string()) {
                return;
            }
        }
        // Not holding the lock here: loading talks to the controller.
        if let Some(registry) = load(name) {
            if let Err(e) = self.insert(name, &registry) {
                debug!("Ignoring unusable message registry {name}: {e}");
            }
        }
    }

    fn lookup(&self, registry: &str, key: &str) -> Option<RegistryMessage> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .loaded
            .get(registry)
            .and_then(|r| r.get(key))
            .cloned()
    }
}

/// True for RIS style `{"Type": "ExtendedError.x.y.z", "Messages": [...]}`
/// bodies and for Redfish `{"error": {"@Message.ExtendedInfo": [...]}}`.
pub fn is_extended_error(body: &Value) -> bool {
    body.get("Type")
        .and_then(Value::as_str)
        .is_some_and(|t| t.starts_with("ExtendedError."))
        || body
            .pointer("/error/@Message.ExtendedInfo")
            .is_some_and(Value::is_array)
}

fn extended_error_entries(body: &Value) -> Vec<(String, Vec<Value>)> {
    let (list, id_key) = if body
        .get("Type")
        .and_then(Value::as_str)
        .is_some_and(|t| t.starts_with("ExtendedError."))
    {
        (body.get("Messages"), "MessageID")
    } else {
        (body.pointer("/error/@Message.ExtendedInfo"), "MessageId")
    };
    let Some(list) = list.and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|m| {
            let id = m.get(id_key).and_then(Value::as_str)?;
            let args = m
                .get("MessageArgs")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            Some((id.to_string(), args))
        })
        .collect()
}

/// `<MessageID>:  <template with %N filled>[  <Resolution>]`. The
/// resolution is appended as the registry has it.
fn render_message(message_id: &str, template: &RegistryMessage, args: &[Value]) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER
        .get_or_init(|| Regex::new(r"%(\d+)").expect("placeholder pattern is valid"));

    let filled = re.replace_all(&template.message, |caps: &Captures| {
        let n: usize = caps[1].parse().unwrap_or(0);
        if n == 0 || n > template.number_of_args {
            return caps[0].to_string();
        }
        match args.get(n - 1) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        }
    });
    let mut out = format!("{message_id}:  {filled}");
    if let Some(resolution) = template.resolution.as_deref().filter(|r| *r != "None") {
        out.push_str("  ");
        out.push_str(resolution);
    }
    out
}
