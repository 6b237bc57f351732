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
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One member of `Managers/1/VirtualMedia`.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase", default)]
pub struct VirtualMedia {
    pub image: Option<String>,
    pub inserted: bool,
    pub media_types: Vec<String>,
    pub write_protected: Option<bool>,
    pub oem: Option<Value>,
}

impl VirtualMedia {
    /// FLOPPY is served by the "Floppy" member, CDROM by the "CD"/"DVD" one.
    pub fn serves(&self, device: &str) -> bool {
        let wanted: &[&str] = match device {
            "FLOPPY" => &["Floppy"],
            "CDROM" => &["CD", "DVD"],
            _ => &[],
        };
        self.media_types.iter().any(|t| wanted.contains(&t.as_str()))
    }

    /// `Oem.<vendor>.BootOnNextServerReset`
    pub fn boot_on_next_reset(&self, oem_key: &str) -> bool {
        self.oem
            .as_ref()
            .and_then(|o| o.get(oem_key))
            .and_then(|o| o.get("BootOnNextServerReset"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
