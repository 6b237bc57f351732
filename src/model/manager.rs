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

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase", default)]
pub struct FirmwareVersionString {
    pub version_string: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase", default)]
pub struct ManagerFirmware {
    pub current: FirmwareVersionString,
}

/// `Managers/1`
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase", default)]
pub struct Manager {
    // Redfish
    pub firmware_version: Option<String>,
    // RIS
    pub firmware: Option<ManagerFirmware>,
}

impl Manager {
    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.as_deref().or_else(|| {
            self.firmware
                .as_ref()
                .and_then(|f| f.current.version_string.as_deref())
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_firmware_version_either_dialect() {
        let ris: Manager = serde_json::from_value(json!({
            "Firmware": {"Current": {"VersionString": "iLO 4 v2.55"}}
        }))
        .unwrap();
        assert_eq!(ris.firmware_version(), Some("iLO 4 v2.55"));
        let redfish: Manager =
            serde_json::from_value(json!({"FirmwareVersion": "iLO 5 v2.18"})).unwrap();
        assert_eq!(redfish.firmware_version(), Some("iLO 5 v2.18"));
    }
}
