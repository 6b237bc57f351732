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
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PowerState;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    On,
    ForceOff,
    ForceRestart,
    GracefulShutdown,
}

impl fmt::Display for ResetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase", default)]
pub struct Boot {
    pub boot_source_override_enabled: Option<String>,
    pub boot_source_override_target: Option<String>,
    pub uefi_target_boot_source_override: Option<String>,
}

impl Boot {
    /// The override target when it applies to the next boot only.
    pub fn one_time_target(&self) -> Option<&str> {
        match self.boot_source_override_enabled.as_deref() {
            Some("Once") => self.boot_source_override_target.as_deref(),
            _ => None,
        }
    }

    pub fn continuous_target(&self) -> Option<&str> {
        match self.boot_source_override_enabled.as_deref() {
            Some("Continuous") => self.boot_source_override_target.as_deref(),
            _ => None,
        }
    }
}

/// `Systems/1`
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ComputerSystem {
    pub model: String,
    pub power_state: Option<PowerState>,
    pub bios_version: Option<String>,
    #[serde(default)]
    pub boot: Boot,
    // Hp on RIS, Hpe on Redfish
    pub oem: Option<Value>,
}

impl ComputerSystem {
    /// `Oem.<vendor>.Bios.UefiClass`: 0 is legacy only, 3 is UEFI only.
    pub fn uefi_class(&self, oem_key: &str) -> Option<i64> {
        self.oem
            .as_ref()?
            .get(oem_key)?
            .pointer("/Bios/UefiClass")?
            .as_i64()
    }
}

/// Maps a boot device name to the REST override target and back.
pub fn boot_target_for_device(device: &str) -> Option<&'static str> {
    match device {
        "NETWORK" => Some("Pxe"),
        "HDD" => Some("Hdd"),
        "CDROM" => Some("Cd"),
        "ISCSI" => Some("UefiTarget"),
        _ => None,
    }
}

pub fn device_for_boot_target(target: &str) -> Option<&'static str> {
    match target {
        "Pxe" => Some("NETWORK"),
        "Hdd" => Some("HDD"),
        "Cd" => Some("CDROM"),
        "UefiTarget" => Some("ISCSI"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_deserialize_ris_system() {
        let system: ComputerSystem = serde_json::from_value(json!({
            "Model": "ProLiant DL380 Gen9",
            "PowerState": "On",
            "BiosVersion": "P89 v2.40",
            "Boot": {"BootSourceOverrideEnabled": "Once", "BootSourceOverrideTarget": "Pxe"},
            "Oem": {"Hp": {"Bios": {"UefiClass": 2}}}
        }))
        .unwrap();
        assert_eq!(system.power_state, Some(PowerState::On));
        assert_eq!(system.boot.one_time_target(), Some("Pxe"));
        assert_eq!(system.boot.continuous_target(), None);
        assert_eq!(system.uefi_class("Hp"), Some(2));
        assert_eq!(system.uefi_class("Hpe"), None);
    }

    #[test]
    fn test_boot_target_mapping() {
        for device in crate::BOOT_DEVICES {
            let target = boot_target_for_device(device).unwrap();
            assert_eq!(device_for_boot_target(target), Some(device));
        }
        assert_eq!(boot_target_for_device("NONE"), None);
    }
}
