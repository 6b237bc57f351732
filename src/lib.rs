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
use std::{collections::HashMap, fmt, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

mod error;
pub mod firmware;
pub mod hpe;
mod jsonmap;
pub mod model;
mod network;
pub mod rest;
pub mod ribcl;
pub mod wait;
pub mod xml;

pub use error::{IloError, LOGIN_FAIL_MESSAGES, LOGIN_FAIL_STATUSES};
pub use network::{
    Endpoint, HttpRequest, HttpResponse, HttpTransport, IloClientPool, IloClientPoolBuilder,
    ReqwestTransport,
};
pub use rest::{Dialect, RestClient};
pub use wait::{FirmwareUpdateProgress, FirmwareUpdateState, WaitPolicy};

/// Virtual media devices an iLO exposes.
pub const VM_DEVICES: [&str; 2] = ["FLOPPY", "CDROM"];
/// Devices accepted for one-time and persistent boot.
pub const BOOT_DEVICES: [&str; 4] = ["NETWORK", "HDD", "CDROM", "ISCSI"];
pub const BOOT_MODES: [&str; 2] = ["LEGACY", "UEFI"];
pub const POWER_TARGETS: [&str; 2] = ["ON", "OFF"];
pub const VM_BOOT_OPTIONS: [&str; 5] =
    ["BOOT_ONCE", "BOOT_ALWAYS", "NO_BOOT", "CONNECT", "DISCONNECT"];
/// Firmware components `update_firmware` knows how to flash.
pub const FIRMWARE_COMPONENTS: [&str; 5] = ["ilo", "cpld", "power_pic", "bios", "chassis"];

/// Interface to an iLO. All calls will include one or more HTTPS round trips.
///
/// Every method defaults to `IloError::CommandNotSupported`, so a protocol
/// dialect only implements what it can do. Argument validation happens
/// before anything is sent.
pub trait IloOperations: Send + Sync {
    /// Server model, e.g. "ProLiant DL380 Gen9".
    fn get_product_name(&self) -> Result<String, IloError> {
        Err(IloError::not_supported("get_product_name"))
    }

    /// "ON" or "OFF"
    fn get_host_power_status(&self) -> Result<String, IloError> {
        Err(IloError::not_supported("get_host_power_status"))
    }

    /// Powers the host "ON" or "OFF". Nothing is sent if the host is
    /// already there.
    fn set_host_power(&self, _target: &str) -> Result<(), IloError> {
        Err(IloError::not_supported("set_host_power"))
    }

    fn reset_server(&self) -> Result<(), IloError> {
        Err(IloError::not_supported("reset_server"))
    }

    fn press_pwr_btn(&self) -> Result<(), IloError> {
        Err(IloError::not_supported("press_pwr_btn"))
    }

    fn hold_pwr_btn(&self) -> Result<(), IloError> {
        Err(IloError::not_supported("hold_pwr_btn"))
    }

    /// Resets the iLO itself and blocks until it answers again.
    fn reset_ilo(&self) -> Result<(), IloError> {
        Err(IloError::not_supported("reset_ilo"))
    }

    /// The one-time boot device, or "Normal" if none is set.
    fn get_one_time_boot(&self) -> Result<String, IloError> {
        Err(IloError::not_supported("get_one_time_boot"))
    }

    fn set_one_time_boot(&self, _device: &str) -> Result<(), IloError> {
        Err(IloError::not_supported("set_one_time_boot"))
    }

    fn get_persistent_boot_device(&self) -> Result<String, IloError> {
        Err(IloError::not_supported("get_persistent_boot_device"))
    }

    /// Makes the first listed device the persistent boot device.
    fn update_persistent_boot(&self, _devices: &[&str]) -> Result<(), IloError> {
        Err(IloError::not_supported("update_persistent_boot"))
    }

    fn get_vm_status(&self, _device: &str) -> Result<VirtualMediaStatus, IloError> {
        Err(IloError::not_supported("get_vm_status"))
    }

    /// Mounts `url` on `device`, ejecting whatever was there before.
    fn insert_virtual_media(&self, _url: &str, _device: &str) -> Result<(), IloError> {
        Err(IloError::not_supported("insert_virtual_media"))
    }

    fn eject_virtual_media(&self, _device: &str) -> Result<(), IloError> {
        Err(IloError::not_supported("eject_virtual_media"))
    }

    fn set_vm_status(
        &self,
        _device: &str,
        _boot_option: &str,
        _write_protect: bool,
    ) -> Result<(), IloError> {
        Err(IloError::not_supported("set_vm_status"))
    }

    /// "LEGACY" or "UEFI"
    fn get_current_boot_mode(&self) -> Result<String, IloError> {
        Err(IloError::not_supported("get_current_boot_mode"))
    }

    /// Boot mode after the next reboot, "LEGACY" or "UEFI"
    fn get_pending_boot_mode(&self) -> Result<String, IloError> {
        Err(IloError::not_supported("get_pending_boot_mode"))
    }

    fn set_pending_boot_mode(&self, _mode: &str) -> Result<(), IloError> {
        Err(IloError::not_supported("set_pending_boot_mode"))
    }

    /// "LEGACY_ONLY", "UEFI_ONLY" or "LEGACY_UEFI"
    fn get_supported_boot_mode(&self) -> Result<String, IloError> {
        Err(IloError::not_supported("get_supported_boot_mode"))
    }

    /// Changes the password of the account this client logs in with.
    fn reset_ilo_credential(&self, _password: &str) -> Result<(), IloError> {
        Err(IloError::not_supported("reset_ilo_credential"))
    }

    fn get_host_health_data(&self) -> Result<serde_json::Value, IloError> {
        Err(IloError::not_supported("get_host_health_data"))
    }

    fn get_host_power_readings(&self) -> Result<PowerReadings, IloError> {
        Err(IloError::not_supported("get_host_power_readings"))
    }

    fn get_ilo_firmware_version(&self) -> Result<String, IloError> {
        Err(IloError::not_supported("get_ilo_firmware_version"))
    }

    fn get_firmware_update_progress(&self) -> Result<FirmwareUpdateProgress, IloError> {
        Err(IloError::not_supported("get_firmware_update_progress"))
    }

    /// Flashes `component` from the image at `url` and waits for the flash
    /// to finish.
    fn update_firmware(&self, _url: &str, _component: &str) -> Result<(), IloError> {
        Err(IloError::not_supported("update_firmware"))
    }

    fn activate_license(&self, _key: &str) -> Result<(), IloError> {
        Err(IloError::not_supported("activate_license"))
    }

    fn get_server_capabilities(&self) -> Result<ServerCapabilities, IloError> {
        Err(IloError::not_supported("get_server_capabilities"))
    }
}

/// State of one virtual media device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMediaStatus {
    pub device: String,
    pub image_inserted: bool,
    pub image_url: Option<String>,
    /// BOOT_ONCE, BOOT_ALWAYS or NO_BOOT
    pub boot_option: String,
    pub write_protect: bool,
}

/// Power draw in watts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerReadings {
    pub present: Option<f64>,
    pub average: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl fmt::Display for PowerReadings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = |v: Option<f64>| v.map(|v| format!("{v} W")).unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "present {} average {} min {} max {}",
            w(self.present),
            w(self.average),
            w(self.minimum),
            w(self.maximum)
        )
    }
}

/// Capability name to value, e.g. "server_model" -> "ProLiant DL360 Gen10".
pub type ServerCapabilities = HashMap<String, String>;

/// ProLiant generation from a product name: "ProLiant BL460c Gen9" is 9,
/// "ProLiant DL380 G7" is 7.
pub fn server_generation(product_name: &str) -> Option<u32> {
    static GENERATION: OnceLock<Regex> = OnceLock::new();
    let re = GENERATION
        .get_or_init(|| Regex::new(r"\bG(?:en)?(\d+)\b").expect("generation pattern is valid"));
    re.captures(product_name)
        .and_then(|c| c[1].parse().ok())
}

/// Upper-cases `value` and checks it against `allowed`.
pub(crate) fn validate_choice(
    what: &str,
    value: &str,
    allowed: &[&str],
) -> Result<String, IloError> {
    let upper = value.to_ascii_uppercase();
    if allowed.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(IloError::invalid_input(format!(
            "invalid {what} '{value}', expected one of {}",
            allowed.join(", ")
        )))
    }
}

pub(crate) fn validate_component(component: &str) -> Result<String, IloError> {
    let lower = component.to_ascii_lowercase();
    if FIRMWARE_COMPONENTS.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        Err(IloError::invalid_input(format!(
            "invalid firmware component '{component}', expected one of {}",
            FIRMWARE_COMPONENTS.join(", ")
        )))
    }
}

pub(crate) fn validate_password(password: &str) -> Result<(), IloError> {
    if password.is_empty() {
        return Err(IloError::invalid_input("password must not be empty"));
    }
    Ok(())
}

/// iSCSI boot only exists in UEFI mode.
pub(crate) fn require_uefi_for<O>(ops: &O, device: &str) -> Result<(), IloError>
where
    O: IloOperations + ?Sized,
{
    if device == "ISCSI" && ops.get_current_boot_mode()? == "LEGACY" {
        return Err(IloError::CommandNotSupportedInBios(format!(
            "{device} boot is not supported in LEGACY boot mode"
        )));
    }
    Ok(())
}
