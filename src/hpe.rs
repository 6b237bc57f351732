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
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    jsonmap,
    model::{
        system::{boot_target_for_device, device_for_boot_target},
        ComputerSystem, FlashStatus, Manager, Power, ResetType, VirtualMedia,
    },
    rest::{collection_members, Dialect, RestClient, RestRequest},
    wait::{wait_for_firmware_update_to_complete, wait_for_ilo_after_reset, WaitPolicy},
    FirmwareUpdateProgress, FirmwareUpdateState, IloError, IloOperations, PowerReadings,
    ServerCapabilities, VirtualMediaStatus, BOOT_DEVICES, BOOT_MODES, POWER_TARGETS,
    VM_BOOT_OPTIONS, VM_DEVICES,
};

const SYSTEM: &str = "Systems/1";
const MANAGER: &str = "Managers/1";
const BIOS: &str = "Systems/1/Bios";
const BIOS_SETTINGS: &str = "Systems/1/Bios/Settings";
const BIOS_BOOT: &str = "Systems/1/Bios/Boot";
const VIRTUAL_MEDIA: &str = "Managers/1/VirtualMedia";
const ACCOUNTS: &str = "AccountService/Accounts";
const LICENSE: &str = "Managers/1/LicenseService";

/// iLO 4 (RIS) and iLO 5+ (Redfish). The two share resources and differ
/// in action targets and in where vendor data lives.
pub struct Bmc {
    client: RestClient,
    reset_wait: WaitPolicy,
    firmware_wait: WaitPolicy,
}

impl Bmc {
    pub fn new(client: RestClient) -> Bmc {
        Bmc {
            client,
            reset_wait: WaitPolicy::default(),
            firmware_wait: WaitPolicy::firmware_flash(),
        }
    }

    pub fn with_wait_policies(mut self, reset: WaitPolicy, firmware: WaitPolicy) -> Bmc {
        self.reset_wait = reset;
        self.firmware_wait = firmware;
        self
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }

    fn dialect(&self) -> Dialect {
        self.client.dialect()
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, IloError> {
        let body = self.client.get_json(path)?;
        serde_json::from_value(body.clone()).map_err(|e| IloError::JsonDeserializeError {
            url: path.to_string(),
            body: body.to_string(),
            source: e,
        })
    }

    fn post(&self, path: &str, body: Value) -> Result<(), IloError> {
        self.client.request(&RestRequest::post(path, body))?;
        Ok(())
    }

    fn patch(&self, path: &str, body: Value) -> Result<(), IloError> {
        self.client.request(&RestRequest::patch(path, body))?;
        Ok(())
    }

    fn system(&self) -> Result<ComputerSystem, IloError> {
        self.get(SYSTEM)
    }

    fn reset_system(&self, reset_type: ResetType) -> Result<(), IloError> {
        debug!("Resetting {} with {reset_type}", self.client.host());
        match self.dialect() {
            Dialect::Ris => self.post(SYSTEM, json!({"Action": "Reset", "ResetType": reset_type})),
            Dialect::Redfish => self.post(
                "Systems/1/Actions/ComputerSystem.Reset",
                json!({"ResetType": reset_type}),
            ),
        }
    }

    fn push_power_button(&self, push_type: &str) -> Result<(), IloError> {
        match self.dialect() {
            Dialect::Ris => self.post(
                SYSTEM,
                json!({"Action": "PowerButton", "Target": "/Oem/Hp", "PushType": push_type}),
            ),
            Dialect::Redfish => self.post(
                "Systems/1/Actions/Oem/Hpe/HpeComputerSystemExt.PowerButton",
                json!({"PushType": push_type}),
            ),
        }
    }

    fn set_boot_override(&self, device: &str, enabled: &str) -> Result<(), IloError> {
        let target = boot_target_for_device(device)
            .ok_or_else(|| IloError::invalid_input(format!("invalid boot device '{device}'")))?;
        self.patch(
            SYSTEM,
            json!({"Boot": {
                "BootSourceOverrideTarget": target,
                "BootSourceOverrideEnabled": enabled
            }}),
        )
    }

    /// RIS keeps BIOS settings at the top level, Redfish under `Attributes`.
    fn bios_attribute(&self, path: &str, name: &str) -> Result<String, IloError> {
        let body = self.client.get_json(path)?;
        let attributes = match self.dialect() {
            Dialect::Ris => &body,
            Dialect::Redfish => jsonmap::get_value(&body, "Attributes", path)?,
        };
        jsonmap::get_str(attributes, name, path).map(str::to_string)
    }

    fn bios_boot_mode(&self, path: &str) -> Result<String, IloError> {
        let mode = self.bios_attribute(path, "BootMode")?;
        Ok(match mode.as_str() {
            "Uefi" => "UEFI".to_string(),
            "LegacyBios" => "LEGACY".to_string(),
            other => other.to_ascii_uppercase(),
        })
    }

    fn find_virtual_media(&self, device: &str) -> Result<(String, VirtualMedia), IloError> {
        let collection = self.client.get_json(VIRTUAL_MEDIA)?;
        for member in collection_members(&collection) {
            let media: VirtualMedia = self.get(&member)?;
            if media.serves(device) {
                return Ok((member, media));
            }
        }
        Err(IloError::not_supported(format!(
            "[iLO {}] no virtual media device serves {device}",
            self.client.host()
        )))
    }

    fn update_service_path(&self) -> &'static str {
        match self.dialect() {
            Dialect::Ris => "Managers/1/UpdateService",
            Dialect::Redfish => "UpdateService",
        }
    }
}

/// Persistent boot order entries look like "NIC.LOM.1.1.IPv4" or "HD.Emb.1.2".
fn classify_structured_boot_string(entry: &str) -> &'static str {
    let upper = entry.to_ascii_uppercase();
    if upper.contains("ISCSI") {
        "ISCSI"
    } else if upper.starts_with("NIC.") || upper.contains("PXE") {
        "NETWORK"
    } else if upper.starts_with("CD.") || upper.contains("DVD") {
        "CDROM"
    } else if upper.starts_with("HD.") || upper.contains("SATA") {
        "HDD"
    } else {
        "UNKNOWN"
    }
}

impl IloOperations for Bmc {
    fn get_product_name(&self) -> Result<String, IloError> {
        Ok(self.system()?.model)
    }

    fn get_host_power_status(&self) -> Result<String, IloError> {
        let state = self.system()?.power_state.ok_or_else(|| IloError::MissingKey {
            key: "PowerState".to_string(),
            url: SYSTEM.to_string(),
        })?;
        Ok(state.as_ribcl().to_string())
    }

    fn set_host_power(&self, target: &str) -> Result<(), IloError> {
        let target = crate::validate_choice("power target", target, &POWER_TARGETS)?;
        if self.get_host_power_status()? == target {
            debug!("{} is already {target}", self.client.host());
            return Ok(());
        }
        let reset_type = if target == "ON" {
            ResetType::On
        } else {
            ResetType::ForceOff
        };
        self.reset_system(reset_type)
    }

    fn reset_server(&self) -> Result<(), IloError> {
        self.reset_system(ResetType::ForceRestart)
    }

    fn press_pwr_btn(&self) -> Result<(), IloError> {
        self.push_power_button("Press")
    }

    fn hold_pwr_btn(&self) -> Result<(), IloError> {
        self.push_power_button("PressAndHold")
    }

    fn reset_ilo(&self) -> Result<(), IloError> {
        match self.dialect() {
            Dialect::Ris => self.post(MANAGER, json!({"Action": "Reset"}))?,
            Dialect::Redfish => self.post(
                "Managers/1/Actions/Manager.Reset",
                json!({"ResetType": "GracefulRestart"}),
            )?,
        }
        wait_for_ilo_after_reset(self, &self.reset_wait)
    }

    fn get_one_time_boot(&self) -> Result<String, IloError> {
        let system = self.system()?;
        Ok(match system.boot.one_time_target() {
            Some(target) => device_for_boot_target(target)
                .map(str::to_string)
                .unwrap_or_else(|| target.to_ascii_uppercase()),
            None => "Normal".to_string(),
        })
    }

    fn set_one_time_boot(&self, device: &str) -> Result<(), IloError> {
        let device = crate::validate_choice("boot device", device, &BOOT_DEVICES)?;
        crate::require_uefi_for(self, &device)?;
        self.set_boot_override(&device, "Once")
    }

    fn get_persistent_boot_device(&self) -> Result<String, IloError> {
        let system = self.system()?;
        if let Some(target) = system.boot.continuous_target() {
            if let Some(device) = device_for_boot_target(target) {
                return Ok(device.to_string());
            }
        }
        let boot = self.client.get_json(BIOS_BOOT)?;
        let order = jsonmap::get_array(&boot, "PersistentBootConfigOrder", BIOS_BOOT)?;
        let first = order.first().and_then(Value::as_str).unwrap_or_default();
        Ok(classify_structured_boot_string(first).to_string())
    }

    fn update_persistent_boot(&self, devices: &[&str]) -> Result<(), IloError> {
        let mut first = None;
        for device in devices {
            if device.eq_ignore_ascii_case("NONE") {
                continue;
            }
            let device = crate::validate_choice("boot device", device, &BOOT_DEVICES)?;
            first.get_or_insert(device);
        }
        let device = first.ok_or_else(|| IloError::invalid_input("no boot device given"))?;
        crate::require_uefi_for(self, &device)?;
        self.set_boot_override(&device, "Continuous")
    }

    fn get_vm_status(&self, device: &str) -> Result<VirtualMediaStatus, IloError> {
        let device = crate::validate_choice("virtual media device", device, &VM_DEVICES)?;
        let (_, media) = self.find_virtual_media(&device)?;
        let boot_option = if media.boot_on_next_reset(self.dialect().oem_key()) {
            "BOOT_ONCE"
        } else {
            "NO_BOOT"
        };
        Ok(VirtualMediaStatus {
            device,
            image_inserted: media.inserted,
            image_url: media.image.filter(|i| !i.is_empty()),
            boot_option: boot_option.to_string(),
            write_protect: media.write_protected.unwrap_or(true),
        })
    }

    fn insert_virtual_media(&self, url: &str, device: &str) -> Result<(), IloError> {
        let device = crate::validate_choice("virtual media device", device, &VM_DEVICES)?;
        let (member, media) = self.find_virtual_media(&device)?;
        if media.inserted {
            self.eject_virtual_media(&device)?;
        }
        match self.dialect() {
            Dialect::Ris => self.patch(&member, json!({"Image": url})),
            Dialect::Redfish => self.post(
                &format!("{member}/Actions/VirtualMedia.InsertMedia"),
                json!({"Image": url}),
            ),
        }
    }

    fn eject_virtual_media(&self, device: &str) -> Result<(), IloError> {
        let device = crate::validate_choice("virtual media device", device, &VM_DEVICES)?;
        let (member, media) = self.find_virtual_media(&device)?;
        if !media.inserted {
            debug!("{} has no image in {device}", self.client.host());
            return Ok(());
        }
        match self.dialect() {
            Dialect::Ris => self.patch(&member, json!({"Image": null})),
            Dialect::Redfish => self.post(
                &format!("{member}/Actions/VirtualMedia.EjectMedia"),
                json!({}),
            ),
        }
    }

    fn set_vm_status(
        &self,
        device: &str,
        boot_option: &str,
        write_protect: bool,
    ) -> Result<(), IloError> {
        let device = crate::validate_choice("virtual media device", device, &VM_DEVICES)?;
        let boot_option = crate::validate_choice("boot option", boot_option, &VM_BOOT_OPTIONS)?;
        let boot_on_next_reset = match boot_option.as_str() {
            "BOOT_ONCE" => true,
            "NO_BOOT" => false,
            other => {
                return Err(IloError::invalid_input(format!(
                    "boot option {other} is only available over RIBCL"
                )))
            }
        };
        if !write_protect {
            debug!("Write protection of {device} cannot be changed over REST, ignoring");
        }
        let (member, _) = self.find_virtual_media(&device)?;
        let mut oem = serde_json::Map::new();
        oem.insert(
            self.dialect().oem_key().to_string(),
            json!({"BootOnNextServerReset": boot_on_next_reset}),
        );
        self.patch(&member, json!({"Oem": oem}))
    }

    fn get_current_boot_mode(&self) -> Result<String, IloError> {
        self.bios_boot_mode(BIOS)
    }

    fn get_pending_boot_mode(&self) -> Result<String, IloError> {
        self.bios_boot_mode(BIOS_SETTINGS)
    }

    fn set_pending_boot_mode(&self, mode: &str) -> Result<(), IloError> {
        let mode = crate::validate_choice("boot mode", mode, &BOOT_MODES)?;
        let value = if mode == "UEFI" { "Uefi" } else { "LegacyBios" };
        let body = match self.dialect() {
            Dialect::Ris => json!({"BootMode": value}),
            Dialect::Redfish => json!({"Attributes": {"BootMode": value}}),
        };
        self.patch(BIOS_SETTINGS, body)
    }

    fn get_supported_boot_mode(&self) -> Result<String, IloError> {
        let system = self.system()?;
        let class = system
            .uefi_class(self.dialect().oem_key())
            .ok_or_else(|| IloError::not_supported("server does not report its UEFI class"))?;
        Ok(match class {
            0 => "LEGACY_ONLY",
            3 => "UEFI_ONLY",
            _ => "LEGACY_UEFI",
        }
        .to_string())
    }

    fn reset_ilo_credential(&self, password: &str) -> Result<(), IloError> {
        crate::validate_password(password)?;
        let user = self
            .client
            .user()
            .ok_or_else(|| IloError::invalid_input("the endpoint has no user"))?;
        let accounts = self.client.get_json(ACCOUNTS)?;
        for member in collection_members(&accounts) {
            let account = self.client.get_json(&member)?;
            if account.get("UserName").and_then(Value::as_str) == Some(user) {
                return self.patch(&member, json!({"Password": password}));
            }
        }
        Err(IloError::ilo(format!(
            "[iLO {}] account {user} not found",
            self.client.host()
        )))
    }

    fn get_host_health_data(&self) -> Result<Value, IloError> {
        let thermal = self.client.get_json("Chassis/1/Thermal")?;
        let power = self.client.get_json("Chassis/1/Power")?;
        Ok(json!({"Thermal": thermal, "Power": power}))
    }

    fn get_host_power_readings(&self) -> Result<PowerReadings, IloError> {
        let power: Power = self.get("Chassis/1/Power")?;
        Ok(power.readings())
    }

    fn get_ilo_firmware_version(&self) -> Result<String, IloError> {
        let manager: Manager = self.get(MANAGER)?;
        manager
            .firmware_version()
            .map(str::to_string)
            .ok_or_else(|| IloError::MissingKey {
                key: "FirmwareVersion".to_string(),
                url: MANAGER.to_string(),
            })
    }

    fn get_firmware_update_progress(&self) -> Result<FirmwareUpdateProgress, IloError> {
        let path = self.update_service_path();
        let body = self.client.get_json(path)?;
        let status = FlashStatus::from_update_service(&body, self.dialect().oem_key())
            .map_err(|e| IloError::JsonDeserializeError {
                url: path.to_string(),
                body: body.to_string(),
                source: e,
            })?;
        let state = status
            .state
            .as_deref()
            .map(|s| s.parse().unwrap_or(FirmwareUpdateState::Unknown))
            .unwrap_or(FirmwareUpdateState::Unknown);
        Ok(FirmwareUpdateProgress {
            state,
            percent: status.percent(),
        })
    }

    fn update_firmware(&self, url: &str, component: &str) -> Result<(), IloError> {
        let component = crate::validate_component(component)?;
        debug!("Flashing {component} on {} from {url}", self.client.host());
        match self.dialect() {
            Dialect::Ris => self.post(
                self.update_service_path(),
                json!({"Action": "InstallFromURI", "FirmwareURI": url}),
            )?,
            Dialect::Redfish => self.post(
                "UpdateService/Actions/UpdateService.SimpleUpdate",
                json!({"ImageURI": url}),
            )?,
        }
        wait_for_firmware_update_to_complete(self, &self.firmware_wait, &self.reset_wait)?;

        let progress = self.get_firmware_update_progress()?;
        match progress.state {
            FirmwareUpdateState::Error => Err(IloError::ilo(format!(
                "[iLO {}] unable to update {component} firmware",
                self.client.host()
            ))),
            FirmwareUpdateState::Unknown => {
                debug!("Status of the {component} firmware update is not known");
                Ok(())
            }
            state => {
                debug!("Firmware update of {component} finished with {state}");
                Ok(())
            }
        }
    }

    fn activate_license(&self, key: &str) -> Result<(), IloError> {
        if key.trim().is_empty() {
            return Err(IloError::invalid_input("license key must not be empty"));
        }
        self.post(LICENSE, json!({"LicenseKey": key}))
    }

    fn get_server_capabilities(&self) -> Result<ServerCapabilities, IloError> {
        let system = self.system()?;
        let mut capabilities = ServerCapabilities::new();
        capabilities.insert("server_model".to_string(), system.model.clone());
        if let Some(rom) = &system.bios_version {
            capabilities.insert("rom_firmware_version".to_string(), rom.clone());
        }
        capabilities.insert(
            "ilo_firmware_version".to_string(),
            self.get_ilo_firmware_version()?,
        );
        if let Some(class) = system.uefi_class(self.dialect().oem_key()) {
            let mode = match class {
                0 => "LEGACY_ONLY",
                3 => "UEFI_ONLY",
                _ => "LEGACY_UEFI",
            };
            capabilities.insert("supported_boot_mode".to_string(), mode.to_string());
        }
        match self.client.get_json("Systems/1/SecureBoot") {
            Ok(_) => {
                capabilities.insert("secure_boot".to_string(), "true".to_string());
            }
            Err(IloError::HttpStatus { .. }) => {}
            Err(e) => return Err(e),
        }
        Ok(capabilities)
    }
}
