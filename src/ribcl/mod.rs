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
//! RIBCL, the XML scripting interface of iLO 2/3/4. Gen8 and older servers
//! only speak this.
use tracing::debug;

use crate::{
    jsonmap,
    wait::{wait_for_ilo_after_reset, WaitPolicy},
    xml::XmlElement,
    IloError, IloOperations, PowerReadings, ServerCapabilities, VirtualMediaStatus,
    BOOT_DEVICES, BOOT_MODES, POWER_TARGETS, VM_BOOT_OPTIONS, VM_DEVICES,
};

pub mod codec;
pub mod transport;

use codec::{Mode, ResponseNode, RibclCommand, RibclResponse};
pub use transport::RibclTransport;

pub struct Bmc {
    transport: RibclTransport,
    reset_wait: WaitPolicy,
}

impl Bmc {
    pub fn new(transport: RibclTransport) -> Bmc {
        Bmc {
            transport,
            reset_wait: WaitPolicy::default(),
        }
    }

    /// How long `reset_ilo` and `update_firmware` wait for the iLO to return.
    pub fn with_reset_wait(mut self, policy: WaitPolicy) -> Bmc {
        self.reset_wait = policy;
        self
    }

    fn context(&self, command: &str) -> String {
        format!("[iLO {}] {command}", self.transport.host())
    }

    fn send(&self, root: &XmlElement) -> Result<RibclResponse, IloError> {
        self.transport.execute(root, || self.get_product_name())
    }

    fn read(&self, command: &str, resource: &str) -> Result<ResponseNode, IloError> {
        let root = self
            .transport
            .build(&RibclCommand::new(command, resource, Mode::Read));
        self.send(&root)?
            .node()
            .ok_or_else(|| IloError::ilo(format!("{} returned no data", self.context(command))))
    }

    fn write(&self, root: &XmlElement) -> Result<(), IloError> {
        if let RibclResponse::Message(m) = self.send(root)? {
            debug!("[iLO {}] {m}", self.transport.host());
        }
        Ok(())
    }

    fn write_command(&self, command: RibclCommand) -> Result<(), IloError> {
        self.write(&self.transport.build(&command))
    }

    /// `<command><tag VALUE=".."/></command>` style reads.
    fn read_value(&self, command: &str, resource: &str, path: &[&str]) -> Result<String, IloError> {
        let node = self.read(command, resource)?;
        jsonmap::get_path_str(&node, path, &self.context(command)).map(str::to_string)
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "YES"
    } else {
        "NO"
    }
}

fn is_yes(node: &serde_json::Value, key: &str) -> bool {
    node.get(key)
        .and_then(serde_json::Value::as_str)
        .is_some_and(|v| v.eq_ignore_ascii_case("YES"))
}

/// `PRESENT_POWER_READING VALUE="123" UNIT="Watts"` to 123.0
fn watts(readings: &serde_json::Value, key: &str) -> Option<f64> {
    readings.get(key)?.get("VALUE")?.as_str()?.trim().parse().ok()
}

/// Classifies a persistent boot entry. Legacy mode reports device names,
/// UEFI mode reports `Boot000X` entries with a description.
fn classify_boot_entry(entry: &serde_json::Value) -> String {
    let value = entry
        .get("VALUE")
        .or_else(|| entry.get("value"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_ascii_uppercase();
    if BOOT_DEVICES.contains(&value.as_str()) {
        return value;
    }
    let description = entry
        .get("DESCRIPTION")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_ascii_uppercase();
    if description.contains("ISCSI") {
        "ISCSI"
    } else if description.contains("NIC") || description.contains("PXE") {
        "NETWORK"
    } else if description.contains("CD") || description.contains("DVD") {
        "CDROM"
    } else if description.contains("HDD")
        || description.contains("LOGICAL DRIVE")
        || description.contains("SATA")
    {
        "HDD"
    } else {
        "UNKNOWN"
    }
    .to_string()
}

impl IloOperations for Bmc {
    fn get_product_name(&self) -> Result<String, IloError> {
        self.read_value(
            "GET_PRODUCT_NAME",
            "SERVER_INFO",
            &["GET_PRODUCT_NAME", "PRODUCT_NAME", "VALUE"],
        )
    }

    fn get_host_power_status(&self) -> Result<String, IloError> {
        self.read_value(
            "GET_HOST_POWER_STATUS",
            "SERVER_INFO",
            &["GET_HOST_POWER", "HOST_POWER"],
        )
    }

    fn set_host_power(&self, target: &str) -> Result<(), IloError> {
        let target = crate::validate_choice("power target", target, &POWER_TARGETS)?;
        if self.get_host_power_status()? == target {
            debug!("[iLO {}] host is already {target}", self.transport.host());
            return Ok(());
        }
        let flag = if target == "ON" { "Yes" } else { "No" };
        self.write_command(
            RibclCommand::new("SET_HOST_POWER", "SERVER_INFO", Mode::Write)
                .attribute("HOST_POWER", flag),
        )
    }

    fn reset_server(&self) -> Result<(), IloError> {
        self.write_command(RibclCommand::new("RESET_SERVER", "SERVER_INFO", Mode::Write))
    }

    fn press_pwr_btn(&self) -> Result<(), IloError> {
        self.write_command(RibclCommand::new("PRESS_PWR_BTN", "SERVER_INFO", Mode::Write))
    }

    fn hold_pwr_btn(&self) -> Result<(), IloError> {
        self.write_command(RibclCommand::new("HOLD_PWR_BTN", "SERVER_INFO", Mode::Write))
    }

    fn reset_ilo(&self) -> Result<(), IloError> {
        self.write_command(RibclCommand::new("RESET_RIB", "RIB_INFO", Mode::Write))?;
        wait_for_ilo_after_reset(self, &self.reset_wait)
    }

    fn get_one_time_boot(&self) -> Result<String, IloError> {
        let value = self.read_value(
            "GET_ONE_TIME_BOOT",
            "SERVER_INFO",
            &["ONE_TIME_BOOT", "BOOT_TYPE", "VALUE"],
        )?;
        Ok(match value.as_str() {
            "NORMAL" => "Normal".to_string(),
            _ => value,
        })
    }

    fn set_one_time_boot(&self, device: &str) -> Result<(), IloError> {
        let device = crate::validate_choice("boot device", device, &BOOT_DEVICES)?;
        crate::require_uefi_for(self, &device)?;
        self.write_command(
            RibclCommand::new("SET_ONE_TIME_BOOT", "SERVER_INFO", Mode::Write)
                .attribute("VALUE", &device),
        )
    }

    fn get_persistent_boot_device(&self) -> Result<String, IloError> {
        let node = self.read("GET_PERSISTENT_BOOT", "SERVER_INFO")?;
        let context = self.context("GET_PERSISTENT_BOOT");
        let devices = jsonmap::get_path(&node, &["PERSISTENT_BOOT", "DEVICE"], &context)?;
        let first = match devices {
            serde_json::Value::Array(list) => list.first(),
            other => Some(other),
        };
        first
            .map(classify_boot_entry)
            .ok_or_else(|| IloError::ilo(format!("{context} returned no devices")))
    }

    fn update_persistent_boot(&self, devices: &[&str]) -> Result<(), IloError> {
        let mut valid = Vec::with_capacity(devices.len());
        for device in devices {
            if device.eq_ignore_ascii_case("NONE") {
                continue;
            }
            valid.push(crate::validate_choice("boot device", device, &BOOT_DEVICES)?);
        }
        if valid.is_empty() {
            return Err(IloError::invalid_input("no boot device given"));
        }
        for device in &valid {
            crate::require_uefi_for(self, device)?;
        }

        let mut root = self
            .transport
            .build(&RibclCommand::new("SET_PERSISTENT_BOOT", "SERVER_INFO", Mode::Write));
        if let Some(cmd) = root.find_mut("SET_PERSISTENT_BOOT") {
            for device in &valid {
                cmd.push_child(XmlElement::new("DEVICE").with_attribute("VALUE", device));
            }
        }
        self.write(&root)
    }

    fn get_vm_status(&self, device: &str) -> Result<VirtualMediaStatus, IloError> {
        let device = crate::validate_choice("virtual media device", device, &VM_DEVICES)?;
        let root = self.transport.build(
            &RibclCommand::new("GET_VM_STATUS", "RIB_INFO", Mode::Read)
                .attribute("DEVICE", &device),
        );
        let context = self.context("GET_VM_STATUS");
        let node = self
            .send(&root)?
            .node()
            .ok_or_else(|| IloError::ilo(format!("{context} returned no data")))?;
        let status = jsonmap::get_value(&node, "GET_VM_STATUS", &context)?;
        let image_url = status
            .get("IMAGE_URL")
            .and_then(serde_json::Value::as_str)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        Ok(VirtualMediaStatus {
            device,
            image_inserted: is_yes(status, "IMAGE_INSERTED"),
            image_url,
            boot_option: jsonmap::get_str(status, "BOOT_OPTION", &context)?.to_string(),
            write_protect: is_yes(status, "WRITE_PROTECT"),
        })
    }

    fn insert_virtual_media(&self, url: &str, device: &str) -> Result<(), IloError> {
        let device = crate::validate_choice("virtual media device", device, &VM_DEVICES)?;
        if self.get_vm_status(&device)?.image_inserted {
            self.eject_virtual_media(&device)?;
        }
        self.write_command(
            RibclCommand::new("INSERT_VIRTUAL_MEDIA", "RIB_INFO", Mode::Write)
                .attribute("DEVICE", &device)
                .attribute("IMAGE_URL", url),
        )
    }

    fn eject_virtual_media(&self, device: &str) -> Result<(), IloError> {
        let device = crate::validate_choice("virtual media device", device, &VM_DEVICES)?;
        if !self.get_vm_status(&device)?.image_inserted {
            debug!("[iLO {}] no image in {device}", self.transport.host());
            return Ok(());
        }
        self.write_command(
            RibclCommand::new("EJECT_VIRTUAL_MEDIA", "RIB_INFO", Mode::Write)
                .attribute("DEVICE", &device),
        )
    }

    fn set_vm_status(
        &self,
        device: &str,
        boot_option: &str,
        write_protect: bool,
    ) -> Result<(), IloError> {
        let device = crate::validate_choice("virtual media device", device, &VM_DEVICES)?;
        let boot_option = crate::validate_choice("boot option", boot_option, &VM_BOOT_OPTIONS)?;
        let mut root = self.transport.build(
            &RibclCommand::new("SET_VM_STATUS", "RIB_INFO", Mode::Write)
                .attribute("DEVICE", &device),
        );
        if let Some(cmd) = root.find_mut("SET_VM_STATUS") {
            cmd.push_child(XmlElement::new("VM_BOOT_OPTION").with_attribute("VALUE", &boot_option));
            cmd.push_child(
                XmlElement::new("VM_WRITE_PROTECT").with_attribute("VALUE", yes_no(write_protect)),
            );
        }
        self.write(&root)
    }

    fn get_current_boot_mode(&self) -> Result<String, IloError> {
        self.read_value(
            "GET_CURRENT_BOOT_MODE",
            "SERVER_INFO",
            &["GET_CURRENT_BOOT_MODE", "BOOT_MODE", "VALUE"],
        )
        .map(|m| m.to_ascii_uppercase())
    }

    fn get_pending_boot_mode(&self) -> Result<String, IloError> {
        self.read_value(
            "GET_PENDING_BOOT_MODE",
            "SERVER_INFO",
            &["GET_PENDING_BOOT_MODE", "BOOT_MODE", "VALUE"],
        )
        .map(|m| m.to_ascii_uppercase())
    }

    fn set_pending_boot_mode(&self, mode: &str) -> Result<(), IloError> {
        let mode = crate::validate_choice("boot mode", mode, &BOOT_MODES)?;
        self.write_command(
            RibclCommand::new("SET_PENDING_BOOT_MODE", "SERVER_INFO", Mode::Write)
                .attribute("VALUE", &mode),
        )
    }

    fn get_supported_boot_mode(&self) -> Result<String, IloError> {
        self.read_value(
            "GET_SUPPORTED_BOOT_MODE",
            "SERVER_INFO",
            &["GET_SUPPORTED_BOOT_MODE", "SUPPORTED_BOOT_MODE", "VALUE"],
        )
    }

    fn reset_ilo_credential(&self, password: &str) -> Result<(), IloError> {
        crate::validate_password(password)?;
        let mut root = self.transport.build(
            &RibclCommand::new("MOD_USER", "USER_INFO", Mode::Write)
                .attribute("USER_LOGIN", self.transport.login()),
        );
        if let Some(cmd) = root.find_mut("MOD_USER") {
            cmd.push_child(XmlElement::new("PASSWORD").with_attribute("value", password));
        }
        self.write(&root)
    }

    fn get_host_health_data(&self) -> Result<serde_json::Value, IloError> {
        let mut node = self.read("GET_EMBEDDED_HEALTH", "SERVER_INFO")?;
        jsonmap::extract(
            &mut node,
            "GET_EMBEDDED_HEALTH_DATA",
            &self.context("GET_EMBEDDED_HEALTH"),
        )
    }

    fn get_host_power_readings(&self) -> Result<PowerReadings, IloError> {
        let node = self.read("GET_POWER_READINGS", "SERVER_INFO")?;
        let readings =
            jsonmap::get_value(&node, "GET_POWER_READINGS", &self.context("GET_POWER_READINGS"))?;
        Ok(PowerReadings {
            present: watts(readings, "PRESENT_POWER_READING"),
            average: watts(readings, "AVERAGE_POWER_READING"),
            minimum: watts(readings, "MINIMUM_POWER_READING"),
            maximum: watts(readings, "MAXIMUM_POWER_READING"),
        })
    }

    fn get_ilo_firmware_version(&self) -> Result<String, IloError> {
        self.read_value(
            "GET_FW_VERSION",
            "RIB_INFO",
            &["GET_FW_VERSION", "FIRMWARE_VERSION"],
        )
    }

    fn update_firmware(&self, url: &str, component: &str) -> Result<(), IloError> {
        let component = crate::validate_component(component)?;
        let command = if component == "ilo" {
            "UPDATE_RIB_FIRMWARE"
        } else {
            "UPDATE_FIRMWARE"
        };
        self.write_command(
            RibclCommand::new(command, "RIB_INFO", Mode::Write).attribute("IMAGE_LOCATION", url),
        )?;
        if component == "ilo" {
            wait_for_ilo_after_reset(self, &self.reset_wait)?;
        }
        Ok(())
    }

    fn activate_license(&self, key: &str) -> Result<(), IloError> {
        if key.trim().is_empty() {
            return Err(IloError::invalid_input("license key must not be empty"));
        }
        let mut root = self
            .transport
            .build(&RibclCommand::new("LICENSE", "RIB_INFO", Mode::Write));
        if let Some(cmd) = root.find_mut("LICENSE") {
            cmd.push_child(XmlElement::new("ACTIVATE").with_attribute("KEY", key));
        }
        self.write(&root)
    }

    fn get_server_capabilities(&self) -> Result<ServerCapabilities, IloError> {
        let mut capabilities = ServerCapabilities::new();
        capabilities.insert("server_model".to_string(), self.get_product_name()?);
        capabilities.insert(
            "ilo_firmware_version".to_string(),
            self.get_ilo_firmware_version()?,
        );
        match self.get_supported_boot_mode() {
            Ok(mode) => {
                capabilities.insert("supported_boot_mode".to_string(), mode);
            }
            Err(IloError::CommandNotSupported { .. }) => {}
            Err(e) => return Err(e),
        }
        Ok(capabilities)
    }
}
