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
/// Drives whole clients against an in-process iLO (see tests/common). GET
/// calls read the mockup tree and PATCH calls merge into it, so a setter
/// followed by its getter shows the round trip a real iLO would make.
use std::sync::Once;

use libilo::{hpe, ribcl, Dialect, FirmwareUpdateState, IloError, IloOperations, WaitPolicy};
use reqwest::Method;
use serde_json::{json, Value};

mod common;
use common::{endpoint, pool, product, rest_mockup, MockIlo};

static SETUP: Once = Once::new();

fn setup_logging() {
    SETUP.call_once(|| {
        use tracing_subscriber::fmt::Layer;
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{filter::LevelFilter, EnvFilter};
        tracing_subscriber::registry()
            .with(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with(Layer::default().compact().with_test_writer().with_ansi(false))
            .init();
    });
}

fn gen10() -> std::sync::Arc<MockIlo> {
    let ilo = MockIlo::new();
    product(&ilo, "ProLiant DL360 Gen10");
    rest_mockup(&ilo, "/redfish/v1/", "Hpe", "ProLiant DL360 Gen10");
    ilo
}

fn gen9() -> std::sync::Arc<MockIlo> {
    let ilo = MockIlo::new();
    product(&ilo, "ProLiant DL380 Gen9");
    rest_mockup(&ilo, "/rest/v1/", "Hp", "ProLiant DL380 Gen9");
    ilo
}

fn rest_bmc(ilo: &std::sync::Arc<MockIlo>, dialect: Dialect) -> hpe::Bmc {
    pool(ilo)
        .create_rest_client(endpoint(), dialect)
        .with_wait_policies(WaitPolicy::immediate(3), WaitPolicy::immediate(3))
}

#[test]
fn test_factory_picks_dialect_by_generation() -> Result<(), anyhow::Error> {
    setup_logging();
    let ilo = gen10();
    let client = pool(&ilo).create_client(endpoint())?;
    assert_eq!(client.get_product_name()?, "ProLiant DL360 Gen10");
    assert_eq!(ilo.sent(Method::GET, "/redfish/v1/Systems/1").len(), 1);

    let ilo = gen9();
    let client = pool(&ilo).create_client(endpoint())?;
    assert_eq!(client.get_host_power_status()?, "ON");
    assert_eq!(ilo.sent(Method::GET, "/rest/v1/Systems/1").len(), 1);

    let ilo = MockIlo::new();
    product(&ilo, "ProLiant DL380 G7");
    ilo.ribcl("GET_HOST_POWER_STATUS", r#"<GET_HOST_POWER HOST_POWER="OFF"/>"#);
    let client = pool(&ilo).create_client(endpoint())?;
    assert_eq!(client.get_host_power_status()?, "OFF");
    assert_eq!(
        ilo.ribcl_commands(),
        vec!["GET_PRODUCT_NAME", "GET_HOST_POWER_STATUS"]
    );
    Ok(())
}

#[test]
fn test_redfish_power_and_boot() -> Result<(), anyhow::Error> {
    setup_logging();
    let ilo = gen10();
    let bmc = rest_bmc(&ilo, Dialect::Redfish);

    bmc.set_host_power("off")?;
    assert_eq!(bmc.get_host_power_status()?, "OFF");
    // already off, nothing is posted
    bmc.set_host_power("OFF")?;
    assert_eq!(
        ilo.sent(Method::POST, "/redfish/v1/Systems/1/Actions/ComputerSystem.Reset")
            .len(),
        1
    );
    bmc.set_host_power("ON")?;
    assert_eq!(bmc.get_host_power_status()?, "ON");

    assert_eq!(bmc.get_one_time_boot()?, "Normal");
    bmc.set_one_time_boot("cdrom")?;
    assert_eq!(bmc.get_one_time_boot()?, "CDROM");

    assert_eq!(bmc.get_persistent_boot_device()?, "NETWORK");
    bmc.update_persistent_boot(&["NONE", "HDD", "NETWORK"])?;
    assert_eq!(bmc.get_persistent_boot_device()?, "HDD");

    assert!(matches!(
        bmc.set_one_time_boot("USB"),
        Err(IloError::InvalidInput(_))
    ));
    Ok(())
}

#[test]
fn test_iscsi_boot_depends_on_boot_mode() -> Result<(), anyhow::Error> {
    setup_logging();
    let ilo = gen10();
    let bmc = rest_bmc(&ilo, Dialect::Redfish);

    bmc.set_one_time_boot("ISCSI")?;
    bmc.set_pending_boot_mode("legacy")?;
    assert_eq!(bmc.get_pending_boot_mode()?, "LEGACY");
    assert_eq!(bmc.get_current_boot_mode()?, "UEFI");

    // the pending mode only applies after a reboot
    ilo.resource(
        "/redfish/v1/Systems/1/Bios",
        json!({"Attributes": {"BootMode": "LegacyBios"}}),
    );
    assert!(matches!(
        bmc.set_one_time_boot("ISCSI"),
        Err(IloError::CommandNotSupportedInBios(_))
    ));
    Ok(())
}

#[test]
fn test_virtual_media_round_trip() -> Result<(), anyhow::Error> {
    setup_logging();
    for (ilo, dialect, root, oem) in [
        (gen10(), Dialect::Redfish, "/redfish/v1/", "Hpe"),
        (gen9(), Dialect::Ris, "/rest/v1/", "Hp"),
    ] {
        let bmc = rest_bmc(&ilo, dialect);
        let cd = format!("{root}Managers/1/VirtualMedia/2");

        let status = bmc.get_vm_status("CDROM")?;
        assert!(!status.image_inserted);
        assert_eq!(status.boot_option, "NO_BOOT");

        bmc.insert_virtual_media("http://10.0.0.5/boot.iso", "CDROM")?;
        match dialect {
            Dialect::Ris => assert_eq!(ilo.get(&cd)["Image"], "http://10.0.0.5/boot.iso"),
            Dialect::Redfish => {
                let posts =
                    ilo.sent(Method::POST, &format!("{cd}/Actions/VirtualMedia.InsertMedia"));
                assert_eq!(posts.len(), 1);
                let body: Value = serde_json::from_str(posts[0].body.as_deref().unwrap())?;
                assert_eq!(body["Image"], "http://10.0.0.5/boot.iso");
            }
        }

        bmc.set_vm_status("CDROM", "boot_once", true)?;
        assert_eq!(ilo.get(&cd)["Oem"][oem]["BootOnNextServerReset"], true);
        assert_eq!(bmc.get_vm_status("CDROM")?.boot_option, "BOOT_ONCE");

        assert!(matches!(
            bmc.set_vm_status("CDROM", "CONNECT", true),
            Err(IloError::InvalidInput(_))
        ));
        assert!(matches!(
            bmc.get_vm_status("USB"),
            Err(IloError::InvalidInput(_))
        ));
    }
    Ok(())
}

#[test]
fn test_health_power_and_capabilities() -> Result<(), anyhow::Error> {
    setup_logging();
    let ilo = gen9();
    let bmc = rest_bmc(&ilo, Dialect::Ris);

    let readings = bmc.get_host_power_readings()?;
    assert_eq!(readings.present, Some(110.0));
    assert_eq!(readings.maximum, Some(140.0));

    let health = bmc.get_host_health_data()?;
    assert!(health["Thermal"]["Fans"].is_array());

    assert_eq!(bmc.get_ilo_firmware_version()?, "iLO 4 v2.55");
    let caps = bmc.get_server_capabilities()?;
    assert_eq!(caps["server_model"], "ProLiant DL380 Gen9");
    assert_eq!(caps["supported_boot_mode"], "LEGACY_UEFI");
    // no SecureBoot resource in this mockup
    assert!(!caps.contains_key("secure_boot"));
    Ok(())
}

#[test]
fn test_missing_resource_reports_extended_error() -> Result<(), anyhow::Error> {
    setup_logging();
    let ilo = MockIlo::new();
    let bmc = rest_bmc(&ilo, Dialect::Redfish);
    match bmc.get_product_name() {
        Err(IloError::HttpStatus {
            status_code,
            messages,
            ..
        }) => {
            assert_eq!(status_code, 404);
            assert!(
                messages.iter().any(|m| m.contains("ResourceMissingAtURI")),
                "{messages:?}"
            );
        }
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn test_firmware_update_redfish() -> Result<(), anyhow::Error> {
    setup_logging();
    let ilo = gen10();
    ilo.resource(
        "/redfish/v1/UpdateService",
        json!({"Oem": {"Hpe": {"State": "Complete", "FlashProgressPercent": 100}}}),
    );
    let bmc = rest_bmc(&ilo, Dialect::Redfish);
    pool(&ilo)
        .image_validator()
        .validate_href("http://10.0.0.42/redfish/v1/Systems/1")?;

    bmc.update_firmware("http://10.0.0.5/ilo5_218.bin", "ilo")?;
    let posts = ilo.sent(
        Method::POST,
        "/redfish/v1/UpdateService/Actions/UpdateService.SimpleUpdate",
    );
    assert_eq!(posts.len(), 1);
    assert_eq!(
        bmc.get_firmware_update_progress()?.state,
        FirmwareUpdateState::Complete
    );
    assert!(matches!(
        bmc.update_firmware("http://10.0.0.5/x.bin", "nic"),
        Err(IloError::InvalidInput(_))
    ));
    Ok(())
}

#[test]
fn test_session_login_uses_token() -> Result<(), anyhow::Error> {
    setup_logging();
    let ilo = gen10();
    let bmc = rest_bmc(&ilo, Dialect::Redfish);
    bmc.client().login_session()?;
    assert_eq!(bmc.client().session_key().as_deref(), Some("session-token"));
    bmc.get_product_name()?;
    bmc.client().logout_session()?;
    assert_eq!(
        ilo.sent(Method::DELETE, "/redfish/v1/SessionService/Sessions/admin0001")
            .len(),
        1
    );
    assert!(bmc.client().session_key().is_none());
    Ok(())
}

#[test]
fn test_ribcl_end_to_end() -> Result<(), anyhow::Error> {
    setup_logging();
    let ilo = MockIlo::new();
    product(&ilo, "ProLiant DL380 G7");
    ilo.ribcl("GET_HOST_POWER_STATUS", r#"<GET_HOST_POWER HOST_POWER="ON"/>"#);
    ilo.ribcl(
        "GET_FW_VERSION",
        r#"<GET_FW_VERSION FIRMWARE_VERSION="1.88" FIRMWARE_DATE="Jul 13 2016" MANAGEMENT_PROCESSOR="iLO3"/>"#,
    );
    let bmc: ribcl::Bmc = pool(&ilo)
        .create_ribcl_client(endpoint())
        .with_reset_wait(WaitPolicy::immediate(3));

    bmc.set_host_power("OFF")?;
    assert_eq!(bmc.get_host_power_status()?, "OFF");
    assert_eq!(bmc.get_ilo_firmware_version()?, "1.88");

    bmc.reset_ilo()?;
    assert_eq!(
        ilo.ribcl_commands(),
        vec![
            "GET_HOST_POWER_STATUS",
            "SET_HOST_POWER",
            "GET_HOST_POWER_STATUS",
            "GET_FW_VERSION",
            "RESET_RIB",
            "GET_PRODUCT_NAME",
        ]
    );
    assert!(matches!(
        bmc.get_firmware_update_progress(),
        Err(IloError::CommandNotSupported { .. })
    ));
    Ok(())
}
