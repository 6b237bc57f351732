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

/* iLO test/example client
 * Also useful for poking at an iLO in an inconsistent state.
 *
 * USAGE: ./client -H 10.153.145.103 -U Administrator -P ThePassword -c get_power_state
 * -H: address of the iLO. HTTPS on port 443 unless -p is given.
 * Run with no params for help.
 * Run with `-v` for more output.
 */

use std::path::Path;

use anyhow::anyhow;
use libilo::{firmware::FirmwareImage, Dialect, Endpoint, IloClientPool, IloOperations};
use tracing::{error, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::prelude::*;

fn main() -> Result<(), anyhow::Error> {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = getopts::Options::new();
    let mut endpoint = Endpoint::default();

    opts.optflag("h", "help", "Print this help");
    opts.optflag("v", "verbose", "Log at DEBUG level. Default is INFO");
    opts.optopt(
        "H",
        "hostname",
        "Required. Hostname or IP address of the iLO",
        "HOST",
    );
    opts.optopt("p", "port", "iLO HTTPS port", "PORT");
    opts.optopt("U", "username", "iLO username", "USER");
    opts.optopt("P", "password", "iLO password", "PASS");
    opts.optopt(
        "d",
        "dialect",
        "Skip detection and force ribcl, ris or redfish",
        "DIALECT",
    );
    opts.optopt(
        "c",
        "cmd",
        "Command to run:
                product
                get_power_state
                on
                off
                reset
                press_button
                hold_button
                reset_ilo
                boot_once DEVICE
                boot_persistent DEVICE[,DEVICE]
                get_boot
                boot_mode
                set_boot_mode LEGACY|UEFI
                vm_status DEVICE
                insert_media URL DEVICE
                eject_media DEVICE
                health
                power_readings
                firmware_version
                firmware_progress
                update_firmware URL COMPONENT
                extract_firmware FILE
                capabilities",
        "CMD",
    );

    let args_given = opts.parse(&args[1..])?;
    if args_given.opt_present("h") || !args_given.opt_present("H") {
        eprintln!(
            "{}",
            opts.usage("client -H ilo_ip -U ilo_user -P ilo_pass -c cmd [ARGS]")
        );
        return Ok(());
    }
    if let Some(host) = args_given.opt_str("H") {
        endpoint.host = host;
    }
    if let Some(port) = args_given.opt_str("p") {
        endpoint.port = Some(port.parse()?);
    }
    endpoint.user = args_given.opt_str("U");
    endpoint.password = args_given.opt_str("P");

    let log_level = if args_given.opt_present("v") {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::from_default_env()
        .add_directive(log_level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);
    tracing_subscriber::registry()
        .with(Layer::default().compact())
        .with(env_filter)
        .init();

    let Some(cmd) = args_given.opt_str("c") else {
        return Ok(());
    };
    let free = &args_given.free;
    let arg = |i: usize| positional(free, i, &cmd);

    // Extraction is local, no iLO needed
    if cmd == "extract_firmware" {
        let (path, extracted) = FirmwareImage::new(Path::new(arg(0)?))?.extract()?;
        info!("{} (unpacked: {extracted})", path.display());
        return Ok(());
    }

    let pool = IloClientPool::builder().build()?;
    let ilo: Box<dyn IloOperations> = match args_given.opt_str("d").as_deref() {
        None => pool.create_client(endpoint)?,
        Some("ribcl") => Box::new(pool.create_ribcl_client(endpoint)),
        Some("ris") => Box::new(pool.create_rest_client(endpoint, Dialect::Ris)),
        Some("redfish") => Box::new(pool.create_rest_client(endpoint, Dialect::Redfish)),
        Some(other) => return Err(anyhow!("Unknown dialect {other}")),
    };

    match cmd.as_str() {
        "product" => info!("{}", ilo.get_product_name()?),
        "get_power_state" => info!("{}", ilo.get_host_power_status()?),
        "on" => ilo.set_host_power("ON")?,
        "off" => ilo.set_host_power("OFF")?,
        "reset" => ilo.reset_server()?,
        "press_button" => ilo.press_pwr_btn()?,
        "hold_button" => ilo.hold_pwr_btn()?,
        "reset_ilo" => {
            ilo.reset_ilo()?;
            info!("iLO is back");
        }
        "boot_once" => ilo.set_one_time_boot(arg(0)?)?,
        "boot_persistent" => {
            let devices: Vec<&str> = arg(0)?.split(',').collect();
            ilo.update_persistent_boot(&devices)?;
        }
        "get_boot" => {
            info!("one time: {}", ilo.get_one_time_boot()?);
            info!("persistent: {}", ilo.get_persistent_boot_device()?);
        }
        "boot_mode" => {
            info!("current: {}", ilo.get_current_boot_mode()?);
            info!("pending: {}", ilo.get_pending_boot_mode()?);
            info!("supported: {}", ilo.get_supported_boot_mode()?);
        }
        "set_boot_mode" => {
            ilo.set_pending_boot_mode(arg(0)?)?;
            info!("Boot mode change requires system restart");
        }
        "vm_status" => info!("{:#?}", ilo.get_vm_status(arg(0)?)?),
        "insert_media" => ilo.insert_virtual_media(arg(0)?, arg(1)?)?,
        "eject_media" => ilo.eject_virtual_media(arg(0)?)?,
        "health" => info!("{:#}", ilo.get_host_health_data()?),
        "power_readings" => info!("{}", ilo.get_host_power_readings()?),
        "firmware_version" => info!("{}", ilo.get_ilo_firmware_version()?),
        "firmware_progress" => info!("{:?}", ilo.get_firmware_update_progress()?),
        "update_firmware" => {
            let url = arg(0)?;
            pool.image_validator().validate_href(url)?;
            ilo.update_firmware(url, arg(1)?)?;
            info!("Firmware update finished");
        }
        "capabilities" => {
            let mut caps: Vec<_> = ilo.get_server_capabilities()?.into_iter().collect();
            caps.sort();
            for (k, v) in caps {
                info!("{k} = {v}");
            }
        }
        other => {
            error!("Unsupported command specified {other}");
        }
    }

    Ok(())
}

fn positional<'a>(free: &'a [String], i: usize, cmd: &str) -> Result<&'a str, anyhow::Error> {
    free.get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{cmd} needs {} argument(s)", i + 1))
}
