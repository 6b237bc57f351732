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
//! An in-process iLO. REST resources live in a path-keyed store that PATCH
//! merges into and actions mutate; RIBCL commands answer with canned
//! payloads. Every request is logged for later inspection.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use libilo::{
    xml::XmlElement, Endpoint, HttpRequest, HttpResponse, HttpTransport, IloClientPool, IloError,
};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method, StatusCode,
};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct Logged {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
}

#[derive(Default)]
struct State {
    resources: HashMap<String, Value>,
    ribcl: HashMap<String, String>,
    log: Vec<Logged>,
}

#[derive(Default)]
pub struct MockIlo {
    state: Mutex<State>,
}

impl MockIlo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn resource(&self, path: &str, body: Value) {
        self.state
            .lock()
            .unwrap()
            .resources
            .insert(path.to_string(), body);
    }

    pub fn get(&self, path: &str) -> Value {
        self.state.lock().unwrap().resources[path].clone()
    }

    /// Payload placed after the RESPONSE element when `command` is sent.
    pub fn ribcl(&self, command: &str, payload: &str) {
        self.state
            .lock()
            .unwrap()
            .ribcl
            .insert(command.to_string(), payload.to_string());
    }

    pub fn log(&self) -> Vec<Logged> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn sent(&self, method: Method, path: &str) -> Vec<Logged> {
        self.log()
            .into_iter()
            .filter(|l| l.method == method && l.path == path)
            .collect()
    }

    /// Names of the RIBCL commands received, in order.
    pub fn ribcl_commands(&self) -> Vec<String> {
        self.sent(Method::POST, "/ribcl")
            .into_iter()
            .filter_map(|l| command_of(&l.body?))
            .map(|(name, _)| name)
            .collect()
    }

    fn handle_ribcl(&self, state: &mut State, body: &str) -> HttpResponse {
        let Some((command, element)) = command_of(body) else {
            return reply(400, "text/plain", b"no command".to_vec());
        };
        if command == "SET_HOST_POWER" {
            let power = if element.attribute("HOST_POWER") == Some("Yes") {
                "ON"
            } else {
                "OFF"
            };
            state.ribcl.insert(
                "GET_HOST_POWER_STATUS".to_string(),
                format!(r#"<GET_HOST_POWER HOST_POWER="{power}"/>"#),
            );
        }
        let payload = state.ribcl.get(&command).cloned().unwrap_or_default();
        let doc = format!(
            "<?xml version=\"1.0\"?>\r\n<RIBCL VERSION=\"2.23\">\r\n\
             <RESPONSE STATUS=\"0x0000\" MESSAGE='No error'/>\r\n{payload}\r\n</RIBCL>\r\n"
        );
        reply(200, "text/xml", doc.into_bytes())
    }

    fn handle_post(&self, state: &mut State, path: &str, body: &Value) -> HttpResponse {
        if path.ends_with("SessionService/Sessions") {
            let mut response = reply(201, "application/json", b"{}".to_vec());
            response
                .headers
                .insert("x-auth-token", HeaderValue::from_static("session-token"));
            response.headers.insert(
                "location",
                HeaderValue::from_static("/redfish/v1/SessionService/Sessions/admin0001"),
            );
            return response;
        }
        let system = path
            .strip_suffix("/Actions/ComputerSystem.Reset")
            .map(str::to_string)
            .or_else(|| (body.get("Action") == Some(&json!("Reset"))).then(|| path.to_string()));
        if let Some(system) = system {
            let power = match body.get("ResetType").and_then(Value::as_str) {
                Some("On") | Some("ForceRestart") => "On",
                _ => "Off",
            };
            if let Some(resource) = state.resources.get_mut(&system) {
                resource["PowerState"] = json!(power);
            }
        }
        reply(200, "application/json", b"{}".to_vec())
    }
}

fn command_of(body: &str) -> Option<(String, XmlElement)> {
    let root = XmlElement::parse(body).ok()?;
    let command = root.find("LOGIN")?.children.first()?.children.first()?.clone();
    Some((command.tag.clone(), command))
}

fn reply(status: u16, content_type: &'static str, body: Vec<u8>) -> HttpResponse {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static(content_type));
    HttpResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers,
        body,
    }
}

fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (k, v) in patch {
                merge(target.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

impl HttpTransport for MockIlo {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, IloError> {
        let url = url::Url::parse(&request.url).map_err(|e| IloError::Connection {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;
        let path = url.path().to_string();
        let body = request
            .body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned());
        let mut state = self.state.lock().unwrap();
        state.log.push(Logged {
            method: request.method.clone(),
            path: path.clone(),
            body: body.clone(),
        });

        if path == "/ribcl" {
            return Ok(self.handle_ribcl(&mut state, body.as_deref().unwrap_or_default()));
        }
        let json_body: Value = body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
            .unwrap_or(Value::Null);
        let response = match request.method {
            Method::GET | Method::HEAD => match state.resources.get(&path) {
                Some(resource) => reply(200, "application/json", resource.to_string().into_bytes()),
                None => not_found(&path),
            },
            Method::PATCH => match state.resources.get_mut(&path) {
                Some(resource) => {
                    merge(resource, &json_body);
                    reply(200, "application/json", b"{}".to_vec())
                }
                None => not_found(&path),
            },
            Method::POST => self.handle_post(&mut state, &path, &json_body),
            _ => reply(204, "application/json", Vec::new()),
        };
        Ok(response)
    }
}

fn not_found(path: &str) -> HttpResponse {
    let body = json!({"error": {
        "code": "iLO.0.10.ExtendedInfo",
        "@Message.ExtendedInfo": [{"MessageId": "Base.1.0.ResourceMissingAtURI", "MessageArgs": [path]}]
    }});
    reply(404, "application/json", body.to_string().into_bytes())
}

pub fn endpoint() -> Endpoint {
    Endpoint {
        host: "10.0.0.42".to_string(),
        port: None,
        user: Some("Administrator".to_string()),
        password: Some("password".to_string()),
    }
}

pub fn pool(ilo: &Arc<MockIlo>) -> IloClientPool {
    IloClientPool::with_transport(ilo.clone(), Duration::ZERO)
}

pub fn product(ilo: &MockIlo, name: &str) {
    ilo.ribcl(
        "GET_PRODUCT_NAME",
        &format!(r#"<GET_PRODUCT_NAME><PRODUCT_NAME VALUE="{name}"/></GET_PRODUCT_NAME>"#),
    );
}

/// A Gen9 (RIS, oem "Hp") or Gen10 (Redfish, oem "Hpe") resource tree.
pub fn rest_mockup(ilo: &MockIlo, root: &str, oem: &str, model: &str) {
    let system = format!("{root}Systems/1");
    ilo.resource(
        &system,
        json!({
            "Model": model,
            "PowerState": "On",
            "BiosVersion": "U32 v2.10",
            "Boot": {"BootSourceOverrideEnabled": "Disabled", "BootSourceOverrideTarget": "None"},
            "Oem": {oem: {"Bios": {"UefiClass": 2}}}
        }),
    );
    let bios = if oem == "Hp" {
        json!({"BootMode": "Uefi"})
    } else {
        json!({"Attributes": {"BootMode": "Uefi"}})
    };
    ilo.resource(&format!("{system}/Bios"), bios.clone());
    ilo.resource(&format!("{system}/Bios/Settings"), bios);
    ilo.resource(
        &format!("{system}/Bios/Boot"),
        json!({"PersistentBootConfigOrder": ["NIC.LOM.1.1.IPv4", "HD.Emb.1.2"]}),
    );
    let firmware = if oem == "Hp" {
        json!({"Firmware": {"Current": {"VersionString": "iLO 4 v2.55"}}})
    } else {
        json!({"FirmwareVersion": "iLO 5 v2.18"})
    };
    ilo.resource(&format!("{root}Managers/1"), firmware);
    ilo.resource(
        &format!("{root}Managers/1/VirtualMedia"),
        json!({"Members": [
            {"@odata.id": format!("{root}Managers/1/VirtualMedia/1")},
            {"@odata.id": format!("{root}Managers/1/VirtualMedia/2")}
        ]}),
    );
    ilo.resource(
        &format!("{root}Managers/1/VirtualMedia/1"),
        json!({"MediaTypes": ["Floppy", "USBStick"], "Inserted": false, "WriteProtected": true}),
    );
    ilo.resource(
        &format!("{root}Managers/1/VirtualMedia/2"),
        json!({
            "MediaTypes": ["CD", "DVD"],
            "Inserted": false,
            "Image": "",
            "WriteProtected": true,
            "Oem": {oem: {"BootOnNextServerReset": false}}
        }),
    );
    ilo.resource(
        &format!("{root}Chassis/1/Power"),
        json!({"PowerControl": [{
            "PowerConsumedWatts": 110,
            "PowerMetrics": {"AverageConsumedWatts": 105, "MinConsumedWatts": 90, "MaxConsumedWatts": 140}
        }]}),
    );
    ilo.resource(&format!("{root}Chassis/1/Thermal"), json!({"Fans": [], "Temperatures": []}));
}
