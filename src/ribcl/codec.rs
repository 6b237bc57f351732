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

// codec.rs
// Builds RIBCL request trees, frames them for the wire, and turns the
// concatenated response documents back into maps or typed errors.

use serde_json::Value;
use tracing::debug;

use crate::xml::XmlElement;
use crate::IloError;

pub const RIBCL_VERSION: &str = "2.0";

/// Commands for which a "not supported" reply is reported together with
/// the platform name, since support depends on the server model.
pub const BOOT_MODE_CMDS: [&str; 4] = [
    "GET_CURRENT_BOOT_MODE",
    "GET_PENDING_BOOT_MODE",
    "GET_SUPPORTED_BOOT_MODE",
    "SET_PENDING_BOOT_MODE",
];

/// A parsed response element: attributes and child elements by tag, plus
/// trimmed text under `"text"`.
pub type ResponseNode = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Read => "read",
            Mode::Write => "write",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RibclCommand {
    pub command_name: String,
    pub resource_tag: String,
    pub mode: Mode,
    pub extra_attributes: Vec<(String, String)>,
}

impl RibclCommand {
    pub fn new(command_name: &str, resource_tag: &str, mode: Mode) -> Self {
        RibclCommand {
            command_name: command_name.to_string(),
            resource_tag: resource_tag.to_string(),
            mode,
            extra_attributes: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.extra_attributes
            .push((name.to_string(), value.to_string()));
        self
    }

    /// RIBCL > LOGIN > resource MODE=.. > command. The extra attributes land
    /// on every element named like the command, wherever it sits.
    pub fn build(&self, login: &str, password: &str) -> XmlElement {
        let mut root = XmlElement::new("RIBCL").with_attribute("VERSION", RIBCL_VERSION);
        root.push_child(
            XmlElement::new("LOGIN")
                .with_attribute("USER_LOGIN", login)
                .with_attribute("PASSWORD", password),
        )
        .push_child(XmlElement::new(&self.resource_tag).with_attribute("MODE", self.mode.as_str()))
        .push_child(XmlElement::new(&self.command_name));

        let attrs = &self.extra_attributes;
        root.for_each_mut(&self.command_name, &mut |cmd| {
            for (name, value) in attrs {
                cmd.set_attribute(name, value);
            }
        });
        root
    }
}

/// The iLO expects every tag on its own CRLF-terminated line.
pub fn serialize_request(root: &XmlElement) -> Result<String, IloError> {
    let mut xml = root.to_fragments()?.join("\r\n");
    xml.push_str("\r\n");
    Ok(xml)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RibclResponse {
    /// The last document that carried data, converted from its RIBCL root.
    Node(ResponseNode),
    /// A human readable message from a successful RESPONSE,
    /// e.g. "Server being reset."
    Message(String),
    Empty,
}

impl RibclResponse {
    pub fn node(self) -> Option<ResponseNode> {
        match self {
            RibclResponse::Node(n) => Some(n),
            _ => None,
        }
    }
}

/// Outcome of checking one document.
enum Checked {
    Data(XmlElement),
    Message(String),
}

/// Parses a RIBCL response stream.
///
/// `product_name` is called only when a boot-mode command was rejected, to
/// name the platform in the error.
pub fn parse_response<F>(
    body: &str,
    host: &str,
    mut product_name: F,
) -> Result<RibclResponse, IloError>
where
    F: FnMut() -> Result<String, IloError>,
{
    let mut data = None;
    let mut message = None;
    for document in split_documents(body) {
        let root = XmlElement::parse(document)?;
        match validate_document(root, host, &mut product_name)? {
            Some(Checked::Data(e)) => data = Some(e),
            Some(Checked::Message(m)) => message = Some(m),
            None => {}
        }
    }
    Ok(match (data, message) {
        (Some(e), _) => RibclResponse::Node(element_to_node(&e)),
        (None, Some(m)) => RibclResponse::Message(m),
        (None, None) => RibclResponse::Empty,
    })
}

/// Slices the stream at every `<?xml`; the last slice runs to the end.
fn split_documents(body: &str) -> Vec<&str> {
    let starts: Vec<usize> = body.match_indices("<?xml").map(|(i, _)| i).collect();
    if starts.len() < 2 {
        return vec![body];
    }
    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| match starts.get(n + 1) {
            Some(&end) => &body[start..end],
            None => &body[start..],
        })
        .collect()
}

fn validate_document<F>(
    root: XmlElement,
    host: &str,
    product_name: &mut F,
) -> Result<Option<Checked>, IloError>
where
    F: FnMut() -> Result<String, IloError>,
{
    if root.tag != "RIBCL" {
        return Err(IloError::ClientInternal {
            message: format!("[iLO {host}] unexpected response root element {}", root.tag),
            status: -1,
        });
    }
    let mut has_payload = false;
    for child in &root.children {
        if child.tag != "RESPONSE" {
            has_payload = true;
            break;
        }
        let status = parse_status(child.attribute("STATUS"), host)?;
        let msg = child.attribute("MESSAGE").unwrap_or_default();
        if status == 0 {
            if msg != "No error" {
                return Ok(Some(Checked::Message(msg.to_string())));
            }
            continue;
        }

        if msg.contains("syntax error") || msg.contains("Feature not supported") {
            if let Some(cmd) = BOOT_MODE_CMDS.iter().find(|c| msg.contains(*c)) {
                let platform = product_name()?;
                let message = format!("[iLO {host}] {cmd} is not supported on {platform}");
                debug!("{message}");
                return Err(IloError::CommandNotSupported {
                    message,
                    status: Some(status),
                });
            }
            return Err(IloError::ClientInternal {
                message: format!("[iLO {host}] {msg}"),
                status,
            });
        }
        if IloError::is_login_failure(status, msg) {
            return Err(IloError::LoginFailed {
                message: format!("[iLO {host}] {msg}"),
                status,
            });
        }
        return Err(IloError::Ilo {
            message: format!("[iLO {host}] {msg}"),
            status: Some(status),
        });
    }
    if has_payload {
        return Ok(Some(Checked::Data(root)));
    }
    Ok(None)
}

fn parse_status(raw: Option<&str>, host: &str) -> Result<i32, IloError> {
    let raw = raw.ok_or_else(|| IloError::ClientInternal {
        message: format!("[iLO {host}] RESPONSE without STATUS"),
        status: -1,
    })?;
    let digits = raw
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    i32::from_str_radix(digits, 16).map_err(|_| IloError::ClientInternal {
        message: format!("[iLO {host}] invalid STATUS {raw}"),
        status: -1,
    })
}

/// Converts an element to a map. A tag seen once maps to its node; a
/// repeated tag maps to an array of nodes in document order.
pub fn element_to_node(element: &XmlElement) -> ResponseNode {
    let mut node = ResponseNode::new();
    if let Some(text) = element.text.as_deref().map(str::trim) {
        if !text.is_empty() {
            node.insert("text".to_string(), Value::String(text.to_string()));
        }
    }
    for (name, value) in &element.attributes {
        node.insert(name.clone(), Value::String(value.clone()));
    }

    let mut children: Vec<(&str, Vec<Value>)> = Vec::new();
    for child in &element.children {
        let converted = Value::Object(element_to_node(child));
        match children.iter_mut().find(|(tag, _)| *tag == child.tag) {
            Some((_, nodes)) => nodes.push(converted),
            None => children.push((&child.tag, vec![converted])),
        }
    }
    for (tag, mut nodes) in children {
        let value = if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            Value::Array(nodes)
        };
        node.insert(tag.to_string(), value);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "10.0.0.1";

    fn no_product() -> Result<String, IloError> {
        panic!("product name should not be queried")
    }

    fn envelope(status: &str, message: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?>\r\n<RIBCL VERSION=\"2.23\">\r\n<RESPONSE\r\n    STATUS=\"{status}\"\r\n    MESSAGE='{message}'\r\n     />\r\n</RIBCL>\r\n"
        )
    }

    #[test]
    fn test_build_tree() {
        let cmd = RibclCommand::new("GET_VM_STATUS", "RIB_INFO", Mode::Read)
            .attribute("DEVICE", "CDROM");
        let root = cmd.build("admin", "pw");
        assert_eq!(root.attribute("VERSION"), Some("2.0"));
        let login = &root.children[0];
        assert_eq!(login.tag, "LOGIN");
        assert_eq!(login.attribute("USER_LOGIN"), Some("admin"));
        assert_eq!(login.attribute("PASSWORD"), Some("pw"));
        let resource = &login.children[0];
        assert_eq!(resource.tag, "RIB_INFO");
        assert_eq!(resource.attribute("MODE"), Some("read"));
        assert_eq!(resource.children[0].tag, "GET_VM_STATUS");
        assert_eq!(resource.children[0].attribute("DEVICE"), Some("CDROM"));
    }

    #[test]
    fn test_serialize_wire_format() {
        let root = RibclCommand::new("GET_PRODUCT_NAME", "SERVER_INFO", Mode::Read).build("u", "p");
        let xml = serialize_request(&root).unwrap();
        assert_eq!(
            xml,
            "<RIBCL VERSION=\"2.0\">\r\n<LOGIN USER_LOGIN=\"u\" PASSWORD=\"p\">\r\n\
             <SERVER_INFO MODE=\"read\">\r\n<GET_PRODUCT_NAME/>\r\n</SERVER_INFO>\r\n\
             </LOGIN>\r\n</RIBCL>\r\n"
        );
    }

    #[test]
    fn test_serialized_request_reparses() {
        let mut root = RibclCommand::new("SET_VM_STATUS", "RIB_INFO", Mode::Write)
            .attribute("DEVICE", "FLOPPY")
            .build("admin", "p&ss\"word");
        root.find_mut("SET_VM_STATUS")
            .unwrap()
            .push_child(XmlElement::new("VM_BOOT_OPTION").with_attribute("VALUE", "BOOT_ONCE"));
        let xml = serialize_request(&root).unwrap();
        let reparsed = XmlElement::parse(&xml).unwrap();
        assert_eq!(reparsed, root);
    }

    #[test]
    fn test_no_error_is_empty() {
        let r = parse_response(&envelope("0x0000", "No error"), HOST, no_product).unwrap();
        assert_eq!(r, RibclResponse::Empty);
    }

    #[test]
    fn test_informational_message() {
        let r = parse_response(&envelope("0x0000", "Server being reset."), HOST, no_product)
            .unwrap();
        assert_eq!(r, RibclResponse::Message("Server being reset.".to_string()));
    }

    #[test]
    fn test_last_payload_document_wins() {
        let body = format!(
            "{}{}<?xml version=\"1.0\"?>\r\n<RIBCL VERSION=\"2.23\">\r\n\
             <RESPONSE STATUS=\"0x0000\" MESSAGE='No error'/>\r\n\
             <GET_HOST_POWER HOST_POWER=\"ON\"/>\r\n</RIBCL>\r\n",
            envelope("0x0000", "No error"),
            envelope("0x0000", "No error")
        );
        let node = parse_response(&body, HOST, no_product)
            .unwrap()
            .node()
            .unwrap();
        assert_eq!(node["GET_HOST_POWER"]["HOST_POWER"], "ON");
        assert_eq!(node["RESPONSE"]["STATUS"], "0x0000");
    }

    #[test]
    fn test_boot_mode_not_supported_names_platform() {
        let body = envelope(
            "0x003C",
            "Feature not supported: GET_PENDING_BOOT_MODE",
        );
        let err = parse_response(&body, HOST, || Ok("ProLiant BL460c G7".to_string()))
            .unwrap_err();
        match err {
            IloError::CommandNotSupported { message, status } => {
                assert!(message.contains("ProLiant BL460c G7"));
                assert!(message.contains("GET_PENDING_BOOT_MODE"));
                assert_eq!(status, Some(0x3c));
            }
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn test_syntax_error_is_internal() {
        let body = envelope("0x0001", "Syntax error: Line #0: syntax error near \">\"");
        let err = parse_response(&body, HOST, no_product).unwrap_err();
        assert!(matches!(err, IloError::ClientInternal { status: 1, .. }));
    }

    #[test]
    fn test_login_failure_by_status_and_message() {
        let err = parse_response(&envelope("0x005F", "whatever"), HOST, no_product).unwrap_err();
        assert!(matches!(err, IloError::LoginFailed { status: 0x5f, .. }));
        let err =
            parse_response(&envelope("0x0001", "Login failed"), HOST, no_product).unwrap_err();
        assert!(matches!(err, IloError::LoginFailed { .. }));
    }

    #[test]
    fn test_other_status_is_generic_error() {
        let err = parse_response(
            &envelope("0x0004", "Virtual Media is not connected."),
            HOST,
            no_product,
        )
        .unwrap_err();
        assert_eq!(err.status(), Some(4));
        assert_eq!(
            err.to_string(),
            "[iLO 10.0.0.1] Virtual Media is not connected."
        );
    }

    #[test]
    fn test_wrong_root_is_internal_error() {
        let err = parse_response("<?xml version=\"1.0\"?><HTML/>", HOST, no_product).unwrap_err();
        assert!(matches!(err, IloError::ClientInternal { status: -1, .. }));
    }

    #[test]
    fn test_single_child_is_not_wrapped() {
        let doc = XmlElement::parse(
            "<PERSISTENT_BOOT><DEVICE value=\"CDROM\"/><SLOT>x</SLOT><SLOT>y</SLOT></PERSISTENT_BOOT>",
        )
        .unwrap();
        let node = element_to_node(&doc);
        assert_eq!(node["DEVICE"], serde_json::json!({"value": "CDROM"}));
        assert_eq!(
            node["SLOT"],
            serde_json::json!([{"text": "x"}, {"text": "y"}])
        );
    }

    #[test]
    fn test_split_documents() {
        assert_eq!(split_documents("<A/>"), vec!["<A/>"]);
        assert_eq!(
            split_documents("<?xml a?><A/><?xml b?><B/>"),
            vec!["<?xml a?><A/>", "<?xml b?><B/>"]
        );
    }
}
