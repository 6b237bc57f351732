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
use std::sync::{Arc, OnceLock};

use regex::Regex;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_LENGTH},
    Method,
};
use tracing::debug;

use super::codec::{self, RibclCommand, RibclResponse};
use crate::network::{Endpoint, HttpRequest, HttpTransport};
use crate::xml::XmlElement;
use crate::IloError;

/// Posts RIBCL documents to `https://host[:port]/ribcl`. One request per
/// call, no retries.
pub struct RibclTransport {
    endpoint: Endpoint,
    http: Arc<dyn HttpTransport>,
}

impl RibclTransport {
    pub fn new(http: Arc<dyn HttpTransport>, endpoint: Endpoint) -> Self {
        Self { endpoint, http }
    }

    pub fn host(&self) -> &str {
        &self.endpoint.host
    }

    pub fn login(&self) -> &str {
        self.endpoint.user.as_deref().unwrap_or_default()
    }

    pub fn url(&self) -> String {
        format!("{}/ribcl", self.endpoint.base_url())
    }

    /// Builds the request tree for a command with this endpoint's credentials.
    pub fn build(&self, command: &RibclCommand) -> XmlElement {
        command.build(
            self.login(),
            self.endpoint.password.as_deref().unwrap_or_default(),
        )
    }

    /// Sends a request tree and returns the raw response text.
    pub fn request(&self, root: &XmlElement) -> Result<String, IloError> {
        let url = self.url();
        let xml = codec::serialize_request(root)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(xml.len()));
        debug!(
            "[iLO {}] POST {url} with request data: {}",
            self.host(),
            mask_password(&xml)
        );

        let response = self.http.execute(HttpRequest {
            method: Method::POST,
            url: url.clone(),
            headers,
            body: Some(xml.into_bytes()),
        })?;
        if !response.status.is_success() {
            return Err(IloError::Connection {
                url,
                reason: format!("HTTP {}", response.status),
            });
        }
        let text = String::from_utf8_lossy(&response.body).into_owned();
        debug!("[iLO {}] RX {} {}", self.host(), response.status, text);
        Ok(text)
    }

    /// Sends a request tree and parses the reply. `product_name` names the
    /// platform when a boot-mode command is rejected.
    pub fn execute<F>(&self, root: &XmlElement, product_name: F) -> Result<RibclResponse, IloError>
    where
        F: FnMut() -> Result<String, IloError>,
    {
        let text = self.request(root)?;
        codec::parse_response(&text, self.host(), product_name)
    }
}

fn mask_password(xml: &str) -> String {
    static PASSWORD: OnceLock<Regex> = OnceLock::new();
    let re = PASSWORD.get_or_init(|| {
        Regex::new(r#"PASSWORD="[^"]*""#).expect("password mask pattern is valid")
    });
    re.replace_all(xml, r#"PASSWORD="********""#).into_owned()
}
