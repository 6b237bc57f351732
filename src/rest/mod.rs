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
//! The REST engine shared by the RIS (Gen9) and Redfish (Gen10+) dialects:
//! auth header composition, path normalization, a bounded redirect loop,
//! connectivity retries and JSON decoding with a gzip fallback.

use std::{
    io::Read,
    sync::{Arc, Mutex, PoisonError},
    thread::sleep,
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::read::GzDecoder;
use reqwest::{
    header::{
        HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONNECTION, CONTENT_TYPE,
        LOCATION,
    },
    Method, StatusCode,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};
use url::{form_urlencoded, Url};

use crate::network::{Endpoint, HttpRequest, HttpResponse, HttpTransport};
use crate::IloError;

pub mod registry;

pub use registry::{is_extended_error, MessageRegistries, RegistryMessage};

/// Requests issued for one logical call while following redirects.
pub const MAX_REDIRECTS: usize = 5;
/// Attempts of a single request that fails at the network level.
pub const MAX_RETRY: usize = 5;

const AUTH_TOKEN: HeaderName = HeaderName::from_static("x-auth-token");
const BIOS_AUTH_TOKEN: HeaderName = HeaderName::from_static("x-hprestfulapi-authtoken");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// iLO 4 RESTful Interface, `/rest/v1/`
    Ris,
    /// iLO 5 and later, `/redfish/v1/`
    Redfish,
}

impl Dialect {
    pub fn root(&self) -> &'static str {
        match self {
            Dialect::Ris => "/rest/v1/",
            Dialect::Redfish => "/redfish/v1/",
        }
    }

    /// Key of the vendor block inside `Oem`.
    pub fn oem_key(&self) -> &'static str {
        match self {
            Dialect::Ris => "Hp",
            Dialect::Redfish => "Hpe",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<RestBody>,
    pub bios_password: Option<String>,
}

impl RestRequest {
    pub fn new(method: Method, path: &str) -> Self {
        RestRequest {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
            bios_password: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn head(path: &str) -> Self {
        Self::new(Method::HEAD, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: &str, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(RestBody::Json(body))
    }

    pub fn patch(path: &str, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(RestBody::Json(body))
    }

    pub fn put(path: &str, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(RestBody::Json(body))
    }

    pub fn with_body(mut self, body: RestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Authorizes this call against a password protected BIOS.
    pub fn with_bios_password(mut self, password: &str) -> Self {
        self.bios_password = Some(password.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl RestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, Default)]
struct Session {
    key: Option<String>,
    location: Option<String>,
}

/// A REST client bound to a single iLO.
pub struct RestClient {
    http: Arc<dyn HttpTransport>,
    endpoint: Endpoint,
    dialect: Dialect,
    retry_delay: Duration,
    authorization_key: Option<String>,
    bios_password: Option<String>,
    session: Mutex<Session>,
    registries: MessageRegistries,
}

impl RestClient {
    pub fn new(
        http: Arc<dyn HttpTransport>,
        endpoint: Endpoint,
        dialect: Dialect,
        retry_delay: Duration,
    ) -> Self {
        RestClient {
            http,
            endpoint,
            dialect,
            retry_delay,
            authorization_key: None,
            bios_password: None,
            session: Mutex::new(Session::default()),
            registries: MessageRegistries::new(),
        }
    }

    /// Sent verbatim as `Authorization` instead of basic auth.
    pub fn with_authorization_key(mut self, key: impl Into<String>) -> Self {
        self.authorization_key = Some(key.into());
        self
    }

    /// BIOS password used for every request of this client.
    pub fn with_bios_password(mut self, password: impl Into<String>) -> Self {
        self.bios_password = Some(password.into());
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn host(&self) -> &str {
        &self.endpoint.host
    }

    pub fn user(&self) -> Option<&str> {
        self.endpoint.user.as_deref()
    }

    pub fn registries(&self) -> &MessageRegistries {
        &self.registries
    }

    pub fn session_key(&self) -> Option<String> {
        self.lock_session().key.clone()
    }

    /// Prefixes the dialect root unless the path already carries it.
    pub fn normalize_path(&self, path: &str) -> String {
        let root = self.dialect.root();
        let joined = if path.contains(root) {
            path.to_string()
        } else {
            format!("{root}{}", path.trim_start_matches('/'))
        };
        let mut out = String::with_capacity(joined.len());
        for c in joined.chars() {
            if c == '/' && out.ends_with('/') {
                continue;
            }
            out.push(c);
        }
        out
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            return path.to_string();
        }
        format!("{}{}", self.endpoint.base_url(), self.normalize_path(path))
    }

    fn headers(&self, bios_password: Option<&str>) -> Result<HeaderMap, IloError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CONNECTION, HeaderValue::from_static("Keep-Alive"));

        if let Some(password) = bios_password.or(self.bios_password.as_deref()) {
            let digest = Sha256::digest(password.as_bytes());
            let hex: String = digest.iter().map(|b| format!("{b:02X}")).collect();
            headers.insert(BIOS_AUTH_TOKEN, header_value(&hex)?);
        }

        if let Some(key) = self.session_key() {
            headers.insert(AUTH_TOKEN, header_value(&key)?);
        } else if let Some(key) = &self.authorization_key {
            headers.insert(AUTHORIZATION, header_value(key)?);
        } else if let (Some(user), Some(password)) =
            (&self.endpoint.user, &self.endpoint.password)
        {
            let credentials = BASE64.encode(format!("{user}:{password}"));
            headers.insert(AUTHORIZATION, header_value(&format!("Basic {credentials}"))?);
        }
        Ok(headers)
    }

    fn encode(&self, req: &RestRequest) -> Result<HttpRequest, IloError> {
        let mut url = self.url_for(&req.path);
        let mut headers = self.headers(req.bios_password.as_deref())?;
        if !req.query.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&req.query)
                .finish();
            url = format!("{url}?{query}");
        }
        let body = match &req.body {
            None => None,
            Some(RestBody::Json(value)) => {
                let bytes = serde_json::to_vec(value).map_err(|e| IloError::JsonSerializeError {
                    url: url.clone(),
                    object_debug: format!("{value:?}"),
                    source: e,
                })?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Some(bytes)
            }
            Some(RestBody::Form(pairs)) => {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
                Some(encoded.into_bytes())
            }
        };
        Ok(HttpRequest {
            method: req.method.clone(),
            url,
            headers,
            body,
        })
    }

    /// Issues the request, following redirects, and decodes the body. Any
    /// final status is returned as is.
    pub fn request_unchecked(&self, req: &RestRequest) -> Result<RestResponse, IloError> {
        let mut http_req = self.encode(req)?;
        let original_url = http_req.url.clone();
        debug!("TX {} {}", http_req.method, http_req.url);

        for attempt in 1..=MAX_REDIRECTS {
            let response = self.send_with_retry(&http_req)?;
            let location = response
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            match location {
                Some(location) if is_redirect(response.status) => {
                    let next = resolve_location(&http_req.url, &location)?;
                    debug!(
                        "{} redirected to {next} ({attempt}/{MAX_REDIRECTS})",
                        http_req.url
                    );
                    if !same_origin(&http_req.url, &next) {
                        debug!("Dropping credentials for cross-origin redirect to {next}");
                        for name in [AUTHORIZATION, AUTH_TOKEN, BIOS_AUTH_TOKEN] {
                            http_req.headers.remove(name);
                        }
                    }
                    http_req.url = next;
                }
                _ => {
                    let body = decode_body(&http_req.url, &response.body)?;
                    trace!(
                        "RX {} {} {} {}",
                        http_req.method,
                        http_req.url,
                        response.status,
                        body_shape(&body)
                    );
                    return Ok(RestResponse {
                        status: response.status,
                        headers: response.headers,
                        body,
                    });
                }
            }
        }
        Err(IloError::Connection {
            url: original_url,
            reason: format!("still redirected after {MAX_REDIRECTS} attempts"),
        })
    }

    /// Like `request_unchecked` but a non-2xx status becomes
    /// `IloError::HttpStatus` carrying the rendered extended error.
    pub fn request(&self, req: &RestRequest) -> Result<RestResponse, IloError> {
        let response = self.request_unchecked(req)?;
        if response.status.is_success() {
            return Ok(response);
        }
        let messages = self.render_extended_error(&response.body);
        warn!(
            "{} {} failed with {}: {messages:?}",
            req.method, req.path, response.status
        );
        Err(IloError::HttpStatus {
            url: self.url_for(&req.path),
            status_code: response.status,
            messages,
        })
    }

    pub fn get_json(&self, path: &str) -> Result<Value, IloError> {
        Ok(self.request(&RestRequest::get(path))?.body)
    }

    fn send_with_retry(&self, req: &HttpRequest) -> Result<HttpResponse, IloError> {
        let mut attempt = 1;
        loop {
            match self.http.execute(req.clone()) {
                Err(IloError::Connection { url, reason }) if attempt < MAX_RETRY => {
                    debug!("{url} unreachable ({reason}), attempt {attempt}/{MAX_RETRY}");
                    attempt += 1;
                    sleep(self.retry_delay);
                }
                other => return other,
            }
        }
    }

    /// Renders an extended error body, fetching unknown registries from
    /// the iLO on the way.
    pub fn render_extended_error(&self, body: &Value) -> Vec<String> {
        if !is_extended_error(body) {
            return Vec::new();
        }
        self.registries
            .render_with(body, |name| self.load_registry(name))
    }

    fn load_registry(&self, name: &str) -> Option<Value> {
        let collection = self
            .request_unchecked(&RestRequest::get("Registries"))
            .ok()
            .filter(|r| r.status.is_success())?;
        for member in collection_members(&collection.body) {
            let Some(entry) = self
                .request_unchecked(&RestRequest::get(&member))
                .ok()
                .filter(|r| r.status.is_success())
            else {
                continue;
            };
            let id = entry
                .body
                .get("Registry")
                .or_else(|| entry.body.get("Id"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if id.split('.').next() != Some(name) {
                continue;
            }
            let location = entry.body.pointer("/Location/0/Uri").and_then(|uri| {
                uri.as_str()
                    .or_else(|| uri.get("extref").and_then(Value::as_str))
            })?;
            debug!("Loading message registry {name} from {location}");
            return self
                .request_unchecked(&RestRequest::get(location))
                .ok()
                .filter(|r| r.status.is_success())
                .map(|r| r.body);
        }
        None
    }

    /// Opens a session; later requests authenticate with its token.
    pub fn login_session(&self) -> Result<(), IloError> {
        let (Some(user), Some(password)) = (&self.endpoint.user, &self.endpoint.password) else {
            return Err(IloError::invalid_input("a session needs a user and a password"));
        };
        let response = self.request(&RestRequest::post(
            "SessionService/Sessions",
            json!({"UserName": user, "Password": password}),
        ))?;
        let key = response.header("x-auth-token").ok_or_else(|| IloError::MissingKey {
            key: "X-Auth-Token".to_string(),
            url: self.url_for("SessionService/Sessions"),
        })?;
        let mut session = self.lock_session();
        session.key = Some(key.to_string());
        session.location = response.header("location").map(str::to_string);
        debug!("Opened session on {}", self.endpoint.host);
        Ok(())
    }

    pub fn logout_session(&self) -> Result<(), IloError> {
        let location = self.lock_session().location.clone();
        if let Some(location) = location {
            self.request(&RestRequest::delete(&location))?;
        }
        *self.lock_session() = Session::default();
        Ok(())
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `@odata.id`s of a Redfish collection or `href`s of a RIS one.
pub fn collection_members(collection: &Value) -> Vec<String> {
    if let Some(members) = collection.get("Members").and_then(Value::as_array) {
        return members
            .iter()
            .filter_map(|m| m.get("@odata.id").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
    }
    if let Some(members) = collection.pointer("/links/Member").and_then(Value::as_array) {
        return members
            .iter()
            .filter_map(|m| m.get("href").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
    }
    if let Some(items) = collection.get("Items").and_then(Value::as_array) {
        return items
            .iter()
            .filter_map(|m| {
                m.pointer("/links/self/href")
                    .or_else(|| m.get("@odata.id"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
            .collect();
    }
    Vec::new()
}

fn header_value(s: &str) -> Result<HeaderValue, IloError> {
    HeaderValue::from_str(s).map_err(|_| {
        IloError::invalid_input("credentials contain characters not allowed in a header")
    })
}

fn is_redirect(status: StatusCode) -> bool {
    status.is_redirection() && status != StatusCode::NOT_MODIFIED
}

fn resolve_location(current: &str, location: &str) -> Result<String, IloError> {
    let base = Url::parse(current).map_err(|e| IloError::Connection {
        url: current.to_string(),
        reason: e.to_string(),
    })?;
    base.join(location)
        .map(String::from)
        .map_err(|e| IloError::Connection {
            url: current.to_string(),
            reason: format!("bad redirect location '{location}': {e}"),
        })
}

/// Scheme, host and port all match.
fn same_origin(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}

/// JSON, else gzip-compressed JSON. An empty body decodes to `Null`.
pub(crate) fn decode_body(url: &str, body: &[u8]) -> Result<Value, IloError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    let plain_err = match serde_json::from_slice(body) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };
    let mut inflated = Vec::new();
    let source = match GzDecoder::new(body).read_to_end(&mut inflated) {
        Ok(_) => match serde_json::from_slice(&inflated) {
            Ok(v) => {
                trace!("{url} body was gzip compressed");
                return Ok(v);
            }
            Err(e) => e,
        },
        Err(_) => plain_err,
    };
    Err(IloError::JsonDeserializeError {
        url: url.to_string(),
        body: String::from_utf8_lossy(body).into_owned(),
        source,
    })
}

fn body_shape(body: &Value) -> String {
    match body {
        Value::Null => "empty".to_string(),
        Value::Object(m) => format!("object with {} keys", m.len()),
        Value::Array(a) => format!("array of {}", a.len()),
        _ => "scalar".to_string(),
    }
}
