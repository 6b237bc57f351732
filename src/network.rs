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
use std::{path::PathBuf, sync::Arc, time::Duration};

use reqwest::{
    blocking::Client as HttpClient, blocking::ClientBuilder as HttpClientBuilder,
    header::HeaderMap, redirect, Certificate, Method, StatusCode,
};
use tracing::{debug, info};

use crate::{firmware::ImageValidator, hpe, ribcl, rest::Dialect, IloError, IloOperations};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// One HTTP exchange as the engines see it, independent of the HTTP stack.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Sends a single request and returns the raw response, without following
/// redirects. Network failures must be reported as `IloError::Connection`.
pub trait HttpTransport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, IloError>;
}

/// The production transport, a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: HttpClient,
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, IloError> {
        let url = request.url.clone();
        let mut req_b = self
            .http_client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(b) = request.body {
            req_b = req_b.body(b);
        }
        let response = req_b.send().map_err(|e| IloError::Connection {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .map_err(|e| IloError::Connection {
                url,
                reason: e.to_string(),
            })?
            .to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[derive(Debug)]
pub struct IloClientPoolBuilder {
    timeout: Duration,
    accept_invalid_certs: bool,
    ca_bundle: Option<PathBuf>,
    retry_delay: Duration,
}

impl IloClientPoolBuilder {
    /// Prevents the client from accepting self signed certificates
    /// and other invalid certificates.
    ///
    /// By default self signed certificates will be accepted, since iLOs
    /// ship with those.
    pub fn reject_invalid_certs(mut self) -> IloClientPoolBuilder {
        self.accept_invalid_certs = false;
        self
    }

    /// Trust the PEM certificates in this file and verify the iLO against them.
    pub fn ca_bundle(mut self, path: impl Into<PathBuf>) -> IloClientPoolBuilder {
        self.ca_bundle = Some(path.into());
        self.accept_invalid_certs = false;
        self
    }

    /// Overwrites the connect/read timeout that will be applied to every request
    pub fn timeout(mut self, timeout: Duration) -> IloClientPoolBuilder {
        self.timeout = timeout;
        self
    }

    /// Sleep between REST attempts that failed at the network level.
    pub fn retry_delay(mut self, delay: Duration) -> IloClientPoolBuilder {
        self.retry_delay = delay;
        self
    }

    pub fn build(&self) -> Result<IloClientPool, IloError> {
        let mut builder = HttpClientBuilder::new()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .timeout(self.timeout)
            .redirect(redirect::Policy::none());
        if let Some(path) = &self.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| {
                IloError::invalid_input(format!("cannot read CA bundle {}: {e}", path.display()))
            })?;
            let certs = Certificate::from_pem_bundle(&pem).map_err(|e| {
                IloError::invalid_input(format!("invalid CA bundle {}: {e}", path.display()))
            })?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
        let http_client = builder
            .build()
            .map_err(|e| IloError::ilo(format!("failed to build HTTP client: {e}")))?;
        Ok(IloClientPool {
            http: Arc::new(ReqwestTransport { http_client }),
            retry_delay: self.retry_delay,
        })
    }
}

/// The endpoint that the iLO client connects to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Endpoint {
    /// Hostname or IP address of the iLO
    pub host: String,
    /// iLO port. If absent the default HTTPS port 443 will be used
    pub port: Option<u16>,
    /// iLO username
    pub user: Option<String>,
    /// iLO password
    pub password: Option<String>,
}

impl Endpoint {
    pub(crate) fn base_url(&self) -> String {
        match self.port {
            Some(p) => format!("https://{}:{}", self.host, p),
            None => format!("https://{}", self.host),
        }
    }
}

#[derive(Clone)]
pub struct IloClientPool {
    http: Arc<dyn HttpTransport>,
    retry_delay: Duration,
}

impl IloClientPool {
    /// Returns Builder for configuring an iLO HTTP connection pool
    pub fn builder() -> IloClientPoolBuilder {
        IloClientPoolBuilder {
            timeout: DEFAULT_TIMEOUT,
            // iLOs nearly always have a self-signed cert
            accept_invalid_certs: true,
            ca_bundle: None,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// A pool over a caller-provided transport, e.g. a proxy or a recording.
    pub fn with_transport(http: Arc<dyn HttpTransport>, retry_delay: Duration) -> Self {
        IloClientPool { http, retry_delay }
    }

    /// Creates an iLO client for a certain endpoint
    ///
    /// Creating the client will immediately send a RIBCL GET_PRODUCT_NAME,
    /// which determines the server generation: Gen8 and older speak RIBCL,
    /// Gen9 speaks RIS and Gen10 onwards speaks Redfish.
    pub fn create_client(&self, endpoint: Endpoint) -> Result<Box<dyn IloOperations>, IloError> {
        let probe = self.create_ribcl_client(endpoint.clone());
        let product_name = probe.get_product_name()?;
        let generation = crate::server_generation(&product_name);
        debug!("iLO {} reports '{product_name}'", endpoint.host);
        match generation {
            Some(g) if g >= 10 => {
                info!("Using Redfish for {} ({product_name})", endpoint.host);
                Ok(Box::new(self.create_rest_client(endpoint, Dialect::Redfish)))
            }
            Some(9) => {
                info!("Using RIS for {} ({product_name})", endpoint.host);
                Ok(Box::new(self.create_rest_client(endpoint, Dialect::Ris)))
            }
            _ => Ok(Box::new(probe)),
        }
    }

    pub fn create_ribcl_client(&self, endpoint: Endpoint) -> ribcl::Bmc {
        ribcl::Bmc::new(ribcl::RibclTransport::new(self.http.clone(), endpoint))
    }

    /// Checks firmware image references over the pool's HTTP stack.
    pub fn image_validator(&self) -> ImageValidator {
        ImageValidator::new(self.http.clone())
    }

    pub fn create_rest_client(&self, endpoint: Endpoint, dialect: Dialect) -> hpe::Bmc {
        hpe::Bmc::new(crate::rest::RestClient::new(
            self.http.clone(),
            endpoint,
            dialect,
            self.retry_delay,
        ))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use reqwest::header::{HeaderName, HeaderValue};

    use super::*;

    /// Replays canned responses in order and records every request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpResponse, IloError>>>,
        pub requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn reply(&self, status: u16, headers: &[(&str, &str)], body: &[u8]) {
            let mut map = HeaderMap::new();
            for (k, v) in headers {
                map.insert(
                    HeaderName::from_bytes(k.as_bytes()).unwrap(),
                    HeaderValue::from_str(v).unwrap(),
                );
            }
            self.replies.lock().unwrap().push_back(Ok(HttpResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers: map,
                body: body.to_vec(),
            }));
        }

        pub fn fail(&self, reason: &str) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(IloError::Connection {
                    url: "scripted".to_string(),
                    reason: reason.to_string(),
                }));
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn request(&self, i: usize) -> HttpRequest {
            self.requests.lock().unwrap()[i].clone()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, IloError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted reply for {}", request.url))
        }
    }

    pub fn endpoint() -> Endpoint {
        Endpoint {
            host: "ilo.example".to_string(),
            port: None,
            user: Some("admin".to_string()),
            password: Some("secret".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{endpoint, ScriptedTransport};
    use super::*;

    const PRODUCT: &str = r#"<?xml version="1.0"?>
<RIBCL VERSION="2.23">
<RESPONSE STATUS="0x0000" MESSAGE='No error'/>
<GET_PRODUCT_NAME>
    <PRODUCT_NAME VALUE ="ProLiant DL380 Gen9"/>
</GET_PRODUCT_NAME>
</RIBCL>
"#;

    #[test]
    fn test_base_url() {
        let mut e = endpoint();
        assert_eq!(e.base_url(), "https://ilo.example");
        e.port = Some(8443);
        assert_eq!(e.base_url(), "https://ilo.example:8443");
    }

    #[test]
    fn test_create_client_picks_ris_for_gen9() {
        let http = ScriptedTransport::new();
        http.reply(200, &[], PRODUCT.as_bytes());
        http.reply(
            200,
            &[],
            br#"{"Model": "ProLiant DL380 Gen9", "PowerState": "Off"}"#,
        );
        let pool = IloClientPool::with_transport(http.clone(), Duration::ZERO);
        let client = pool.create_client(endpoint()).unwrap();
        assert_eq!(client.get_host_power_status().unwrap(), "OFF");
        assert_eq!(http.request(0).url, "https://ilo.example/ribcl");
        assert_eq!(http.request(1).url, "https://ilo.example/rest/v1/Systems/1");
    }
}
