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
use reqwest::StatusCode;

/// RIBCL status codes the controller uses to reject credentials.
pub const LOGIN_FAIL_STATUSES: [i32; 2] = [0x005f, 0x000a];

/// RIBCL messages the controller uses to reject credentials.
pub const LOGIN_FAIL_MESSAGES: [&str; 3] = [
    "User login name was not found",
    "Login failed",
    "Login credentials rejected",
];

#[derive(thiserror::Error, Debug)]
pub enum IloError {
    #[error("Connection error talking to iLO at {url}. {reason}")]
    Connection { url: String, reason: String },

    #[error("{message}")]
    LoginFailed { message: String, status: i32 },

    #[error("{message}")]
    CommandNotSupported { message: String, status: Option<i32> },

    #[error("{0}")]
    CommandNotSupportedInBios(String),

    #[error("{message}")]
    ClientInternal { message: String, status: i32 },

    #[error("{message}")]
    Ilo { message: String, status: Option<i32> },

    #[error("HTTP {status_code} at {url}. {}", messages.join("; "))]
    HttpStatus {
        url: String,
        status_code: StatusCode,
        messages: Vec<String>,
    },

    #[error("Could not deserialize response from {url}. Body: {body}. {source}")]
    JsonDeserializeError {
        url: String,
        body: String,
        source: serde_json::Error,
    },

    #[error("Could not serialize request body for {url}. Obj: {object_debug}. {source}")]
    JsonSerializeError {
        url: String,
        object_debug: String,
        source: serde_json::Error,
    },

    #[error("Could not parse RIBCL XML: {0}")]
    XmlParse(String),

    #[error("Missing key {key} in response from {url}")]
    MissingKey { key: String, url: String },

    #[error("Key {key} should be {expected_type} in response from {url}")]
    InvalidKeyType {
        key: String,
        expected_type: String,
        url: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Firmware image extraction failed: {0}")]
    ImageExtraction(String),

    #[error("Image reference validation failed: {0}")]
    ImageRefValidation(String),
}

impl IloError {
    /// The status code the controller reported, for errors that carry one.
    pub fn status(&self) -> Option<i32> {
        match self {
            IloError::LoginFailed { status, .. } | IloError::ClientInternal { status, .. } => {
                Some(*status)
            }
            IloError::CommandNotSupported { status, .. } | IloError::Ilo { status, .. } => *status,
            IloError::HttpStatus { status_code, .. } => Some(i32::from(status_code.as_u16())),
            _ => None,
        }
    }

    pub(crate) fn ilo(message: impl Into<String>) -> Self {
        IloError::Ilo {
            message: message.into(),
            status: None,
        }
    }

    pub(crate) fn not_supported(message: impl Into<String>) -> Self {
        IloError::CommandNotSupported {
            message: message.into(),
            status: None,
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        IloError::InvalidInput(message.into())
    }

    /// Whether the controller rejected the credentials, by status code or message.
    pub fn is_login_failure(status: i32, message: &str) -> bool {
        LOGIN_FAIL_STATUSES.contains(&status) || LOGIN_FAIL_MESSAGES.contains(&message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let e = IloError::LoginFailed {
            message: "Login failed".to_string(),
            status: 0x005f,
        };
        assert_eq!(e.status(), Some(0x5f));
        assert_eq!(IloError::invalid_input("bad").status(), None);
        assert_eq!(IloError::ilo("x").status(), None);
    }

    #[test]
    fn test_login_failure_detection() {
        assert!(IloError::is_login_failure(0x000a, "anything"));
        assert!(IloError::is_login_failure(0x0001, "Login credentials rejected"));
        assert!(!IloError::is_login_failure(0x0001, "Login credentials rejected."));
        assert!(!IloError::is_login_failure(0x0004, "Invalid parameter"));
    }

    #[test]
    fn test_http_status_display_joins_messages() {
        let e = IloError::HttpStatus {
            url: "https://ilo/redfish/v1/Systems/1".to_string(),
            status_code: StatusCode::BAD_REQUEST,
            messages: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            e.to_string(),
            "HTTP 400 Bad Request at https://ilo/redfish/v1/Systems/1. a; b"
        );
    }
}
