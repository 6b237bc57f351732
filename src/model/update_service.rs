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
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// iLO firmware flash progress. RIS puts this on `Managers/1/UpdateService`,
/// Redfish under `Oem.Hpe` of `UpdateService`.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase", default)]
pub struct FlashStatus {
    pub state: Option<String>,
    pub progress_percent: Option<i64>,
    pub flash_progress_percent: Option<i64>,
}

impl FlashStatus {
    pub fn from_update_service(body: &Value, oem_key: &str) -> Result<Self, serde_json::Error> {
        let source = body
            .get("Oem")
            .and_then(|o| o.get(oem_key))
            .filter(|o| o.get("State").is_some())
            .unwrap_or(body);
        serde_json::from_value(source.clone())
    }

    pub fn percent(&self) -> Option<i64> {
        self.flash_progress_percent.or(self.progress_percent)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_flash_status_locations() {
        let ris = FlashStatus::from_update_service(
            &json!({"State": "Updating", "ProgressPercent": 40}),
            "Hp",
        )
        .unwrap();
        assert_eq!(ris.state.as_deref(), Some("Updating"));
        assert_eq!(ris.percent(), Some(40));

        let redfish = FlashStatus::from_update_service(
            &json!({"Oem": {"Hpe": {"State": "Complete", "FlashProgressPercent": 100}}}),
            "Hpe",
        )
        .unwrap();
        assert_eq!(redfish.state.as_deref(), Some("Complete"));
        assert_eq!(redfish.percent(), Some(100));

        assert!(FlashStatus::from_update_service(&json!({}), "Hpe")
            .unwrap()
            .state
            .is_none());
        assert!(FlashStatus::from_update_service(
            &json!({"Oem": {"Hpe": {"State": "Writing", "FlashProgressPercent": 42.5}}}),
            "Hpe"
        )
        .is_err());
    }
}
