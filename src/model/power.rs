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

use crate::PowerReadings;

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase", default)]
pub struct PowerMetrics {
    pub average_consumed_watts: Option<f64>,
    pub interval_in_min: Option<i64>,
    pub max_consumed_watts: Option<f64>,
    pub min_consumed_watts: Option<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase", default)]
pub struct PowerControl {
    pub power_capacity_watts: Option<f64>,
    pub power_consumed_watts: Option<f64>,
    pub power_metrics: Option<PowerMetrics>,
}

/// `Chassis/1/Power`
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase", default)]
pub struct Power {
    pub power_control: Vec<PowerControl>,
    // RIS reports the present draw at the top level
    pub power_consumed_watts: Option<f64>,
}

impl Power {
    pub fn readings(&self) -> PowerReadings {
        let control = self.power_control.first();
        let metrics = control.and_then(|c| c.power_metrics.as_ref());
        PowerReadings {
            present: control
                .and_then(|c| c.power_consumed_watts)
                .or(self.power_consumed_watts),
            average: metrics.and_then(|m| m.average_consumed_watts),
            minimum: metrics.and_then(|m| m.min_consumed_watts),
            maximum: metrics.and_then(|m| m.max_consumed_watts),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_readings() {
        let power: Power = serde_json::from_value(json!({
            "PowerControl": [{
                "PowerConsumedWatts": 180,
                "PowerMetrics": {"AverageConsumedWatts": 175, "MaxConsumedWatts": 240,
                                 "MinConsumedWatts": 150, "IntervalInMin": 20}
            }]
        }))
        .unwrap();
        let r = power.readings();
        assert_eq!(r.present, Some(180.0));
        assert_eq!(r.average, Some(175.0));
        assert_eq!(r.minimum, Some(150.0));
        assert_eq!(r.maximum, Some(240.0));
        assert_eq!(Power::default().readings(), PowerReadings::default());
    }
}
