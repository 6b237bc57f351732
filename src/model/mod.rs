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
//! Typed views of the iLO REST resources the operations read. Fields are
//! optional wherever RIS and Redfish disagree or older firmware omits them.
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod manager;
pub mod power;
pub mod system;
pub mod update_service;
pub mod virtual_media;

pub use manager::Manager;
pub use power::Power;
pub use system::{Boot, ComputerSystem, ResetType};
pub use update_service::FlashStatus;
pub use virtual_media::VirtualMedia;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Off,
    On,
    PoweringOff,
    PoweringOn,
    Reset,
    Unknown,
}

impl PowerState {
    /// The RIBCL spelling. A host that is still powering on counts as ON.
    pub fn as_ribcl(&self) -> &'static str {
        match self {
            PowerState::On | PowerState::PoweringOn | PowerState::Reset => "ON",
            PowerState::Off | PowerState::PoweringOff => "OFF",
            PowerState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
