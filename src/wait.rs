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

// wait.rs
// Bounded polling used around whole operations: waiting for the iLO to come
// back after a reset and for a firmware flash to finish.

use std::{fmt, str::FromStr, thread::sleep, time::Duration};

use tracing::debug;

use crate::{IloError, IloOperations};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub retries: u32,
    pub delay_between_retries: Duration,
    pub delay_before_attempts: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy {
            retries: 10,
            delay_between_retries: Duration::from_secs(5),
            delay_before_attempts: Duration::from_secs(10),
        }
    }
}

impl WaitPolicy {
    /// Default policy for firmware flashing, which polls less often.
    pub fn firmware_flash() -> Self {
        WaitPolicy {
            delay_between_retries: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// No sleeping at all. Useful against simulators.
    pub fn immediate(retries: u32) -> Self {
        WaitPolicy {
            retries,
            delay_between_retries: Duration::ZERO,
            delay_before_attempts: Duration::ZERO,
        }
    }
}

/// What to do when the retries run out.
#[derive(Debug)]
pub enum OnExhausted {
    Fail(IloError),
    Silent,
}

/// Sleeps `delay_before_attempts`, then calls `has_completed` up to
/// `retries` times until it returns true. Errors from the predicate count
/// as "not yet".
pub fn wait_for_operation_to_complete<F>(
    mut has_completed: F,
    policy: &WaitPolicy,
    on_exhausted: OnExhausted,
) -> Result<(), IloError>
where
    F: FnMut() -> Result<bool, IloError>,
{
    sleep(policy.delay_before_attempts);
    for attempt in 1..=policy.retries {
        match has_completed() {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => debug!("Attempt {attempt} of {}: {e}", policy.retries),
        }
        if attempt < policy.retries {
            sleep(policy.delay_between_retries);
        }
    }
    match on_exhausted {
        OnExhausted::Fail(e) => Err(e),
        OnExhausted::Silent => Ok(()),
    }
}

/// Blocks until the iLO answers a product name query again.
pub fn wait_for_ilo_after_reset<O>(ops: &O, policy: &WaitPolicy) -> Result<(), IloError>
where
    O: IloOperations + ?Sized,
{
    wait_for_operation_to_complete(
        || ops.get_product_name().map(|_| true),
        policy,
        OnExhausted::Fail(IloError::Connection {
            url: String::new(),
            reason: "iLO is not up after reset.".to_string(),
        }),
    )
}

/// Blocks until the firmware flash reaches a terminal state, then until the
/// iLO is reachable again.
pub fn wait_for_firmware_update_to_complete<O>(
    ops: &O,
    flash_policy: &WaitPolicy,
    reset_policy: &WaitPolicy,
) -> Result<(), IloError>
where
    O: IloOperations + ?Sized,
{
    let mut tracker = FirmwareFlashTracker::default();
    wait_for_operation_to_complete(
        || {
            let progress = ops.get_firmware_update_progress()?;
            debug!(
                "Firmware update state {} ({}%)",
                progress.state,
                progress.percent.unwrap_or_default()
            );
            Ok(tracker.observe(progress.state))
        },
        flash_policy,
        OnExhausted::Fail(IloError::ilo("iLO firmware update has failed.")),
    )?;
    wait_for_ilo_after_reset(ops, reset_policy)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareUpdateState {
    Idle,
    Updating,
    Verifying,
    Uploading,
    Writing,
    Complete,
    Error,
    Unknown,
}

impl FromStr for FirmwareUpdateState {
    type Err = std::convert::Infallible;

    /// Anything the iLO reports that we don't know is `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Idle" => FirmwareUpdateState::Idle,
            "Updating" => FirmwareUpdateState::Updating,
            "Verifying" => FirmwareUpdateState::Verifying,
            "Uploading" => FirmwareUpdateState::Uploading,
            "Writing" => FirmwareUpdateState::Writing,
            "Complete" => FirmwareUpdateState::Complete,
            "Error" => FirmwareUpdateState::Error,
            _ => FirmwareUpdateState::Unknown,
        })
    }
}

impl fmt::Display for FirmwareUpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareUpdateProgress {
    pub state: FirmwareUpdateState,
    pub percent: Option<i64>,
}

/// Remembers the previous and current flash state across polls.
#[derive(Debug, Clone, Copy)]
pub struct FirmwareFlashTracker {
    previous: FirmwareUpdateState,
    current: FirmwareUpdateState,
}

impl Default for FirmwareFlashTracker {
    fn default() -> Self {
        FirmwareFlashTracker {
            previous: FirmwareUpdateState::Idle,
            current: FirmwareUpdateState::Idle,
        }
    }
}

impl FirmwareFlashTracker {
    /// Records a new observation and reports whether the flash is over.
    pub fn observe(&mut self, state: FirmwareUpdateState) -> bool {
        use FirmwareUpdateState::*;
        self.previous = self.current;
        self.current = state;
        matches!(
            (self.previous, self.current),
            (
                Updating | Verifying | Uploading | Writing,
                Complete | Error | Unknown | Idle
            ) | (Idle, Complete | Error)
        )
    }
}
