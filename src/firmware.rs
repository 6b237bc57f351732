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
//! Firmware image handling around `update_firmware`: unpacking the files
//! HPE ships (`.scexe` self-extractors and `.rpm` packages) down to the raw
//! image, and checking an image reference before the iLO is pointed at it.
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};

use reqwest::{header::HeaderMap, Method};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::{HttpRequest, HttpTransport, IloError};

/// Extensions of files an iLO can flash directly.
pub const FIRMWARE_EXTENSIONS: [&str; 4] = ["bin", "hex", "vme", "flash"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareExtractor {
    /// Self extracting shell archive, unpacked with `--unpack=<dir>`
    Scexe,
    /// RPM package, unpacked with `rpm2cpio | cpio`
    Rpm,
    /// Already a flashable image
    Raw,
}

impl FirmwareExtractor {
    pub fn for_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("scexe") => FirmwareExtractor::Scexe,
            Some("rpm") => FirmwareExtractor::Rpm,
            _ => FirmwareExtractor::Raw,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FirmwareImage {
    path: PathBuf,
    extractor: FirmwareExtractor,
    work_root: Option<PathBuf>,
}

impl FirmwareImage {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, IloError> {
        let path = path.into();
        if !path.is_file() {
            return Err(IloError::ImageExtraction(format!(
                "{} is not a file",
                path.display()
            )));
        }
        let extractor = FirmwareExtractor::for_path(&path);
        Ok(FirmwareImage {
            path,
            extractor,
            work_root: None,
        })
    }

    /// Unpack below `root` instead of the system temp directory.
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extractor(&self) -> FirmwareExtractor {
        self.extractor
    }

    /// Returns the flashable file and whether it had to be unpacked. An
    /// unpacked file lives in a fresh directory the caller owns.
    pub fn extract(&self) -> Result<(PathBuf, bool), IloError> {
        let script = match self.extractor {
            FirmwareExtractor::Raw => return Ok((self.path.clone(), false)),
            FirmwareExtractor::Scexe => "sh \"$0\" --unpack=.",
            FirmwareExtractor::Rpm => "rpm2cpio \"$0\" | cpio -idm",
        };
        let source = fs::canonicalize(&self.path).map_err(|e| {
            IloError::ImageExtraction(format!("{}: {e}", self.path.display()))
        })?;
        let mut builder = tempfile::Builder::new();
        builder.prefix("ilo-firmware-");
        let work_dir = match &self.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| IloError::ImageExtraction(format!("cannot create work dir: {e}")))?;
        let dir = work_dir.path();
        debug!("Unpacking {} into {}", source.display(), dir.display());

        let output = Command::new("sh")
            .arg("-c")
            .arg(script)
            .arg(&source)
            .current_dir(dir)
            .output()
            .map_err(|e| IloError::ImageExtraction(format!("failed to run extractor: {e}")))?;
        if !output.status.success() {
            return Err(IloError::ImageExtraction(format!(
                "unpacking {} failed: {}",
                self.path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let image = find_firmware_file(dir)?.ok_or_else(|| {
            IloError::ImageExtraction(format!(
                "no firmware file ({}) inside {}",
                FIRMWARE_EXTENSIONS.join(", "),
                self.path.display()
            ))
        })?;
        // the caller owns the directory from here on
        let _ = work_dir.keep();
        info!("Extracted {} from {}", image.display(), self.path.display());
        Ok((image, true))
    }
}

/// First file below `dir` with a firmware extension, in path order.
fn find_firmware_file(dir: &Path) -> Result<Option<PathBuf>, IloError> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| IloError::ImageExtraction(format!("{}: {e}", dir.display())))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in &entries {
        let is_firmware = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| FIRMWARE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if path.is_file() && is_firmware {
            return Ok(Some(path.clone()));
        }
    }
    for path in entries.iter().filter(|p| p.is_dir()) {
        if let Some(found) = find_firmware_file(path)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Checks an image before handing its location to the iLO.
pub struct ImageValidator {
    http: Arc<dyn HttpTransport>,
}

impl ImageValidator {
    pub fn new(http: Arc<dyn HttpTransport>) -> Self {
        ImageValidator { http }
    }

    /// The image must answer a HEAD request with a 2xx status.
    pub fn validate_href(&self, url: &str) -> Result<(), IloError> {
        let response = self
            .http
            .execute(HttpRequest {
                method: Method::HEAD,
                url: url.to_string(),
                headers: HeaderMap::new(),
                body: None,
            })
            .map_err(|e| IloError::ImageRefValidation(format!("{url} is not reachable: {e}")))?;
        if !response.status.is_success() {
            return Err(IloError::ImageRefValidation(format!(
                "{url} answered {}",
                response.status
            )));
        }
        Ok(())
    }

    /// Compares the SHA-256 of the file with `expected` (hex, any case).
    pub fn verify_image_checksum(path: &Path, expected: &str) -> Result<(), IloError> {
        let data = fs::read(path).map_err(|e| {
            IloError::ImageRefValidation(format!("cannot read {}: {e}", path.display()))
        })?;
        let actual: String = Sha256::digest(&data)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(IloError::ImageRefValidation(format!(
                "checksum of {} is {actual}, expected {expected}",
                path.display()
            )));
        }
        Ok(())
    }
}
