//! Firmware package reader for Secure DFU.
//!
//! Reads an nrfutil-style DFU zip:
//! - manifest.json - names the init packet and binary of each image
//! - `<image>.dat` - init packet (signed command object)
//! - `<image>.bin` - firmware binary (data objects)

use std::fmt;
use std::io::{Read, Seek};
use std::path::Path;

use serde::Deserialize;

use super::error::{DfuError, DfuResult};

/// Image entries a DFU package manifest may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Application,
    Bootloader,
    Softdevice,
    SoftdeviceBootloader,
}

impl ImageKind {
    /// Key of this image in manifest.json.
    pub fn manifest_key(&self) -> &'static str {
        match self {
            ImageKind::Application => "application",
            ImageKind::Bootloader => "bootloader",
            ImageKind::Softdevice => "softdevice",
            ImageKind::SoftdeviceBootloader => "softdevice_bootloader",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.manifest_key())
    }
}

/// Contents of a DFU firmware package.
#[derive(Debug)]
pub struct FirmwarePackage {
    /// Init packet data (.dat contents).
    pub init_data: Vec<u8>,
    /// Firmware binary data (.bin contents).
    pub firmware_data: Vec<u8>,
    /// Manifest entry the payloads were read from.
    pub manifest: ManifestData,
}

/// Parsed manifest entry for one image.
#[derive(Debug, Clone)]
pub struct ManifestData {
    pub image: ImageKind,
    /// Name of the binary file.
    pub bin_file: String,
    /// Name of the init packet file.
    pub dat_file: String,
    /// Only present in legacy packages.
    pub dfu_version: Option<f32>,
}

/// Raw manifest.json structure for deserialization.
#[derive(Debug, Deserialize)]
struct RawManifest {
    manifest: ManifestInner,
}

#[derive(Debug, Deserialize)]
struct ManifestInner {
    application: Option<ImageEntry>,
    bootloader: Option<ImageEntry>,
    softdevice: Option<ImageEntry>,
    softdevice_bootloader: Option<ImageEntry>,
    dfu_version: Option<f32>,
}

impl ManifestInner {
    fn entry(&self, image: ImageKind) -> Option<&ImageEntry> {
        match image {
            ImageKind::Application => self.application.as_ref(),
            ImageKind::Bootloader => self.bootloader.as_ref(),
            ImageKind::Softdevice => self.softdevice.as_ref(),
            ImageKind::SoftdeviceBootloader => self.softdevice_bootloader.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    bin_file: String,
    dat_file: String,
}

/// Read the application image from a DFU zip package.
pub fn read_firmware_zip<P: AsRef<Path>>(path: P) -> DfuResult<FirmwarePackage> {
    read_firmware_zip_image(path, ImageKind::Application)
}

/// Read and parse a DFU zip package, selecting one image.
///
/// # Arguments
/// * `path` - Path to the DFU zip file
/// * `image` - Which manifest entry to load
///
/// # Returns
/// Init packet, firmware binary and the manifest entry they came from
pub fn read_firmware_zip_image<P: AsRef<Path>>(
    path: P,
    image: ImageKind,
) -> DfuResult<FirmwarePackage> {
    let file = std::fs::File::open(path.as_ref())?;
    let mut archive = zip::ZipArchive::new(file)?;

    let manifest = read_manifest(&mut archive, image)?;

    let init_data = read_file_from_zip(&mut archive, &manifest.dat_file)?;
    let firmware_data = read_file_from_zip(&mut archive, &manifest.bin_file)?;

    if init_data.is_empty() {
        return Err(DfuError::EmptyPayload { name: "init" });
    }
    if firmware_data.is_empty() {
        return Err(DfuError::EmptyPayload { name: "firmware" });
    }

    Ok(FirmwarePackage {
        init_data,
        firmware_data,
        manifest,
    })
}

/// Read and parse the manifest.json from the archive.
fn read_manifest<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    image: ImageKind,
) -> DfuResult<ManifestData> {
    let mut manifest_file = archive.by_name("manifest.json").map_err(|_| {
        DfuError::MissingFile {
            filename: "manifest.json".to_string(),
        }
    })?;

    let mut contents = String::new();
    manifest_file.read_to_string(&mut contents)?;

    let raw: RawManifest = serde_json::from_str(&contents)?;

    let entry = raw
        .manifest
        .entry(image)
        .ok_or_else(|| DfuError::MissingImage {
            image: image.to_string(),
        })?;

    if entry.bin_file.is_empty() || entry.dat_file.is_empty() {
        return Err(DfuError::InvalidManifest {
            reason: format!("{} entry has an empty file name", image),
        });
    }

    Ok(ManifestData {
        image,
        bin_file: entry.bin_file.clone(),
        dat_file: entry.dat_file.clone(),
        dfu_version: raw.manifest.dfu_version,
    })
}

/// Read a file from the zip archive by name.
fn read_file_from_zip<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> DfuResult<Vec<u8>> {
    let mut file = archive.by_name(name).map_err(|_| DfuError::MissingFile {
        filename: name.to_string(),
    })?;

    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)?;

    Ok(data)
}
