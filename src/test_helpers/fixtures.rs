use std::io::Write;
use std::path::PathBuf;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::temp::TestContext;

/// Deterministic init packet of `len` bytes.
pub fn init_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(0x12)).collect()
}

/// Deterministic firmware image of `len` bytes.
///
/// The pattern does not repeat on a page boundary, so a misplaced object
/// changes the image CRC.
pub fn firmware_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

/// Builder for creating DFU zip packages on disk
pub struct PackageBuilder {
    manifest: Option<String>,
    files: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self {
            manifest: None,
            files: Vec::new(),
        }
    }

    pub fn manifest(mut self, json: &str) -> Self {
        self.manifest = Some(json.to_string());
        self
    }

    pub fn file(mut self, name: &str, content: &[u8]) -> Self {
        self.files.push((name.to_string(), content.to_vec()));
        self
    }

    /// Write the package into the context's directory and return its path.
    pub fn write(self, ctx: &TestContext, name: &str) -> PathBuf {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            let options = FileOptions::default().compression_method(CompressionMethod::Stored);

            if let Some(manifest) = &self.manifest {
                zip.start_file("manifest.json", options).unwrap();
                zip.write_all(manifest.as_bytes()).unwrap();
            }
            for (file_name, content) in &self.files {
                zip.start_file(file_name.as_str(), options).unwrap();
                zip.write_all(content).unwrap();
            }
            zip.finish().unwrap();
        }
        ctx.create_file_bytes(name, buffer.get_ref())
    }
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}
