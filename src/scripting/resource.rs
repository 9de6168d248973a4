use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

const BYTECODE_SIGNATURE: &[u8] = b"\x1bLua";

/// A compiled or plain-text Lua chunk produced by the resource pipeline.
///
/// The bridge never inspects the payload beyond telling bytecode from text; it
/// is handed to the runtime as is.
#[derive(Debug, Clone)]
pub struct LuaResource {
    name: String,
    data: Arc<[u8]>,
}

impl LuaResource {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: Arc::from(data.into().into_boxed_slice()),
        }
    }

    /// Reads a resource from disk, using the file name as the chunk name.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("unable to read Lua resource {}", path.display()))?;
        if data.is_empty() {
            return Err(anyhow!("Lua resource {} is empty", path.display()));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_bytecode(&self) -> bool {
        self.data.starts_with(BYTECODE_SIGNATURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn open_reads_file_and_names_chunk() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"return 1").unwrap();
        let resource = LuaResource::open(tmp.path()).unwrap();
        assert_eq!(resource.data(), b"return 1");
        assert!(!resource.is_bytecode());
        assert_eq!(
            resource.name(),
            tmp.path().file_name().unwrap().to_string_lossy()
        );
    }

    #[test]
    fn open_rejects_empty_files() {
        let tmp = NamedTempFile::new().unwrap();
        assert!(LuaResource::open(tmp.path()).is_err());
    }

    #[test]
    fn detects_bytecode_signature() {
        let resource = LuaResource::new("compiled", b"\x1bLua\x54\x00".to_vec());
        assert!(resource.is_bytecode());
    }
}
