// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use lantern_core::LOG_GENERAL;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

pub const VERT_FILE: &str = "tri.vert.spv";
pub const FRAG_FILE: &str = "tri.frag.spv";

static EMBEDDED_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.vert.spv"));
static EMBEDDED_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.frag.spv"));

/// SPIR-V words for the triangle's vertex and fragment stages.
pub struct ShaderCode {
    pub vert: Vec<u32>,
    pub frag: Vec<u32>,
}

impl ShaderCode {
    /// Reads both stages from `dir` when given, otherwise uses the copies
    /// compiled into the crate.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => {
                debug!(target: LOG_GENERAL, "loading shaders from {}", dir.display());
                Ok(ShaderCode {
                    vert: read_file(&dir.join(VERT_FILE))?,
                    frag: read_file(&dir.join(FRAG_FILE))?,
                })
            }
            None => Self::embedded(),
        }
    }

    pub fn embedded() -> Result<Self> {
        Ok(ShaderCode {
            vert: words(EMBEDDED_VERT).context("embedded vertex shader")?,
            frag: words(EMBEDDED_FRAG).context("embedded fragment shader")?,
        })
    }
}

fn read_file(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    words(&bytes).with_context(|| format!("parse SPIR-V {}", path.display()))
}

fn words(bytes: &[u8]) -> Result<Vec<u32>> {
    Ok(ash::util::read_spv(&mut Cursor::new(bytes))?)
}

/// # Safety
/// `device` must be live.
pub unsafe fn create_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        code_size: code.len() * 4,
        p_code: code.as_ptr(),
        ..Default::default()
    };
    unsafe { device.create_shader_module(&info, None) }.context("create_shader_module")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn embedded_blobs_are_spirv() {
        let code = ShaderCode::embedded().unwrap();
        assert_eq!(code.vert[0], SPIRV_MAGIC);
        assert_eq!(code.frag[0], SPIRV_MAGIC);
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = std::env::temp_dir().join("lantern-no-such-shader-dir");
        let err = ShaderCode::load(Some(&dir)).err().unwrap();
        assert!(format!("{err:#}").contains(VERT_FILE));
    }

    #[test]
    fn loads_from_dir() {
        let dir = std::env::temp_dir().join(format!("lantern-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(VERT_FILE), EMBEDDED_VERT).unwrap();
        std::fs::write(dir.join(FRAG_FILE), EMBEDDED_FRAG).unwrap();

        let code = ShaderCode::load(Some(&dir)).unwrap();
        assert_eq!(code.vert.len() * 4, EMBEDDED_VERT.len());
        assert_eq!(code.frag.len() * 4, EMBEDDED_FRAG.len());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn truncated_blob_is_rejected() {
        assert!(words(&[0x03, 0x02, 0x23]).is_err());
    }
}
