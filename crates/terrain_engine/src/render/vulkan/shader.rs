//! Shader loading
//!
//! Shaders arrive as precompiled SPIR-V blobs. The bytes are re-aligned into
//! 32-bit words; their contents are left to the driver.

use ash::{vk, Device};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use crate::render::vulkan::{VulkanResult, VulkanError};

/// Re-align raw SPIR-V bytes into words
pub fn spirv_words(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| VulkanError::InvalidShaderCode(e.to_string()))
}

/// Read a whole shader binary from disk
pub fn read_shader_file(path: &Path) -> VulkanResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| VulkanError::ShaderIo {
        path: path.display().to_string(),
        source,
    })
}

/// Resolve a shader file name against `override_dir`, or the directory of the
/// running executable when no override is given
pub fn shader_path(file_name: &str, override_dir: Option<&Path>) -> VulkanResult<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.join(file_name));
    }

    let exe = std::env::current_exe().map_err(|source| VulkanError::ShaderIo {
        path: file_name.to_string(),
        source,
    })?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(file_name))
}

/// Shader module that lives only as long as pipeline creation needs it
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: &Device, bytes: &[u8]) -> VulkanResult<Self> {
        let words = spirv_words(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        let module = unsafe {
            device.create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device: device.clone(), module })
    }

    /// Stage description with entry point `main`
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

const ENTRY_POINT: &std::ffi::CStr = unsafe { std::ffi::CStr::from_bytes_with_nul_unchecked(b"main\0") };

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spirv_words_little_endian() {
        // SPIR-V magic number followed by one more word
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x01, 0x00, 0x00, 0x00];
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 1]);
    }

    #[test]
    fn test_spirv_partial_word_rejected() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x01];
        assert!(matches!(spirv_words(&bytes), Err(VulkanError::InvalidShaderCode(_))));
    }

    #[test]
    fn test_shader_path_override() {
        let path = shader_path("terrain.vert.spv", Some(Path::new("/tmp/shaders"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/shaders/terrain.vert.spv"));
    }

    #[test]
    fn test_shader_path_next_to_executable() {
        let path = shader_path("particle.frag.spv", None).unwrap();
        let exe_dir = std::env::current_exe().unwrap().parent().unwrap().to_path_buf();
        assert_eq!(path, exe_dir.join("particle.frag.spv"));
    }

    #[test]
    fn test_missing_shader_file() {
        let err = read_shader_file(Path::new("/definitely/not/here.spv")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.spv"));
    }
}
