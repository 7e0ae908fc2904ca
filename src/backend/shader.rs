// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Shaders are compiled ahead of time by
// build.rs and read from disk at pipeline creation, so they can be swapped
// without rebuilding the binary.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use super::VulkanDevice;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a whole shader file into memory
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to open file: {}", path.display()))
}

/// Decode SPIR-V bytes into properly aligned 32-bit words
pub fn read_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!("SPIR-V size {} is not a multiple of 4", bytes.len());
    }

    let words = ash::util::read_spv(&mut Cursor::new(bytes)).context("Failed to read SPIR-V")?;

    // read_spv already fixed up the byte order
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        _ => anyhow::bail!("Missing SPIR-V magic number"),
    }
}

/// Load SPIR-V shader from bytes and create a shader module
pub fn create_shader_module(device: &VulkanDevice, code: &[u8]) -> Result<vk::ShaderModule> {
    let words = read_spirv(code)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    unsafe {
        device.device.create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

/// Read a compiled shader from disk and wrap it in a module
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let code = read_file(path)?;
    create_shader_module(device, &code)
        .with_context(|| format!("Invalid shader: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_little_endian_words() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 7]);
        let words = read_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000, 7]);
    }

    #[test]
    fn decodes_from_unaligned_buffer() {
        // Offset by one byte so the slice start is not 4-byte aligned
        let mut storage = vec![0u8];
        storage.extend(words_to_bytes(&[SPIRV_MAGIC, 42]));
        let words = read_spirv(&storage[1..]).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 42]);
    }

    #[test]
    fn rejects_truncated_input() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 1]);
        bytes.pop();
        assert!(read_spirv(&bytes).is_err());
    }

    #[test]
    fn rejects_missing_magic() {
        let bytes = words_to_bytes(&[0xdead_beef, 1]);
        assert!(read_spirv(&bytes).is_err());
        assert!(read_spirv(&[]).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_file(Path::new("dat/shaders/nope.spv")).unwrap_err();
        assert!(format!("{:#}", err).contains("dat/shaders/nope.spv"));
    }
}
