use std::ffi::CStr;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

/// SPIR-V words for every shader in `shaders/`, compiled by the build script
pub mod spirv {
    include!(concat!(env!("OUT_DIR"), "/shaders.rs"));
}

pub const ENTRY_POINT: &CStr = c"main";

pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn new(vert: &[u32], frag: &[u32], device: Arc<ash::Device>) -> Result<Self> {
        let vert_mod = create_shader_module(vert, &device)?;
        let frag_mod = match create_shader_module(frag, &device) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_mod, None) };
                return Err(e);
            }
        };
        Ok(Self { vert_mod, frag_mod, device })
    }

    pub fn stages(&self) -> [vk::PipelineShaderStageCreateInfo<'static>; 2] {
        [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(self.vert_mod)
                .name(ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(self.frag_mod)
                .name(ENTRY_POINT),
        ]
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

fn create_shader_module(code: &[u32], device: &ash::Device) -> Result<vk::ShaderModule> {
    // SPIR-V magic number
    if code.first() != Some(&0x0723_0203) {
        return Err(eyre!("Shader code is not a SPIR-V module"));
    }

    let shader_module_info = vk::ShaderModuleCreateInfo::default().code(code);
    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}

#[cfg(test)]
mod tests {
    use super::spirv;

    #[test]
    fn generated_modules_are_spirv() {
        for words in [
            &spirv::SCENE_VERT[..],
            &spirv::SCENE_FRAG[..],
            &spirv::OVERLAY_VERT[..],
            &spirv::OVERLAY_FRAG[..],
        ] {
            assert_eq!(words[0], 0x0723_0203);
            assert!(words.len() > 5);
        }
    }
}
