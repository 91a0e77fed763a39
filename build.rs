use color_eyre::Result;
use color_eyre::eyre::{OptionExt, eyre};
use naga::{
    back::spv, front::glsl::{Frontend, Options},
    valid::{Capabilities, ValidationFlags, Validator},
    ShaderStage
};
use std::fmt::Write as _;
use std::{env, fs, path::{Path, PathBuf}};

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=shaders");

    let cargo_manifest_dir = env::var("CARGO_MANIFEST_DIR")?;
    let out_dir = env::var("OUT_DIR")?;
    let shaders_in_dir = Path::new(&cargo_manifest_dir).join("shaders");

    let source = compile_shaders(&shaders_in_dir)?;
    fs::write(Path::new(&out_dir).join("shaders.rs"), source)?;

    Ok(())
}

/// Compiles every GLSL stage in `shaders_in_dir` and returns Rust source declaring one
/// `pub static <NAME>_<STAGE>: [u32; N]` word array per shader.
fn compile_shaders(shaders_in_dir: &Path) -> Result<String> {
    let mut paths = fs::read_dir(shaders_in_dir)
        .map_err(|e| eyre!("Cannot open shader directory {:?}: {e}", shaders_in_dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<PathBuf>>>()?;
    // Stable output regardless of directory iteration order
    paths.sort();

    let mut generated = String::from("// Generated by build.rs from shaders/*. Do not edit.\n\n");

    for path in paths {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_eyre(format!("Shader file has no extension: {:?}", path))?;
        let shader_stage = match ext {
            "vert" => ShaderStage::Vertex,
            "frag" => ShaderStage::Fragment,
            _ => {
                println!("cargo:warning=Skipping non-GLSL file: {:?}", path);
                continue;
            }
        };

        let source = fs::read_to_string(&path)?;
        if source.trim().is_empty() {
            return Err(eyre!("Shader source is empty: {:?}", path));
        }

        // Read the GLSL file and parse into IR
        let mut frontend = Frontend::default();
        let module = frontend
            .parse(&Options::from(shader_stage), &source)
            .map_err(|e| eyre!("Failed to parse {:?}: {e:?}", path))?;

        // Validate the IR
        let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
        let validation_info = validator
            .validate(&module)
            .map_err(|e| eyre!("Failed to validate {:?}: {e:?}", path))?;

        // Shaders are authored against Vulkan's clip space already
        let mut options = spv::Options::default();
        options.flags.remove(spv::WriterFlags::ADJUST_COORDINATE_SPACE);
        let words = spv::write_vec(&module, &validation_info, &options, None)?;
        if words.is_empty() {
            return Err(eyre!("Shader compiled to an empty module: {:?}", path));
        }

        let shader_name = path
            .file_stem()
            .ok_or_eyre("Shader file has no name")?
            .to_str()
            .ok_or_eyre("Shader file name is not valid UTF-8")?;
        let ident = format!("{}_{}", shader_name, ext)
            .to_uppercase()
            .replace(['-', '.'], "_");

        write!(generated, "pub static {}: [u32; {}] = [", ident, words.len())?;
        for (i, word) in words.iter().enumerate() {
            if i % 8 == 0 {
                generated.push_str("\n    ");
            }
            write!(generated, "0x{:08x}, ", word)?;
        }
        generated.push_str("\n];\n\n");
    }

    Ok(generated)
}
