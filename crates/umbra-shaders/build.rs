//! Build script compiling the GLSL sources in `shaders/` to SPIR-V.
//!
//! Only active with the `compile` feature. Each `<name>.<stage>` source
//! becomes `$OUT_DIR/<name>.<stage>.spv`.

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    #[cfg(feature = "compile")]
    compile::all();
}

#[cfg(feature = "compile")]
mod compile {
    use shaderc::{Compiler, ShaderKind};
    use std::env;
    use std::fs;
    use std::path::{Path, PathBuf};

    const SOURCES: &[(&str, ShaderKind)] = &[
        ("shadow.vert", ShaderKind::Vertex),
        ("shadow.geom", ShaderKind::Geometry),
        ("shadow.frag", ShaderKind::Fragment),
        ("gbuffer.vert", ShaderKind::Vertex),
        ("gbuffer.frag", ShaderKind::Fragment),
        ("lighting.vert", ShaderKind::Vertex),
        ("lighting.frag", ShaderKind::Fragment),
        ("light.vert", ShaderKind::Vertex),
        ("light.frag", ShaderKind::Fragment),
    ];

    pub fn all() {
        let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
        let shader_dir = Path::new("shaders");
        let compiler = Compiler::new().expect("Failed to create shader compiler");

        for (file, kind) in SOURCES {
            compile_shader(
                &compiler,
                &shader_dir.join(file),
                &out_dir.join(format!("{file}.spv")),
                *kind,
            );
        }
    }

    fn compile_shader(compiler: &Compiler, input: &Path, output: &Path, kind: ShaderKind) {
        let source = fs::read_to_string(input)
            .unwrap_or_else(|e| panic!("Failed to read shader {}: {e}", input.display()));
        let file_name = input.file_name().and_then(|n| n.to_str()).unwrap_or("shader");

        let mut options =
            shaderc::CompileOptions::new().expect("Failed to create compile options");
        options.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_3 as u32,
        );
        options.set_target_spirv(shaderc::SpirvVersion::V1_6);
        options.set_optimization_level(shaderc::OptimizationLevel::Performance);

        let result = compiler
            .compile_into_spirv(&source, kind, file_name, "main", Some(&options))
            .unwrap_or_else(|e| panic!("Failed to compile shader {}: {e}", input.display()));

        if result.get_num_warnings() > 0 {
            println!(
                "cargo:warning=Shader warnings in {}: {}",
                input.display(),
                result.get_warning_messages()
            );
        }

        fs::write(output, bytemuck::cast_slice::<u32, u8>(result.as_binary()))
            .unwrap_or_else(|e| panic!("Failed to write shader {}: {e}", output.display()));
    }
}
