// Build script to compile GLSL shaders to SPIR-V

use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=dat/shaders/");

    // Compile shaders using glslc (part of Vulkan SDK)
    compile_shader("dat/shaders/default.vert.glsl", "vert");
    compile_shader("dat/shaders/default.frag.glsl", "frag");
}

fn compile_shader(input: &str, stage: &str) {
    let input_path = Path::new(input);
    let output = format!("{}.spv", input);
    let output_path = Path::new(&output);

    // The .glsl suffix hides the stage from glslc, so name it explicitly
    let result = Command::new("glslc")
        .arg(format!("-fshader-stage={}", stage))
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!(
                "cargo:warning=Install the Vulkan SDK or run: glslc -fshader-stage={} {} -o {}",
                stage, input, output
            );
        }
    }
}
