// build.rs
// Compiles the GLSL shaders in resources/shaders to SPIR-V next to the binary

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_STAGES: [&str; 2] = ["vert", "frag"];

/// Compile every `.vert`/`.frag` in `shader_dir` into `<name>.<stage>.spv`
fn compile_shaders(shader_dir: &Path, target_dir: &Path, glslc: &Path) -> usize {
    let entries = match std::fs::read_dir(shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            println!("cargo:warning=No shader directory found at {}", shader_dir.display());
            return 0;
        }
    };

    let mut compiled = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        if !SHADER_STAGES.contains(&ext) {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        // terrain.vert -> terrain.vert.spv
        let out_file = target_dir.join(format!("{file_name}.spv"));

        let up_to_date = match (std::fs::metadata(&path), std::fs::metadata(&out_file)) {
            (Ok(src), Ok(dst)) => matches!(
                (src.modified(), dst.modified()),
                (Ok(src_time), Ok(dst_time)) if dst_time >= src_time
            ),
            _ => false,
        };
        if up_to_date {
            continue;
        }

        let status = Command::new(glslc).arg(&path).arg("-o").arg(&out_file).status();
        match status {
            Ok(s) if s.success() => compiled += 1,
            Ok(s) => panic!("glslc failed for {} with exit code {}", path.display(), s.code().unwrap_or(-1)),
            Err(e) => panic!("Failed to run glslc for {}: {}", path.display(), e),
        }
    }
    compiled
}

/// `target/<profile>`, where cargo puts the binary
fn binary_dir() -> Option<PathBuf> {
    let out_dir = PathBuf::from(env::var("OUT_DIR").ok()?);
    // OUT_DIR is target/<profile>/build/<pkg>-<hash>/out
    out_dir.ancestors().nth(3).map(Path::to_path_buf)
}

fn main() {
    println!("cargo:rerun-if-changed=resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if env::var("SKIP_SHADERS").is_ok() {
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        println!("cargo:warning=VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        Path::new(&vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        Path::new(&vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        panic!("glslc not found at {}", glslc.display());
    }

    let Some(target_dir) = binary_dir() else {
        println!("cargo:warning=Could not locate the binary directory, shader compilation skipped");
        return;
    };

    let compiled = compile_shaders(Path::new("resources/shaders"), &target_dir, &glslc);
    if compiled > 0 {
        println!("cargo:warning=Compiled {compiled} shader(s) into {}", target_dir.display());
    }
}
