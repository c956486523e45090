pub mod codegen_error;
pub mod nasm;
pub mod toolchain;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub use codegen_error::CodegenError;
pub use nasm::generate;
pub use toolchain::{NasmLd, Toolchain, ToolchainError};

use crate::lang::program::Program;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Executable path; the assembly goes to `<output>.asm`.
    pub output: PathBuf,
    /// Stop after writing the assembly.
    pub asm_only: bool,
    /// Leave `<output>.asm` behind once the toolchain has run.
    pub keep_intermediates: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("glmp.out"),
            asm_only: false,
            keep_intermediates: false,
        }
    }
}

/// Writes `<output>.asm` and, unless `asm_only`, hands it to `toolchain`.
///
/// Returns the path of the final artifact. If lowering fails the partially
/// written assembly file is removed; after the toolchain runs it is removed
/// either way unless `keep_intermediates` is set.
pub fn compile_to_file(
    program: &Program,
    options: &CompileOptions,
    toolchain: &dyn Toolchain,
) -> Result<PathBuf, CodegenError> {
    let asm_path = toolchain::with_suffix(&options.output, "asm");
    write_asm(program, &asm_path)?;
    tracing::debug!(path = %asm_path.display(), "wrote assembly");

    if options.asm_only {
        return Ok(asm_path);
    }

    let built = toolchain.build(&asm_path, &options.output);
    if !options.keep_intermediates {
        remove(&asm_path);
    }
    built?;
    Ok(options.output.clone())
}

fn remove(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "unable to delete intermediate");
    }
}

fn write_asm(program: &Program, path: &Path) -> Result<(), CodegenError> {
    let file = File::create(path).map_err(|source| CodegenError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    let mut out = BufWriter::new(file);

    let result = nasm::emit(program, &mut out).and_then(|()| Ok(out.flush()?));
    if result.is_err() {
        drop(out);
        remove(path);
    }
    result
}
