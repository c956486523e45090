//! The external assembler/linker collaborator.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}){}", stderr_suffix(.stderr))]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{}", trimmed)
    }
}

/// Turns an assembly file into an executable at `output`.
pub trait Toolchain {
    fn build(&self, asm: &Path, output: &Path) -> Result<(), ToolchainError>;
}

/// `nasm -felf64` followed by `ld`; the first failing step stops the chain.
/// The object file is removed after linking unless `keep_intermediates` is set.
#[derive(Debug, Clone)]
pub struct NasmLd {
    pub nasm: String,
    pub ld: String,
    pub keep_intermediates: bool,
}

impl Default for NasmLd {
    fn default() -> Self {
        Self {
            nasm: "nasm".to_string(),
            ld: "ld".to_string(),
            keep_intermediates: false,
        }
    }
}

/// `path` with `ext` appended (`out` -> `out.o`), keeping any existing dots.
pub fn with_suffix(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

fn run(program: &str, args: &[&Path]) -> Result<(), ToolchainError> {
    let command = std::iter::once(program.to_string())
        .chain(args.iter().map(|a| a.display().to_string()))
        .collect::<Vec<_>>()
        .join(" ");
    tracing::info!(%command, "running");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ToolchainError::Spawn {
            command: command.clone(),
            source,
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(ToolchainError::Failed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Toolchain for NasmLd {
    fn build(&self, asm: &Path, output: &Path) -> Result<(), ToolchainError> {
        let object = with_suffix(output, "o");

        run(
            &self.nasm,
            &[Path::new("-felf64"), asm, Path::new("-o"), object.as_path()],
        )?;
        let linked = run(&self.ld, &[object.as_path(), Path::new("-o"), output]);

        if !self.keep_intermediates {
            if let Err(e) = std::fs::remove_file(&object) {
                tracing::warn!(path = %object.display(), error = %e, "unable to delete intermediate");
            }
        }
        linked
    }
}
