use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tracing_subscriber::EnvFilter;

use glomp::codegen::{self, CompileOptions, NasmLd};
use glomp::frontend::token_dumper::TokenDumper;
use glomp::runtime::{Vm, VmConfig};
use glomp::{Error, Program};

#[derive(Parser)]
#[command(name = "glomp", version, about = "Interpret or compile glomp programs", long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["interpret", "compile"])))]
struct Cli {
    /// Source file (or program image with --load-program)
    input: PathBuf,

    /// Interpret the program
    #[arg(short = 'i', long)]
    interpret: bool,

    /// Compile the program to a native executable
    #[arg(short = 'c', long)]
    compile: bool,

    /// Dump tokens to stdout
    #[arg(short = 'd', long = "dump")]
    dump: bool,

    /// Output path of the compiled executable
    #[arg(short = 'o', long, default_value = "glmp.out")]
    output: PathBuf,

    /// Only generate <output>.asm, do not assemble or link
    #[arg(short = 'a', long = "asm")]
    asm_only: bool,

    /// Keep the .asm and .o files after linking
    #[arg(long)]
    keep: bool,

    /// Disable colors in the token dump
    #[arg(long)]
    no_color: bool,

    /// Abort interpretation after this many steps
    #[arg(long, conflicts_with = "compile")]
    max_steps: Option<usize>,

    /// Abort interpretation when the operand stack grows past this size
    #[arg(long, conflicts_with = "compile")]
    max_stack: Option<usize>,

    /// Write the linked program image to this path
    #[arg(long)]
    emit_program: Option<PathBuf>,

    /// Treat the input as a program image written by --emit-program
    #[arg(long)]
    load_program: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GLOMP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let program = load(cli)?;

    if let Some(path) = &cli.emit_program {
        let bytes = program.to_bytes().context("encoding program image")?;
        fs::write(path, bytes)
            .with_context(|| format!("failed to write program image {}", path.display()))?;
    }

    if cli.compile {
        let options = CompileOptions {
            output: cli.output.clone(),
            asm_only: cli.asm_only,
            keep_intermediates: cli.keep,
        };
        let toolchain = NasmLd {
            keep_intermediates: cli.keep,
            ..NasmLd::default()
        };
        let artifact =
            codegen::compile_to_file(&program, &options, &toolchain).map_err(Error::from)?;
        tracing::info!(path = %artifact.display(), "compiled");
        return Ok(0);
    }

    let config = VmConfig {
        max_steps: cli.max_steps,
        max_stack_size: cli.max_stack,
    };
    let stdout = io::stdout();
    let mut vm = Vm::with_config(BufWriter::new(stdout.lock()), config);
    let value = vm.run(&program).map_err(Error::from)?;

    // the OS keeps the low byte, exactly as with the compiled exit syscall
    Ok(value as i32)
}

fn load(cli: &Cli) -> Result<Program> {
    if cli.load_program {
        let bytes = fs::read(&cli.input)
            .with_context(|| format!("failed to open file: {}", cli.input.display()))?;
        let program = Program::from_bytes(&bytes)?;
        if cli.dump {
            dump(program.tokens(), cli.no_color)?;
        }
        return Ok(program);
    }

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to open file: {}", cli.input.display()))?;
    let tokens = glomp::tokenize(&source).map_err(Error::from)?;
    if cli.dump {
        dump(&tokens, cli.no_color)?;
    }
    Ok(glomp::build(tokens)?)
}

fn dump(tokens: &[glomp::Spanned], no_color: bool) -> Result<()> {
    let mut dumper = TokenDumper::new();
    if no_color {
        dumper = dumper.no_color();
    }
    let mut out = io::stdout().lock();
    dumper.dump(tokens, &mut out)?;
    out.flush()?;
    Ok(())
}
