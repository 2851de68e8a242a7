use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;

use la_lib::compiler::{Compiler, CompilerOptions, Phase};
use la_lib::linker;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Source file to compile.
    file: Option<PathBuf>,

    /// Compile every .la file under this directory instead.
    #[arg(long)]
    all: Option<PathBuf>,

    /// Base name of the produced artifacts.
    #[arg(short, long, default_value = "out")]
    output: String,

    /// Stop after parsing.
    #[arg(long)]
    parse_only: bool,

    /// Stop after type checking.
    #[arg(long)]
    check: bool,

    /// Stop after writing textual LLVM IR (<output>.ll).
    #[arg(long)]
    emit_llvm: bool,

    /// Write the parsed tree as ast.json.
    #[arg(long)]
    ast_json: bool,

    /// Report warnings.
    #[arg(short = 'W', long)]
    warnings: bool,

    /// Treat warnings as errors.
    #[arg(long)]
    werror: bool,

    /// Extra flag passed to the linker (repeatable).
    #[arg(short = 'L', long = "linker-flag")]
    linker_flags: Vec<String>,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .expect("logger setup");

    let phase = if cli.parse_only {
        Phase::Parse
    } else if cli.check {
        Phase::Check
    } else if cli.emit_llvm {
        Phase::EmitIr
    } else {
        Phase::Build
    };

    if phase == Phase::Build && !linker::check_available() {
        bail!("no known linker is available; install cc, gcc or clang");
    }

    let options = CompilerOptions {
        output: cli.output,
        report_warnings: cli.warnings,
        warnings_as_errors: cli.werror,
        linker_flags: cli.linker_flags,
        write_ast: cli.ast_json,
        write_ir: cli.emit_llvm,
    };
    let compiler = Compiler::new(options);

    match (&cli.file, &cli.all) {
        (Some(file), None) => compiler.compile_file(file, phase),
        (None, Some(directory)) => compiler.compile_directory(directory, phase),
        (Some(_), Some(_)) => bail!("pass either a file or --all <dir>, not both"),
        (None, None) => bail!("nothing to compile; pass a file or --all <dir>"),
    }
}
