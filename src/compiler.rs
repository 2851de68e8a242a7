//! The driver: wires lexer, parser, checker and emitter together and
//! writes the artifacts (`ast.json`, `<output>.ll`, `<output>.o`, linked
//! executable).
//!
//! The sink policy is applied after every phase: once it holds an error,
//! the next phase is not entered. Warnings are printed when configured
//! and fail the build when warnings-as-errors is set.

use std::path::Path;

use anyhow::{bail, Context as AnyhowContext};
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};
use inkwell::OptimizationLevel;

use crate::codegen;
use crate::diagnostics::{DiagnosticSink, Severity};
use crate::lexer::{Lexer, TokenKind};
use crate::linker;
use crate::parser::Parser;
use crate::typechecker::TypeChecker;

/// How far a compilation run goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Lex and parse only.
    Parse,
    /// Parse and type check.
    Check,
    /// Parse, check and emit textual LLVM IR.
    EmitIr,
    /// Full build: object file plus linked executable.
    Build,
}

#[derive(Clone, Debug)]
pub struct CompilerOptions {
    /// Base name of the produced artifacts.
    pub output: String,
    pub report_warnings: bool,
    pub warnings_as_errors: bool,
    /// Extra flags handed to the linker, in order.
    pub linker_flags: Vec<String>,
    /// Write the parsed tree as `ast.json`.
    pub write_ast: bool,
    /// Write textual IR as `<output>.ll` even on full builds.
    pub write_ir: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            output: "out".to_string(),
            report_warnings: false,
            warnings_as_errors: false,
            linker_flags: vec![],
            write_ast: false,
            write_ir: false,
        }
    }
}

pub struct Compiler {
    pub options: CompilerOptions,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Compiler { options }
    }

    pub fn compile_file(&self, path: &Path, phase: Phase) -> anyhow::Result<()> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("could not read '{}'", path.display()))?;
        let name = path.to_string_lossy().into_owned();
        log::info!("compiling {name}");
        self.compile_source(&source, &name, phase)
    }

    /// Compiles every `.la` file under `directory`, each with a fresh
    /// context and its own output base name.
    pub fn compile_directory(&self, directory: &Path, phase: Phase) -> anyhow::Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(directory)
            .with_context(|| format!("could not read '{}'", directory.display()))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "la"))
            .collect();
        entries.sort();

        for path in entries {
            let stem = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.options.output.clone());
            let per_file = Compiler::new(CompilerOptions {
                output: stem,
                ..self.options.clone()
            });
            per_file.compile_file(&path, phase)?;
        }
        Ok(())
    }

    pub fn compile_source(&self, source: &str, name: &str, phase: Phase) -> anyhow::Result<()> {
        let mut sink = DiagnosticSink::new();
        let file = sink.add_file(name, source);

        let tokens = Lexer::new(source, file).lex();
        for token in &tokens {
            if token.kind == TokenKind::Invalid {
                let _ = sink.error(
                    crate::diagnostics::Stage::Lexical,
                    token.span,
                    token.lexeme.clone(),
                );
            }
        }
        if sink.has_errors() {
            return self.finish(&sink);
        }

        let unit = Parser::new(tokens, &mut sink).parse();
        let Ok(mut unit) = unit else {
            return self.finish(&sink);
        };

        if self.options.write_ast {
            let json = serde_json::to_string_pretty(&unit)
                .context("could not serialize the tree")?;
            std::fs::write("ast.json", json).context("could not write ast.json")?;
        }
        if phase == Phase::Parse {
            return self.finish(&sink);
        }

        if TypeChecker::new(&mut sink).check(&mut unit).is_err() {
            return self.finish(&sink);
        }
        if phase == Phase::Check {
            return self.finish(&sink);
        }

        let context = inkwell::context::Context::create();
        let module = match codegen::emit(&context, &unit, &self.options.output, &mut sink) {
            Ok(module) => module,
            Err(_) => return self.finish(&sink),
        };

        if phase == Phase::EmitIr || self.options.write_ir {
            let path = format!("{}.ll", self.options.output);
            module
                .print_to_file(&path)
                .map_err(|message| anyhow::anyhow!(message.to_string()))
                .with_context(|| format!("could not write {path}"))?;
        }

        if phase == Phase::Build {
            let object_path = self.emit_object(&module)?;
            linker::link(&object_path, &self.options.output, &self.options.linker_flags)?;
        }

        self.finish(&sink)
    }

    /// Runs the default pass pipeline and writes the native object file.
    fn emit_object(&self, module: &inkwell::module::Module<'_>) -> anyhow::Result<std::path::PathBuf> {
        // Target initialization is process-wide and idempotent.
        Target::initialize_all(&InitializationConfig::default());

        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple)
            .map_err(|message| anyhow::anyhow!(message.to_string()))?;
        let machine = target
            .create_target_machine(
                &triple,
                "generic",
                "",
                OptimizationLevel::Default,
                RelocMode::PIC,
                CodeModel::Default,
            )
            .context("could not create a target machine")?;

        module
            .run_passes(
                "default<O2>",
                &machine,
                inkwell::passes::PassBuilderOptions::create(),
            )
            .map_err(|message| anyhow::anyhow!(message.to_string()))?;

        let path = std::path::PathBuf::from(format!("{}.o", self.options.output));
        machine
            .write_to_file(module, FileType::Object, &path)
            .map_err(|message| anyhow::anyhow!(message.to_string()))?;
        Ok(path)
    }

    /// Applies the diagnostic policy at the end of a run.
    fn finish(&self, sink: &DiagnosticSink) -> anyhow::Result<()> {
        if self.options.report_warnings && sink.warning_count() > 0 {
            sink.print(Severity::Warning);
        } else if sink.has_errors() {
            sink.print(Severity::Error);
        }

        if sink.has_errors() {
            bail!("compilation failed with {} error(s)", sink.error_count());
        }
        if self.options.warnings_as_errors && sink.warning_count() > 0 {
            bail!(
                "compilation failed with {} warning(s) treated as errors",
                sink.warning_count()
            );
        }
        Ok(())
    }
}
