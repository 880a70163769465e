use std::path::PathBuf;

use clap::Parser;
use lash_core::{analyze_path, AnalysisOptions};

#[derive(Parser)]
#[command(name = "lashc")]
#[command(about = "Compiles Lash source to Bash")]
#[command(version, disable_version_flag = true)]
struct Cli {
    /// Print version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: (),

    /// Lash source file to compile
    input: PathBuf,

    /// Print the parsed AST instead of compiling
    #[arg(long = "ast")]
    ast: bool,

    /// Run analysis only; report diagnostics without emitting Bash
    #[arg(long = "check")]
    check: bool,

    /// Write the generated Bash to this file instead of stdout
    #[arg(long = "emit-bash")]
    emit_bash: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let result = match analyze_path(&cli.input, AnalysisOptions::default()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("lashc: {e}");
            std::process::exit(1);
        }
    };

    for diag in &result.diagnostics {
        eprintln!("{diag}");
    }

    if result.has_errors {
        std::process::exit(1);
    }

    let program = match &result.program {
        Some(p) => p,
        None => {
            eprintln!("lashc: no program to emit");
            std::process::exit(1);
        }
    };

    if cli.ast {
        println!("{program:#?}");
        return;
    }

    if cli.check {
        return;
    }

    let generated = lash_core::codegen::generate(program, &result.types);
    for warning in &generated.unsupported {
        eprintln!("lashc: unsupported: {warning}");
    }

    match &cli.emit_bash {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &generated.bash) {
                eprintln!("lashc: cannot write {}: {e}", path.display());
                std::process::exit(1);
            }
        }
        None => print!("{}", generated.bash),
    }

    if !generated.unsupported.is_empty() {
        std::process::exit(1);
    }
}
