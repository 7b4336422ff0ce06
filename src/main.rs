use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use reel::diagnostic::ansi::AnsiRenderer;
use reel::diagnostic::Diagnostic;

#[derive(Parser)]
#[command(name = "reel", version, about = "The reel scripting language")]
struct Cli {
    /// Script file to run
    path: Option<PathBuf>,

    /// Run source text given on the command line instead of a file
    #[arg(short = 'e', long = "eval", value_name = "SOURCE")]
    eval: Option<String>,

    /// Print an intermediate form instead of running
    #[arg(long, value_enum, value_name = "FORM")]
    emit: Option<Emit>,

    /// Print the final value of the script
    #[arg(short, long)]
    print: bool,

    /// Disable colored diagnostics
    #[arg(long)]
    no_color: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Emit {
    /// The parsed node tree as JSON
    Ast,
    /// The opcode tape listing
    Tape,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let renderer = AnsiRenderer {
        use_color: !cli.no_color,
    };

    let source = match (&cli.eval, &cli.path) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error reading {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        (None, None) => {
            eprintln!("usage: reel <file.reel> | reel -e '<source>'");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(d) => {
            eprint!("{}", renderer.render(&d));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, source: &str) -> Result<(), Diagnostic> {
    let module = reel::parse_source(source)?;

    match cli.emit {
        Some(Emit::Ast) => {
            let json = serde_json::to_string_pretty(&module)
                .map_err(|e| Diagnostic::error(format!("serialization error: {e}")))?;
            println!("{json}");
            Ok(())
        }
        Some(Emit::Tape) => {
            let program =
                reel::tape::build(&module).map_err(|e| Diagnostic::from(&e).with_source(source))?;
            print!("{}", program.disassemble());
            Ok(())
        }
        None => {
            let ctx = reel::RuntimeContext::new();
            ctx.start_sweeper();
            let mut interp = reel::Interpreter::new(ctx);
            let result = interp
                .run_module(&module)
                .map_err(|e| Diagnostic::from(&e).with_source(source))?;
            if cli.print {
                println!("{}", result.lock());
            }
            Ok(())
        }
    }
}
