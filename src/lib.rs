//! reel: a dynamically-typed, class-based scripting language with bignum
//! arithmetic, built around a shared record model and two backends — a
//! tree-walking evaluator and an opcode-tape builder.

pub mod ast;
pub mod diagnostic;
pub mod gc;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod record;
pub mod runtime;
pub mod tape;

pub use interpreter::Interpreter;
pub use runtime::RuntimeContext;

use diagnostic::Diagnostic;

/// Lex and parse source text into a module.
pub fn parse_source(source: &str) -> Result<ast::Module, Diagnostic> {
    let tokens = lexer::lex(source).map_err(|e| Diagnostic::from(&e).with_source(source))?;
    parser::parse(tokens, source).map_err(|e| Diagnostic::from(&e).with_source(source))
}

/// Run source text in a fresh runtime and yield the final value.
pub fn run_source(source: &str) -> Result<record::RecordRef, Diagnostic> {
    let module = parse_source(source)?;
    let ctx = RuntimeContext::new();
    ctx.start_sweeper();
    let mut interp = Interpreter::new(ctx);
    interp
        .run_module(&module)
        .map_err(|e| Diagnostic::from(&e).with_source(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_source_end_to_end() {
        let result = run_source("var x = 6 x * 7").unwrap();
        assert_eq!(result.lock().to_string(), "42");
    }

    #[test]
    fn run_source_reports_lex_errors() {
        let err = run_source("var x = $").unwrap_err();
        assert!(err.message.contains("unexpected token"));
    }

    #[test]
    fn run_source_reports_runtime_errors() {
        let err = run_source("1 / 0").unwrap_err();
        assert!(err.message.contains("floating point exception"));
    }
}
