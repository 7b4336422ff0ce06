//! Built-in procedures installed into the base scope frame.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_traits::ToPrimitive;

use crate::ast::Span;
use crate::record::{ErrorKind, EvalError, EvalResult, Payload, Record, RecordRef};
use crate::runtime::system_error;

use super::Interpreter;

pub fn install(interp: &mut Interpreter) {
    let table: &[(&'static str, crate::record::BuiltinFn)] = &[
        ("print", builtin_print),
        ("len", builtin_len),
        ("typeof", builtin_typeof),
        ("str", builtin_str),
        ("int", builtin_int),
        ("float", builtin_float),
        ("random", builtin_random),
        ("sleep", builtin_sleep),
        ("spawn", builtin_spawn),
        ("join", builtin_join),
        ("collect", builtin_collect),
    ];
    for (name, handler) in table {
        let cell = interp.alloc(Record::make_builtin(*name, *handler));
        interp.declare(*name, cell);
    }
}

fn expect_one(mut args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    if args.len() != 1 {
        return Err(EvalError::new(
            ErrorKind::Arity {
                expected: 1,
                got: args.len(),
            },
            span,
        ));
    }
    Ok(args.remove(0))
}

fn builtin_print(interp: &mut Interpreter, args: Vec<RecordRef>, _span: Span) -> EvalResult<RecordRef> {
    let line = args
        .iter()
        .map(|a| a.lock().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    println!("{line}");
    Ok(interp.alloc(Record::make_undefined()))
}

fn builtin_len(interp: &mut Interpreter, args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    let arg = expect_one(args, span)?;
    let len = {
        let guard = arg.lock();
        match &guard.payload {
            Payload::Str(s) => s.chars().count(),
            Payload::Tuple(children) => children.len(),
            Payload::Object(children) => children.len(),
            Payload::Struct { fields, .. } => fields.len(),
            _ => {
                return Err(
                    EvalError::runtime(format!("len is not defined for {}", guard.kind)).at(span),
                )
            }
        }
    };
    Ok(interp.alloc(Record::make_int(len as u64)))
}

fn builtin_typeof(interp: &mut Interpreter, args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    let arg = expect_one(args, span)?;
    let name = {
        let guard = arg.lock();
        if guard.null {
            "null"
        } else {
            guard.kind.name()
        }
    };
    Ok(interp.alloc(Record::make_string(name)))
}

fn builtin_str(interp: &mut Interpreter, args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    let arg = expect_one(args, span)?;
    let text = arg.lock().to_string();
    Ok(interp.alloc(Record::make_string(text)))
}

fn builtin_int(interp: &mut Interpreter, args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    let arg = expect_one(args, span)?;
    let value = {
        let guard = arg.lock();
        if guard.is_nullish() {
            None
        } else {
            match &guard.payload {
                Payload::Str(s) => s.trim().parse().ok(),
                _ => guard.as_bigint(),
            }
        }
    };
    match value {
        Some(v) => Ok(interp.alloc(Record::make_int(v))),
        None => Ok(interp.alloc(Record::make_nan())),
    }
}

fn builtin_float(interp: &mut Interpreter, args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    let arg = expect_one(args, span)?;
    let value = {
        let guard = arg.lock();
        if guard.is_nullish() {
            None
        } else {
            match &guard.payload {
                Payload::Str(s) => s.trim().parse::<BigDecimal>().ok(),
                _ => guard.as_bigdecimal(),
            }
        }
    };
    match value {
        Some(v) => Ok(interp.alloc(Record::make_float(v))),
        None => Ok(interp.alloc(Record::make_nan())),
    }
}

fn builtin_random(interp: &mut Interpreter, args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    if !args.is_empty() {
        return Err(EvalError::new(
            ErrorKind::Arity {
                expected: 0,
                got: args.len(),
            },
            span,
        ));
    }
    let v = BigDecimal::try_from(fastrand::f64())
        .map_err(|e| EvalError::runtime(format!("random: {e}")).at(span))?;
    Ok(interp.alloc(Record::make_float(v)))
}

fn builtin_sleep(interp: &mut Interpreter, args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    let arg = expect_one(args, span)?;
    let millis = arg
        .lock()
        .as_bigint()
        .and_then(|v| v.to_u64())
        .ok_or_else(|| EvalError::runtime("sleep wants a millisecond count").at(span))?;
    std::thread::sleep(std::time::Duration::from_millis(millis));
    Ok(interp.alloc(Record::make_undefined()))
}

/// `spawn(f)` runs a zero-argument proc on its own OS thread, registered
/// as a child of the calling thread's node. Returns the child's id.
fn builtin_spawn(interp: &mut Interpreter, args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    let arg = expect_one(args, span)?;
    let proc = {
        let guard = arg.lock();
        match &guard.payload {
            Payload::Proc(p) => p.clone(),
            _ => return Err(EvalError::new(ErrorKind::NotCallable(guard.kind.name()), span)),
        }
    };
    let node = interp.ctx.new_thread_node(&interp.node);
    let id = node.id;
    let ctx = Arc::clone(&interp.ctx);
    let thread_node = Arc::clone(&node);
    let handle = std::thread::Builder::new()
        .name(format!("reel-{id}"))
        .spawn(move || {
            let mut worker = Interpreter::with_node(ctx, Arc::clone(&thread_node));
            let result = worker.call_proc(&proc, Vec::new(), Span::UNKNOWN);
            match &result {
                Ok(v) => thread_node.set_rax(v.clone()),
                Err(e) => thread_node.push_pending(e.clone()),
            }
            result
        })
        .map_err(|e| system_error(format!("cannot spawn thread: {e}")).at(span))?;
    node.attach(handle);
    Ok(interp.alloc(Record::make_int(id)))
}

/// `join(id)` blocks until the child thread finishes and yields its result.
/// An exception raised on the child surfaces here, on the joining thread.
fn builtin_join(interp: &mut Interpreter, args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    let arg = expect_one(args, span)?;
    let id = arg
        .lock()
        .as_bigint()
        .and_then(|v| v.to_u64())
        .ok_or_else(|| EvalError::runtime("join wants a thread id").at(span))?;
    interp.node.join_child(id).map_err(|e| e.at(span))
}

/// Force one sweep of the collector; yields the number of reclaimed slots.
fn builtin_collect(interp: &mut Interpreter, args: Vec<RecordRef>, span: Span) -> EvalResult<RecordRef> {
    if !args.is_empty() {
        return Err(EvalError::new(
            ErrorKind::Arity {
                expected: 0,
                got: args.len(),
            },
            span,
        ));
    }
    let reclaimed = interp.ctx.gc.clean();
    Ok(interp.alloc(Record::make_int(reclaimed as u64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser;
    use crate::runtime::RuntimeContext;

    fn run_display(source: &str) -> String {
        let tokens = lexer::lex(source).expect("lex");
        let module = parser::parse(tokens, source).expect("parse");
        let ctx = RuntimeContext::new();
        let mut interp = Interpreter::new(ctx);
        interp.run_module(&module).unwrap().lock().to_string()
    }

    #[test]
    fn len_of_strings_and_aggregates() {
        assert_eq!(run_display("len(\"hello\")"), "5");
        assert_eq!(run_display("len([1, 2, 3])"), "3");
        assert_eq!(run_display("len({a: 1})"), "1");
    }

    #[test]
    fn typeof_names_kinds() {
        assert_eq!(run_display("typeof(1)"), "int");
        assert_eq!(run_display("typeof(1.5)"), "float");
        assert_eq!(run_display("typeof(\"s\")"), "string");
        assert_eq!(run_display("typeof(null)"), "null");
        assert_eq!(run_display("typeof(nan)"), "nan");
        assert_eq!(run_display("typeof([1])"), "tuple");
    }

    #[test]
    fn typeof_respects_null_flag() {
        // a typed slot set to null keeps its kind but reads as null
        assert_eq!(run_display("var n: int = 1 n = null typeof(n)"), "null");
    }

    #[test]
    fn conversions() {
        assert_eq!(run_display("int(\"42\")"), "42");
        assert_eq!(run_display("int(3.9)"), "3");
        assert_eq!(run_display("int(\"oops\")"), "nan");
        assert_eq!(run_display("float(\"2.5\")"), "2.5");
        assert_eq!(run_display("str(12) + str(34)"), "1234");
    }

    #[test]
    fn random_is_a_unit_float() {
        let text = run_display("var r = random() r >= 0 && r < 1");
        assert_eq!(text, "1");
    }

    #[test]
    fn spawned_thread_exception_surfaces_at_join() {
        let source = "
            fun bad() { throw \"from child\" }
            var id = spawn(bad)
            var msg = \"\"
            try { join(id) } catch (e) { msg = e }
            msg
        ";
        assert_eq!(run_display(source), "from child");
    }

    #[test]
    fn collect_reports_reclaimed_count() {
        // numbers allocated in the loop are unreachable afterwards
        let source = "
            for (var i = 0; i < 5; i += 1) { var t = i * 2 }
            typeof(collect())
        ";
        assert_eq!(run_display(source), "int");
    }
}
