use std::io::Write;
use std::process::Command;

fn reel() -> Command {
    Command::new(env!("CARGO_BIN_EXE_reel"))
}

// --- Inline source ---

#[test]
fn eval_prints_final_value() {
    let out = reel()
        .args(["-e", "6 * 7", "--print"])
        .output()
        .expect("failed to run reel");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "42");
}

#[test]
fn print_builtin_writes_stdout() {
    let out = reel()
        .args(["-e", "print(\"hello\", 1 + 1)"])
        .output()
        .expect("failed to run reel");
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello 2");
}

#[test]
fn bignum_arithmetic_through_cli() {
    let out = reel()
        .args(["-e", "2 ** 100", "--print"])
        .output()
        .expect("failed to run reel");
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout).trim(),
        "1267650600228229401496703205376"
    );
}

#[test]
fn classes_run_end_to_end() {
    let source = "
        class Counter {
            var n = 0
            fun bump() { this.n += 1 return this.n }
        }
        var c = Counter()
        c.bump() c.bump()
        print(c.bump())
    ";
    let out = reel().args(["-e", source]).output().expect("failed to run reel");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "3");
}

// --- Emit modes ---

#[test]
fn emit_ast_outputs_json() {
    let out = reel()
        .args(["-e", "var x = 1", "--emit", "ast"])
        .output()
        .expect("failed to run reel");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\"Var\""), "expected AST JSON, got: {stdout}");
    assert!(stdout.contains("\"name\": \"x\""), "got: {stdout}");
}

#[test]
fn emit_tape_outputs_listing() {
    let out = reel()
        .args(["-e", "var x = 1 if (x) { x = 2 }", "--emit", "tape"])
        .output()
        .expect("failed to run reel");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("ent"), "expected tape listing, got: {stdout}");
    assert!(stdout.contains("psave"), "got: {stdout}");
    assert!(stdout.contains("jz"), "got: {stdout}");
}

// --- Script files ---

#[test]
fn runs_a_script_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        "fun fib(n) {{ return n < 2 ? n : fib(n - 1) + fib(n - 2) }} print(fib(15))"
    )
    .unwrap();
    let out = reel()
        .arg(file.path())
        .output()
        .expect("failed to run reel");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "610");
}

#[test]
fn missing_file_fails_with_message() {
    let out = reel()
        .arg("no-such-file.reel")
        .output()
        .expect("failed to run reel");
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("error reading"));
}

// --- Diagnostics ---

#[test]
fn parse_error_renders_with_caret() {
    let out = reel()
        .args(["--no-color", "-e", "var = 5"])
        .output()
        .expect("failed to run reel");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error:"), "stderr: {stderr}");
    assert!(stderr.contains('^'), "expected caret in: {stderr}");
    assert!(!stderr.contains("\x1b["), "expected no ANSI codes: {stderr:?}");
}

#[test]
fn runtime_error_names_the_failure() {
    let out = reel()
        .args(["--no-color", "-e", "5 / 0"])
        .output()
        .expect("failed to run reel");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("floating point exception"),
        "stderr: {stderr}"
    );
}

#[test]
fn uncaught_throw_reports_value() {
    let out = reel()
        .args(["--no-color", "-e", "throw \"kaboom\""])
        .output()
        .expect("failed to run reel");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("kaboom"), "stderr: {stderr}");
}

// --- Threads ---

#[test]
fn spawn_join_through_cli() {
    let source = "
        fun work() {
            var total = 0
            for (var i = 1; i <= 100; i += 1) { total += i }
            return total
        }
        var a = spawn(work)
        var b = spawn(work)
        print(join(a) + join(b))
    ";
    let out = reel().args(["-e", source]).output().expect("failed to run reel");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "10100");
}
