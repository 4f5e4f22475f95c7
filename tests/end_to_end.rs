//! Compila, enlaza y ejecuta programas reales.
//!
//! Requiere `gcc` en una máquina x86-64 con Linux. Los programas se
//! enlazan contra el `libruntime.a` del crate `runtime`, construido
//! una sola vez con cargo en un directorio propio. Si alguna de las
//! herramientas no está disponible, las pruebas terminan sin verificar
//! nada.

#![cfg(all(target_arch = "x86_64", target_os = "linux"))]

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::OnceLock,
};

use exprc::{
    codegen,
    link::{LinkOptions, Linker},
};

use tempfile::TempDir;

fn available(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Directorio que contiene `libruntime.a`, si se logró construir.
fn runtime_dir() -> Option<&'static Path> {
    static RUNTIME: OnceLock<Option<PathBuf>> = OnceLock::new();

    RUNTIME
        .get_or_init(|| {
            let target = Path::new(env!("CARGO_TARGET_TMPDIR")).join("runtime");
            let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");

            let status = Command::new(env!("CARGO"))
                .args(["build", "--offline", "--package", "runtime", "--manifest-path"])
                .arg(&manifest)
                .arg("--target-dir")
                .arg(&target)
                .status()
                .ok()?;

            let dir = target.join("debug");
            (status.success() && dir.join("libruntime.a").exists()).then_some(dir)
        })
        .as_deref()
}

/// Compila y ejecuta, retornando la salida estándar del programa.
fn run(text: &str, input: &str) -> Option<String> {
    if !available("gcc") {
        eprintln!("gcc not found, skipping");
        return None;
    }

    let runtime = match runtime_dir() {
        Some(runtime) => runtime,
        None => {
            eprintln!("libruntime.a could not be built, skipping");
            return None;
        }
    };

    let dir = TempDir::new().unwrap();

    let program = exprc::compile(text.as_bytes(), "e2e.src").unwrap();
    let executable = dir.path().join("program");

    let mut linker = Linker::spawn(&executable, runtime, LinkOptions::empty()).unwrap();
    codegen::emit(&program, linker.stdin()).unwrap();
    linker.finish().unwrap();

    let mut child = Command::new(&executable)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    Some(String::from_utf8(output.stdout).unwrap())
}

fn check(text: &str, expected: &str) {
    if let Some(output) = run(text, "") {
        assert_eq!(output, expected, "program: {}", text);
    }
}

#[test]
fn addition() {
    check("2 + 3", "5\n");
}

#[test]
fn boolean_or() {
    check("false or true", "true\n");
}

#[test]
fn arithmetic_edge_cases() {
    check("7 / 2", "3\n");
    check("-7 % 3", "-1\n");
    check("3000000000 + 1", "3000000001\n");
    check("not (1 == 2)", "true\n");
}

#[test]
fn loops_and_scopes() {
    check(
        "var a = 1; while true do { if a >= 10 then { break; }; a = a + 1; }; a",
        "10\n",
    );

    check("var x = 1; { var x = 2; print_int(x) }; x", "2\n1\n");
}

#[test]
fn operands_are_read_before_later_assignments() {
    check("var a = 1; a + (a = 5)", "6\n");
    check("var a = 2; var b = 0; b = a * { a = 10; a }; b", "20\n");
}

#[test]
fn reads_input() {
    if let Some(output) = run("var n = read_int(); n * 6", "7\n") {
        assert_eq!(output, "42\n");
    }
}
