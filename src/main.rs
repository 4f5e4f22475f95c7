//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, bail, Context};
use clap::{crate_version, Arg, ArgMatches, Command};
use exprc::{
    codegen,
    error::Diagnostics,
    interp::{self, Value},
    irgen,
    link::{LinkOptions, Linker},
    semantic::Signatures,
};

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
    process,
};

fn main() -> anyhow::Result<()> {
    init_tracing();

    // Parsing de CLI
    let args = Command::new("exprc")
        .version(crate_version!())
        .about("Expression language compiler for x86-64")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .default_value("-")
                .help("Source file ('-' for stdin)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("FILE")
                .help("Output file ('-' along with -S or --ir for stdout)"),
        )
        .arg(
            Arg::new("asm")
                .short('S')
                .help("Generate assembly instead of linking"),
        )
        .arg(
            Arg::new("ir")
                .long("ir")
                .conflicts_with("asm")
                .help("Dump intermediate representation instead of linking"),
        )
        .arg(
            Arg::new("interpret")
                .short('i')
                .long("interpret")
                .conflicts_with_all(&["asm", "ir", "output"])
                .help("Evaluate the program instead of compiling it"),
        )
        .arg(Arg::new("strip").short('s').help("Strip executables"))
        .arg(
            Arg::new("library")
                .short('L')
                .takes_value(true)
                .value_name("DIR")
                .help("Directory containing libruntime.a (default: next to exprc)"),
        )
        .get_matches();

    // `default_value` garantiza que siempre hay entrada
    let input = args.value_of("input").unwrap_or("-");
    let reader: Box<dyn BufRead> = match input {
        "-" => Box::new(BufReader::new(io::stdin())),
        path => {
            let file = File::open(path).with_context(|| format!("Failed to open: {}", path))?;
            Box::new(BufReader::new(file))
        }
    };

    let name = if input == "-" { "<stdin>" } else { input };
    let ast = exprc::analyze(reader, name).unwrap_or_else(|diagnostics| fail(diagnostics));

    if args.is_present("interpret") {
        let stdout = io::stdout();
        let stdin = io::stdin();

        let value = interp::interpret(&ast, stdin.lock(), stdout.lock())
            .unwrap_or_else(|error| fail(Diagnostics::from(error).kind("Runtime error")));

        // Mismo comportamiento que un ejecutable compilado
        if value != Value::Unit {
            println!("{}", value);
        }

        return Ok(());
    }

    let program = irgen::generate_program(&Signatures::root(), &ast)
        .unwrap_or_else(|error| fail(Diagnostics::from(error).kind("Code generation error")));

    let output = args.value_of("output");
    match (args.is_present("ir"), args.is_present("asm"), output) {
        // Listado de IR, sin enlazado
        (true, _, output) => {
            let mut writer = open_output(output)?;
            write!(writer, "{}", program).context("Failed to write IR listing")?;
            writer.flush().context("Failed to write IR listing")?;
        }

        // Ensamblador, sin enlazado
        (false, true, output) => {
            let mut writer = open_output(output)?;
            codegen::emit(&program, &mut writer).context("Internal compiler error")?;
        }

        // Salida a stdout con enlazado
        (false, false, Some("-")) => bail!("Refusing to write executable to stdout"),

        // Salida a archivo con enlazado
        (false, false, path) => {
            let path = path.unwrap_or("a.out");
            let library_dir = library_dir(&args)?;

            let mut options = LinkOptions::empty();
            if args.is_present("strip") {
                options |= LinkOptions::STRIP;
            }

            let mut linker = Linker::spawn(path, &library_dir, options).context("Failed to link")?;
            codegen::emit(&program, linker.stdin())
                .context("Failed to emit assembly to assembler")?;

            linker
                .finish()
                .with_context(|| format!("Failed to generate executable: {}", path))?;
        }
    };

    Ok(())
}

/// Instala el suscriptor de `tracing` solo si `RUST_LOG` está definida.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

/// Reporta errores de compilación y termina el proceso.
fn fail(diagnostics: Diagnostics) -> ! {
    eprint!("{}", diagnostics);
    process::exit(1)
}

fn open_output(output: Option<&str>) -> anyhow::Result<Box<dyn Write>> {
    match output {
        None | Some("-") => Ok(Box::new(io::stdout())),
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            Ok(Box::new(io::BufWriter::new(file)))
        }
    }
}

/// Ruta de búsqueda de `libruntime.a`.
///
/// Por defecto es el directorio del ejecutable del compilador, que es
/// donde cargo coloca la biblioteca de soporte.
fn library_dir(args: &ArgMatches) -> anyhow::Result<PathBuf> {
    if let Some(dir) = args.value_of("library") {
        return Ok(PathBuf::from(dir));
    }

    let mut path = std::env::current_exe().context("Failed to locate compiler executable")?;
    path.pop(); // "<...>/exprc" => "<...>"

    Ok(path)
}
