//! Interfaz pública.
//!
//! Las funciones en este módulo están diseñadas para ser
//! invocadas en la forma descrita en la documentación
//! top-level de este crate. Es necesario que todas sean
//! tanto `#[no_mangle]` como `extern "C"`.
//!
//! La lógica vive en [`crate::hosted`], donde puede probarse
//! sin depender de la entrada y salida estándar del proceso.

use std::{
    io::{self, Write},
    process,
};

use crate::hosted;

/// Imprime un entero seguido de un salto de línea.
#[no_mangle]
pub extern "C" fn print_int(value: i64) {
    let stdout = io::stdout();
    report(hosted::print_int(&mut stdout.lock(), value));
}

/// Imprime `true` o `false`. Cualquier valor distinto de cero es verdadero.
#[no_mangle]
pub extern "C" fn print_bool(value: i64) {
    let stdout = io::stdout();
    report(hosted::print_bool(&mut stdout.lock(), value));
}

/// Lee un entero de una línea de la entrada estándar.
///
/// El proceso aborta si la entrada termina o no contiene un entero.
#[no_mangle]
pub extern "C" fn read_int() -> i64 {
    // Lo que ya se imprimió debe verse antes de bloquear
    let _ = io::stdout().flush();

    let stdin = io::stdin();
    match hosted::read_int(&mut stdin.lock()) {
        Ok(value) => value,
        Err(error) => {
            eprintln!("read_int: {}", error);
            process::abort();
        }
    }
}

fn report(result: io::Result<()>) {
    if let Err(error) = result {
        eprintln!("libruntime: failed to write to stdout: {}", error);
        process::abort();
    }
}
