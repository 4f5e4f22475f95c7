//! Biblioteca de soporte para programas emitidos por `exprc`.
//!
//! # Propósito
//! Los programas compilados no realizan E/S por sí mismos. En su lugar
//! invocan a las funciones de esta biblioteca, la cual se enlaza
//! estáticamente (`libruntime.a`) en cada ejecutable.
//!
//! # Uso
//! `libruntime` exporta símbolos "unmangled" usando la convención de llamada
//! que use el lenguaje C en la plataforma objetivo. Es decir, el compilador no
//! necesita emitir código Rust para usar la biblioteca, sino que es suficiente
//! con conocer el símbolo de cada función, parámetros esperados y tipo de retorno.
//! Todos los valores son enteros de 64 bits; los booleanos son `0` o `1`.
//!
//! # Punto de entrada
//! Esta biblioteca no define `main()`. El compilador emite ese símbolo
//! y el entorno de C se encarga del resto.

pub mod builtin;
pub mod hosted;
