//! Compilador de un lenguaje de expresiones a x86-64.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un AST por medio de análisis sintáctico en [`parse`].
//! El árbol sintáctico es anotado con tipos por análisis semántico en
//! [`semantic`]. Los nombres se resuelven con la cadena de alcances de
//! [`symtab`], común a todas las fases.
//!
//! # Back end
//! El árbol anotado se aplana en [`irgen`] a la representación
//! intermedia descrita en [`ir`]. En [`codegen`] esa representación
//! se traduce a ensamblador x86-64, con una ranura de stack fija por
//! variable. El ensamblado y el enlazado contra `libruntime` se
//! delegan a `gcc` en [`link`].
//!
//! # Intérprete
//! [`interp`] evalúa el árbol directamente, sin pasar por el back end.

#[macro_use]
mod macros;

pub mod codegen;
pub mod error;
pub mod interp;
pub mod ir;
pub mod irgen;
pub mod lex;
pub mod link;
pub mod parse;
pub mod semantic;
pub mod source;
pub mod symtab;

use std::io::BufRead;

use error::Diagnostics;
use lex::Lexer;
use parse::Expr;
use semantic::Signatures;

/// Ejecuta el front end: análisis léxico, sintáctico y semántico.
///
/// El árbol resultante está completamente anotado con tipos.
pub fn analyze<R: BufRead>(reader: R, name: &str) -> Result<Expr, Diagnostics> {
    let (start, stream) = source::consume(reader, name);

    let tokens = Lexer::new(start.clone(), stream)
        .tokenize()
        .map_err(|error| Diagnostics::from(error).kind("Lexical error"))?;

    let mut ast = parse::parse(start, &tokens)
        .map_err(|error| Diagnostics::from(error).kind("Syntax error"))?;

    semantic::typecheck(&mut ast, &Signatures::root())
        .map_err(|error| Diagnostics::from(error).kind("Semantic error"))?;

    Ok(ast)
}

/// Compila un programa completo hasta representación intermedia.
pub fn compile<R: BufRead>(reader: R, name: &str) -> Result<ir::Program, Diagnostics> {
    let ast = analyze(reader, name)?;
    irgen::generate_program(&Signatures::root(), &ast)
        .map_err(|error| Diagnostics::from(error).kind("Code generation error"))
}
