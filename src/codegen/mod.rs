//! Generación de código ensamblador.
//!
//! Traduce un [`Program`] en IR a un módulo de ensamblador x86-64 en
//! sintaxis AT&T, apto para GNU as. No hay asignación de registros:
//! cada variable de IR vive en una ranura fija de 8 bytes bajo `%rbp`
//! (ver [`Locals`]).
//!
//! El módulo completo se genera en memoria antes de escribirse, por
//! lo cual un error nunca deja salida parcial.

use std::{
    collections::HashMap,
    io::{self, Write},
};

use thiserror::Error;

use crate::ir::{Function, Instruction, Label, Program, Var};

mod intrinsics;
mod x86_64;

pub use intrinsics::Intrinsic;

/// Tamaño de cada ranura de variable, en bytes.
pub const SLOT_SIZE: u32 = 8;

/// Alineamiento de stack requerido por la ABI en cada llamada.
const STACK_ALIGNMENT: u32 = 16;

/// Funciones de soporte que provee `libruntime`.
pub const EXTERNS: &[&str] = &["print_int", "print_bool", "read_int"];

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Variable `{0}` has no stack slot")]
    UndefinedLocal(String),

    #[error("Call to `{function}` passes {count} arguments, at most 6 are supported")]
    TooManyArguments { function: String, count: usize },

    #[error("Unsupported instruction: {0}")]
    Unsupported(String),
}

/// Escribe el módulo de ensamblador de un programa.
#[tracing::instrument(level = "debug", skip_all)]
pub fn emit<W: Write>(program: &Program, output: &mut W) -> Result<(), CodegenError> {
    let mut buffer = Vec::new();
    write_module(program, &mut buffer)?;

    tracing::debug!(bytes = buffer.len(), "assembly generated");
    output.write_all(&buffer)?;
    output.flush()?;

    Ok(())
}

/// Como [`emit()`], pero retorna el texto del módulo.
pub fn generate_assembly(program: &Program) -> Result<String, CodegenError> {
    let mut buffer = Vec::new();
    write_module(program, &mut buffer)?;

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn write_module<W: Write>(program: &Program, output: &mut W) -> Result<(), CodegenError> {
    for name in EXTERNS {
        writeln!(output, ".extern {}", name)?;
    }

    writeln!(output, ".section .text")?;

    for function in &program.functions {
        writeln!(output)?;
        writeln!(output, ".global {}", function.name)?;
        writeln!(output, ".type {}, @function", function.name)?;
        writeln!(output, "{}:", function.name)?;

        x86_64::emit_function(output, function)?;
    }

    // Sin esta sección el enlazador asume un stack ejecutable
    writeln!(output)?;
    writeln!(output, ".section .note.GNU-stack,\"\",@progbits")?;

    Ok(())
}

/// Disposición del stack frame de una función.
///
/// Cada variable distinta que aparece como operando recibe una ranura
/// propia, en orden de primera aparición: `-8(%rbp)`, `-16(%rbp)`, etc.
pub struct Locals {
    slots: HashMap<Var, i64>,
    order: Vec<Var>,
}

impl Locals {
    pub fn new(instructions: &[Instruction]) -> Self {
        let mut slots = HashMap::new();
        let mut order = Vec::new();

        for var in instructions.iter().flat_map(Instruction::variables) {
            if !slots.contains_key(var) {
                let offset = -((order.len() as i64 + 1) * SLOT_SIZE as i64);
                slots.insert(var.clone(), offset);
                order.push(var.clone());
            }
        }

        Locals { slots, order }
    }

    /// Referencia de memoria a la ranura de una variable.
    pub fn get_ref(&self, var: &Var) -> Result<String, CodegenError> {
        self.slots
            .get(var)
            .map(|offset| format!("{}(%rbp)", offset))
            .ok_or_else(|| CodegenError::UndefinedLocal(var.name().to_owned()))
    }

    /// Bytes de stack que ocupan las ranuras, alineados a 16.
    pub fn stack_used(&self) -> u32 {
        let used = self.order.len() as u32 * SLOT_SIZE;
        (used + STACK_ALIGNMENT - 1) / STACK_ALIGNMENT * STACK_ALIGNMENT
    }

    /// Variables en orden de ranura.
    pub fn iter(&self) -> impl Iterator<Item = &Var> {
        self.order.iter()
    }
}

fn emit_label<W: Write>(output: &mut W, function: &Function, label: &Label) -> io::Result<()> {
    writeln!(output, "{}:", label_symbol(function, label))
}

fn label_symbol(function: &Function, label: &Label) -> String {
    format!(".L{}.{}", function.name, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::Type;

    fn var(name: &str) -> Var {
        Var::new(name, Type::Int)
    }

    #[test]
    fn slots_in_first_appearance_order() {
        let (a, b, c) = (var("x1"), var("x2"), var("x3"));
        let locals = Locals::new(&[
            Instruction::LoadIntConst(1, a.clone()),
            Instruction::Copy(a.clone(), b.clone()),
            Instruction::Call {
                target: var("+"),
                arguments: vec![b.clone(), a.clone()],
                output: c.clone(),
            },
        ]);

        assert_eq!(locals.get_ref(&a).unwrap(), "-8(%rbp)");
        assert_eq!(locals.get_ref(&b).unwrap(), "-16(%rbp)");
        assert_eq!(locals.get_ref(&c).unwrap(), "-24(%rbp)");
        assert_eq!(locals.iter().count(), 3);

        // El objetivo de una llamada no ocupa ranura
        assert!(matches!(
            locals.get_ref(&var("+")),
            Err(CodegenError::UndefinedLocal(name)) if name == "+"
        ));
    }

    #[test]
    fn frame_size_rounds_to_sixteen() {
        let frame = |count: usize| {
            let body: Vec<_> = (0..count)
                .map(|i| Instruction::LoadIntConst(0, var(&format!("x{}", i))))
                .collect();

            Locals::new(&body).stack_used()
        };

        assert_eq!(frame(0), 0);
        assert_eq!(frame(1), 16);
        assert_eq!(frame(2), 16);
        assert_eq!(frame(3), 32);
        assert_eq!(frame(4), 32);
    }

    #[test]
    fn distinct_slots_are_aligned() {
        let body: Vec<_> = (0..10)
            .map(|i| Instruction::LoadIntConst(i, var(&format!("x{}", i))))
            .collect();

        let locals = Locals::new(&body);
        let mut offsets: Vec<_> = locals.iter().map(|var| locals.slots[var]).collect();

        assert!(offsets.iter().all(|offset| offset % 8 == 0 && *offset < 0));
        offsets.dedup();
        assert_eq!(offsets.len(), 10);
    }

    #[test]
    fn module_layout() {
        let x = var("x1");
        let program = Program::main(vec![Instruction::LoadIntConst(5, x)]);
        let asm = generate_assembly(&program).unwrap();

        let expected = "\
.extern print_int
.extern print_bool
.extern read_int
.section .text

.global main
.type main, @function
main:
\tpushq   %rbp
\tmovq    %rsp, %rbp
\tsubq    $16, %rsp
\t# x1 in -8(%rbp)

\t# LoadIntConst(5, x1)
\tmovq    $5, -8(%rbp)

\tmovq    $0, %rax
\tmovq    %rbp, %rsp
\tpopq    %rbp
\tret

.section .note.GNU-stack,\"\",@progbits
";

        assert_eq!(asm, expected);
    }
}
