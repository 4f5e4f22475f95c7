//! Representación intermedia.
//!
//! El código intermedio es una secuencia plana de instrucciones por
//! función, sin estructuras anidadas. Las variables son nombres únicos
//! con un tipo estático; el control de flujo se expresa únicamente con
//! etiquetas y saltos.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use crate::semantic::Type;

/// Variable de IR.
///
/// Las variables raíz (operadores e intrínsecos) llevan el tipo de
/// retorno de su firma y nunca son destino de una instrucción.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Var {
    name: Rc<str>,
    typ: Type,
}

impl Var {
    pub fn new(name: &str, typ: Type) -> Self {
        Var {
            name: name.into(),
            typ,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn typ(&self) -> Type {
        self.typ
    }
}

impl Display for Var {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.name)
    }
}

/// Etiqueta de salto, única dentro de una función.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(Rc<str>);

impl Label {
    pub fn new(name: &str) -> Self {
        Label(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    LoadIntConst(i64, Var),
    LoadBoolConst(bool, Var),
    Copy(Var, Var),

    Call {
        target: Var,
        arguments: Vec<Var>,
        output: Var,
    },

    Jump(Label),
    CondJump(Var, Label, Label),
    SetLabel(Label),
}

impl Instruction {
    /// Variables que la instrucción lee o escribe.
    ///
    /// El objetivo de una llamada es un símbolo y no se incluye.
    pub fn variables(&self) -> Vec<&Var> {
        use Instruction::*;

        match self {
            LoadIntConst(_, output) | LoadBoolConst(_, output) => vec![output],
            Copy(source, output) => vec![source, output],
            Call {
                arguments, output, ..
            } => arguments.iter().chain(Some(output)).collect(),

            CondJump(condition, _, _) => vec![condition],
            Jump(_) | SetLabel(_) => vec![],
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self {
            LoadIntConst(value, output) => write!(fmt, "LoadIntConst({}, {})", value, output),
            LoadBoolConst(value, output) => write!(fmt, "LoadBoolConst({}, {})", value, output),
            Copy(source, output) => write!(fmt, "Copy({}, {})", source, output),

            Call {
                target,
                arguments,
                output,
            } => {
                write!(fmt, "Call({}, [", target)?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        fmt.write_str(", ")?;
                    }

                    argument.fmt(fmt)?;
                }

                write!(fmt, "], {})", output)
            }

            Jump(label) => write!(fmt, "Jump({})", label),
            CondJump(condition, then, otherwise) => {
                write!(fmt, "CondJump({}, {}, {})", condition, then, otherwise)
            }

            SetLabel(label) => write!(fmt, "Label({})", label),
        }
    }
}

pub struct Function {
    pub name: String,
    pub body: Vec<Instruction>,
}

pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    /// Programa de una única función `main`.
    pub fn main(body: Vec<Instruction>) -> Self {
        Program {
            functions: vec![Function {
                name: String::from("main"),
                body,
            }],
        }
    }
}

impl Display for Program {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for function in &self.functions {
            writeln!(fmt, "{}:", function.name)?;
            for instruction in &function.body {
                match instruction {
                    Instruction::SetLabel(_) => writeln!(fmt, "{}", instruction)?,
                    _ => writeln!(fmt, "    {}", instruction)?,
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_operands_exclude_target() {
        let (a, b, out) = (
            Var::new("x1", Type::Int),
            Var::new("x2", Type::Int),
            Var::new("x3", Type::Int),
        );

        let call = Instruction::Call {
            target: Var::new("+", Type::Int),
            arguments: vec![a.clone(), b.clone()],
            output: out.clone(),
        };

        assert_eq!(call.variables(), vec![&a, &b, &out]);
        assert_eq!(call.to_string(), "Call(+, [x1, x2], x3)");
    }

    #[test]
    fn rendering() {
        let x = Var::new("x1", Type::Bool);
        let (then, otherwise) = (Label::new("then1"), Label::new("else2"));

        assert_eq!(
            Instruction::LoadBoolConst(true, x.clone()).to_string(),
            "LoadBoolConst(true, x1)"
        );

        assert_eq!(
            Instruction::CondJump(x, then.clone(), otherwise).to_string(),
            "CondJump(x1, then1, else2)"
        );

        assert_eq!(Instruction::SetLabel(then.clone()).to_string(), "Label(then1)");
        assert_eq!(Instruction::Jump(then).to_string(), "Jump(then1)");
    }

    #[test]
    fn program_listing() {
        let x = Var::new("x1", Type::Int);
        let program = Program::main(vec![
            Instruction::SetLabel(Label::new("start1")),
            Instruction::LoadIntConst(7, x),
        ]);

        assert_eq!(program.to_string(), "main:\nLabel(start1)\n    LoadIntConst(7, x1)\n");
    }
}
