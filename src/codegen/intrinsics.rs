//! Operadores y funciones de soporte con emisión en línea.
//!
//! Cada intrínseco recibe referencias a las ranuras de sus argumentos
//! y deja su resultado en `%rax`.

use std::io::{self, Write};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Intrinsic {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Neg,
    Not,
    PrintInt,
    PrintBool,
    ReadInt,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Self> {
        use Intrinsic::*;

        let intrinsic = match name {
            "+" => Add,
            "-" => Sub,
            "*" => Mul,
            "/" => Div,
            "%" => Mod,
            "<" => Less,
            "<=" => LessOrEqual,
            ">" => Greater,
            ">=" => GreaterOrEqual,
            "==" => Equal,
            "!=" => NotEqual,
            "and" => And,
            "or" => Or,
            "unary_-" => Neg,
            "unary_not" => Not,
            "print_int" => PrintInt,
            "print_bool" => PrintBool,
            "read_int" => ReadInt,
            _ => return None,
        };

        Some(intrinsic)
    }

    pub fn arity(self) -> usize {
        use Intrinsic::*;

        match self {
            ReadInt => 0,
            Neg | Not | PrintInt | PrintBool => 1,
            _ => 2,
        }
    }

    /// Emite el cuerpo del intrínseco. `arguments` debe tener exactamente
    /// [`Intrinsic::arity()`] elementos.
    pub fn emit<W: Write>(self, output: &mut W, arguments: &[String]) -> io::Result<()> {
        use Intrinsic::*;

        match (self, arguments) {
            (Add | Sub | Mul | And | Or, [left, right]) => {
                let opcode = match self {
                    Add => "addq",
                    Sub => "subq",
                    Mul => "imulq",
                    And => "andq",
                    _ => "orq",
                };

                emit!(output, "movq", "{}, %rax", left)?;
                emit!(output, opcode, "{}, %rax", right)
            }

            (Div | Mod, [left, right]) => {
                emit!(output, "movq", "{}, %rax", left)?;
                emit!(output, "cqto")?;
                emit!(output, "idivq", "{}", right)?;

                if self == Mod {
                    emit!(output, "movq", "%rdx, %rax")?;
                }

                Ok(())
            }

            (Less | LessOrEqual | Greater | GreaterOrEqual | Equal | NotEqual, [left, right]) => {
                let set = match self {
                    Less => "setl",
                    LessOrEqual => "setle",
                    Greater => "setg",
                    GreaterOrEqual => "setge",
                    Equal => "sete",
                    _ => "setne",
                };

                // `xorq` altera las banderas, debe ir antes de `cmpq`
                emit!(output, "xorq", "%rax, %rax")?;
                emit!(output, "movq", "{}, %rdx", left)?;
                emit!(output, "cmpq", "{}, %rdx", right)?;
                emit!(output, set, "%al")
            }

            (Neg, [operand]) => {
                emit!(output, "movq", "{}, %rax", operand)?;
                emit!(output, "negq", "%rax")
            }

            (Not, [operand]) => {
                emit!(output, "movq", "{}, %rax", operand)?;
                emit!(output, "xorq", "$1, %rax")
            }

            (PrintInt | PrintBool, [operand]) => {
                let target = if self == PrintInt {
                    "print_int"
                } else {
                    "print_bool"
                };

                emit!(output, "movq", "{}, %rdi", operand)?;
                emit!(output, "callq", "{}", target)
            }

            (ReadInt, []) => emit!(output, "callq", "read_int"),

            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{:?} expects {} arguments", self, self.arity()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_str(intrinsic: Intrinsic, arguments: &[&str]) -> String {
        let arguments: Vec<_> = arguments.iter().map(|argument| argument.to_string()).collect();
        let mut output = Vec::new();

        intrinsic.emit(&mut output, &arguments).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn names_and_arities() {
        assert_eq!(Intrinsic::from_name("<="), Some(Intrinsic::LessOrEqual));
        assert_eq!(Intrinsic::from_name("unary_not"), Some(Intrinsic::Not));
        assert_eq!(Intrinsic::from_name("f"), None);

        assert_eq!(Intrinsic::ReadInt.arity(), 0);
        assert_eq!(Intrinsic::Neg.arity(), 1);
        assert_eq!(Intrinsic::Equal.arity(), 2);
    }

    #[test]
    fn arithmetic() {
        assert_eq!(
            emit_str(Intrinsic::Sub, &["-8(%rbp)", "-16(%rbp)"]),
            "\tmovq    -8(%rbp), %rax\n\tsubq    -16(%rbp), %rax\n"
        );

        assert_eq!(
            emit_str(Intrinsic::Mod, &["-8(%rbp)", "-16(%rbp)"]),
            "\tmovq    -8(%rbp), %rax\n\tcqto\n\tidivq   -16(%rbp)\n\tmovq    %rdx, %rax\n"
        );
    }

    #[test]
    fn comparisons_clear_before_compare() {
        assert_eq!(
            emit_str(Intrinsic::Less, &["-8(%rbp)", "-16(%rbp)"]),
            "\txorq    %rax, %rax\n\tmovq    -8(%rbp), %rdx\n\
             \tcmpq    -16(%rbp), %rdx\n\tsetl    %al\n"
        );
    }

    #[test]
    fn support_calls() {
        assert_eq!(
            emit_str(Intrinsic::PrintBool, &["-8(%rbp)"]),
            "\tmovq    -8(%rbp), %rdi\n\tcallq   print_bool\n"
        );

        assert_eq!(emit_str(Intrinsic::ReadInt, &[]), "\tcallq   read_int\n");
    }

    #[test]
    fn wrong_arity_fails() {
        let mut output = Vec::new();
        assert!(Intrinsic::Add.emit(&mut output, &[]).is_err());
    }
}
