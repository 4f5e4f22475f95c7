//! Intérprete de árboles.
//!
//! Evalúa directamente un árbol sintáctico sobre la misma cadena de
//! alcances que usan las demás fases, con valores en tiempo de
//! ejecución como contenido. Sirve como referencia de semántica para
//! las pruebas y se expone en la CLI con `--interpret`.
//!
//! `break` y `continue` viajan por el camino de error como
//! [`Unwind`] hasta el ciclo más cercano.

use std::{
    fmt::{self, Display},
    io::{self, BufRead, Write},
};

use thiserror::Error;

use crate::{
    lex::Identifier,
    parse::{BinOp, Expr, ExprKind, Literal, UnaryOp},
    source::{Located, Location},
    symtab::SymbolTable,
};

/// Valor en tiempo de ejecución.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Unit,
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(integer) => write!(fmt, "{}", integer),
            Value::Bool(boolean) => write!(fmt, "{}", boolean),
            Value::Unit => fmt.write_str("unit"),
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Symbol `{0}` is undefined")]
    Undefined(Identifier),

    #[error("`{0}` used outside of a loop")]
    OutsideLoop(Identifier),

    #[error("Left-hand side of `=` must be a variable")]
    BadAssignment,

    #[error("Operation `{0}` cannot be applied to these values")]
    BadOperands(String),

    #[error("Unexpected end of input while reading an integer")]
    EndOfInput,

    #[error("Invalid integer in input: {0:?}")]
    BadInput(String),
}

/// Salida no local de una evaluación.
enum Unwind {
    Break,
    Continue,
    Error(Located<RuntimeError>),
}

impl From<Located<RuntimeError>> for Unwind {
    fn from(error: Located<RuntimeError>) -> Self {
        Unwind::Error(error)
    }
}

type Eval<T> = Result<T, Unwind>;

/// Evalúa un programa completo.
///
/// `read_int()` consume líneas de `input`; `print_int()` y
/// `print_bool()` escriben a `output`.
#[tracing::instrument(level = "debug", skip_all)]
pub fn interpret<R, W>(root: &Expr, input: R, output: W) -> Result<Value, Located<RuntimeError>>
where
    R: BufRead,
    W: Write,
{
    let mut interpreter = Interpreter {
        scope: SymbolTable::new(),
        input,
        output,
    };

    match interpreter.eval(root) {
        Ok(value) => {
            let flushed = interpreter.output.flush().map_err(RuntimeError::from);
            flushed.map_err(|error| Located::at(error, root.location.clone()))?;

            Ok(value)
        }

        Err(Unwind::Error(error)) => Err(error),

        // Ningún ciclo capturó la salida
        Err(Unwind::Break) => Err(outside_loop("break", &root.location)),
        Err(Unwind::Continue) => Err(outside_loop("continue", &root.location)),
    }
}

struct Interpreter<R, W> {
    scope: SymbolTable<Value>,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Interpreter<R, W> {
    fn eval(&mut self, expr: &Expr) -> Eval<Value> {
        let location = &expr.location;

        match &expr.kind {
            ExprKind::Literal(Literal::Int(integer)) => Ok(Value::Int(*integer)),
            ExprKind::Literal(Literal::Bool(boolean)) => Ok(Value::Bool(*boolean)),
            ExprKind::Literal(Literal::Unit) => Ok(Value::Unit),

            ExprKind::Identifier(id) => match id.as_ref() {
                "break" => Err(Unwind::Break),
                "continue" => Err(Unwind::Continue),
                name => match self.scope.lookup(name) {
                    Some(value) => Ok(*value),
                    None => fail(RuntimeError::Undefined(id.clone()), location),
                },
            },

            ExprKind::Binary(left, BinOp::Assign, right) => {
                let name = match &left.kind {
                    ExprKind::Identifier(id) if !matches!(id.as_ref(), "break" | "continue") => id,
                    _ => return fail(RuntimeError::BadAssignment, location),
                };

                let value = self.eval(right)?;
                match self.scope.lookup_mut(name.as_ref()) {
                    Some(slot) => *slot = value,
                    None => return fail(RuntimeError::Undefined(name.clone()), &left.location),
                }

                Ok(value)
            }

            ExprKind::Binary(left, op @ (BinOp::And | BinOp::Or), right) => {
                let short_circuit = *op == BinOp::Or;
                match self.eval(left)? {
                    Value::Bool(value) if value == short_circuit => Ok(Value::Bool(value)),
                    Value::Bool(_) => match self.eval(right)? {
                        Value::Bool(value) => Ok(Value::Bool(value)),
                        _ => fail(RuntimeError::BadOperands(op.to_string()), location),
                    },

                    _ => fail(RuntimeError::BadOperands(op.to_string()), location),
                }
            }

            ExprKind::Binary(left, op, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, left, right).map_err(|error| Located::at(error, location.clone()).into())
            }

            ExprKind::Unary(op, operand) => match (op, self.eval(operand)?) {
                (UnaryOp::Neg, Value::Int(integer)) => Ok(Value::Int(integer.wrapping_neg())),
                (UnaryOp::Not, Value::Bool(boolean)) => Ok(Value::Bool(!boolean)),
                _ => fail(RuntimeError::BadOperands(op.symbol().to_string()), location),
            },

            ExprKind::Condition {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.condition(condition)?;
                match (condition, otherwise) {
                    (true, None) => self.eval(then).map(|_| Value::Unit),
                    (true, Some(_)) => self.eval(then),
                    (false, Some(otherwise)) => self.eval(otherwise),
                    (false, None) => Ok(Value::Unit),
                }
            }

            ExprKind::Block { statements, result } => {
                self.scope.enter();
                let value = self.block(statements, result);
                self.scope.leave();

                value
            }

            ExprKind::Declaration { name, value, .. } => {
                let value = self.eval(value)?;
                self.scope.declare(name.clone(), value);

                Ok(Value::Unit)
            }

            ExprKind::Loop { condition, body } => {
                while self.condition(condition)? {
                    match self.eval(body) {
                        Ok(_) | Err(Unwind::Continue) => (),
                        Err(Unwind::Break) => break,
                        Err(error) => return Err(error),
                    }
                }

                Ok(Value::Unit)
            }

            ExprKind::Call { callee, arguments } => {
                let arguments = arguments
                    .iter()
                    .map(|argument| self.eval(argument))
                    .collect::<Eval<Vec<_>>>()?;

                self.call(callee, &arguments)
                    .map_err(|error| Located::at(error, location.clone()).into())
            }
        }
    }

    fn block(&mut self, statements: &[Expr], result: &Expr) -> Eval<Value> {
        for statement in statements {
            self.eval(statement)?;
        }

        self.eval(result)
    }

    fn condition(&mut self, condition: &Expr) -> Eval<bool> {
        match self.eval(condition)? {
            Value::Bool(value) => Ok(value),
            _ => fail(RuntimeError::BadOperands(String::from("if")), &condition.location),
        }
    }

    fn call(&mut self, callee: &Identifier, arguments: &[Value]) -> Result<Value, RuntimeError> {
        match (callee.as_ref(), arguments) {
            ("print_int", [Value::Int(integer)]) => {
                writeln!(self.output, "{}", integer)?;
                Ok(Value::Unit)
            }

            ("print_bool", [Value::Bool(boolean)]) => {
                writeln!(self.output, "{}", boolean)?;
                Ok(Value::Unit)
            }

            ("read_int", []) => {
                self.output.flush()?;

                let mut line = String::new();
                if self.input.read_line(&mut line)? == 0 {
                    return Err(RuntimeError::EndOfInput);
                }

                let line = line.trim();
                line.parse()
                    .map(Value::Int)
                    .map_err(|_| RuntimeError::BadInput(line.to_string()))
            }

            ("print_int" | "print_bool" | "read_int", _) => {
                Err(RuntimeError::BadOperands(callee.to_string()))
            }

            _ => Err(RuntimeError::Undefined(callee.clone())),
        }
    }
}

/// Operadores binarios estrictos. La aritmética es modular en 64 bits.
fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    use Value::{Bool, Int};

    let value = match (op, left, right) {
        (BinOp::Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (BinOp::Sub, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (BinOp::Mul, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (BinOp::Div | BinOp::Mod, Int(_), Int(0)) => return Err(RuntimeError::DivisionByZero),
        (BinOp::Div, Int(a), Int(b)) => Int(a.wrapping_div(b)),
        (BinOp::Mod, Int(a), Int(b)) => Int(a.wrapping_rem(b)),
        (BinOp::Less, Int(a), Int(b)) => Bool(a < b),
        (BinOp::LessOrEqual, Int(a), Int(b)) => Bool(a <= b),
        (BinOp::Greater, Int(a), Int(b)) => Bool(a > b),
        (BinOp::GreaterOrEqual, Int(a), Int(b)) => Bool(a >= b),
        (BinOp::Equal, a, b) if same_type(a, b) => Bool(a == b),
        (BinOp::NotEqual, a, b) if same_type(a, b) => Bool(a != b),
        (op, _, _) => return Err(RuntimeError::BadOperands(op.to_string())),
    };

    Ok(value)
}

fn same_type(a: Value, b: Value) -> bool {
    std::mem::discriminant(&a) == std::mem::discriminant(&b)
}

fn fail<T>(error: RuntimeError, location: &Location) -> Eval<T> {
    Err(Unwind::Error(Located::at(error, location.clone())))
}

fn outside_loop(name: &str, location: &Location) -> Located<RuntimeError> {
    Located::at(RuntimeError::OutsideLoop(name.into()), location.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, parse, source};

    fn run_with_input(text: &str, input: &str) -> (Result<Value, Located<RuntimeError>>, String) {
        let (start, stream) = source::consume(text.as_bytes(), "test");
        let tokens = Lexer::new(start.clone(), stream).tokenize().unwrap();
        let ast = parse::parse(start, &tokens).unwrap();

        let mut output = Vec::new();
        let result = interpret(&ast, input.as_bytes(), &mut output);

        (result, String::from_utf8(output).unwrap())
    }

    fn run(text: &str) -> Value {
        run_with_input(text, "").0.unwrap()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(run("1 + 2 * 3"), Value::Int(7));
        assert_eq!(run("(1 + 2) * 3"), Value::Int(9));
        assert_eq!(run("7 / 2"), Value::Int(3));
        assert_eq!(run("-7 % 3"), Value::Int(-1));
        assert_eq!(run("- -5"), Value::Int(5));
    }

    #[test]
    fn comparisons_and_equality() {
        assert_eq!(run("1 < 2"), Value::Bool(true));
        assert_eq!(run("2 <= 1"), Value::Bool(false));
        assert_eq!(run("true == true"), Value::Bool(true));
        assert_eq!(run("1 != 1"), Value::Bool(false));
        assert_eq!(run("not false"), Value::Bool(true));
    }

    #[test]
    fn loop_with_break() {
        let program = "var a = 1; while true do { if a >= 10 then { break; }; a = a + 1; }; a";
        assert_eq!(run(program), Value::Int(10));
    }

    #[test]
    fn loop_with_continue() {
        let program = "
            var i = 0;
            var sum = 0;
            while i < 10 do {
                i = i + 1;
                if i % 2 == 0 then continue;
                sum = sum + i;
            };
            sum
        ";

        assert_eq!(run(program), Value::Int(25));
    }

    #[test]
    fn short_circuit_skips_side_effects() {
        let (result, output) = run_with_input("false and { print_int(1); true }", "");
        assert_eq!(result.unwrap(), Value::Bool(false));
        assert_eq!(output, "");

        let (result, output) = run_with_input("true or { print_int(2); true }", "");
        assert_eq!(result.unwrap(), Value::Bool(true));
        assert_eq!(output, "");

        let (result, output) = run_with_input("true and { print_int(3); false }", "");
        assert_eq!(result.unwrap(), Value::Bool(false));
        assert_eq!(output, "3\n");
    }

    #[test]
    fn scopes() {
        assert_eq!(run("var x = 1; { var x = 2; x = 3 }; x"), Value::Int(1));
        assert_eq!(run("var x = 1; { x = 3 }; x"), Value::Int(3));

        let (result, _) = run_with_input("{ var y = 1 }; y", "");
        assert!(matches!(result.unwrap_err().val(), RuntimeError::Undefined(_)));
    }

    #[test]
    fn conditions() {
        assert_eq!(run("if 1 < 2 then 3 else 4"), Value::Int(3));
        assert_eq!(run("if false then 3"), Value::Unit);
        assert_eq!(run("if true then 3"), Value::Unit);
    }

    #[test]
    fn intrinsics() {
        let (result, output) = run_with_input("var x = read_int(); print_int(x * 2); print_bool(x > 3)", "21\n");
        assert_eq!(result.unwrap(), Value::Unit);
        assert_eq!(output, "42\ntrue\n");

        let (result, _) = run_with_input("read_int()", "");
        assert!(matches!(result.unwrap_err().val(), RuntimeError::EndOfInput));

        let (result, _) = run_with_input("read_int()", "twelve\n");
        assert!(matches!(result.unwrap_err().val(), RuntimeError::BadInput(_)));
    }

    #[test]
    fn division_by_zero() {
        let (result, _) = run_with_input("1 / (2 - 2)", "");
        let error = result.unwrap_err();

        assert!(matches!(error.val(), RuntimeError::DivisionByZero));
        assert_eq!(error.location().start().to_string(), "1:3");
    }

    #[test]
    fn loop_control_outside_loop() {
        let (result, _) = run_with_input("break", "");
        assert!(matches!(result.unwrap_err().val(), RuntimeError::OutsideLoop(_)));
    }
}
