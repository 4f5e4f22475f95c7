//! Análisis semántico.
//!
//! Se verifica que cada operador y cada función se aplique sobre
//! operandos de los tipos correctos según una tabla global de firmas,
//! y se anota en el árbol el tipo estático de cada nodo. El análisis
//! se detiene en el primer error.

use thiserror::Error;

use std::{
    collections::HashMap,
    fmt::{self, Display},
};

use crate::{
    lex::Identifier,
    parse::{BinOp, Expr, ExprKind, Literal},
    source::Located,
    symtab::SymbolTable,
};

/// Tipo estático de un valor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
    Unit,
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => fmt.write_str("Int"),
            Type::Bool => fmt.write_str("Bool"),
            Type::Unit => fmt.write_str("Unit"),
        }
    }
}

/// Forma de los parámetros de una firma.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Parameters {
    /// Tipos exactos, en orden.
    Exact(Vec<Type>),

    /// Dos operandos de cualquier tipo, siempre que sea el mismo.
    SamePair,
}

/// Firma de un operador o función.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub parameters: Parameters,
    pub returns: Type,
}

impl Signature {
    fn exact(parameters: &[Type], returns: Type) -> Self {
        Signature {
            parameters: Parameters::Exact(parameters.to_vec()),
            returns,
        }
    }

    /// Determina si los argumentos dados satisfacen la firma.
    pub fn accepts(&self, arguments: &[Type]) -> bool {
        match &self.parameters {
            Parameters::Exact(parameters) => parameters == arguments,
            Parameters::SamePair => matches!(arguments, [first, second] if first == second),
        }
    }
}

/// Tabla global de firmas: operadores e intrínsecos.
#[derive(Clone, Debug)]
pub struct Signatures(HashMap<Identifier, Signature>);

impl Signatures {
    /// Firmas predefinidas del lenguaje.
    pub fn root() -> Self {
        use Type::*;

        let mut table = HashMap::new();
        let mut define = |name: &str, signature| {
            table.insert(Identifier::new(name), signature);
        };

        for op in ["+", "-", "*", "/", "%"] {
            define(op, Signature::exact(&[Int, Int], Int));
        }

        for op in ["<", "<=", ">", ">="] {
            define(op, Signature::exact(&[Int, Int], Bool));
        }

        for op in ["==", "!="] {
            define(
                op,
                Signature {
                    parameters: Parameters::SamePair,
                    returns: Bool,
                },
            );
        }

        for op in ["and", "or"] {
            define(op, Signature::exact(&[Bool, Bool], Bool));
        }

        define("unary_-", Signature::exact(&[Int], Int));
        define("unary_not", Signature::exact(&[Bool], Bool));
        define("print_int", Signature::exact(&[Int], Unit));
        define("print_bool", Signature::exact(&[Bool], Unit));
        define("read_int", Signature::exact(&[], Int));

        Signatures(table)
    }

    pub fn get(&self, name: &str) -> Option<&Signature> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Signature)> {
        self.0.iter()
    }
}

impl Default for Signatures {
    fn default() -> Self {
        Signatures::root()
    }
}

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Symbol `{0}` is undefined")]
    Undefined(Identifier),

    #[error("Expected variable, found function `{0}`")]
    ExpectedVar(Identifier),

    #[error("Expected function, found variable `{0}`")]
    ExpectedFunction(Identifier),

    #[error("`{0}` used outside of a loop")]
    OutsideLoop(Identifier),

    #[error("Left-hand side of `=` must be a variable")]
    BadAssignment,

    #[error("Type mismatch in `{operation}`: expected ({expected}), found ({found})")]
    Operands {
        operation: String,
        expected: Expected,
        found: TypeList,
    },

    #[error("Type mismatch in `{operation}`: expected `{expected}`, found `{found}`")]
    ExpectedType {
        operation: &'static str,
        expected: Type,
        found: Type,
    },

    #[error("Branches of `if` disagree: `then` is `{0}`, `else` is `{1}`")]
    BranchMismatch(Type, Type),

    #[error("Variable `{0}` is already declared in this scope")]
    Redeclaration(Identifier),
}

/// Lista de tipos, desplegada como `Int, Bool`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeList(pub Vec<Type>);

impl Display for TypeList {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, typ) in self.0.iter().enumerate() {
            if i > 0 {
                fmt.write_str(", ")?;
            }

            typ.fmt(fmt)?;
        }

        Ok(())
    }
}

/// Tipos esperados por una firma.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expected(pub Parameters);

impl Display for Expected {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Parameters::Exact(types) => TypeList(types.clone()).fmt(fmt),
            Parameters::SamePair => fmt.write_str("T, T"),
        }
    }
}

/// Verifica tipos y anota cada nodo del árbol.
///
/// Retorna el tipo de la expresión raíz.
#[tracing::instrument(level = "debug", skip_all)]
pub fn typecheck(root: &mut Expr, signatures: &Signatures) -> Semantic<Type> {
    let scope = signatures
        .iter()
        .map(|(name, signature)| (name.clone(), Named::Function(signature.clone())))
        .collect();

    let mut checker = Checker {
        scope,
        loop_depth: 0,
    };

    let typ = checker.check(root)?;
    tracing::debug!(%typ, "type check complete");

    Ok(typ)
}

/// Lo que un nombre puede significar durante análisis semántico.
enum Named {
    Var(Type),
    Function(Signature),
}

struct Checker {
    scope: SymbolTable<Named>,
    loop_depth: u32,
}

impl Checker {
    fn check(&mut self, expr: &mut Expr) -> Semantic<Type> {
        let typ = self.infer(expr)?;
        expr.typ = Some(typ);

        Ok(typ)
    }

    fn infer(&mut self, expr: &mut Expr) -> Semantic<Type> {
        let location = expr.location.clone();
        let fail = |error| Err(Located::at(error, location.clone()));

        match &mut expr.kind {
            ExprKind::Literal(Literal::Int(_)) => Ok(Type::Int),
            ExprKind::Literal(Literal::Bool(_)) => Ok(Type::Bool),
            ExprKind::Literal(Literal::Unit) => Ok(Type::Unit),

            ExprKind::Identifier(id) => match id.as_ref() {
                "break" | "continue" if self.loop_depth == 0 => {
                    fail(SemanticError::OutsideLoop(id.clone()))
                }

                "break" | "continue" => Ok(Type::Unit),
                _ => self.variable(id).map_err(|error| Located::at(error, location.clone())),
            },

            ExprKind::Binary(left, BinOp::Assign, right) => {
                match &left.kind {
                    ExprKind::Identifier(id) if !matches!(id.as_ref(), "break" | "continue") => (),
                    _ => return fail(SemanticError::BadAssignment),
                }

                let target = self.check(left)?;
                let value = self.check(right)?;

                if target != value {
                    return fail(SemanticError::ExpectedType {
                        operation: "=",
                        expected: target,
                        found: value,
                    });
                }

                Ok(value)
            }

            ExprKind::Binary(left, op, right) => {
                let op = *op;
                let arguments = [self.check(left)?, self.check(right)?];
                self.apply(op.symbol(), &arguments)
                    .map_err(|error| Located::at(error, location.clone()))
            }

            ExprKind::Unary(op, operand) => {
                let op = *op;
                let arguments = [self.check(operand)?];
                self.apply(op.symbol(), &arguments)
                    .map_err(|error| Located::at(error, location.clone()))
            }

            ExprKind::Call { callee, arguments } => {
                let callee = callee.clone();
                let arguments = arguments
                    .iter_mut()
                    .map(|argument| self.check(argument))
                    .collect::<Semantic<Vec<_>>>()?;

                self.apply(callee.as_ref(), &arguments)
                    .map_err(|error| Located::at(error, location.clone()))
            }

            ExprKind::Condition {
                condition,
                then,
                otherwise,
            } => {
                self.expect(condition, Type::Bool, "if")?;
                let then = self.check(then)?;

                match otherwise {
                    None => Ok(Type::Unit),
                    Some(otherwise) => {
                        let otherwise = self.check(otherwise)?;
                        if then == otherwise {
                            Ok(then)
                        } else {
                            fail(SemanticError::BranchMismatch(then, otherwise))
                        }
                    }
                }
            }

            ExprKind::Block { statements, result } => {
                self.scope.enter();
                let typ = self.block(statements, result);
                self.scope.leave();

                typ
            }

            ExprKind::Declaration {
                name,
                value,
                declared,
            } => {
                let typ = self.check(value)?;
                if let Some(declared) = *declared {
                    if declared != typ {
                        return fail(SemanticError::ExpectedType {
                            operation: "var",
                            expected: declared,
                            found: typ,
                        });
                    }
                }

                if self.scope.is_local(name.as_ref()) {
                    return fail(SemanticError::Redeclaration(name.clone()));
                }

                self.scope.declare(name.clone(), Named::Var(typ));
                Ok(Type::Unit)
            }

            ExprKind::Loop { condition, body } => {
                self.expect(condition, Type::Bool, "while")?;

                self.loop_depth += 1;
                let body = self.check(body);
                self.loop_depth -= 1;

                body.map(|_| Type::Unit)
            }
        }
    }

    fn block(&mut self, statements: &mut [Expr], result: &mut Expr) -> Semantic<Type> {
        for statement in statements {
            self.check(statement)?;
        }

        self.check(result)
    }

    fn expect(&mut self, expr: &mut Expr, expected: Type, operation: &'static str) -> Semantic<()> {
        let found = self.check(expr)?;
        if found == expected {
            Ok(())
        } else {
            Err(Located::at(
                SemanticError::ExpectedType {
                    operation,
                    expected,
                    found,
                },
                expr.location.clone(),
            ))
        }
    }

    fn variable(&self, id: &Identifier) -> Result<Type, SemanticError> {
        match self.scope.lookup(id.as_ref()) {
            Some(Named::Var(typ)) => Ok(*typ),
            Some(Named::Function(_)) => Err(SemanticError::ExpectedVar(id.clone())),
            None => Err(SemanticError::Undefined(id.clone())),
        }
    }

    fn apply(&self, name: &str, arguments: &[Type]) -> Result<Type, SemanticError> {
        let signature = match self.scope.lookup(name) {
            Some(Named::Function(signature)) => signature,
            Some(Named::Var(_)) => return Err(SemanticError::ExpectedFunction(name.into())),
            None => return Err(SemanticError::Undefined(name.into())),
        };

        if signature.accepts(arguments) {
            Ok(signature.returns)
        } else {
            Err(SemanticError::Operands {
                operation: name.to_string(),
                expected: Expected(signature.parameters.clone()),
                found: TypeList(arguments.to_vec()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, parse, source};
    use pretty_assertions::assert_eq;

    fn check_str(text: &str) -> Semantic<Expr> {
        let (start, stream) = source::consume(text.as_bytes(), "test");
        let tokens = Lexer::new(start.clone(), stream).tokenize().unwrap();
        let mut ast = parse::parse(start, &tokens).unwrap();

        typecheck(&mut ast, &Signatures::root())?;
        Ok(ast)
    }

    fn type_of(text: &str) -> Type {
        check_str(text).unwrap().typ.unwrap()
    }

    fn error_of(text: &str) -> String {
        match check_str(text) {
            Ok(_) => panic!("`{}` type-checked unexpectedly", text),
            Err(error) => error.val().to_string(),
        }
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert_eq!(type_of("1 + 2 * 3"), Type::Int);
        assert_eq!(type_of("1 < 2"), Type::Bool);
        assert_eq!(type_of("-1"), Type::Int);
        assert_eq!(type_of("not true"), Type::Bool);
        assert_eq!(type_of("true and 1 >= 2 or false"), Type::Bool);
    }

    #[test]
    fn equality_accepts_any_matching_pair() {
        assert_eq!(type_of("1 == 2"), Type::Bool);
        assert_eq!(type_of("true != false"), Type::Bool);
        assert_eq!(type_of("{} == {}"), Type::Bool);

        assert_eq!(
            error_of("1 == true"),
            "Type mismatch in `==`: expected (T, T), found (Int, Bool)"
        );
    }

    #[test]
    fn operand_mismatch() {
        assert_eq!(
            error_of("1 + true"),
            "Type mismatch in `+`: expected (Int, Int), found (Int, Bool)"
        );

        assert_eq!(
            error_of("not 1"),
            "Type mismatch in `unary_not`: expected (Bool), found (Int)"
        );

        assert_eq!(
            error_of("print_int(true)"),
            "Type mismatch in `print_int`: expected (Int), found (Bool)"
        );

        assert_eq!(
            error_of("read_int(1)"),
            "Type mismatch in `read_int`: expected (), found (Int)"
        );
    }

    #[test]
    fn every_node_is_annotated() {
        let ast = check_str("var x = 1; x + 2").unwrap();
        match &ast.kind {
            ExprKind::Block { statements, result } => {
                assert_eq!(statements[0].typ, Some(Type::Unit));
                assert_eq!(result.typ, Some(Type::Int));

                match &result.kind {
                    ExprKind::Binary(left, _, right) => {
                        assert_eq!(left.typ, Some(Type::Int));
                        assert_eq!(right.typ, Some(Type::Int));
                    }

                    _ => panic!("expected binary operation"),
                }
            }

            _ => panic!("expected block"),
        }
    }

    #[test]
    fn conditions() {
        assert_eq!(type_of("if true then 1 else 2"), Type::Int);
        assert_eq!(type_of("if true then 1"), Type::Unit);

        assert_eq!(
            error_of("if 1 then 2"),
            "Type mismatch in `if`: expected `Bool`, found `Int`"
        );

        assert_eq!(
            error_of("if true then 1 else false"),
            "Branches of `if` disagree: `then` is `Int`, `else` is `Bool`"
        );
    }

    #[test]
    fn loops_and_control() {
        assert_eq!(type_of("while true do { break }"), Type::Unit);
        assert_eq!(type_of("while false do continue"), Type::Unit);

        assert_eq!(error_of("break"), "`break` used outside of a loop");
        assert_eq!(
            error_of("while 1 do 2"),
            "Type mismatch in `while`: expected `Bool`, found `Int`"
        );
    }

    #[test]
    fn declarations_and_scopes() {
        assert_eq!(type_of("var x: Bool = true; x"), Type::Bool);
        assert_eq!(type_of("var x = 1; { var x = true; x }"), Type::Bool);

        assert_eq!(
            error_of("var x: Int = true"),
            "Type mismatch in `var`: expected `Int`, found `Bool`"
        );

        assert_eq!(
            error_of("var x = 1; var x = 2"),
            "Variable `x` is already declared in this scope"
        );

        assert_eq!(error_of("{ var y = 1 }; y"), "Symbol `y` is undefined");
    }

    #[test]
    fn assignments() {
        assert_eq!(type_of("var x = 1; x = 2"), Type::Int);
        assert_eq!(type_of("var a = 1; var b = 2; a = b = 3"), Type::Int);

        assert_eq!(
            error_of("var x = 1; x = true"),
            "Type mismatch in `=`: expected `Int`, found `Bool`"
        );

        assert_eq!(error_of("1 = 2"), "Left-hand side of `=` must be a variable");
        assert_eq!(error_of("y = 2"), "Symbol `y` is undefined");
    }

    #[test]
    fn functions_are_not_variables() {
        assert_eq!(
            error_of("print_int + 1"),
            "Expected variable, found function `print_int`"
        );

        assert_eq!(
            error_of("var f = 1; f(2)"),
            "Expected function, found variable `f`"
        );

        assert_eq!(error_of("g(2)"), "Symbol `g` is undefined");
    }

    #[test]
    fn error_location_points_at_operator() {
        let error = check_str("1 +\n true").unwrap_err();
        assert_eq!(error.location().start().to_string(), "1:3");
    }
}
