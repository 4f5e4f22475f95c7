//! Análisis sintáctico.
//!
//! El parser es de descenso recursivo. Los operadores binarios se
//! resuelven con un ciclo de precedencia parametrizado por nivel
//! (ver [`PRECEDENCE`]), donde `=` es el único operador asociativo
//! a la derecha. Todo el programa es una expresión; si consiste de
//! varias sentencias separadas por `;`, se envuelve en un bloque.

use std::{
    fmt::{self, Display},
    iter::Peekable,
    slice,
};

use thiserror::Error;

use crate::{
    lex::{Identifier, Token},
    semantic::Type,
    source::{Located, Location},
};

/// Palabras que no pueden usarse como nombres de variable.
const RESERVED: &[&str] = &[
    "if", "then", "else", "while", "do", "var", "true", "false", "and", "or", "not",
];

/// Niveles de precedencia de operadores binarios, de menor a mayor.
pub const PRECEDENCE: &[&[BinOp]] = &[
    &[BinOp::Assign],
    &[BinOp::Or],
    &[BinOp::And],
    &[BinOp::Equal, BinOp::NotEqual],
    &[
        BinOp::Less,
        BinOp::LessOrEqual,
        BinOp::Greater,
        BinOp::GreaterOrEqual,
    ],
    &[BinOp::Add, BinOp::Sub],
    &[BinOp::Mul, BinOp::Div, BinOp::Mod],
];

/// Nodo del árbol sintáctico.
///
/// El tipo estático se anota una única vez durante [`crate::semantic`].
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub location: Location,
    pub typ: Option<Type>,
    pub kind: ExprKind,
}

impl Expr {
    /// Construye un nodo sin anotación de tipo.
    pub fn new(location: Location, kind: ExprKind) -> Self {
        Expr {
            location,
            typ: None,
            kind,
        }
    }

    /// Literal `unit` sintetizado.
    pub fn unit(location: Location) -> Self {
        Expr::new(location, ExprKind::Literal(Literal::Unit))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(Identifier),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),

    Condition {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },

    Block {
        statements: Vec<Expr>,
        result: Box<Expr>,
    },

    Declaration {
        name: Identifier,
        value: Box<Expr>,
        declared: Option<Type>,
    },

    Loop {
        condition: Box<Expr>,
        body: Box<Expr>,
    },

    Call {
        callee: Identifier,
        arguments: Vec<Expr>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Unit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Assign,
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    /// Nombre del operador en la tabla de símbolos raíz.
    pub fn symbol(self) -> &'static str {
        use BinOp::*;

        match self {
            Assign => "=",
            Or => "or",
            And => "and",
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
        }
    }

    /// Nivel de precedencia, como índice en [`PRECEDENCE`].
    pub fn level(self) -> usize {
        PRECEDENCE
            .iter()
            .position(|level| level.contains(&self))
            .unwrap_or(PRECEDENCE.len())
    }

    fn is_right_associative(self) -> bool {
        self == BinOp::Assign
    }

    fn from_token(token: &Token) -> Option<Self> {
        use BinOp::*;

        let op = match token {
            Token::Assign => Assign,
            Token::Equal => Equal,
            Token::NotEqual => NotEqual,
            Token::Less => Less,
            Token::LessOrEqual => LessOrEqual,
            Token::Greater => Greater,
            Token::GreaterOrEqual => GreaterOrEqual,
            Token::Plus => Add,
            Token::Minus => Sub,
            Token::Times => Mul,
            Token::Slash => Div,
            Token::Percent => Mod,
            token if token.is_word("or") => Or,
            token if token.is_word("and") => And,
            _ => return None,
        };

        Some(op)
    }
}

impl Display for BinOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.symbol())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    /// Nombre del operador en la tabla de símbolos raíz.
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "unary_-",
            UnaryOp::Not => "unary_not",
        }
    }
}

impl Display for UnaryOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => fmt.write_str("-"),
            UnaryOp::Not => fmt.write_str("not"),
        }
    }
}

/// Descripción de lo que el parser esperaba encontrar.
#[derive(Clone, Debug, PartialEq)]
pub enum Expected {
    Token(Token),
    Word(&'static str),
    Expression,
    Identifier,
    Type,
    EndOfInput,
    OneOf(Vec<Expected>),
}

impl Display for Expected {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Token(token) => token.fmt(fmt),
            Expected::Word(word) => write!(fmt, "`{}`", word),
            Expected::Expression => fmt.write_str("an expression"),
            Expected::Identifier => fmt.write_str("an identifier"),
            Expected::Type => fmt.write_str("a type (`Int`, `Bool` or `Unit`)"),
            Expected::EndOfInput => fmt.write_str("end of input"),
            Expected::OneOf(options) => {
                for (i, option) in options.iter().enumerate() {
                    if i > 0 {
                        fmt.write_str(" or ")?;
                    }

                    option.fmt(fmt)?;
                }

                Ok(())
            }
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {0}, found {1} instead")]
    UnexpectedToken(Expected, Token),

    #[error("Expected {0}, none was found instead")]
    UnexpectedEof(Expected),

    #[error("Declarations are only allowed directly inside blocks or at top level")]
    MisplacedDeclaration,
}

type Parse<T> = Result<T, Located<ParserError>>;

/// Construye el árbol sintáctico de un programa completo.
///
/// `start` es la ubicación inicial del código fuente, a la cual se
/// refieren los errores de un programa sin tokens.
#[tracing::instrument(level = "debug", skip_all)]
pub fn parse(start: Location, tokens: &[Located<Token>]) -> Parse<Expr> {
    let last_known = tokens
        .first()
        .map(|token| token.location().clone())
        .unwrap_or(start);

    let mut parser = Parser {
        tokens: tokens.iter().peekable(),
        last_known,
        previous: None,
    };

    parser.program()
}

struct Parser<'a> {
    tokens: Peekable<slice::Iter<'a, Located<Token>>>,
    last_known: Location,
    previous: Option<&'a Token>,
}

/// Fin de una secuencia de sentencias.
#[derive(Copy, Clone)]
enum Closing {
    Curly,
    Eof,
}

/// Sentencias de un bloque. Sin resultado, el bloque evalúa a `unit`.
struct Sequence {
    statements: Vec<Expr>,
    result: Option<Expr>,
}

impl<'a> Parser<'a> {
    fn program(&mut self) -> Parse<Expr> {
        let location = match self.tokens.peek() {
            Some(token) => token.location().clone(),
            None => return self.fail(ParserError::UnexpectedEof(Expected::Expression)),
        };

        let Sequence {
            statements,
            result,
        } = self.sequence(Closing::Eof)?;

        match (statements.is_empty(), result) {
            (true, Some(result)) => Ok(result),
            (_, result) => {
                let result = result.unwrap_or_else(|| Expr::unit(location.clone()));
                let block = ExprKind::Block {
                    statements,
                    result: Box::new(result),
                };

                Ok(Expr::new(location, block))
            }
        }
    }

    fn sequence(&mut self, closing: Closing) -> Parse<Sequence> {
        let mut statements = Vec::new();

        loop {
            if self.at_closing(closing) {
                break Ok(Sequence {
                    statements,
                    result: None,
                });
            }

            let statement = self.statement()?;
            if self.at_closing(closing) {
                break Ok(Sequence {
                    statements,
                    result: Some(statement),
                });
            }

            // Tras un `}` el `;` es opcional
            let after_curly = self.previous == Some(&Token::CloseCurly);
            if self.peek_is(&Token::Semicolon) {
                self.next()?;
            } else if !after_curly {
                let close = match closing {
                    Closing::Curly => Expected::Token(Token::CloseCurly),
                    Closing::Eof => Expected::EndOfInput,
                };

                let expected = Expected::OneOf(vec![Expected::Token(Token::Semicolon), close]);
                return self.unexpected(expected);
            }

            statements.push(statement);
        }
    }

    fn at_closing(&mut self, closing: Closing) -> bool {
        match closing {
            Closing::Curly => self.peek_is(&Token::CloseCurly),
            Closing::Eof => self.tokens.peek().is_none(),
        }
    }

    fn statement(&mut self) -> Parse<Expr> {
        if self.peek_word("var") {
            self.declaration()
        } else {
            self.expression(0)
        }
    }

    fn declaration(&mut self) -> Parse<Expr> {
        let location = self.expect_word("var")?;
        let name = self.identifier()?.into_inner();

        let declared = if self.peek_is(&Token::Colon) {
            self.next()?;
            Some(self.typ()?)
        } else {
            None
        };

        self.expect(Token::Assign)?;
        let value = self.expression(0)?;

        let declaration = ExprKind::Declaration {
            name,
            value: Box::new(value),
            declared,
        };

        Ok(Expr::new(location, declaration))
    }

    fn expression(&mut self, level: usize) -> Parse<Expr> {
        if level == PRECEDENCE.len() {
            return self.unary();
        }

        let mut left = self.expression(level + 1)?;
        while let Some(op) = self.peek_binop(level) {
            let location = self.next()?.location().clone();
            let right = if op.is_right_associative() {
                self.expression(level)?
            } else {
                self.expression(level + 1)?
            };

            left = Expr::new(location, ExprKind::Binary(Box::new(left), op, Box::new(right)));
        }

        Ok(left)
    }

    fn unary(&mut self) -> Parse<Expr> {
        let op = match self.tokens.peek().map(|token| token.val()) {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(token) if token.is_word("not") => UnaryOp::Not,
            _ => return self.factor(),
        };

        let location = self.next()?.location().clone();
        let operand = self.unary()?;

        Ok(Expr::new(location, ExprKind::Unary(op, Box::new(operand))))
    }

    fn factor(&mut self) -> Parse<Expr> {
        let token = match self.tokens.peek() {
            Some(token) => *token,
            None => return self.fail(ParserError::UnexpectedEof(Expected::Expression)),
        };

        let location = token.location().clone();
        match token.val() {
            Token::OpenParen => {
                self.next()?;
                let inner = self.expression(0)?;
                self.expect(Token::CloseParen)?;

                Ok(inner)
            }

            Token::OpenCurly => self.block(),

            Token::IntLiteral(integer) => {
                self.next()?;
                Ok(Expr::new(location, ExprKind::Literal(Literal::Int(*integer))))
            }

            Token::Id(id) => match id.as_ref() {
                "if" => self.condition(),
                "while" => self.while_loop(),
                "true" | "false" => {
                    self.next()?;
                    let value = id.as_ref() == "true";
                    Ok(Expr::new(location, ExprKind::Literal(Literal::Bool(value))))
                }

                "var" => {
                    self.next()?;
                    self.fail(ParserError::MisplacedDeclaration)
                }

                word if RESERVED.contains(&word) => self.unexpected(Expected::Expression),

                _ => {
                    self.next()?;
                    if self.peek_is(&Token::OpenParen) {
                        self.call(location, id.clone())
                    } else {
                        Ok(Expr::new(location, ExprKind::Identifier(id.clone())))
                    }
                }
            },

            _ => self.unexpected(Expected::Expression),
        }
    }

    fn block(&mut self) -> Parse<Expr> {
        let location = self.expect(Token::OpenCurly)?;

        let Sequence {
            statements,
            result,
        } = self.sequence(Closing::Curly)?;

        self.expect(Token::CloseCurly)?;

        let result = result.unwrap_or_else(|| Expr::unit(location.clone()));
        let block = ExprKind::Block {
            statements,
            result: Box::new(result),
        };

        Ok(Expr::new(location, block))
    }

    fn condition(&mut self) -> Parse<Expr> {
        let location = self.expect_word("if")?;
        let condition = self.expression(0)?;

        self.expect_word("then")?;
        let then = self.expression(0)?;

        let otherwise = if self.peek_word("else") {
            self.next()?;
            Some(Box::new(self.expression(0)?))
        } else {
            None
        };

        let condition = ExprKind::Condition {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise,
        };

        Ok(Expr::new(location, condition))
    }

    fn while_loop(&mut self) -> Parse<Expr> {
        let location = self.expect_word("while")?;
        let condition = self.expression(0)?;

        self.expect_word("do")?;
        let body = self.expression(0)?;

        let body = ExprKind::Loop {
            condition: Box::new(condition),
            body: Box::new(body),
        };

        Ok(Expr::new(location, body))
    }

    fn call(&mut self, location: Location, callee: Identifier) -> Parse<Expr> {
        self.expect(Token::OpenParen)?;

        let mut arguments = Vec::new();
        if !self.peek_is(&Token::CloseParen) {
            arguments.push(self.expression(0)?);
            while self.peek_is(&Token::Comma) {
                self.next()?;
                arguments.push(self.expression(0)?);
            }
        }

        self.expect(Token::CloseParen)?;
        Ok(Expr::new(location, ExprKind::Call { callee, arguments }))
    }

    fn typ(&mut self) -> Parse<Type> {
        let typ = match self.tokens.peek().map(|token| token.val()) {
            Some(token) if token.is_word("Int") => Type::Int,
            Some(token) if token.is_word("Bool") => Type::Bool,
            Some(token) if token.is_word("Unit") => Type::Unit,
            _ => return self.unexpected(Expected::Type),
        };

        self.next()?;
        Ok(typ)
    }

    fn identifier(&mut self) -> Parse<Located<Identifier>> {
        match self.tokens.peek().map(|token| token.val()) {
            Some(Token::Id(id)) if !RESERVED.contains(&id.as_ref()) => {
                let (location, token) = self.next()?.clone().split();
                match token {
                    Token::Id(id) => Ok(Located::at(id, location)),
                    _ => unreachable!(),
                }
            }

            _ => self.unexpected(Expected::Identifier),
        }
    }

    fn peek_binop(&mut self, level: usize) -> Option<BinOp> {
        self.tokens
            .peek()
            .and_then(|token| BinOp::from_token(token.val()))
            .filter(|op| op.level() == level)
    }

    fn peek_is(&mut self, expected: &Token) -> bool {
        matches!(self.tokens.peek(), Some(token) if token.val() == expected)
    }

    fn peek_word(&mut self, word: &str) -> bool {
        matches!(self.tokens.peek(), Some(token) if token.val().is_word(word))
    }

    fn expect_word(&mut self, word: &'static str) -> Parse<Location> {
        if self.peek_word(word) {
            Ok(self.next()?.location().clone())
        } else {
            self.unexpected(Expected::Word(word))
        }
    }

    fn expect(&mut self, token: Token) -> Parse<Location> {
        if self.peek_is(&token) {
            Ok(self.next()?.location().clone())
        } else {
            self.unexpected(Expected::Token(token))
        }
    }

    fn next(&mut self) -> Parse<&'a Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                self.previous = Some(token.val());
                Ok(token)
            }

            None => self.fail(ParserError::UnexpectedEof(Expected::Expression)),
        }
    }

    /// Falla indicando lo esperado y lo que realmente sigue.
    fn unexpected<T>(&mut self, expected: Expected) -> Parse<T> {
        match self.tokens.peek() {
            Some(found) => Err(Located::at(
                ParserError::UnexpectedToken(expected, found.val().clone()),
                found.location().clone(),
            )),

            None => self.fail(ParserError::UnexpectedEof(expected)),
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Located::at(error, self.last_known.clone()))
    }
}
