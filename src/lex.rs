//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios se descartan durante esta operación. Cada
//! token emitido esta asociado a una ubicación en el código fuente original,
//! lo cual permite rastrear errores en tanto los mismos como constructos
//! más elevados de fases posteriores.
//!
//! # Contenido de un token
//! Operadores y puntuación se identifican por el hecho de lo que son y no
//! incluyen lexemas. Los identificadores sí incluyen su lexema original.
//! Las constantes literales se resuelven a sus valores en vez de preservar
//! sus lexemas. [`Token::lexeme()`] reconstruye un texto equivalente.
//!
//! # Reglas importantes del lenguaje
//! - Las palabras reservadas (`if`, `while`, `and`, `true`, ...) son
//!   identificadores para el lexer. Es el parser quien les da significado.
//! - Hay comentarios de línea con `//` o `#` y comentarios de bloque
//!   con `/* ... */`.
//!
//! # Errores
//! El lexer se detiene ante el primer error. No hay recuperación.

use crate::source::{InputStream, Located, Location};
use std::{
    borrow::Borrow,
    fmt::{self, Display},
    rc::Rc,
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Error de E/S originado por el [`InputStream`].
    #[error("I/O error")]
    Input(#[from] std::io::Error),

    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Se esperaba un carácter específico en esta posición.
    #[error("Expected {0:?}")]
    Expected(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {}]", i64::MAX)]
    IntOverflow,

    /// Un comentario de bloque no se cerró antes del fin de archivo.
    #[error("Unterminated block comment")]
    UnterminatedComment,
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl Identifier {
    pub fn new(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier::new(name)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Clasificación gruesa de tokens.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    IntLiteral,
    Operator,
    Punctuation,
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador o palabra reservada.
    Id(Identifier),

    /// Literal de entero.
    IntLiteral(i64),

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Slash,

    /// `%`
    Percent,

    /// `=`
    Assign,

    /// `==`
    Equal,

    /// `!=`
    NotEqual,

    /// `<`
    Less,

    /// `<=`
    LessOrEqual,

    /// `>`
    Greater,

    /// `>=`
    GreaterOrEqual,

    /// `,`
    Comma,

    /// `;`
    Semicolon,

    /// `:`
    Colon,

    /// `(`
    OpenParen,

    /// `{`
    OpenCurly,

    /// `)`
    CloseParen,

    /// `}`
    CloseCurly,
}

impl Token {
    /// Clasifica el token.
    pub fn kind(&self) -> TokenKind {
        use Token::*;

        match self {
            Id(_) => TokenKind::Identifier,
            IntLiteral(_) => TokenKind::IntLiteral,

            Plus | Minus | Times | Slash | Percent | Assign | Equal | NotEqual | Less
            | LessOrEqual | Greater | GreaterOrEqual => TokenKind::Operator,

            Comma | Semicolon | Colon | OpenParen | OpenCurly | CloseParen | CloseCurly => {
                TokenKind::Punctuation
            }
        }
    }

    /// Texto que, al volver a escanearse, produce este mismo token.
    pub fn lexeme(&self) -> String {
        use Token::*;

        let symbol = match self {
            Id(id) => return id.to_string(),
            IntLiteral(integer) => return integer.to_string(),
            Plus => "+",
            Minus => "-",
            Times => "*",
            Slash => "/",
            Percent => "%",
            Assign => "=",
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Comma => ",",
            Semicolon => ";",
            Colon => ":",
            OpenParen => "(",
            OpenCurly => "{",
            CloseParen => ")",
            CloseCurly => "}",
        };

        symbol.to_string()
    }

    /// Determina si el token es el identificador `word`.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Id(id) if id.as_ref() == word)
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Id(id) => write!(fmt, "identifier `{}`", id),
            Token::IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            other => write!(fmt, "`{}`", other.lexeme()),
        }
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: std::iter::Peekable<S>,
    state: State,
    start: Location,
    next: Location,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de error. El lexer no emite nada más.
    Error,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Se encontró `/`.
    ///
    /// Puede ser división o el inicio de un comentario.
    Slash,

    /// Comentario de línea.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`.
    Comment,

    /// Comentario de bloque. El booleano indica si el último
    /// carácter fue `*`.
    BlockComment(bool),

    /// Se encontró uno de `=`, `!`, `<` o `>`, que pueden
    /// extenderse con un `=` siguiente.
    Compare(char),

    /// Constante entera.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(i64),

    /// Término que puede ser un identificador o una palabra reservada.
    Word(String),
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        let next = start.clone();
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start,
            next,
        }
    }

    /// Reduce la entrada a una secuencia de tokens, fallando ante
    /// el primer error léxico.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn tokenize(self) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        let tokens = self.collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(tokens = tokens.len(), "lexing complete");

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<(Token, Location)>, LexerError> {
        use {State::*, Token::*};

        let mut last_accepted = self.start.clone();
        let token = loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let next_char = match self.source.peek() {
                None => None,
                Some(Ok((c, _))) => Some(*c),
                Some(Err(_)) => match self.source.next() {
                    Some(Err(error)) => break Err(error.into()),
                    _ => unreachable!(),
                },
            };

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.next.clone();
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                (Error, _) => return Ok(None),

                // Tokens triviales
                (Start, None) => return Ok(None),
                (Start, Some('+')) => self.state = Complete(Plus),
                (Start, Some('-')) => self.state = Complete(Minus),
                (Start, Some('*')) => self.state = Complete(Times),
                (Start, Some('%')) => self.state = Complete(Percent),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some(':')) => self.state = Complete(Colon),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('/')) => self.state = State::Slash,
                (Start, Some('#')) => self.state = Comment,
                (Start, Some(c @ ('=' | '!' | '<' | '>'))) => self.state = Compare(c),

                // Identificadores y palabras reservadas
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // Inicio de una constante numérica. No se consume
                // el entero, ya que esta lógica ya está implementada
                // en el respectivo caso para un estado de constante
                // entera para el cual el siguiente carácter es un
                // dígito. Por tanto, la constante es inicialmente cero.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(0);
                    continue;
                }

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_whitespace() => (),
                (Start, Some(c)) => break Err(LexerError::BadChar(c)),

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => break Ok(std::mem::replace(value, Plus)),

                // `/` es división salvo que inicie un comentario
                (State::Slash, Some('/')) => self.state = Comment,
                (State::Slash, Some('*')) => self.state = BlockComment(false),
                (State::Slash, _) => break Ok(Token::Slash),

                // Los comentarios descartan la línea donde ocurren
                (Comment, Some('\n')) => self.state = Start,
                (Comment, Some(_)) => (),
                (Comment, None) => self.state = Start,

                // Los comentarios de bloque terminan con `*/`
                (BlockComment(true), Some('/')) => self.state = Start,
                (BlockComment(star), Some(c)) => *star = c == '*',
                (BlockComment(_), None) => break Err(LexerError::UnterminatedComment),

                // Operadores de uno o dos caracteres
                (Compare(first), Some('=')) => {
                    let token = match first {
                        '=' => Equal,
                        '!' => NotEqual,
                        '<' => LessOrEqual,
                        _ => GreaterOrEqual,
                    };

                    self.state = Complete(token);
                }

                (Compare('='), _) => break Ok(Assign),
                (Compare('<'), _) => break Ok(Less),
                (Compare('>'), _) => break Ok(Greater),
                (Compare(_), _) => break Err(LexerError::Expected('=')),

                // Acumulación dígito por dígito de constantes enteras
                (Integer(accumulated), Some(digit)) if digit.is_ascii_digit() => {
                    let digit = digit as i64 - '0' as i64;

                    match accumulated
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                    {
                        Some(result) => *accumulated = result,
                        None => break Err(LexerError::IntOverflow),
                    }
                }

                // Si sigue algo que no es un dígito, la constante a terminado
                (Integer(integer), _) => break Ok(IntLiteral(*integer)),

                // Extensión de términos
                (Word(word), Some(c)) if is_word_char(c) => {
                    word.push(c);
                }

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => break Ok(Id(Identifier::new(word))),
            }

            // Si no hubo `continue`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            if let Some(Ok((_, next_position))) = self.source.next() {
                last_accepted = std::mem::replace(&mut self.next, next_position);
            }
        };

        token.map(|token| Some((token, last_accepted)))
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some((token, last_accepted))) => {
                self.state = State::Start;

                let location = Location::span(self.start.clone(), &last_accepted);
                Some(Ok(Located::at(token, location)))
            }

            Err(error) => {
                self.state = State::Error;

                // Un comentario sin cerrar se señala desde su apertura
                let location = match error {
                    LexerError::UnterminatedComment => self.start.clone(),
                    _ => self.next.clone(),
                };

                Some(Err(Located::at(error, location)))
            }
        }
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;
    use pretty_assertions::assert_eq;

    fn lex(text: &str) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        let (start, stream) = source::consume(text.as_bytes(), "test");
        Lexer::new(start, stream).tokenize()
    }

    fn tokens(text: &str) -> Vec<Token> {
        lex(text)
            .unwrap()
            .into_iter()
            .map(Located::into_inner)
            .collect()
    }

    fn id(name: &str) -> Token {
        Token::Id(Identifier::new(name))
    }

    #[test]
    fn words_and_literals() {
        assert_eq!(
            tokens("if  3\nwhile_x 12"),
            vec![
                id("if"),
                Token::IntLiteral(3),
                id("while_x"),
                Token::IntLiteral(12)
            ]
        );
    }

    #[test]
    fn operators_and_punctuation() {
        use Token::*;

        assert_eq!(
            tokens("a=b==c!=d<=e>=f<g>h+-*/%(){},;:"),
            vec![
                id("a"),
                Assign,
                id("b"),
                Equal,
                id("c"),
                NotEqual,
                id("d"),
                LessOrEqual,
                id("e"),
                GreaterOrEqual,
                id("f"),
                Less,
                id("g"),
                Greater,
                id("h"),
                Plus,
                Minus,
                Times,
                Slash,
                Percent,
                OpenParen,
                CloseParen,
                OpenCurly,
                CloseCurly,
                Comma,
                Semicolon,
                Colon,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let text = "1 // first\n# second\n/* third\n * still */ 2 / 3";
        assert_eq!(
            tokens(text),
            vec![
                Token::IntLiteral(1),
                Token::IntLiteral(2),
                Token::Slash,
                Token::IntLiteral(3)
            ]
        );
    }

    #[test]
    fn locations_track_lines_and_columns() {
        let located = lex("aa\n  bbb + 1").unwrap();
        let starts: Vec<_> = located
            .iter()
            .map(|token| token.location().start().to_string())
            .collect();

        assert_eq!(starts, vec!["1:1", "2:3", "2:7", "2:9"]);
        assert_eq!(located[1].location().end().column(), 6);
    }

    #[test]
    fn first_bad_char_aborts() {
        let error = lex("1 +\n  @ $").unwrap_err();
        assert!(matches!(error.val(), LexerError::BadChar('@')));
        assert_eq!(error.location().start().to_string(), "2:3");
    }

    #[test]
    fn lone_bang_is_an_error() {
        let error = lex("a ! b").unwrap_err();
        assert!(matches!(error.val(), LexerError::Expected('=')));
    }

    #[test]
    fn integer_overflow() {
        let error = lex("99999999999999999999").unwrap_err();
        assert!(matches!(error.val(), LexerError::IntOverflow));
        assert_eq!(tokens("9223372036854775807"), vec![Token::IntLiteral(i64::MAX)]);
    }

    #[test]
    fn unterminated_block_comment() {
        let error = lex("1 /* never\nclosed").unwrap_err();
        assert!(matches!(error.val(), LexerError::UnterminatedComment));
        assert_eq!(error.location().start().to_string(), "1:3");
    }

    #[test]
    fn kinds_and_lexemes() {
        let all = tokens("x 42 >= ;");
        let kinds: Vec<_> = all.iter().map(Token::kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::IntLiteral,
                TokenKind::Operator,
                TokenKind::Punctuation
            ]
        );

        let lexemes: Vec<_> = all.iter().map(Token::lexeme).collect();
        assert_eq!(lexemes, vec!["x", "42", ">=", ";"]);
    }
}
