//! Implementación sobre `std`, parametrizada por flujos de E/S.

use std::io::{self, BufRead, Write};

use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected end of input")]
    EndOfInput,

    #[error("invalid integer: {0:?}")]
    BadInput(String),
}

pub fn print_int<W: Write>(output: &mut W, value: i64) -> io::Result<()> {
    writeln!(output, "{}", value)
}

pub fn print_bool<W: Write>(output: &mut W, value: i64) -> io::Result<()> {
    writeln!(output, "{}", value != 0)
}

/// Lee una línea y la interpreta como un entero, ignorando espacios.
pub fn read_int<R: BufRead>(input: &mut R) -> Result<i64, ReadError> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(ReadError::EndOfInput);
    }

    let line = line.trim();
    line.parse().map_err(|_| ReadError::BadInput(line.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printed<F>(print: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> io::Result<()>,
    {
        let mut output = Vec::new();
        print(&mut output).unwrap();

        String::from_utf8(output).unwrap()
    }

    #[test]
    fn prints_values() {
        assert_eq!(printed(|out| print_int(out, -42)), "-42\n");
        assert_eq!(printed(|out| print_bool(out, 1)), "true\n");
        assert_eq!(printed(|out| print_bool(out, 0)), "false\n");
        assert_eq!(printed(|out| print_bool(out, 7)), "true\n");
    }

    #[test]
    fn reads_one_integer_per_line() {
        let mut input = " 12 \n-3\n".as_bytes();
        assert_eq!(read_int(&mut input).unwrap(), 12);
        assert_eq!(read_int(&mut input).unwrap(), -3);
        assert!(matches!(read_int(&mut input), Err(ReadError::EndOfInput)));
    }

    #[test]
    fn rejects_garbage() {
        let mut input = "twelve\n".as_bytes();
        assert!(matches!(
            read_int(&mut input),
            Err(ReadError::BadInput(text)) if text == "twelve"
        ));
    }
}
