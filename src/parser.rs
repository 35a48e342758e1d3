//! Splits a line of assembly into a label, a mnemonic and its operands.
//!
//! ```text
//! [label] <whitespace> MNEMONIC [op {, op}] [; comment]
//! ```
//!
//! Anything in the first column is a label, so an instruction without one
//! must be indented.

use crate::operand::{is_immediate, is_label, is_register};
use crate::Error;

/// A line of assembly, split but not yet checked against any instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine<'a> {
    /// The label in the first column, if any
    pub label: Option<&'a str>,
    /// The instruction name, as written
    pub mnemonic: &'a str,
    /// Everything after the mnemonic, trimmed
    pub operands: &'a str,
}

/// An operand token sorted into its lexical class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// `R3`, `SP`, `APSR`, ...
    Register(&'a str),
    /// `#4`, `#0x10`, ...
    Immediate(&'a str),
    /// A branch target
    Label(&'a str),
}

impl<'a> Token<'a> {
    /// The token as written.
    pub fn text(&self) -> &'a str {
        match self {
            Token::Register(text) | Token::Immediate(text) | Token::Label(text) => text,
        }
    }
}

/// Split a line into label, mnemonic and operand text.
pub fn split_line(line: &str) -> Result<SourceLine<'_>, Error> {
    let line = match line.find(';') {
        Some(comment) => &line[..comment],
        None => line,
    };
    let line = line.trim_end();

    let (label, rest) = if line.starts_with(|c: char| !c.is_whitespace()) {
        let end = line.find(char::is_whitespace).unwrap_or(line.len());
        let label = &line[..end];
        if !is_label(label) {
            return Err(Error::Parsing(format!("{} is not a valid label", label)));
        }
        if is_register(label) {
            return Err(Error::Parsing(format!(
                "{} is a register name and cannot be a label",
                label
            )));
        }
        (Some(label), &line[end..])
    } else {
        (None, line)
    };

    let rest = rest.trim_start();
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let mnemonic = &rest[..end];
    if mnemonic.is_empty() {
        return Err(Error::Parsing(format!(
            "No instruction found in {:?}",
            line
        )));
    }
    Ok(SourceLine {
        label,
        mnemonic,
        operands: rest[end..].trim(),
    })
}

/// Split operand text into exactly `arity` comma separated tokens.
pub fn parse_operands(text: &str, arity: usize) -> Result<Vec<&str>, Error> {
    let text = text.trim();
    if arity == 0 {
        if !text.is_empty() {
            return Err(Error::Parsing(format!(
                "Extra operands {:?}: this instruction takes none",
                text
            )));
        }
        return Ok(Vec::new());
    }
    if text.is_empty() {
        return Err(Error::Parsing(format!(
            "Expected {} operand(s) but found None",
            arity
        )));
    }

    let pieces: Vec<&str> = text.split(',').map(str::trim).collect();
    for piece in &pieces {
        if let Some(gap) = piece.find(char::is_whitespace) {
            // `# 5` is a broken immediate, not two operands
            if &piece[..gap] == "#" {
                return Err(Error::Parsing(format!("Unknown operand {:?}", piece)));
            }
            return Err(Error::Parsing(format!(
                "Missing comma between {:?} and {:?}",
                &piece[..gap],
                piece[gap..].trim_start()
            )));
        }
    }
    if pieces.len() > arity {
        return Err(Error::Parsing(format!(
            "Extra operand(s) {:?}: expected {}",
            pieces[arity..].join(", "),
            arity
        )));
    }
    for position in 0..arity {
        match pieces.get(position) {
            Some(piece) if !piece.is_empty() => {}
            _ => {
                return Err(Error::Parsing(format!(
                    "Missing the {} operand",
                    ordinal(position)
                )))
            }
        }
    }
    Ok(pieces)
}

/// Sort a token into register, immediate or (when allowed) label.
pub fn classify(token: &str, allow_label: bool) -> Result<Token<'_>, Error> {
    if is_register(token) {
        Ok(Token::Register(token))
    } else if is_immediate(token) {
        Ok(Token::Immediate(token))
    } else if allow_label && is_label(token) {
        Ok(Token::Label(token))
    } else {
        Err(Error::Parsing(format!("Unknown operand {:?}", token)))
    }
}

fn ordinal(position: usize) -> &'static str {
    match position {
        0 => "first",
        1 => "second",
        2 => "third",
        _ => "next",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parsing_error<T: std::fmt::Debug>(result: Result<T, Error>) -> String {
        match result {
            Err(Error::Parsing(message)) => message,
            other => panic!("expected a parsing error, got {:?}", other),
        }
    }

    #[test]
    fn split_plain() {
        assert_eq!(
            split_line(" MOVS R1, #123"),
            Ok(SourceLine {
                label: None,
                mnemonic: "MOVS",
                operands: "R1, #123"
            })
        );
    }

    #[test]
    fn split_label_and_comment() {
        assert_eq!(
            split_line("loop\tSUBS R0, R0, #1 ; count down"),
            Ok(SourceLine {
                label: Some("loop"),
                mnemonic: "SUBS",
                operands: "R0, R0, #1"
            })
        );
        assert_eq!(
            split_line(" NOP"),
            Ok(SourceLine {
                label: None,
                mnemonic: "NOP",
                operands: ""
            })
        );
    }

    #[test]
    fn split_failures() {
        parsing_error(split_line("   "));
        parsing_error(split_line("loop"));
        parsing_error(split_line("1abc MOVS R0, #1"));
    }

    #[test]
    fn register_names_are_not_labels() {
        for line in ["SP NOP", "R0 NOP", "pc NOP", "APSR NOP", "R0x3 NOP"] {
            let message = parsing_error(split_line(line));
            assert!(message.contains("register"), "{}: {}", line, message);
        }
        assert_eq!(split_line("SPIN NOP").map(|l| l.label), Ok(Some("SPIN")));
    }

    #[test]
    fn operands() {
        assert_eq!(parse_operands("R0, R1 ,R2", 3), Ok(vec!["R0", "R1", "R2"]));
        assert_eq!(parse_operands("", 0), Ok(vec![]));
    }

    #[test]
    fn no_operands() {
        let message = parsing_error(parse_operands("", 2));
        assert!(message.contains("None"), "{}", message);
    }

    #[test]
    fn missing_first() {
        let message = parsing_error(parse_operands(",", 2));
        assert!(message.contains("first"), "{}", message);
    }

    #[test]
    fn missing_second() {
        let message = parsing_error(parse_operands("R1,", 2));
        assert!(message.contains("second"), "{}", message);
        let message = parsing_error(parse_operands("R1", 2));
        assert!(message.contains("second"), "{}", message);
    }

    #[test]
    fn extra() {
        let message = parsing_error(parse_operands("R1, #123, 456", 2));
        assert!(message.contains("Extra"), "{}", message);
        let message = parsing_error(parse_operands("R1", 0));
        assert!(message.contains("Extra"), "{}", message);
    }

    #[test]
    fn missing_comma() {
        let message = parsing_error(parse_operands("R1 #123", 2));
        assert!(message.contains("comma"), "{}", message);
    }

    #[test]
    fn spaced_immediate() {
        let message = parsing_error(parse_operands("R1, # 5", 2));
        assert!(message.contains("Unknown"), "{}", message);
    }

    #[test]
    fn classification() {
        assert_eq!(classify("R1", false), Ok(Token::Register("R1")));
        assert_eq!(classify("#1", false), Ok(Token::Immediate("#1")));
        assert_eq!(classify("loop", true), Ok(Token::Label("loop")));
        assert_eq!(classify("PC", true), Ok(Token::Register("PC")));
        for token in ["abc", "123", "R", "#"] {
            let message = parsing_error(classify(token, false));
            assert!(message.contains("Unknown"), "{}", message);
        }
    }
}
