//! Lexical classification of operand tokens.
//!
//! A register token is `R` followed by decimal digits, `R0x` followed by
//! hex digits, one of the aliases `SP`, `LR` and `PC`, or the name of a
//! special register. An immediate token is `#` followed by decimal digits,
//! or `#0x` followed by hex digits. The `is_*` functions only look at the
//! shape of a token; the `check_*` functions also extract its value.

use crate::registers::SpecialRegister;
use crate::Error;

/// Does this token look like a register?
pub fn is_register(token: &str) -> bool {
    let token = token.trim();
    if is_alias(token) || SpecialRegister::from_name(token).is_some() {
        return true;
    }
    match strip_prefix_ignore_case(token, "R") {
        Some(rest) => is_number(rest),
        None => false,
    }
}

/// Does this token look like an immediate value?
pub fn is_immediate(token: &str) -> bool {
    match token.trim().strip_prefix('#') {
        Some(rest) => is_number(rest),
        None => false,
    }
}

/// Does this token look like a label?
///
/// Labels start with a letter, `_` or `.`, and continue with letters,
/// digits, `_` or `.`. Register names also match, so check for a register
/// first.
pub fn is_label(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Extract the register number from a register token.
///
/// `SP`, `LR` and `PC` give 13, 14 and 15. Special register names are not
/// numbered and are rejected, as is anything without digits.
pub fn check_register(token: &str) -> Result<u64, Error> {
    let token = token.trim();
    if let Some(index) = alias_index(token) {
        return Ok(index);
    }
    let Some(rest) = strip_prefix_ignore_case(token, "R") else {
        return Err(Error::Rule(format!("{} is not a register", token)));
    };
    parse_number(rest).ok_or_else(|| {
        Error::Rule(format!(
            "{} is not a register: expected digits after 'R'",
            token
        ))
    })
}

/// Extract the value from an immediate token.
pub fn check_immediate(token: &str) -> Result<u64, Error> {
    let token = token.trim();
    let Some(rest) = token.strip_prefix('#') else {
        return Err(Error::Rule(format!("{} is not an immediate", token)));
    };
    parse_number(rest).ok_or_else(|| {
        Error::Rule(format!(
            "{} is not an immediate: expected digits after '#'",
            token
        ))
    })
}

/// Fail unless `value` is a multiple of `multiple`.
pub fn check_multiple_of(value: u64, multiple: u64) -> Result<(), Error> {
    if multiple == 0 {
        return Err(Error::Rule(format!(
            "{} cannot be checked against a multiple of 0",
            value
        )));
    }
    if value % multiple != 0 {
        return Err(Error::Rule(format!(
            "{} is not a multiple of {}",
            value, multiple
        )));
    }
    Ok(())
}

fn is_alias(token: &str) -> bool {
    alias_index(token).is_some()
}

fn alias_index(token: &str) -> Option<u64> {
    if token.eq_ignore_ascii_case("SP") {
        Some(13)
    } else if token.eq_ignore_ascii_case("LR") {
        Some(14)
    } else if token.eq_ignore_ascii_case("PC") {
        Some(15)
    } else {
        None
    }
}

fn strip_prefix_ignore_case<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    if token.len() >= prefix.len()
        && token.is_char_boundary(prefix.len())
        && token[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&token[prefix.len()..])
    } else {
        None
    }
}

/// Decimal digits, or `0x` and hex digits.
fn is_number(text: &str) -> bool {
    match strip_prefix_ignore_case(text, "0x") {
        Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()),
    }
}

fn parse_number(text: &str) -> Option<u64> {
    if !is_number(text) {
        return None;
    }
    match strip_prefix_ignore_case(text, "0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registers() {
        assert!(is_register("R0"));
        assert!(is_register("R0xF"));
        assert!(is_register("r12"));
        assert!(is_register("PC"));
        assert!(is_register("APSR"));
        assert!(!is_register("#0"));
        assert!(!is_register("#0x1"));
        assert!(!is_register("R"));
        assert!(!is_register("R0x"));
        assert!(!is_register("abc"));
    }

    #[test]
    fn immediates() {
        assert!(!is_immediate("R0"));
        assert!(!is_immediate("R0xF"));
        assert!(is_immediate("#0"));
        assert!(is_immediate("#0x1"));
        assert!(!is_immediate("#"));
        assert!(!is_immediate("#-1"));
        assert!(!is_immediate("123"));
    }

    #[test]
    fn labels() {
        assert!(is_label("loop"));
        assert!(is_label("_start"));
        assert!(is_label(".L1"));
        assert!(!is_label("1abc"));
        assert!(!is_label("a-b"));
        assert!(!is_label(""));
    }

    #[test]
    fn register_values() {
        static TEST_CASES: &[(&str, u64)] = &[
            ("R0", 0),
            ("R1", 1),
            ("R15", 15),
            ("R0x5", 5),
            ("R0xE", 14),
            ("SP", 13),
            ("LR", 14),
            ("PC", 15),
        ];
        for (token, index) in TEST_CASES {
            assert_eq!(check_register(token), Ok(*index), "{}", token);
        }
        assert!(matches!(check_register("R"), Err(Error::Rule(_))));
        assert!(matches!(check_register("#"), Err(Error::Rule(_))));
        assert!(matches!(check_register("APSR"), Err(Error::Rule(_))));
    }

    #[test]
    fn immediate_values() {
        static TEST_CASES: &[(&str, u64)] = &[
            ("#0", 0),
            ("#1", 1),
            ("#15", 15),
            ("#0x5", 5),
            ("#0x70", 112),
            ("#0X3f8", 1016),
        ];
        for (token, value) in TEST_CASES {
            assert_eq!(check_immediate(token), Ok(*value), "{}", token);
        }
        assert!(matches!(check_immediate("#"), Err(Error::Rule(_))));
        assert!(matches!(check_immediate("#0x"), Err(Error::Rule(_))));
        assert!(matches!(check_immediate("R1"), Err(Error::Rule(_))));
        assert!(matches!(
            check_immediate("#99999999999999999999999"),
            Err(Error::Rule(_))
        ));
    }

    #[test]
    fn multiple_of() {
        for (value, multiple) in [(0, 2), (8, 4), (64, 8), (1234, 2), (6, 3)] {
            assert_eq!(check_multiple_of(value, multiple), Ok(()));
        }
        assert!(check_multiple_of(1, 2).is_err());
        assert!(check_multiple_of(4, 3).is_err());
        assert!(check_multiple_of(4, 0).is_err());
    }
}
