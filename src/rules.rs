//! Operand constraints.
//!
//! Each [`Rule`] names one class of acceptable operand: a range of
//! registers, or an immediate with a range and an alignment. Rules know
//! nothing about the instruction using them.

use crate::operand::{check_immediate, check_multiple_of, check_register, is_immediate, is_register};
use crate::registers::{Register, SpecialRegister};
use crate::Error;

/// A named operand constraint
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Rule {
    /// R0 to R7
    LowRegisters,
    /// R8 to R12
    HighRegisters,
    /// R0 to R12
    GeneralPurposeRegisters,
    /// R0 to R15
    AnyRegisters,
    /// R0 to R12, or LR
    LrOrGeneralPurposeRegisters,
    /// A processor status or control register name
    SpecialRegisters,
    /// 0 to 7
    Imm3,
    /// 0 to 31
    Imm5,
    /// 1 to 32
    Imm5Counting,
    /// 0 to 62, in steps of 2
    Imm6_2,
    /// 0 to 124, in steps of 4
    Imm7_4,
    /// 0 to 255
    Imm8,
    /// 0 to 508, in steps of 4
    Imm9_4,
    /// 0 to 1020, in steps of 4
    Imm10_4,
}

/// What a token turned out to hold, once a rule has accepted it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Value {
    /// A register number
    Register(u64),
    /// An immediate value
    Immediate(u64),
    /// A special register
    Special(SpecialRegister),
}

impl Rule {
    /// Every rule, in catalogue order.
    pub const ALL: [Rule; 14] = [
        Rule::LowRegisters,
        Rule::HighRegisters,
        Rule::GeneralPurposeRegisters,
        Rule::AnyRegisters,
        Rule::LrOrGeneralPurposeRegisters,
        Rule::SpecialRegisters,
        Rule::Imm3,
        Rule::Imm5,
        Rule::Imm5Counting,
        Rule::Imm6_2,
        Rule::Imm7_4,
        Rule::Imm8,
        Rule::Imm9_4,
        Rule::Imm10_4,
    ];

    /// The conventional name of this rule, e.g. `low_registers`.
    pub fn name(self) -> &'static str {
        match self {
            Rule::LowRegisters => "low_registers",
            Rule::HighRegisters => "high_registers",
            Rule::GeneralPurposeRegisters => "general_purpose_registers",
            Rule::AnyRegisters => "any_registers",
            Rule::LrOrGeneralPurposeRegisters => "LR_or_general_purpose_registers",
            Rule::SpecialRegisters => "special_registers",
            Rule::Imm3 => "imm3",
            Rule::Imm5 => "imm5",
            Rule::Imm5Counting => "imm5_counting",
            Rule::Imm6_2 => "imm6_2",
            Rule::Imm7_4 => "imm7_4",
            Rule::Imm8 => "imm8",
            Rule::Imm9_4 => "imm9_4",
            Rule::Imm10_4 => "imm10_4",
        }
    }

    /// Look a rule up by its conventional name.
    pub fn from_name(name: &str) -> Option<Rule> {
        Self::ALL.iter().copied().find(|rule| rule.name() == name)
    }

    /// Check one token against this rule, returning what it holds.
    pub fn check(self, token: &str, register_count: usize) -> Result<Value, Error> {
        let token = token.trim();
        match self {
            Rule::LowRegisters => register_in(token, register_count, 0, 7, false, "a low register"),
            Rule::HighRegisters => {
                register_in(token, register_count, 8, 12, false, "a high register")
            }
            Rule::GeneralPurposeRegisters => register_in(
                token,
                register_count,
                0,
                12,
                false,
                "a general purpose register",
            ),
            Rule::AnyRegisters => register_in(token, register_count, 0, 15, false, "a register"),
            Rule::LrOrGeneralPurposeRegisters => register_in(
                token,
                register_count,
                0,
                12,
                true,
                "LR or a general purpose register",
            ),
            Rule::SpecialRegisters => match SpecialRegister::from_name(token) {
                Some(special) => Ok(Value::Special(special)),
                None => Err(Error::Rule(format!("{} is not a special register", token))),
            },
            Rule::Imm3 => immediate_in(token, self, 0, 7, 1),
            Rule::Imm5 => immediate_in(token, self, 0, 31, 1),
            Rule::Imm5Counting => immediate_in(token, self, 1, 32, 1),
            Rule::Imm6_2 => immediate_in(token, self, 0, 62, 2),
            Rule::Imm7_4 => immediate_in(token, self, 0, 124, 4),
            Rule::Imm8 => immediate_in(token, self, 0, 255, 1),
            Rule::Imm9_4 => immediate_in(token, self, 0, 508, 4),
            Rule::Imm10_4 => immediate_in(token, self, 0, 1020, 4),
        }
    }

    /// Check a token that must be a register under this rule.
    pub fn register(self, token: &str, register_count: usize) -> Result<Register, Error> {
        match self.check(token, register_count)? {
            Value::Register(index) => Ok(Register::from(index as u8)),
            _ => Err(Error::Rule(format!("{} is not a register", token))),
        }
    }

    /// Check a token that must be an immediate under this rule.
    pub fn immediate(self, token: &str, register_count: usize) -> Result<u64, Error> {
        match self.check(token, register_count)? {
            Value::Immediate(value) => Ok(value),
            _ => Err(Error::Rule(format!("{} is not an immediate", token))),
        }
    }

    /// Check a token that must be a special register under this rule.
    pub fn special(self, token: &str, register_count: usize) -> Result<SpecialRegister, Error> {
        match self.check(token, register_count)? {
            Value::Special(special) => Ok(special),
            _ => Err(Error::Rule(format!("{} is not a special register", token))),
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Check groups of tokens, each against its rule.
///
/// Stops at the first token that fails.
pub fn check_arguments<'a, G, T>(groups: G, register_count: usize) -> Result<(), Error>
where
    G: IntoIterator<Item = (Rule, T)>,
    T: IntoIterator<Item = &'a str>,
{
    for (rule, tokens) in groups {
        for token in tokens {
            rule.check(token, register_count)?;
        }
    }
    Ok(())
}

fn register_in(
    token: &str,
    register_count: usize,
    low: u64,
    high: u64,
    allow_lr: bool,
    what: &str,
) -> Result<Value, Error> {
    if !is_register(token) || SpecialRegister::from_name(token).is_some() {
        return Err(Error::Rule(format!("{} is not a register", token)));
    }
    let index = check_register(token)?;
    if index >= register_count as u64 {
        return Err(Error::Rule(format!(
            "{} is greater than the highest register R{}",
            token,
            register_count.saturating_sub(1)
        )));
    }
    if (allow_lr && index == 14) || (low..=high).contains(&index) {
        Ok(Value::Register(index))
    } else {
        Err(Error::Rule(format!(
            "{} is not {} (R{} to R{})",
            token, what, low, high
        )))
    }
}

fn immediate_in(token: &str, rule: Rule, low: u64, high: u64, multiple: u64) -> Result<Value, Error> {
    if !is_immediate(token) {
        return Err(Error::Rule(format!("{} is not an immediate", token)));
    }
    let value = check_immediate(token)?;
    if value > high {
        return Err(Error::Rule(format!(
            "{} is greater than the maximum {} allowed by {}",
            token, high, rule
        )));
    }
    if value < low {
        return Err(Error::Rule(format!(
            "{} is less than the minimum {} allowed by {}",
            token, low, rule
        )));
    }
    check_multiple_of(value, multiple)
        .map_err(|_| Error::Rule(format!("{} is not a multiple of {} for {}", token, multiple, rule)))?;
    Ok(Value::Immediate(value))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn check<const N: usize>(rule: Rule, tokens: [&str; N]) -> Result<(), Error> {
        check_arguments([(rule, tokens)], 16)
    }

    fn rule_error(result: Result<(), Error>) -> String {
        match result {
            Err(Error::Rule(message)) => message,
            other => panic!("expected a rule error, got {:?}", other),
        }
    }

    #[test]
    fn not_an_immediate() {
        rule_error(check(Rule::Imm8, ["R4"]));
    }

    #[test]
    fn immediate_out_of_range() {
        let message = rule_error(check(Rule::Imm8, ["#1234"]));
        assert!(message.contains("greater"), "{}", message);
    }

    #[test]
    fn immediate_not_multiple_of() {
        rule_error(check(Rule::Imm6_2, ["#3"]));
        rule_error(check(Rule::Imm7_4, ["#6"]));
    }

    #[test]
    fn low_register() {
        assert_eq!(check(Rule::LowRegisters, ["R0", "R7"]), Ok(()));
        rule_error(check(Rule::LowRegisters, ["R8"]));
        let message = rule_error(check(Rule::LowRegisters, ["#1"]));
        assert!(message.contains("not a register"), "{}", message);
    }

    #[test]
    fn high_register() {
        assert_eq!(check(Rule::HighRegisters, ["R8", "R12"]), Ok(()));
        rule_error(check(Rule::HighRegisters, ["R0"]));
        rule_error(check(Rule::HighRegisters, ["R13"]));
        rule_error(check(Rule::HighRegisters, ["#1"]));
    }

    #[test]
    fn general_purpose_register() {
        assert_eq!(check(Rule::GeneralPurposeRegisters, ["R0", "R12"]), Ok(()));
        rule_error(check(Rule::GeneralPurposeRegisters, ["R13"]));
        rule_error(check(Rule::GeneralPurposeRegisters, ["#1"]));
    }

    #[test]
    fn any_register() {
        assert_eq!(check(Rule::AnyRegisters, ["R0", "R15", "SP", "LR", "PC"]), Ok(()));
        let message = rule_error(check(Rule::AnyRegisters, ["R16"]));
        assert!(message.contains("greater"), "{}", message);
        rule_error(check(Rule::AnyRegisters, ["#1"]));
    }

    #[test]
    fn extra_registers_are_not_architectural() {
        // R16 exists in a 20 register file but no instruction can name it
        let message = rule_error(check_arguments([(Rule::AnyRegisters, ["R16"])], 20));
        assert!(!message.contains("greater"), "{}", message);
    }

    #[test]
    fn lr_or_general_purpose_registers() {
        assert_eq!(
            check(Rule::LrOrGeneralPurposeRegisters, ["R0", "R1", "R12", "LR", "R14"]),
            Ok(())
        );
        rule_error(check(Rule::LrOrGeneralPurposeRegisters, ["R13"]));
        rule_error(check(Rule::LrOrGeneralPurposeRegisters, ["PC"]));
        rule_error(check(Rule::LrOrGeneralPurposeRegisters, ["#1"]));
    }

    #[test]
    fn special_registers() {
        assert_eq!(
            check(
                Rule::SpecialRegisters,
                [
                    "APSR", "IAPSR", "EAPSR", "XPSR", "PSR", "IPSR", "EPSR", "IEPSR", "MSP",
                    "PSP", "PRIMASK", "CONTROL"
                ]
            ),
            Ok(())
        );
        for token in ["R0", "#0", "R15", "BASEPRI", "FAULTMASK"] {
            rule_error(check(Rule::SpecialRegisters, [token]));
        }
    }

    #[test]
    fn immediate_ranges() {
        static TEST_CASES: &[(Rule, &[&str], &[&str])] = &[
            (Rule::Imm3, &["#0", "#1", "#7", "#0x2"], &["R0", "#8"]),
            (Rule::Imm5, &["#0", "#1", "#31", "#0xF"], &["R0", "#32"]),
            (Rule::Imm5Counting, &["#1", "#32", "#0xE"], &["R0", "#33", "#0"]),
            (Rule::Imm6_2, &["#0", "#2", "#62", "#0xC"], &["R0", "#1", "#63", "#64"]),
            (Rule::Imm7_4, &["#0", "#4", "#124", "#0x14"], &["R0", "#1", "#127", "#128"]),
            (Rule::Imm8, &["#0", "#1", "#255", "#0xF1"], &["R0", "#256"]),
            (Rule::Imm9_4, &["#0", "#4", "#508", "#0x100"], &["R0", "#1", "#511", "#512"]),
            (Rule::Imm10_4, &["#0", "#4", "#1020", "#0x3f8"], &["R0", "#1", "#1023", "#1024"]),
        ];
        for (rule, good, bad) in TEST_CASES {
            assert_eq!(
                check_arguments([(*rule, good.iter().copied())], 16),
                Ok(()),
                "{} accepts {:?}",
                rule,
                good
            );
            for token in bad.iter() {
                assert!(
                    matches!(rule.check(token, 16), Err(Error::Rule(_))),
                    "{} rejects {}",
                    rule,
                    token
                );
            }
        }
    }

    #[test]
    fn mixed_groups_stop_at_first_failure() {
        let result = check_arguments(
            [
                (Rule::LowRegisters, vec!["R0", "R1"]),
                (Rule::Imm8, vec!["#300", "R9"]),
            ],
            16,
        );
        let message = rule_error(result);
        assert!(message.contains("#300"), "{}", message);
    }

    #[test]
    fn values() {
        assert_eq!(Rule::AnyRegisters.register("LR", 16), Ok(Register::Lr));
        assert_eq!(Rule::Imm8.immediate("#0x10", 16), Ok(16));
        assert_eq!(
            Rule::SpecialRegisters.special("primask", 16),
            Ok(SpecialRegister::Primask)
        );
        assert_eq!(Rule::from_name("imm9_4"), Some(Rule::Imm9_4));
        assert_eq!(Rule::from_name("nope"), None);
    }
}
