//! An assemble-and-execute simulator for the Arm Thumb instructions found
//! on Cortex-M class processors.
//!
//! Feed it one line of assembly at a time with [`Simulator::evaluate`],
//! which checks the line against the same operand constraints the real
//! encodings have, then execute everything queued with [`Simulator::run`].
//!
//! ```
//! let mut sim = thumbsim::Simulator::default();
//! sim.set_register("R7", 0x1234_5678).unwrap();
//! sim.evaluate(" REV R6, R7").unwrap();
//! sim.run().unwrap();
//! assert_eq!(sim.register("R6"), Ok(0x7856_3412));
//! ```

#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

pub mod instruction;
pub mod operand;
pub mod parser;
pub mod registers;
pub mod rules;
pub mod simulator;

pub use instruction::{Condition, Instruction, Mnemonic};
pub use operand::{check_immediate, check_multiple_of, check_register, is_immediate, is_register};
pub use registers::{ArithOp, Flag, Register, RegisterFile, SpecialRegister};
pub use rules::{check_arguments, Rule};
pub use simulator::{Entry, Program, Simulator, State};

/// All the ways we can fail to assemble or execute code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The line does not have the shape of an instruction
    #[error("parsing error: {0}")]
    Parsing(String),
    /// The instruction (or a label) is not known
    #[error("validation error: {0}")]
    Validation(String),
    /// An operand broke one of the instruction's constraints
    #[error("rule error: {0}")]
    Rule(String),
    /// The simulator cannot be built with this configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// How to build a [`Simulator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Width of every register, in bits
    pub bit_width: u32,
    /// How many numbered registers to provide (at least 16)
    pub register_count: usize,
    /// Size of data memory, in bytes. Reserved for load/store support.
    pub memory_size: usize,
    /// Secondary sizing parameter. Reserved.
    pub word_size: usize,
    /// Validation strictness. Reserved.
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            bit_width: 32,
            register_count: 16,
            memory_size: 1024,
            word_size: 8,
            strict: false,
        }
    }
}

impl Config {
    /// Check the configuration describes a machine we can simulate.
    pub fn validate(&self) -> Result<(), Error> {
        registers::check_shape(self.bit_width, self.register_count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn bad_configs() {
        for config in [
            Config {
                bit_width: 8,
                ..Default::default()
            },
            Config {
                bit_width: 24,
                ..Default::default()
            },
            Config {
                bit_width: 128,
                ..Default::default()
            },
            Config {
                register_count: 15,
                ..Default::default()
            },
        ] {
            assert!(
                matches!(config.validate(), Err(Error::Config(_))),
                "{:?}",
                config
            );
        }
    }

    #[test]
    fn error_display() {
        assert_eq!(
            Error::Rule("R9 is not a low register".into()).to_string(),
            "rule error: R9 is not a low register"
        );
    }
}

// End of file
