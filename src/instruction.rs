//! The instruction table.
//!
//! [`Mnemonic`] is the closed set of instruction names we accept. Each one
//! knows how many operands it takes; [`Instruction::decode`] checks those
//! operands against the rules of every form the mnemonic has and produces
//! a resolved [`Instruction`] ready to execute.

use crate::parser::Token;
use crate::registers::{Register, SpecialRegister};
use crate::rules::Rule;
use crate::Error;

/// Conditions that can be applied to an operation like a Branch
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Equal (Z == 1)
    Eq,
    /// Not Equal (Z == 0)
    Ne,
    /// Carry Set (C == 1)
    Cs,
    /// Carry Clear (C == 0)
    Cc,
    /// Minus, negative (N == 1)
    Mi,
    /// Plus, positive (N == 0)
    Pl,
    /// Overflow (V == 1)
    Vs,
    /// No overflow (V == 0)
    Vc,
    /// Unsigned higher (C == 1 and Z == 0)
    Hi,
    /// Unsigned lower or same (C == 0 or Z == 1)
    Ls,
    /// Signed greater than or equal (N == V)
    Ge,
    /// Signed less than (N != V)
    Lt,
    /// Signed greater than (Z == 0 and N == V)
    Gt,
    /// Signed less than or equal (Z == 1 or N != V)
    Le,
    /// Always executes
    Always,
}

impl Condition {
    /// Every condition, in encoding order.
    pub const ALL: [Condition; 15] = [
        Condition::Eq,
        Condition::Ne,
        Condition::Cs,
        Condition::Cc,
        Condition::Mi,
        Condition::Pl,
        Condition::Vs,
        Condition::Vc,
        Condition::Hi,
        Condition::Ls,
        Condition::Ge,
        Condition::Lt,
        Condition::Gt,
        Condition::Le,
        Condition::Always,
    ];

    /// Parse a two letter condition suffix, including the `HS`/`LO` synonyms.
    pub fn from_suffix(suffix: &str) -> Option<Condition> {
        let cond = match suffix.to_ascii_uppercase().as_str() {
            "EQ" => Condition::Eq,
            "NE" => Condition::Ne,
            "CS" | "HS" => Condition::Cs,
            "CC" | "LO" => Condition::Cc,
            "MI" => Condition::Mi,
            "PL" => Condition::Pl,
            "VS" => Condition::Vs,
            "VC" => Condition::Vc,
            "HI" => Condition::Hi,
            "LS" => Condition::Ls,
            "GE" => Condition::Ge,
            "LT" => Condition::Lt,
            "GT" => Condition::Gt,
            "LE" => Condition::Le,
            "AL" => Condition::Always,
            _ => return None,
        };
        Some(cond)
    }

    /// The canonical suffix; empty for `Always`.
    pub fn suffix(self) -> &'static str {
        match self {
            Condition::Eq => "EQ",
            Condition::Ne => "NE",
            Condition::Cs => "CS",
            Condition::Cc => "CC",
            Condition::Mi => "MI",
            Condition::Pl => "PL",
            Condition::Vs => "VS",
            Condition::Vc => "VC",
            Condition::Hi => "HI",
            Condition::Ls => "LS",
            Condition::Ge => "GE",
            Condition::Lt => "LT",
            Condition::Gt => "GT",
            Condition::Le => "LE",
            Condition::Always => "",
        }
    }
}

/// Every instruction name the simulator understands
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Mnemonic {
    Adcs,
    Add,
    Adds,
    Ands,
    Asrs,
    /// `B` and its conditional forms
    B(Condition),
    Bics,
    Bl,
    Blx,
    Bx,
    Cmn,
    Cmp,
    Eors,
    Lsls,
    Lsrs,
    Mov,
    Movs,
    Mrs,
    Msr,
    Muls,
    Mvns,
    Nop,
    Orrs,
    Rev,
    Rev16,
    Revsh,
    Rors,
    Rsbs,
    Sbcs,
    Sub,
    Subs,
    Sxtb,
    Sxth,
    Tst,
    Uxtb,
    Uxth,
}

impl Mnemonic {
    /// Look up an instruction name, ignoring case.
    pub fn from_name(name: &str) -> Option<Mnemonic> {
        let upper = name.to_ascii_uppercase();
        let mnemonic = match upper.as_str() {
            "ADCS" => Mnemonic::Adcs,
            "ADD" => Mnemonic::Add,
            "ADDS" => Mnemonic::Adds,
            "ANDS" => Mnemonic::Ands,
            "ASRS" => Mnemonic::Asrs,
            "B" => Mnemonic::B(Condition::Always),
            "BICS" => Mnemonic::Bics,
            "BL" => Mnemonic::Bl,
            "BLX" => Mnemonic::Blx,
            "BX" => Mnemonic::Bx,
            "CMN" => Mnemonic::Cmn,
            "CMP" => Mnemonic::Cmp,
            "EORS" => Mnemonic::Eors,
            "LSLS" => Mnemonic::Lsls,
            "LSRS" => Mnemonic::Lsrs,
            "MOV" => Mnemonic::Mov,
            "MOVS" => Mnemonic::Movs,
            "MRS" => Mnemonic::Mrs,
            "MSR" => Mnemonic::Msr,
            "MULS" => Mnemonic::Muls,
            "MVNS" => Mnemonic::Mvns,
            "NOP" => Mnemonic::Nop,
            "ORRS" => Mnemonic::Orrs,
            "REV" => Mnemonic::Rev,
            "REV16" => Mnemonic::Rev16,
            "REVSH" => Mnemonic::Revsh,
            "RORS" => Mnemonic::Rors,
            "RSBS" => Mnemonic::Rsbs,
            "SBCS" => Mnemonic::Sbcs,
            "SUB" => Mnemonic::Sub,
            "SUBS" => Mnemonic::Subs,
            "SXTB" => Mnemonic::Sxtb,
            "SXTH" => Mnemonic::Sxth,
            "TST" => Mnemonic::Tst,
            "UXTB" => Mnemonic::Uxtb,
            "UXTH" => Mnemonic::Uxth,
            // BLS, BLT and BLE land here, not on BL
            other if other.len() == 3 && other.starts_with('B') => {
                Mnemonic::B(Condition::from_suffix(&other[1..])?)
            }
            _ => return None,
        };
        Some(mnemonic)
    }

    /// How many operands this instruction is written with.
    pub fn arity(self) -> usize {
        match self {
            Mnemonic::Nop => 0,
            Mnemonic::B(_) | Mnemonic::Bl | Mnemonic::Blx | Mnemonic::Bx => 1,
            Mnemonic::Cmn
            | Mnemonic::Cmp
            | Mnemonic::Mov
            | Mnemonic::Movs
            | Mnemonic::Mrs
            | Mnemonic::Msr
            | Mnemonic::Mvns
            | Mnemonic::Rev
            | Mnemonic::Rev16
            | Mnemonic::Revsh
            | Mnemonic::Sxtb
            | Mnemonic::Sxth
            | Mnemonic::Tst
            | Mnemonic::Uxtb
            | Mnemonic::Uxth => 2,
            _ => 3,
        }
    }

    /// Does this instruction take a label operand?
    pub fn takes_label(self) -> bool {
        matches!(self, Mnemonic::B(_) | Mnemonic::Bl)
    }

    /// Does this instruction update the APSR flags?
    pub fn sets_flags(self) -> bool {
        matches!(
            self,
            Mnemonic::Adcs
                | Mnemonic::Adds
                | Mnemonic::Ands
                | Mnemonic::Asrs
                | Mnemonic::Bics
                | Mnemonic::Cmn
                | Mnemonic::Cmp
                | Mnemonic::Eors
                | Mnemonic::Lsls
                | Mnemonic::Lsrs
                | Mnemonic::Movs
                | Mnemonic::Msr
                | Mnemonic::Muls
                | Mnemonic::Mvns
                | Mnemonic::Orrs
                | Mnemonic::Rors
                | Mnemonic::Rsbs
                | Mnemonic::Sbcs
                | Mnemonic::Subs
                | Mnemonic::Tst
        )
    }
}

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Mnemonic::B(cond) = self {
            return write!(f, "B{}", cond.suffix());
        }
        let name = format!("{:?}", self).to_ascii_uppercase();
        f.write_str(&name)
    }
}

/// A fully checked instruction, with its operands decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// ADCS <Rdn>,<Rdn>,<Rm>
    AdcsReg {
        /// Destination and first source
        rdn: Register,
        /// Second source
        rm: Register,
    },
    /// ADD <Rdn>,<Rdn>,<Rm> or ADD <Rd>,SP|PC,<Rm>
    AddReg {
        /// Destination
        rd: Register,
        /// First source
        rn: Register,
        /// Second source
        rm: Register,
    },
    /// ADD <Rd>,SP|PC,#<imm> or ADD SP,SP,#<imm>
    AddImm {
        /// Destination
        rd: Register,
        /// SP or PC
        rn: Register,
        /// The value to add
        imm: u64,
    },
    /// ADDS <Rd>,<Rn>,<Rm>
    AddsReg {
        /// Destination
        rd: Register,
        /// First source
        rn: Register,
        /// Second source
        rm: Register,
    },
    /// ADDS <Rd>,<Rn>,#<imm>
    AddsImm {
        /// Destination
        rd: Register,
        /// Source
        rn: Register,
        /// The value to add
        imm: u64,
    },
    /// ANDS <Rdn>,<Rdn>,<Rm>
    AndsReg {
        /// Destination and first source
        rdn: Register,
        /// Second source
        rm: Register,
    },
    /// ASRS <Rd>,<Rm>,#<imm>
    AsrsImm {
        /// Destination
        rd: Register,
        /// Value to shift
        rm: Register,
        /// Shift amount, 1 to 32
        imm: u64,
    },
    /// ASRS <Rdn>,<Rdn>,<Rm>
    AsrsReg {
        /// Destination and value to shift
        rdn: Register,
        /// Holds the shift amount
        rm: Register,
    },
    /// B<c> <label>
    Branch {
        /// Only branch if this holds
        cond: Condition,
        /// Where to go
        label: String,
    },
    /// BICS <Rdn>,<Rdn>,<Rm>
    BicsReg {
        /// Destination and first source
        rdn: Register,
        /// Bits to clear
        rm: Register,
    },
    /// BL <label>
    BranchLink {
        /// Where to go
        label: String,
    },
    /// BLX <Rm>
    BranchLinkExchange {
        /// Which register contains the new PC
        rm: Register,
    },
    /// BX <Rm>
    BranchExchange {
        /// Which register contains the new PC
        rm: Register,
    },
    /// CMN <Rn>,<Rm>
    CmnReg {
        /// Left hand side
        rn: Register,
        /// Right hand side
        rm: Register,
    },
    /// CMP <Rn>,<Rm>
    CmpReg {
        /// The left hand register to compare
        rn: Register,
        /// The right hand register to compare
        rm: Register,
    },
    /// CMP <Rn>,#<imm8>
    CmpImm {
        /// The register to compare
        rn: Register,
        /// The value to compare against
        imm: u64,
    },
    /// EORS <Rdn>,<Rdn>,<Rm>
    EorsReg {
        /// Destination and first source
        rdn: Register,
        /// Second source
        rm: Register,
    },
    /// LSLS <Rd>,<Rm>,#<imm>
    LslsImm {
        /// Destination
        rd: Register,
        /// Value to shift
        rm: Register,
        /// Shift amount, 0 to 31
        imm: u64,
    },
    /// LSLS <Rdn>,<Rdn>,<Rm>
    LslsReg {
        /// Destination and value to shift
        rdn: Register,
        /// Holds the shift amount
        rm: Register,
    },
    /// LSRS <Rd>,<Rm>,#<imm>
    LsrsImm {
        /// Destination
        rd: Register,
        /// Value to shift
        rm: Register,
        /// Shift amount, 1 to 32
        imm: u64,
    },
    /// LSRS <Rdn>,<Rdn>,<Rm>
    LsrsReg {
        /// Destination and value to shift
        rdn: Register,
        /// Holds the shift amount
        rm: Register,
    },
    /// MOV <Rd>,<Rm>
    MovReg {
        /// Which register to move into
        rd: Register,
        /// Which register to move from
        rm: Register,
    },
    /// MOVS <Rd>,<Rm>
    MovsReg {
        /// Which register to move into
        rd: Register,
        /// Which register to move from
        rm: Register,
    },
    /// MOVS <Rd>,#<imm8>
    MovsImm {
        /// Which register to move the value into
        rd: Register,
        /// The 8-bit value
        imm: u64,
    },
    /// MRS <Rd>,<spec_reg>
    Mrs {
        /// Destination
        rd: Register,
        /// The status register to read
        spec: SpecialRegister,
    },
    /// MSR <spec_reg>,<Rn>
    Msr {
        /// The status register to write
        spec: SpecialRegister,
        /// Source
        rn: Register,
    },
    /// MULS <Rdm>,<Rn>,<Rdm>
    Muls {
        /// Destination and one factor
        rdm: Register,
        /// The other factor
        rn: Register,
    },
    /// MVNS <Rd>,<Rm>
    MvnsReg {
        /// Destination
        rd: Register,
        /// Value to invert
        rm: Register,
    },
    /// NOP
    Nop,
    /// ORRS <Rdn>,<Rdn>,<Rm>
    OrrsReg {
        /// Destination and first source
        rdn: Register,
        /// Second source
        rm: Register,
    },
    /// REV <Rd>,<Rm>
    Rev {
        /// Destination
        rd: Register,
        /// Source
        rm: Register,
    },
    /// REV16 <Rd>,<Rm>
    Rev16 {
        /// Destination
        rd: Register,
        /// Source
        rm: Register,
    },
    /// REVSH <Rd>,<Rm>
    Revsh {
        /// Destination
        rd: Register,
        /// Source
        rm: Register,
    },
    /// RORS <Rdn>,<Rdn>,<Rm>
    RorsReg {
        /// Destination and value to rotate
        rdn: Register,
        /// Holds the rotate amount
        rm: Register,
    },
    /// RSBS <Rd>,<Rn>,#0
    RsbsImm {
        /// Destination
        rd: Register,
        /// Value to negate
        rn: Register,
    },
    /// SBCS <Rdn>,<Rdn>,<Rm>
    SbcsReg {
        /// Destination and first source
        rdn: Register,
        /// Second source
        rm: Register,
    },
    /// SUB SP,SP,#<imm>
    SubSpImm {
        /// Bytes to take off the stack pointer
        imm: u64,
    },
    /// SUBS <Rd>,<Rn>,<Rm>
    SubsReg {
        /// Destination
        rd: Register,
        /// First source
        rn: Register,
        /// Second source
        rm: Register,
    },
    /// SUBS <Rd>,<Rn>,#<imm>
    SubsImm {
        /// Destination
        rd: Register,
        /// Source
        rn: Register,
        /// The value to subtract
        imm: u64,
    },
    /// SXTB <Rd>,<Rm>
    Sxtb {
        /// Destination
        rd: Register,
        /// Source
        rm: Register,
    },
    /// SXTH <Rd>,<Rm>
    Sxth {
        /// Destination
        rd: Register,
        /// Source
        rm: Register,
    },
    /// TST <Rn>,<Rm>
    TstReg {
        /// Left hand side
        rn: Register,
        /// Right hand side
        rm: Register,
    },
    /// UXTB <Rd>,<Rm>
    Uxtb {
        /// Destination
        rd: Register,
        /// Source
        rm: Register,
    },
    /// UXTH <Rd>,<Rm>
    Uxth {
        /// Destination
        rd: Register,
        /// Source
        rm: Register,
    },
}

/// The operands of one instruction being decoded.
struct Operands<'a, 'b> {
    mnemonic: Mnemonic,
    tokens: &'b [Token<'a>],
    register_count: usize,
}

impl Operands<'_, '_> {
    fn text(&self, position: usize) -> Result<&str, Error> {
        self.tokens
            .get(position)
            .map(|token| token.text())
            .ok_or_else(|| Error::Rule(format!("{} is missing an operand", self.mnemonic)))
    }

    fn reg(&self, position: usize, rule: Rule) -> Result<Register, Error> {
        rule.register(self.text(position)?, self.register_count)
    }

    fn imm(&self, position: usize, rule: Rule) -> Result<u64, Error> {
        rule.immediate(self.text(position)?, self.register_count)
    }

    fn special(&self, position: usize) -> Result<SpecialRegister, Error> {
        Rule::SpecialRegisters.special(self.text(position)?, self.register_count)
    }

    fn is_immediate(&self, position: usize) -> bool {
        matches!(self.tokens.get(position), Some(Token::Immediate(_)))
    }

    fn label(&self, position: usize) -> Result<String, Error> {
        match self.tokens.get(position) {
            Some(Token::Label(label)) => Ok((*label).to_owned()),
            Some(other) => Err(Error::Rule(format!(
                "{} needs a label, not {}",
                self.mnemonic,
                other.text()
            ))),
            None => Err(Error::Rule(format!("{} is missing a label", self.mnemonic))),
        }
    }

    /// The two-operand encodings write back into their first source.
    fn same(&self, rd: Register, rn: Register) -> Result<(), Error> {
        if rd == rn {
            Ok(())
        } else {
            Err(Error::Rule(format!(
                "{} requires the destination {} to be the same as the first source {}",
                self.mnemonic, rd, rn
            )))
        }
    }

    /// For commutative operations the destination may match either source;
    /// returns the source it does not match.
    fn either(&self, rd: Register, rn: Register, rm: Register) -> Result<Register, Error> {
        if rd == rn {
            Ok(rm)
        } else if rd == rm {
            Ok(rn)
        } else {
            Err(Error::Rule(format!(
                "{} requires the destination {} to be the same as one of the sources {} or {}",
                self.mnemonic, rd, rn, rm
            )))
        }
    }
}

impl Instruction {
    /// Check classified operand tokens against the forms of `mnemonic`.
    ///
    /// `register_count` bounds the register numbers that are recognised at
    /// all; the rules then narrow that down per operand.
    pub fn decode(
        mnemonic: Mnemonic,
        tokens: &[Token<'_>],
        register_count: usize,
    ) -> Result<Instruction, Error> {
        if tokens.len() != mnemonic.arity() {
            return Err(Error::Rule(format!(
                "{} takes {} operand(s), not {}",
                mnemonic,
                mnemonic.arity(),
                tokens.len()
            )));
        }
        let ops = Operands {
            mnemonic,
            tokens,
            register_count,
        };
        let low = Rule::LowRegisters;
        let any = Rule::AnyRegisters;

        let instruction = match mnemonic {
            Mnemonic::Adcs | Mnemonic::Bics | Mnemonic::Sbcs => {
                let rd = ops.reg(0, low)?;
                let rn = ops.reg(1, low)?;
                let rm = ops.reg(2, low)?;
                ops.same(rd, rn)?;
                match mnemonic {
                    Mnemonic::Adcs => Instruction::AdcsReg { rdn: rd, rm },
                    Mnemonic::Bics => Instruction::BicsReg { rdn: rd, rm },
                    _ => Instruction::SbcsReg { rdn: rd, rm },
                }
            }
            Mnemonic::Add => {
                let rd = ops.reg(0, any)?;
                let rn = ops.reg(1, any)?;
                if ops.is_immediate(2) {
                    match (rd, rn) {
                        (Register::Sp, Register::Sp) => Instruction::AddImm {
                            rd,
                            rn,
                            imm: ops.imm(2, Rule::Imm9_4)?,
                        },
                        (_, Register::Sp | Register::Pc) => Instruction::AddImm {
                            rd: ops.reg(0, low)?,
                            rn,
                            imm: ops.imm(2, Rule::Imm10_4)?,
                        },
                        _ => {
                            return Err(Error::Rule(format!(
                                "ADD only adds an immediate to SP or PC, not {}; use ADDS",
                                rn
                            )))
                        }
                    }
                } else {
                    let rm = ops.reg(2, any)?;
                    if !matches!(rn, Register::Sp | Register::Pc) {
                        ops.same(rd, rn)?;
                    }
                    Instruction::AddReg { rd, rn, rm }
                }
            }
            Mnemonic::Adds | Mnemonic::Subs => {
                let rd = ops.reg(0, low)?;
                let rn = ops.reg(1, low)?;
                let add = mnemonic == Mnemonic::Adds;
                if ops.is_immediate(2) {
                    let rule = if rd == rn { Rule::Imm8 } else { Rule::Imm3 };
                    let imm = ops.imm(2, rule)?;
                    if add {
                        Instruction::AddsImm { rd, rn, imm }
                    } else {
                        Instruction::SubsImm { rd, rn, imm }
                    }
                } else {
                    let rm = ops.reg(2, low)?;
                    if add {
                        Instruction::AddsReg { rd, rn, rm }
                    } else {
                        Instruction::SubsReg { rd, rn, rm }
                    }
                }
            }
            Mnemonic::Ands | Mnemonic::Eors | Mnemonic::Orrs | Mnemonic::Muls => {
                let rd = ops.reg(0, low)?;
                let rn = ops.reg(1, low)?;
                let rm = ops.reg(2, low)?;
                let other = ops.either(rd, rn, rm)?;
                match mnemonic {
                    Mnemonic::Ands => Instruction::AndsReg { rdn: rd, rm: other },
                    Mnemonic::Eors => Instruction::EorsReg { rdn: rd, rm: other },
                    Mnemonic::Orrs => Instruction::OrrsReg { rdn: rd, rm: other },
                    _ => Instruction::Muls { rdm: rd, rn: other },
                }
            }
            Mnemonic::Asrs | Mnemonic::Lsls | Mnemonic::Lsrs => {
                let rd = ops.reg(0, low)?;
                let rm = ops.reg(1, low)?;
                if ops.is_immediate(2) {
                    let rule = if mnemonic == Mnemonic::Lsls {
                        Rule::Imm5
                    } else {
                        Rule::Imm5Counting
                    };
                    let imm = ops.imm(2, rule)?;
                    match mnemonic {
                        Mnemonic::Asrs => Instruction::AsrsImm { rd, rm, imm },
                        Mnemonic::Lsls => Instruction::LslsImm { rd, rm, imm },
                        _ => Instruction::LsrsImm { rd, rm, imm },
                    }
                } else {
                    let amount = ops.reg(2, low)?;
                    ops.same(rd, rm)?;
                    match mnemonic {
                        Mnemonic::Asrs => Instruction::AsrsReg { rdn: rd, rm: amount },
                        Mnemonic::Lsls => Instruction::LslsReg { rdn: rd, rm: amount },
                        _ => Instruction::LsrsReg { rdn: rd, rm: amount },
                    }
                }
            }
            Mnemonic::Rors => {
                let rd = ops.reg(0, low)?;
                let rn = ops.reg(1, low)?;
                let rm = ops.reg(2, low)?;
                ops.same(rd, rn)?;
                Instruction::RorsReg { rdn: rd, rm }
            }
            Mnemonic::B(cond) => Instruction::Branch {
                cond,
                label: ops.label(0)?,
            },
            Mnemonic::Bl => Instruction::BranchLink {
                label: ops.label(0)?,
            },
            Mnemonic::Blx => Instruction::BranchLinkExchange {
                rm: ops.reg(0, any)?,
            },
            Mnemonic::Bx => Instruction::BranchExchange {
                rm: ops.reg(0, any)?,
            },
            Mnemonic::Cmn => Instruction::CmnReg {
                rn: ops.reg(0, low)?,
                rm: ops.reg(1, low)?,
            },
            Mnemonic::Cmp => {
                if ops.is_immediate(1) {
                    Instruction::CmpImm {
                        rn: ops.reg(0, low)?,
                        imm: ops.imm(1, Rule::Imm8)?,
                    }
                } else {
                    Instruction::CmpReg {
                        rn: ops.reg(0, any)?,
                        rm: ops.reg(1, any)?,
                    }
                }
            }
            Mnemonic::Mov => {
                let rd = ops.reg(0, any)?;
                if ops.is_immediate(1) {
                    return Err(Error::Rule(format!(
                        "MOV cannot move the immediate {} into {}; use MOVS",
                        ops.text(1)?,
                        rd
                    )));
                }
                Instruction::MovReg {
                    rd,
                    rm: ops.reg(1, any)?,
                }
            }
            Mnemonic::Movs => {
                let rd = ops.reg(0, low)?;
                if ops.is_immediate(1) {
                    Instruction::MovsImm {
                        rd,
                        imm: ops.imm(1, Rule::Imm8)?,
                    }
                } else {
                    Instruction::MovsReg {
                        rd,
                        rm: ops.reg(1, low)?,
                    }
                }
            }
            Mnemonic::Mrs => Instruction::Mrs {
                rd: ops.reg(0, Rule::LrOrGeneralPurposeRegisters)?,
                spec: ops.special(1)?,
            },
            Mnemonic::Msr => Instruction::Msr {
                spec: ops.special(0)?,
                rn: ops.reg(1, Rule::GeneralPurposeRegisters)?,
            },
            Mnemonic::Nop => Instruction::Nop,
            Mnemonic::Rsbs => {
                let rd = ops.reg(0, low)?;
                let rn = ops.reg(1, low)?;
                if ops.imm(2, Rule::Imm8)? != 0 {
                    return Err(Error::Rule(format!(
                        "RSBS only subtracts from #0, not {}",
                        ops.text(2)?
                    )));
                }
                Instruction::RsbsImm { rd, rn }
            }
            Mnemonic::Sub => {
                let rd = ops.reg(0, any)?;
                let rn = ops.reg(1, any)?;
                let imm = ops.imm(2, Rule::Imm9_4)?;
                if rd != Register::Sp || rn != Register::Sp {
                    return Err(Error::Rule(format!(
                        "SUB only operates as SUB SP, SP, #imm, not on {} and {}; use SUBS",
                        rd, rn
                    )));
                }
                Instruction::SubSpImm { imm }
            }
            Mnemonic::Tst => Instruction::TstReg {
                rn: ops.reg(0, low)?,
                rm: ops.reg(1, low)?,
            },
            Mnemonic::Mvns
            | Mnemonic::Rev
            | Mnemonic::Rev16
            | Mnemonic::Revsh
            | Mnemonic::Sxtb
            | Mnemonic::Sxth
            | Mnemonic::Uxtb
            | Mnemonic::Uxth => {
                let rd = ops.reg(0, low)?;
                let rm = ops.reg(1, low)?;
                match mnemonic {
                    Mnemonic::Mvns => Instruction::MvnsReg { rd, rm },
                    Mnemonic::Rev => Instruction::Rev { rd, rm },
                    Mnemonic::Rev16 => Instruction::Rev16 { rd, rm },
                    Mnemonic::Revsh => Instruction::Revsh { rd, rm },
                    Mnemonic::Sxtb => Instruction::Sxtb { rd, rm },
                    Mnemonic::Sxth => Instruction::Sxth { rd, rm },
                    Mnemonic::Uxtb => Instruction::Uxtb { rd, rm },
                    _ => Instruction::Uxth { rd, rm },
                }
            }
        };
        Ok(instruction)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::classify;
    use pretty_assertions::assert_eq;

    fn decode(name: &str, operands: &[&str]) -> Result<Instruction, Error> {
        let mnemonic = Mnemonic::from_name(name).expect("known mnemonic");
        let tokens: Vec<Token> = operands
            .iter()
            .map(|op| classify(op, mnemonic.takes_label()).expect("classified"))
            .collect();
        Instruction::decode(mnemonic, &tokens, 16)
    }

    fn rule_error(result: Result<Instruction, Error>) -> String {
        match result {
            Err(Error::Rule(message)) => message,
            other => panic!("expected a rule error, got {:?}", other),
        }
    }

    #[test]
    fn mnemonic_names() {
        assert_eq!(Mnemonic::from_name("adds"), Some(Mnemonic::Adds));
        assert_eq!(Mnemonic::from_name("B"), Some(Mnemonic::B(Condition::Always)));
        assert_eq!(Mnemonic::from_name("BL"), Some(Mnemonic::Bl));
        assert_eq!(Mnemonic::from_name("BLS"), Some(Mnemonic::B(Condition::Ls)));
        assert_eq!(Mnemonic::from_name("BLT"), Some(Mnemonic::B(Condition::Lt)));
        assert_eq!(Mnemonic::from_name("BHS"), Some(Mnemonic::B(Condition::Cs)));
        assert_eq!(Mnemonic::from_name("BLO"), Some(Mnemonic::B(Condition::Cc)));
        assert_eq!(Mnemonic::from_name("BXX"), None);
        assert_eq!(Mnemonic::from_name("BADINST"), None);
        assert_eq!(Mnemonic::B(Condition::Ne).to_string(), "BNE");
        assert_eq!(Mnemonic::Rev16.to_string(), "REV16");
    }

    #[test]
    fn condition_codes() {
        for cond in Condition::ALL {
            if cond != Condition::Always {
                assert_eq!(Condition::from_suffix(cond.suffix()), Some(cond), "{:?}", cond);
            }
        }
        assert_eq!(Condition::from_suffix("al"), Some(Condition::Always));
        assert_eq!(Condition::Always.suffix(), "");
        assert_eq!(Condition::from_suffix("hs"), Some(Condition::Cs));
        assert_eq!(Condition::from_suffix("XX"), None);
    }

    #[test]
    fn adcs() {
        assert_eq!(
            decode("ADCS", &["R0", "R0", "R2"]),
            Ok(Instruction::AdcsReg {
                rdn: Register::R0,
                rm: Register::R2
            })
        );
        let message = rule_error(decode("ADCS", &["R0", "R1", "R2"]));
        assert!(message.contains("same"), "{}", message);
        rule_error(decode("ADCS", &["R8", "R8", "R2"]));
    }

    #[test]
    fn add_forms() {
        assert_eq!(
            decode("ADD", &["R0", "R0", "R2"]),
            Ok(Instruction::AddReg {
                rd: Register::R0,
                rn: Register::R0,
                rm: Register::R2
            })
        );
        assert_eq!(
            decode("ADD", &["R10", "R10", "R12"]),
            Ok(Instruction::AddReg {
                rd: Register::R10,
                rn: Register::R10,
                rm: Register::R12
            })
        );
        rule_error(decode("ADD", &["R0", "R1", "R2"]));
        assert_eq!(
            decode("ADD", &["R0", "PC", "#4"]),
            Ok(Instruction::AddImm {
                rd: Register::R0,
                rn: Register::Pc,
                imm: 4
            })
        );
        assert_eq!(
            decode("ADD", &["SP", "SP", "#508"]),
            Ok(Instruction::AddImm {
                rd: Register::Sp,
                rn: Register::Sp,
                imm: 508
            })
        );
        rule_error(decode("ADD", &["SP", "SP", "#512"]));
        rule_error(decode("ADD", &["R0", "SP", "#3"]));
        rule_error(decode("ADD", &["R8", "SP", "#4"]));
        rule_error(decode("ADD", &["R0", "R1", "#4"]));
    }

    #[test]
    fn adds_forms() {
        assert!(decode("ADDS", &["R0", "R1", "R2"]).is_ok());
        assert!(decode("ADDS", &["R0", "R0", "#255"]).is_ok());
        assert!(decode("ADDS", &["R0", "R1", "#7"]).is_ok());
        rule_error(decode("ADDS", &["R0", "R0", "#256"]));
        rule_error(decode("ADDS", &["R0", "R1", "#8"]));
        rule_error(decode("SUBS", &["R0", "R1", "#8"]));
    }

    #[test]
    fn commutative_destination() {
        assert_eq!(
            decode("MULS", &["R0", "R1", "R0"]),
            Ok(Instruction::Muls {
                rdm: Register::R0,
                rn: Register::R1
            })
        );
        assert_eq!(
            decode("ANDS", &["R3", "R3", "R4"]),
            Ok(Instruction::AndsReg {
                rdn: Register::R3,
                rm: Register::R4
            })
        );
        rule_error(decode("MULS", &["R0", "R1", "R2"]));
        rule_error(decode("BICS", &["R0", "R1", "R0"]));
    }

    #[test]
    fn shifts() {
        assert!(decode("LSLS", &["R0", "R1", "#0"]).is_ok());
        rule_error(decode("LSLS", &["R0", "R1", "#32"]));
        assert!(decode("LSRS", &["R0", "R1", "#32"]).is_ok());
        rule_error(decode("ASRS", &["R0", "R1", "#0"]));
        assert!(decode("ASRS", &["R0", "R0", "R1"]).is_ok());
        rule_error(decode("ASRS", &["R0", "R2", "R1"]));
        rule_error(decode("RORS", &["R0", "R0", "#1"]));
    }

    #[test]
    fn moves() {
        assert!(decode("MOV", &["R1", "R0"]).is_ok());
        assert!(decode("MOV", &["LR", "R12"]).is_ok());
        rule_error(decode("MOV", &["R1", "#3"]));
        let message = rule_error(decode("MOVS", &["#1", "#3"]));
        assert!(message.contains("not a register"), "{}", message);
        let message = rule_error(decode("MOVS", &["R17", "#3"]));
        assert!(message.contains("greater"), "{}", message);
        rule_error(decode("MOVS", &["R9", "R1"]));
        rule_error(decode("MVNS", &["R9", "R0"]));
        rule_error(decode("REV", &["R4", "R10"]));
    }

    #[test]
    fn status_registers() {
        assert_eq!(
            decode("MRS", &["LR", "APSR"]),
            Ok(Instruction::Mrs {
                rd: Register::Lr,
                spec: SpecialRegister::Apsr
            })
        );
        rule_error(decode("MRS", &["SP", "APSR"]));
        rule_error(decode("MRS", &["R0", "R1"]));
        assert_eq!(
            decode("MSR", &["APSR", "R0"]),
            Ok(Instruction::Msr {
                spec: SpecialRegister::Apsr,
                rn: Register::R0
            })
        );
    }

    #[test]
    fn misc() {
        assert_eq!(decode("RSBS", &["R0", "R1", "#0"]), Ok(Instruction::RsbsImm {
            rd: Register::R0,
            rn: Register::R1
        }));
        rule_error(decode("RSBS", &["R0", "R1", "#1"]));
        assert_eq!(decode("SUB", &["SP", "SP", "#16"]), Ok(Instruction::SubSpImm { imm: 16 }));
        rule_error(decode("SUB", &["R0", "R0", "#16"]));
        assert_eq!(decode("NOP", &[]), Ok(Instruction::Nop));
        assert!(decode("CMP", &["R8", "R9"]).is_ok());
        rule_error(decode("CMP", &["R8", "#1"]));
    }

    #[test]
    fn branches() {
        assert_eq!(
            decode("BNE", &["loop"]),
            Ok(Instruction::Branch {
                cond: Condition::Ne,
                label: "loop".to_owned()
            })
        );
        rule_error(decode("B", &["R0"]));
        assert_eq!(
            decode("BX", &["LR"]),
            Ok(Instruction::BranchExchange { rm: Register::Lr })
        );
    }
}
