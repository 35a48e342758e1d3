//! The execution engine.
//!
//! [`Simulator::evaluate`] turns a line of assembly into a resolved
//! [`Instruction`] and appends it to the [`Program`]. [`Simulator::run`]
//! then fetches from the program at `PC`, executes, and moves `PC` on,
//! either to the next instruction or to wherever a branch sent it.
//!
//! `PC` holds the index of an instruction within the program, not a byte
//! address, and reading `PC` during an instruction gives that instruction's
//! own index.

use std::collections::HashMap;

use crate::instruction::{Condition, Instruction, Mnemonic};
use crate::parser::{classify, parse_operands, split_line};
use crate::registers::{ArithOp, Flag, Register, RegisterFile};
use crate::rules::{self, Rule};
use crate::{Config, Error};

/// One resolved line of the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The line as it was given to `evaluate`
    pub source: String,
    /// The label on the line, if any
    pub label: Option<String>,
    /// Which instruction this is
    pub mnemonic: Mnemonic,
    /// The decoded instruction
    pub instruction: Instruction,
}

/// Everything `evaluate` has accepted so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    entries: Vec<Entry>,
    labels: HashMap<String, usize>,
}

impl Program {
    /// How many instructions are loaded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the program empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the instruction at an index.
    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Walk the program in order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Where a label points.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    fn push(&mut self, entry: Entry) {
        if let Some(label) = &entry.label {
            self.labels.insert(label.clone(), self.entries.len());
        }
        self.entries.push(entry);
    }
}

/// Where the simulator is in its life
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Nothing has been evaluated
    Empty,
    /// Instructions are queued but none has executed
    Loaded,
    /// At least one instruction has executed
    Ran,
}

/// What happens to `PC` after an instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Flow {
    Next,
    Jump(u64),
}

/// A Thumb core, plus the program it is running.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: Config,
    registers: RegisterFile,
    program: Program,
    executed: u64,
}

impl Default for Simulator {
    fn default() -> Simulator {
        Simulator::build(Config::default())
    }
}

impl Simulator {
    /// Create a new simulator.
    ///
    /// All registers and flags start at zero and the program is empty.
    pub fn new(config: Config) -> Result<Simulator, Error> {
        config.validate()?;
        Ok(Simulator::build(config))
    }

    fn build(config: Config) -> Simulator {
        Simulator {
            registers: RegisterFile::zeroed(config.bit_width, config.register_count),
            config,
            program: Program::default(),
            executed: 0,
        }
    }

    /// The configuration we were built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The register file.
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// The register file, for modification.
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    /// Read a register by name (`R3`, `SP`, `APSR`, ...).
    pub fn register(&self, name: &str) -> Result<u64, Error> {
        self.registers.get(name)
    }

    /// Write a register by name (`R3`, `SP`, `APSR`, ...).
    pub fn set_register(&mut self, name: &str, value: u64) -> Result<(), Error> {
        self.registers.set(name, value)
    }

    /// The instructions accepted so far.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The current value of `PC`.
    pub fn pc(&self) -> u64 {
        self.registers.read(Register::Pc)
    }

    /// Where we are in our life.
    pub fn state(&self) -> State {
        if self.executed > 0 {
            State::Ran
        } else if self.program.is_empty() {
            State::Empty
        } else {
            State::Loaded
        }
    }

    /// Check groups of operand tokens against rules, using this
    /// simulator's register count.
    pub fn check_arguments<'a, G, T>(&self, groups: G) -> Result<(), Error>
    where
        G: IntoIterator<Item = (Rule, T)>,
        T: IntoIterator<Item = &'a str>,
    {
        rules::check_arguments(groups, self.config.register_count)
    }

    /// Check one line of assembly and append it to the program.
    ///
    /// Nothing is executed. On error the program is left as it was.
    pub fn evaluate(&mut self, line: &str) -> Result<(), Error> {
        let source = split_line(line)?;
        let mnemonic = Mnemonic::from_name(source.mnemonic).ok_or_else(|| {
            Error::Validation(format!(
                "{} is not a supported instruction",
                source.mnemonic
            ))
        })?;
        let tokens = parse_operands(source.operands, mnemonic.arity())?
            .into_iter()
            .map(|token| classify(token, mnemonic.takes_label()))
            .collect::<Result<Vec<_>, _>>()?;
        let instruction = Instruction::decode(mnemonic, &tokens, self.config.register_count)?;

        if let Some(label) = source.label {
            if let Some(index) = self.program.label(label) {
                return Err(Error::Validation(format!(
                    "Label {} is already defined at instruction {}",
                    label, index
                )));
            }
        }

        tracing::debug!(
            "Loaded {:?} at {} (label {:?})",
            instruction,
            self.program.len(),
            source.label
        );
        self.program.push(Entry {
            source: line.to_owned(),
            label: source.label.map(str::to_owned),
            mnemonic,
            instruction,
        });
        Ok(())
    }

    /// Execute from `PC` until we run off the end of the program.
    pub fn run(&mut self) -> Result<(), Error> {
        tracing::debug!("Running from {} of {}", self.pc(), self.program.len());
        while self.step()? {}
        tracing::debug!("Stopped at {} after {} instructions", self.pc(), self.executed);
        Ok(())
    }

    /// Fetch and execute the one instruction at `PC`.
    ///
    /// Returns `false` if `PC` is past the end of the program.
    pub fn step(&mut self) -> Result<bool, Error> {
        let entry = usize::try_from(self.pc())
            .ok()
            .and_then(|index| self.program.get(index));
        let Some(entry) = entry else {
            return Ok(false);
        };
        let instruction = entry.instruction.clone();
        tracing::trace!(
            "{:>4}: {:?}{}",
            self.pc(),
            instruction,
            if entry.mnemonic.sets_flags() { " (sets flags)" } else { "" }
        );
        self.execute(&instruction)?;
        self.executed += 1;
        Ok(true)
    }

    /// Execute an instruction, as if it were at the current `PC`.
    ///
    /// Either the instruction completes and `PC` moves on, or it fails
    /// before any register has been changed.
    pub fn execute(&mut self, instruction: &Instruction) -> Result<(), Error> {
        let pc = self.pc();
        let mask = self.registers.mask();
        let width = self.registers.width();

        let flow = match instruction {
            Instruction::AdcsReg { rdn, rm } => {
                let carry = self.registers.is_c_set();
                let (result, c, v) =
                    self.registers
                        .add_with_carry(self.fetch_reg(*rdn), self.fetch_reg(*rm), carry);
                self.registers.write(*rdn, result);
                self.set_arith_flags(result, c, v);
                Flow::Next
            }
            Instruction::AddReg { rd, rn, rm } => {
                let value = self.fetch_reg(*rn).wrapping_add(self.fetch_reg(*rm)) & mask;
                self.store_reg(*rd, value)
            }
            Instruction::AddImm { rd, rn, imm } => {
                let value = self.fetch_reg(*rn).wrapping_add(*imm) & mask;
                self.store_reg(*rd, value)
            }
            Instruction::AddsReg { rd, rn, rm } => {
                self.add_sub(*rd, self.fetch_reg(*rn), self.fetch_reg(*rm), ArithOp::Add)
            }
            Instruction::AddsImm { rd, rn, imm } => {
                self.add_sub(*rd, self.fetch_reg(*rn), *imm, ArithOp::Add)
            }
            Instruction::AndsReg { rdn, rm } => {
                self.logical(*rdn, self.fetch_reg(*rdn) & self.fetch_reg(*rm))
            }
            Instruction::AsrsImm { rd, rm, imm } => {
                let shifted = shift_right_arithmetic(self.fetch_reg(*rm), *imm, width, mask);
                self.shift(*rd, shifted)
            }
            Instruction::AsrsReg { rdn, rm } => {
                let amount = self.fetch_reg(*rm) & 0xFF;
                let shifted = shift_right_arithmetic(self.fetch_reg(*rdn), amount, width, mask);
                self.shift(*rdn, shifted)
            }
            Instruction::Branch { cond, label } => {
                let target = self.resolve(label)?;
                if self.check_condition(*cond) {
                    Flow::Jump(target)
                } else {
                    Flow::Next
                }
            }
            Instruction::BicsReg { rdn, rm } => {
                self.logical(*rdn, self.fetch_reg(*rdn) & !self.fetch_reg(*rm) & mask)
            }
            Instruction::BranchLink { label } => {
                let target = self.resolve(label)?;
                self.registers.write(Register::Lr, pc.wrapping_add(1));
                Flow::Jump(target)
            }
            Instruction::BranchLinkExchange { rm } => {
                let target = self.fetch_reg(*rm);
                self.registers.write(Register::Lr, pc.wrapping_add(1));
                Flow::Jump(target)
            }
            Instruction::BranchExchange { rm } => Flow::Jump(self.fetch_reg(*rm)),
            Instruction::CmnReg { rn, rm } => {
                self.compare(self.fetch_reg(*rn), self.fetch_reg(*rm), ArithOp::Add)
            }
            Instruction::CmpReg { rn, rm } => {
                self.compare(self.fetch_reg(*rn), self.fetch_reg(*rm), ArithOp::Sub)
            }
            Instruction::CmpImm { rn, imm } => {
                self.compare(self.fetch_reg(*rn), *imm, ArithOp::Sub)
            }
            Instruction::EorsReg { rdn, rm } => {
                self.logical(*rdn, self.fetch_reg(*rdn) ^ self.fetch_reg(*rm))
            }
            Instruction::LslsImm { rd, rm, imm } => {
                let shifted = shift_left(self.fetch_reg(*rm), *imm, width, mask);
                self.shift(*rd, shifted)
            }
            Instruction::LslsReg { rdn, rm } => {
                let amount = self.fetch_reg(*rm) & 0xFF;
                let shifted = shift_left(self.fetch_reg(*rdn), amount, width, mask);
                self.shift(*rdn, shifted)
            }
            Instruction::LsrsImm { rd, rm, imm } => {
                let shifted = shift_right_logical(self.fetch_reg(*rm), *imm, width);
                self.shift(*rd, shifted)
            }
            Instruction::LsrsReg { rdn, rm } => {
                let amount = self.fetch_reg(*rm) & 0xFF;
                let shifted = shift_right_logical(self.fetch_reg(*rdn), amount, width);
                self.shift(*rdn, shifted)
            }
            Instruction::MovReg { rd, rm } => {
                let value = self.fetch_reg(*rm);
                self.store_reg(*rd, value)
            }
            Instruction::MovsReg { rd, rm } => self.logical(*rd, self.fetch_reg(*rm)),
            Instruction::MovsImm { rd, imm } => self.logical(*rd, *imm & mask),
            Instruction::Mrs { rd, spec } => {
                let value = self.registers.read_special(*spec);
                self.store_reg(*rd, value)
            }
            Instruction::Msr { spec, rn } => {
                let value = self.fetch_reg(*rn);
                self.registers.write_special(*spec, value);
                Flow::Next
            }
            Instruction::Muls { rdm, rn } => {
                let value = self.fetch_reg(*rdm).wrapping_mul(self.fetch_reg(*rn)) & mask;
                self.logical(*rdm, value)
            }
            Instruction::MvnsReg { rd, rm } => self.logical(*rd, !self.fetch_reg(*rm) & mask),
            Instruction::Nop => Flow::Next,
            Instruction::OrrsReg { rdn, rm } => {
                self.logical(*rdn, self.fetch_reg(*rdn) | self.fetch_reg(*rm))
            }
            Instruction::Rev { rd, rm } => {
                let value = reverse_bytes(self.fetch_reg(*rm), width);
                self.store_reg(*rd, value)
            }
            Instruction::Rev16 { rd, rm } => {
                let value = reverse_halfword_bytes(self.fetch_reg(*rm), width);
                self.store_reg(*rd, value)
            }
            Instruction::Revsh { rd, rm } => {
                let value = reverse_halfword_bytes(self.fetch_reg(*rm) & 0xFFFF, 16);
                let value = self.registers.sign_extend(value, 16);
                self.store_reg(*rd, value)
            }
            Instruction::RorsReg { rdn, rm } => {
                let amount = self.fetch_reg(*rm) & 0xFF;
                let rotated = rotate_right(self.fetch_reg(*rdn), amount, width, mask);
                self.shift(*rdn, rotated)
            }
            Instruction::RsbsImm { rd, rn } => self.add_sub(*rd, 0, self.fetch_reg(*rn), ArithOp::Sub),
            Instruction::SbcsReg { rdn, rm } => {
                let carry = self.registers.is_c_set();
                let (result, c, v) = self.registers.add_with_carry(
                    self.fetch_reg(*rdn),
                    !self.fetch_reg(*rm) & mask,
                    carry,
                );
                self.registers.write(*rdn, result);
                self.set_arith_flags(result, c, v);
                Flow::Next
            }
            Instruction::SubSpImm { imm } => {
                let value = self.fetch_reg(Register::Sp).wrapping_sub(*imm) & mask;
                self.store_reg(Register::Sp, value)
            }
            Instruction::SubsReg { rd, rn, rm } => {
                self.add_sub(*rd, self.fetch_reg(*rn), self.fetch_reg(*rm), ArithOp::Sub)
            }
            Instruction::SubsImm { rd, rn, imm } => {
                self.add_sub(*rd, self.fetch_reg(*rn), *imm, ArithOp::Sub)
            }
            Instruction::Sxtb { rd, rm } => {
                let value = self.registers.sign_extend(self.fetch_reg(*rm), 8);
                self.store_reg(*rd, value)
            }
            Instruction::Sxth { rd, rm } => {
                let value = self.registers.sign_extend(self.fetch_reg(*rm), 16);
                self.store_reg(*rd, value)
            }
            Instruction::TstReg { rn, rm } => {
                let value = self.fetch_reg(*rn) & self.fetch_reg(*rm);
                self.registers.set_nz_flags(value);
                Flow::Next
            }
            Instruction::Uxtb { rd, rm } => {
                let value = self.fetch_reg(*rm) & 0xFF;
                self.store_reg(*rd, value)
            }
            Instruction::Uxth { rd, rm } => {
                let value = self.fetch_reg(*rm) & 0xFFFF;
                self.store_reg(*rd, value)
            }
        };

        let next = match flow {
            Flow::Next => pc.wrapping_add(1),
            Flow::Jump(target) => {
                tracing::trace!("Branch from {} to {}", pc, target);
                target
            }
        };
        self.registers.write(Register::Pc, next);
        Ok(())
    }

    /// Get a value from the given register
    fn fetch_reg(&self, register: Register) -> u64 {
        self.registers.read(register)
    }

    /// Store a value into the given register. A write to `PC` is a branch.
    fn store_reg(&mut self, register: Register, value: u64) -> Flow {
        if register == Register::Pc {
            Flow::Jump(value & self.registers.mask())
        } else {
            self.registers.write(register, value);
            Flow::Next
        }
    }

    /// ADDS, SUBS and RSBS: store the result and set all four flags.
    fn add_sub(&mut self, rd: Register, a: u64, b: u64, op: ArithOp) -> Flow {
        let mask = self.registers.mask();
        let result = match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
        } & mask;
        self.registers.set_nzcv_flags(a, b, result, op);
        self.store_reg(rd, result)
    }

    /// CMP and CMN: set the flags and throw the result away.
    fn compare(&mut self, a: u64, b: u64, op: ArithOp) -> Flow {
        let mask = self.registers.mask();
        let result = match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
        } & mask;
        self.registers.set_nzcv_flags(a, b, result, op);
        Flow::Next
    }

    /// Store a result and set N and Z from it. C and V are unchanged.
    fn logical(&mut self, rd: Register, value: u64) -> Flow {
        self.registers.set_nz_flags(value);
        self.store_reg(rd, value)
    }

    /// Store a shifted result, set N and Z, and C if anything was shifted out.
    fn shift(&mut self, rd: Register, (value, carry): (u64, Option<bool>)) -> Flow {
        if let Some(carry) = carry {
            self.registers.set_apsr_flag_to_value(Flag::C, carry);
        }
        self.logical(rd, value)
    }

    fn set_arith_flags(&mut self, result: u64, carry: bool, overflow: bool) {
        let negative = self.registers.is_negative(result);
        self.registers.write_nzcv(negative, result == 0, carry, overflow);
    }

    /// Find the instruction a label names.
    fn resolve(&self, label: &str) -> Result<u64, Error> {
        self.program
            .label(label)
            .map(|index| index as u64)
            .ok_or_else(|| Error::Validation(format!("Label {} is not defined", label)))
    }

    /// Check whether the CPU's APSR flags match the given condition.
    fn check_condition(&self, cond: Condition) -> bool {
        let regs = &self.registers;
        match cond {
            Condition::Eq => regs.is_z_set(),
            Condition::Ne => !regs.is_z_set(),
            Condition::Cs => regs.is_c_set(),
            Condition::Cc => !regs.is_c_set(),
            Condition::Mi => regs.is_n_set(),
            Condition::Pl => !regs.is_n_set(),
            Condition::Vs => regs.is_v_set(),
            Condition::Vc => !regs.is_v_set(),
            Condition::Hi => regs.is_c_set() && !regs.is_z_set(),
            Condition::Ls => !regs.is_c_set() || regs.is_z_set(),
            Condition::Ge => regs.is_n_set() == regs.is_v_set(),
            Condition::Lt => regs.is_n_set() != regs.is_v_set(),
            Condition::Gt => !regs.is_z_set() && (regs.is_n_set() == regs.is_v_set()),
            Condition::Le => regs.is_z_set() || (regs.is_n_set() != regs.is_v_set()),
            Condition::Always => true,
        }
    }
}

/// Logical shift left, giving the result and the last bit shifted out.
fn shift_left(value: u64, amount: u64, width: u32, mask: u64) -> (u64, Option<bool>) {
    let width = u64::from(width);
    if amount == 0 {
        (value, None)
    } else if amount < width {
        let carry = (value >> (width - amount)) & 1 != 0;
        ((value << amount) & mask, Some(carry))
    } else if amount == width {
        (0, Some(value & 1 != 0))
    } else {
        (0, Some(false))
    }
}

/// Logical shift right, giving the result and the last bit shifted out.
fn shift_right_logical(value: u64, amount: u64, width: u32) -> (u64, Option<bool>) {
    let width = u64::from(width);
    if amount == 0 {
        (value, None)
    } else if amount < width {
        let carry = (value >> (amount - 1)) & 1 != 0;
        (value >> amount, Some(carry))
    } else if amount == width {
        (0, Some((value >> (width - 1)) & 1 != 0))
    } else {
        (0, Some(false))
    }
}

/// Arithmetic shift right, giving the result and the last bit shifted out.
fn shift_right_arithmetic(value: u64, amount: u64, width: u32, mask: u64) -> (u64, Option<bool>) {
    let negative = (value >> (width - 1)) & 1 != 0;
    if amount == 0 {
        (value, None)
    } else if amount >= u64::from(width) {
        if negative {
            (mask, Some(true))
        } else {
            (0, Some(false))
        }
    } else {
        // Move our sign bit up to bit 63 so the shift drags it down
        let spare = 64 - width;
        let signed = ((value << spare) as i64) >> spare;
        let carry = (value >> (amount - 1)) & 1 != 0;
        (((signed >> amount) as u64) & mask, Some(carry))
    }
}

/// Rotate right, giving the result and the new top bit as carry.
fn rotate_right(value: u64, amount: u64, width: u32, mask: u64) -> (u64, Option<bool>) {
    if amount == 0 {
        return (value, None);
    }
    let width64 = u64::from(width);
    let by = amount % width64;
    let result = if by == 0 {
        value
    } else {
        ((value >> by) | (value << (width64 - by))) & mask
    };
    (result, Some((result >> (width - 1)) & 1 != 0))
}

/// Reverse the order of the bytes in a `width`-bit value.
fn reverse_bytes(value: u64, width: u32) -> u64 {
    let bytes = width / 8;
    (0..bytes).fold(0, |acc, i| {
        let byte = (value >> (8 * i)) & 0xFF;
        acc | (byte << (8 * (bytes - 1 - i)))
    })
}

/// Swap the two bytes within each halfword of a `width`-bit value.
fn reverse_halfword_bytes(value: u64, width: u32) -> u64 {
    (0..width / 16).fold(0, |acc, half| {
        let shift = 16 * half;
        let low = (value >> shift) & 0xFF;
        let high = (value >> (shift + 8)) & 0xFF;
        acc | (low << (shift + 8)) | (high << shift)
    })
}
