//! The register file of the simulated core.
//!
//! Holds the numbered registers (with `SP`, `LR` and `PC` as views over
//! `R13`, `R14` and `R15`), the APSR condition flags, and the handful of
//! system registers `MRS`/`MSR` can reach.

use crate::Error;

/// Identifies a register in our CPU
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Register {
    /// Register R0
    R0,
    /// Register R1
    R1,
    /// Register R2
    R2,
    /// Register R3
    R3,
    /// Register R4
    R4,
    /// Register R5
    R5,
    /// Register R6
    R6,
    /// Register R7
    R7,
    /// Register R8
    R8,
    /// Register R9
    R9,
    /// Register R10
    R10,
    /// Register R11
    R11,
    /// Register R12
    R12,
    /// Stack Pointer (R13)
    Sp,
    /// Link Register (R14)
    Lr,
    /// Program Counter (R15)
    Pc,
}

impl From<u8> for Register {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0 => Register::R0,
            1 => Register::R1,
            2 => Register::R2,
            3 => Register::R3,
            4 => Register::R4,
            5 => Register::R5,
            6 => Register::R6,
            7 => Register::R7,
            8 => Register::R8,
            9 => Register::R9,
            10 => Register::R10,
            11 => Register::R11,
            12 => Register::R12,
            13 => Register::Sp,
            14 => Register::Lr,
            _ => Register::Pc,
        }
    }
}

impl Register {
    /// The slot this register occupies in the register file.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Is this one of R0 to R7?
    pub fn is_low(self) -> bool {
        self.index() < 8
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Register::Sp => write!(f, "SP"),
            Register::Lr => write!(f, "LR"),
            Register::Pc => write!(f, "PC"),
            other => write!(f, "R{}", other.index()),
        }
    }
}

/// The processor status and control registers reachable through `MRS`/`MSR`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SpecialRegister {
    /// Application status (the NZCV flags)
    Apsr,
    /// APSR combined with IPSR
    Iapsr,
    /// APSR combined with EPSR
    Eapsr,
    /// All three PSR views combined
    Xpsr,
    /// Synonym for `XPSR`
    Psr,
    /// Interrupt status (the active exception number)
    Ipsr,
    /// Execution status
    Epsr,
    /// IPSR combined with EPSR
    Iepsr,
    /// Main stack pointer
    Msp,
    /// Process stack pointer
    Psp,
    /// Exception mask
    Primask,
    /// Stack selection and privilege
    Control,
}

impl SpecialRegister {
    /// Every special register this core knows about.
    pub const ALL: [SpecialRegister; 12] = [
        SpecialRegister::Apsr,
        SpecialRegister::Iapsr,
        SpecialRegister::Eapsr,
        SpecialRegister::Xpsr,
        SpecialRegister::Psr,
        SpecialRegister::Ipsr,
        SpecialRegister::Epsr,
        SpecialRegister::Iepsr,
        SpecialRegister::Msp,
        SpecialRegister::Psp,
        SpecialRegister::Primask,
        SpecialRegister::Control,
    ];

    /// The assembler name of this register.
    pub fn name(self) -> &'static str {
        match self {
            SpecialRegister::Apsr => "APSR",
            SpecialRegister::Iapsr => "IAPSR",
            SpecialRegister::Eapsr => "EAPSR",
            SpecialRegister::Xpsr => "XPSR",
            SpecialRegister::Psr => "PSR",
            SpecialRegister::Ipsr => "IPSR",
            SpecialRegister::Epsr => "EPSR",
            SpecialRegister::Iepsr => "IEPSR",
            SpecialRegister::Msp => "MSP",
            SpecialRegister::Psp => "PSP",
            SpecialRegister::Primask => "PRIMASK",
            SpecialRegister::Control => "CONTROL",
        }
    }

    /// Look a special register up by name, ignoring case.
    pub fn from_name(name: &str) -> Option<SpecialRegister> {
        Self::ALL
            .iter()
            .copied()
            .find(|reg| reg.name().eq_ignore_ascii_case(name))
    }

    /// Does this PSR view include the APSR flags?
    fn includes_apsr(self) -> bool {
        matches!(
            self,
            SpecialRegister::Apsr
                | SpecialRegister::Iapsr
                | SpecialRegister::Eapsr
                | SpecialRegister::Xpsr
                | SpecialRegister::Psr
        )
    }

    /// Writes to these are ignored.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            SpecialRegister::Ipsr | SpecialRegister::Epsr | SpecialRegister::Iepsr
        )
    }
}

/// One of the four APSR condition flags
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Negative
    N,
    /// Zero
    Z,
    /// Carry (or not-borrow)
    C,
    /// Signed overflow
    V,
}

impl Flag {
    /// How far below the top bit of the APSR this flag lives.
    fn offset(self) -> u32 {
        match self {
            Flag::N => 1,
            Flag::Z => 2,
            Flag::C => 3,
            Flag::V => 4,
        }
    }
}

/// Which operation produced a result, for carry and overflow purposes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArithOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
}

/// The machine state: numbered registers, flags and system registers.
///
/// All values are unsigned and held modulo `2^W`, where `W` is the
/// configured bit width. `SP`, `LR` and `PC` are not separate storage; they
/// read and write the `R13`, `R14` and `R15` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    width: u32,
    regs: Vec<u64>,
    apsr: u64,
    psp: u64,
    primask: u64,
    control: u64,
}

impl RegisterFile {
    /// Create a register file of `count` registers, each `width` bits wide.
    ///
    /// Everything starts at zero. `width` must be 16, 32, 48 or 64 and
    /// `count` at least 16.
    pub fn new(width: u32, count: usize) -> Result<RegisterFile, Error> {
        check_shape(width, count)?;
        Ok(RegisterFile::zeroed(width, count))
    }

    /// As `new`, for a shape that has already been checked.
    pub(crate) fn zeroed(width: u32, count: usize) -> RegisterFile {
        RegisterFile {
            width,
            regs: vec![0; count],
            apsr: 0,
            psp: 0,
            primask: 0,
            control: 0,
        }
    }

    /// The register width in bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// How many numbered registers there are.
    pub fn count(&self) -> usize {
        self.regs.len()
    }

    /// A value with the low `W` bits set.
    pub fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Get the contents of a register
    pub fn read(&self, reg: Register) -> u64 {
        self.regs[reg.index()]
    }

    /// Store a value into the given register, truncated to the register width.
    pub fn write(&mut self, reg: Register, value: u64) {
        let value = value & self.mask();
        self.regs[reg.index()] = value;
    }

    /// Read any register by its assembler name.
    ///
    /// Accepts `R<n>`, `R0x<hex>`, the aliases `SP`, `LR` and `PC`, and the
    /// special register names (`APSR`, `PRIMASK`, ...).
    pub fn get(&self, name: &str) -> Result<u64, Error> {
        match self.lookup(name)? {
            Slot::Numbered(index) => Ok(self.regs[index]),
            Slot::Special(special) => Ok(self.read_special(special)),
        }
    }

    /// Write any register by its assembler name.
    ///
    /// The value is truncated to the register width. Writing a PSR view
    /// keeps only the flag bits.
    pub fn set(&mut self, name: &str, value: u64) -> Result<(), Error> {
        match self.lookup(name)? {
            Slot::Numbered(index) => {
                self.regs[index] = value & self.mask();
            }
            Slot::Special(special) => self.write_special(special, value),
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Slot, Error> {
        let name = name.trim();
        if let Some(special) = SpecialRegister::from_name(name) {
            return Ok(Slot::Special(special));
        }
        let index = crate::operand::check_register(name)?;
        if index >= self.regs.len() as u64 {
            return Err(Error::Rule(format!(
                "{} is greater than the highest register R{}",
                name,
                self.regs.len() - 1
            )));
        }
        Ok(Slot::Numbered(index as usize))
    }

    /// Read a special register, as `MRS` would.
    pub fn read_special(&self, reg: SpecialRegister) -> u64 {
        match reg {
            // IPSR and EPSR are always zero in this model, so every PSR
            // view reads back as the flags
            SpecialRegister::Apsr
            | SpecialRegister::Iapsr
            | SpecialRegister::Eapsr
            | SpecialRegister::Xpsr
            | SpecialRegister::Psr => self.apsr,
            SpecialRegister::Ipsr | SpecialRegister::Epsr | SpecialRegister::Iepsr => 0,
            SpecialRegister::Msp => self.read(Register::Sp),
            SpecialRegister::Psp => self.psp,
            SpecialRegister::Primask => self.primask,
            SpecialRegister::Control => self.control,
        }
    }

    /// Write a special register, as `MSR` would.
    pub fn write_special(&mut self, reg: SpecialRegister, value: u64) {
        if reg.includes_apsr() {
            self.apsr = value & self.flags_mask();
            return;
        }
        match reg {
            SpecialRegister::Msp => self.write(Register::Sp, value),
            SpecialRegister::Psp => self.psp = value & self.mask(),
            SpecialRegister::Primask => self.primask = value & 0b1,
            SpecialRegister::Control => self.control = value & 0b11,
            _ => {
                tracing::warn!("Ignoring write of {:#x} to read-only {}", value, reg.name());
            }
        }
    }

    /// The raw flags word.
    pub fn apsr(&self) -> u64 {
        self.apsr
    }

    /// Bit mask of one flag within the APSR.
    pub fn flag_mask(&self, flag: Flag) -> u64 {
        1 << (self.width - flag.offset())
    }

    fn flags_mask(&self) -> u64 {
        self.flag_mask(Flag::N) | self.flag_mask(Flag::Z) | self.flag_mask(Flag::C) | self.flag_mask(Flag::V)
    }

    /// Set or clear a single flag, leaving the others alone.
    pub fn set_apsr_flag_to_value(&mut self, flag: Flag, value: bool) {
        let mask = self.flag_mask(flag);
        if value {
            self.apsr |= mask;
        } else {
            self.apsr &= !mask;
        }
    }

    /// Get a flag
    pub fn is_flag_set(&self, flag: Flag) -> bool {
        (self.apsr & self.flag_mask(flag)) != 0
    }

    /// Get the N flag
    pub fn is_n_set(&self) -> bool {
        self.is_flag_set(Flag::N)
    }

    /// Get the Z flag
    pub fn is_z_set(&self) -> bool {
        self.is_flag_set(Flag::Z)
    }

    /// Get the C flag
    pub fn is_c_set(&self) -> bool {
        self.is_flag_set(Flag::C)
    }

    /// Get the V flag
    pub fn is_v_set(&self) -> bool {
        self.is_flag_set(Flag::V)
    }

    /// Set N from the top bit of `result`.
    pub fn set_n_flag(&mut self, result: u64) {
        let negative = self.is_negative(result);
        self.set_apsr_flag_to_value(Flag::N, negative);
    }

    /// Set Z if `result` is zero.
    pub fn set_z_flag(&mut self, result: u64) {
        let zero = result & self.mask() == 0;
        self.set_apsr_flag_to_value(Flag::Z, zero);
    }

    /// Set C for `a <op> b`.
    pub fn set_c_flag(&mut self, a: u64, b: u64, _result: u64, op: ArithOp) {
        let carry = self.carry(a, b, op);
        self.set_apsr_flag_to_value(Flag::C, carry);
    }

    /// Set V for `a <op> b == result`.
    pub fn set_v_flag(&mut self, a: u64, b: u64, result: u64, op: ArithOp) {
        let overflow = self.overflow(a, b, result, op);
        self.set_apsr_flag_to_value(Flag::V, overflow);
    }

    /// Set N and Z from a result, leaving C and V alone.
    pub fn set_nz_flags(&mut self, result: u64) {
        self.set_n_flag(result);
        self.set_z_flag(result);
    }

    /// Set all four flags for `a <op> b == result` in one go.
    pub fn set_nzcv_flags(&mut self, a: u64, b: u64, result: u64, op: ArithOp) {
        let n = self.is_negative(result);
        let z = result & self.mask() == 0;
        let c = self.carry(a, b, op);
        let v = self.overflow(a, b, result, op);
        self.write_nzcv(n, z, c, v);
    }

    /// Replace the whole NZCV nibble.
    pub fn write_nzcv(&mut self, n: bool, z: bool, c: bool, v: bool) {
        let mut apsr = 0;
        for (flag, value) in [(Flag::N, n), (Flag::Z, z), (Flag::C, c), (Flag::V, v)] {
            if value {
                apsr |= self.flag_mask(flag);
            }
        }
        tracing::trace!("NZCV <- {}{}{}{}", n as u8, z as u8, c as u8, v as u8);
        self.apsr = apsr;
    }

    /// Is the sign bit of this `W`-bit value set?
    pub fn is_negative(&self, value: u64) -> bool {
        (value >> (self.width - 1)) & 1 != 0
    }

    /// Unsigned carry out of `a + b`, or not-borrow for `a - b`.
    fn carry(&self, a: u64, b: u64, op: ArithOp) -> bool {
        let a = a & self.mask();
        let b = b & self.mask();
        match op {
            ArithOp::Add => (u128::from(a) + u128::from(b)) > u128::from(self.mask()),
            ArithOp::Sub => a >= b,
        }
    }

    /// Signed overflow of `a <op> b == result`.
    fn overflow(&self, a: u64, b: u64, result: u64, op: ArithOp) -> bool {
        let a_neg = self.is_negative(a);
        let b_neg = self.is_negative(b);
        let r_neg = self.is_negative(result);
        match op {
            ArithOp::Add => a_neg == b_neg && r_neg != a_neg,
            ArithOp::Sub => a_neg != b_neg && r_neg != a_neg,
        }
    }

    /// Adds two `W`-bit numbers, with carry in, producing a result, carry out, and overflow.
    pub fn add_with_carry(&self, value1: u64, value2: u64, carry_in: bool) -> (u64, bool, bool) {
        let mask = self.mask();
        let value1 = value1 & mask;
        let value2 = value2 & mask;
        let wide = u128::from(value1) + u128::from(value2) + u128::from(carry_in);
        let result = (wide as u64) & mask;
        // Did we carry out of the top bit?
        let carry_out = wide > u128::from(mask);
        // Two operands of the same sign gave a result of the other sign
        let overflow_out = self.is_negative(value1) == self.is_negative(value2)
            && self.is_negative(result) != self.is_negative(value1);
        (result, carry_out, overflow_out)
    }

    /// Sign-extend the low `bits` bits of `value` up to the register width.
    pub fn sign_extend(&self, value: u64, bits: u32) -> u64 {
        let field = if bits >= 64 {
            value
        } else {
            value & ((1u64 << bits) - 1)
        };
        if bits < 64 && (field >> (bits - 1)) & 1 != 0 {
            // Top bit set, so negative, so set upper bits
            (field | !((1u64 << bits) - 1)) & self.mask()
        } else {
            field & self.mask()
        }
    }
}

enum Slot {
    Numbered(usize),
    Special(SpecialRegister),
}

/// Fail unless we can simulate `count` registers of `width` bits.
pub(crate) fn check_shape(width: u32, count: usize) -> Result<(), Error> {
    if !(16..=64).contains(&width) || width % 16 != 0 {
        return Err(Error::Config(format!(
            "bit width {} must be 16, 32, 48 or 64",
            width
        )));
    }
    if count < 16 {
        return Err(Error::Config(format!(
            "{} registers is not enough to hold R0 to R15",
            count
        )));
    }
    Ok(())
}
