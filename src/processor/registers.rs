use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::memory::Word;

/// Default entrypoint of user programs
pub const PC_START: Word = 0x3000;

/// Initial processor status: user mode, Z set
pub const PSR_START: Word = 0x8002;

/// PSR bit selecting user mode
pub const PSR_USER: Word = 1 << 15;

/// Condition flag. Exactly one is set at any time.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(TryFromPrimitive, IntoPrimitive)]
pub enum Flag {
    Positive = 0b001,
    Zero = 0b010,
    Negative = 0b100,
}

impl Flag {
    /// Classifies `value` as a two's-complement integer
    pub fn of(value: Word) -> Self {
        if value == 0 {
            Flag::Zero
        } else if value >> 15 != 0 {
            Flag::Negative
        } else {
            Flag::Positive
        }
    }

    /// True if this flag is one of the `nzp` bits
    pub fn matches(self, nzp: Word) -> bool {
        Word::from(self) & nzp != 0
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Flag::Positive => "P",
            Flag::Zero => "Z",
            Flag::Negative => "N",
        })
    }
}

/// Privilege level encoded in PSR bit 15
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    Supervisor,
    User,
}

/// The register file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registers {
    /// General purpose registers R0-R7. R6 is the stack pointer, R7 the return address.
    gpr: [Word; 8],
    /// Program counter
    pub pc: Word,
    /// Condition flag
    pub cond: Flag,
    /// Processor status register
    pub psr: Word,
    /// Saved supervisor stack pointer
    pub ssp: Word,
    /// Saved user stack pointer
    pub usp: Word,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new(PC_START)
    }
}

impl Registers {
    pub fn new(pc: Word) -> Self {
        Self {
            gpr: [0; 8],
            pc,
            cond: Flag::Zero,
            psr: PSR_START,
            ssp: 0,
            usp: 0,
        }
    }

    /// Reads a general purpose register. Only the low 3 bits of `index` are used.
    pub fn reg(&self, index: Word) -> Word {
        self.gpr[(index & 0b111) as usize]
    }

    /// Writes a general purpose register. Only the low 3 bits of `index` are used.
    pub fn set_reg(&mut self, index: Word, value: Word) {
        self.gpr[(index & 0b111) as usize] = value;
    }

    pub fn update_flags(&mut self, value: Word) {
        self.cond = Flag::of(value);
    }

    pub fn privilege(&self) -> Privilege {
        if self.psr & PSR_USER == 0 {
            Privilege::Supervisor
        } else {
            Privilege::User
        }
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.gpr.iter().enumerate() {
            writeln!(f, "R{}: 0x{:04X}", i, value)?;
        }
        write!(
            f,
            "PC: 0x{:04X} COND: {} PSR: 0x{:04X} SSP: 0x{:04X} USP: 0x{:04X}",
            self.pc, self.cond, self.psr, self.ssp, self.usp
        )
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn test_initial_state() -> Result<()> {
        let regs = Registers::default();

        assert_eq!(regs.pc, 0x3000);
        assert_eq!(regs.psr, 0x8002);
        assert_eq!(regs.cond, Flag::Zero);
        assert_eq!(regs.privilege(), Privilege::User);
        for i in 0..8 {
            assert_eq!(regs.reg(i), 0);
        }

        Ok(())
    }

    #[test]
    fn test_flag_of() -> Result<()> {
        assert_eq!(Flag::of(0), Flag::Zero);
        assert_eq!(Flag::of(1), Flag::Positive);
        assert_eq!(Flag::of(0x7FFF), Flag::Positive);
        assert_eq!(Flag::of(0x8000), Flag::Negative);
        assert_eq!(Flag::of(0xFFFF), Flag::Negative);

        Ok(())
    }

    #[test]
    fn test_exactly_one_flag() -> Result<()> {
        let mut regs = Registers::default();

        for value in 0..=Word::MAX {
            regs.update_flags(value);
            let bits = Word::from(regs.cond);
            assert_eq!(bits.count_ones(), 1);
            assert_eq!(Flag::try_from(bits)?, regs.cond);
        }

        Ok(())
    }

    #[test]
    fn test_flag_matches() -> Result<()> {
        assert!(Flag::Negative.matches(0b100));
        assert!(Flag::Zero.matches(0b111));
        assert!(!Flag::Positive.matches(0b110));
        assert!(!Flag::Zero.matches(0b000));

        Ok(())
    }

    #[test]
    fn test_register_index_masked() -> Result<()> {
        let mut regs = Registers::default();
        regs.set_reg(0b1011, 0xABCD);

        assert_eq!(regs.reg(3), 0xABCD);

        Ok(())
    }

    #[test]
    fn test_privilege() -> Result<()> {
        let mut regs = Registers::default();
        regs.psr = 0x0002;
        assert_eq!(regs.privilege(), Privilege::Supervisor);
        regs.psr = 0x8000;
        assert_eq!(regs.privilege(), Privilege::User);

        Ok(())
    }
}
