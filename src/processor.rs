use std::convert::TryFrom;
use std::fmt;

use crate::console::Console;
use crate::memory::{Byte, Memory, Word};
use color_eyre::eyre::{Result, WrapErr};
use log::*;
use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;

pub mod registers;
pub mod trap;

use registers::{Privilege, Registers, PSR_USER};

/// Where the privilege mode violation exception would be serviced
pub const PRIVILEGE_VIOLATION_VECTOR: Word = 0x0100;

/// Notice written when RTI is executed in user mode
pub const PRIVILEGE_VIOLATION_NOTICE: &str =
    "Illegal opcode exception: RTI executed in user mode. The machine has been halted.\n";

/// Why the processor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    /// The HALT trap was executed
    Halt,
    /// The opcode field did not decode
    InvalidOpcode(Byte),
    /// RTI was executed in user mode
    PrivilegeViolation,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Halt => f.write_str("halted"),
            ExitReason::InvalidOpcode(opcode) => write!(f, "invalid opcode 0x{:X}", opcode),
            ExitReason::PrivilegeViolation => f.write_str("privilege mode violation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum State {
    Running,
    Halted(ExitReason),
}

/// Widens the low `bits` bits of `value` as a two's-complement integer
pub fn sign_extend(value: Word, bits: u32) -> Word {
    debug_assert!((1..=16).contains(&bits));

    if bits >= 16 {
        return value;
    }

    let value = value & ((1 << bits) - 1);
    if (value >> (bits - 1)) & 1 != 0 {
        value | (0xFFFF << bits)
    } else {
        value
    }
}

// Operand fields
fn dr(instruction: Word) -> Word {
    (instruction >> 9) & 0b111
}

fn sr1(instruction: Word) -> Word {
    (instruction >> 6) & 0b111
}

fn sr2(instruction: Word) -> Word {
    instruction & 0b111
}

fn is_immediate(instruction: Word) -> bool {
    (instruction >> 5) & 1 != 0
}

fn pc_offset9(instruction: Word) -> Word {
    sign_extend(instruction, 9)
}

/// Emulates the LC-3 CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Processor {
    /// The register file
    pub registers: Registers,
    state: State,
}

impl Default for Processor {
    /// Initializes a new CPU at the conventional user program origin
    fn default() -> Self {
        Self::new(registers::PC_START)
    }
}

impl Processor {
    /// Initializes a new CPU
    /// @param entrypoint The start of the program
    pub fn new(entrypoint: Word) -> Self {
        Self {
            registers: Registers::new(entrypoint),
            state: State::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// The termination reason, once halted
    pub fn exit_reason(&self) -> Option<ExitReason> {
        match self.state {
            State::Running => None,
            State::Halted(reason) => Some(reason),
        }
    }

    fn halt(&mut self, reason: ExitReason) {
        self.state = State::Halted(reason);
    }

    /// Executes a single instruction. The PC must already point past it.
    pub fn execute_instruction<C: Console + ?Sized>(
        &mut self,
        instruction: Word,
        memory: &mut Memory,
        console: &mut C,
    ) -> Result<()> {
        let opcode = (instruction >> 12) as Byte;
        let opcode = match Opcode::try_from(opcode) {
            Ok(opcode) => opcode,
            Err(_) => {
                error!("Invalid opcode 0x{:X} in 0x{:04X}", opcode, instruction);
                self.halt(ExitReason::InvalidOpcode(opcode));
                return Ok(());
            }
        };

        let regs = &mut self.registers;

        match opcode {
            Opcode::BR => {
                let nzp = dr(instruction);
                let offset = pc_offset9(instruction);
                let taken = regs.cond.matches(nzp);
                if taken {
                    regs.pc = regs.pc.wrapping_add(offset);
                }

                debug!("BR {:03b} {}: {}", nzp, offset as i16, taken);
            }
            Opcode::ADD | Opcode::AND => {
                let a = regs.reg(sr1(instruction));
                let b = if is_immediate(instruction) {
                    sign_extend(instruction, 5)
                } else {
                    regs.reg(sr2(instruction))
                };
                let result = if opcode == Opcode::ADD {
                    a.wrapping_add(b)
                } else {
                    a & b
                };
                regs.set_reg(dr(instruction), result);
                regs.update_flags(result);

                debug!("{} 0x{:04X} 0x{:04X}: 0x{:04X}", opcode, a, b, result);
            }
            Opcode::LD => {
                let address = regs.pc.wrapping_add(pc_offset9(instruction));
                let value = memory.read(address, console)?;
                regs.set_reg(dr(instruction), value);
                regs.update_flags(value);

                debug!("LD R{} 0x{:04X}: 0x{:04X}", dr(instruction), address, value);
            }
            Opcode::ST => {
                let address = regs.pc.wrapping_add(pc_offset9(instruction));
                let value = regs.reg(dr(instruction));
                memory.write(address, value);

                debug!("ST R{} 0x{:04X}: 0x{:04X}", dr(instruction), address, value);
            }
            Opcode::JSR => {
                // R7 is written before BaseR is read, so JSRR R7 lands on the next instruction
                regs.set_reg(7, regs.pc);
                if (instruction >> 11) & 1 != 0 {
                    regs.pc = regs.pc.wrapping_add(sign_extend(instruction, 11));
                } else {
                    regs.pc = regs.reg(sr1(instruction));
                }

                debug!("JSR 0x{:04X}", regs.pc);
            }
            Opcode::LDR => {
                let address = regs
                    .reg(sr1(instruction))
                    .wrapping_add(sign_extend(instruction, 6));
                let value = memory.read(address, console)?;
                regs.set_reg(dr(instruction), value);
                regs.update_flags(value);

                debug!("LDR R{} 0x{:04X}: 0x{:04X}", dr(instruction), address, value);
            }
            Opcode::STR => {
                let address = regs
                    .reg(sr1(instruction))
                    .wrapping_add(sign_extend(instruction, 6));
                let value = regs.reg(dr(instruction));
                memory.write(address, value);

                debug!("STR R{} 0x{:04X}: 0x{:04X}", dr(instruction), address, value);
            }
            Opcode::RTI => match regs.privilege() {
                Privilege::Supervisor => {
                    let sp = regs.reg(6);
                    let pc = memory.read(sp, console)?;
                    let psr = memory.read(sp.wrapping_add(1), console)?;
                    regs.pc = pc;
                    regs.psr = psr;
                    regs.ssp = sp.wrapping_add(2);
                    regs.set_reg(6, regs.usp);

                    debug!("RTI 0x{:04X} PSR 0x{:04X}", pc, psr);
                }
                Privilege::User => self.privilege_violation(memory, console)?,
            },
            Opcode::NOT => {
                let value = !regs.reg(sr1(instruction));
                regs.set_reg(dr(instruction), value);
                regs.update_flags(value);

                debug!("NOT R{}: 0x{:04X}", dr(instruction), value);
            }
            Opcode::LDI => {
                let pointer = regs.pc.wrapping_add(pc_offset9(instruction));
                let address = memory.read(pointer, console)?;
                let value = memory.read(address, console)?;
                regs.set_reg(dr(instruction), value);
                regs.update_flags(value);

                debug!("LDI R{} 0x{:04X}: 0x{:04X}", dr(instruction), address, value);
            }
            Opcode::STI => {
                let pointer = regs.pc.wrapping_add(pc_offset9(instruction));
                let address = memory.read(pointer, console)?;
                let value = regs.reg(dr(instruction));
                memory.write(address, value);

                debug!("STI R{} 0x{:04X}: 0x{:04X}", dr(instruction), address, value);
            }
            Opcode::JMP => {
                regs.pc = regs.reg(sr1(instruction));

                debug!("JMP 0x{:04X}", regs.pc);
            }
            Opcode::RES => {
                debug!("RES");
            }
            Opcode::LEA => {
                let value = regs.pc.wrapping_add(pc_offset9(instruction));
                regs.set_reg(dr(instruction), value);
                regs.update_flags(value);

                debug!("LEA R{}: 0x{:04X}", dr(instruction), value);
            }
            Opcode::TRAP => {
                self.trap(instruction as Byte, memory, console)?;
            }
        }

        Ok(())
    }

    /// Enters supervisor mode as the exception would, then halts since no
    /// service routine is installed at the vector.
    fn privilege_violation<C: Console + ?Sized>(
        &mut self,
        memory: &mut Memory,
        console: &mut C,
    ) -> Result<()> {
        let regs = &mut self.registers;
        let return_pc = regs.pc;

        regs.usp = regs.reg(6);
        regs.psr &= !PSR_USER;

        let mut sp = regs.ssp;
        sp = sp.wrapping_sub(1);
        memory.write(sp, regs.psr);
        sp = sp.wrapping_sub(1);
        memory.write(sp, return_pc);
        regs.set_reg(6, sp);

        regs.pc = PRIVILEGE_VIOLATION_VECTOR;

        error!(
            "Illegal opcode exception: RTI executed in user mode at 0x{:04X}, the machine has been halted",
            return_pc.wrapping_sub(1)
        );
        console.write_str(PRIVILEGE_VIOLATION_NOTICE)?;
        console.flush()?;
        self.halt(ExitReason::PrivilegeViolation);

        Ok(())
    }

    /// Runs one execution step. Does nothing once halted.
    pub fn execute<C: Console + ?Sized>(
        &mut self,
        memory: &mut Memory,
        console: &mut C,
    ) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }

        let pc = self.registers.pc;
        let instruction = memory
            .read(pc, console)
            .wrap_err_with(|| format!("Failed to fetch instruction at 0x{:04X}", pc))?;
        self.registers.pc = pc.wrapping_add(1);

        self.execute_instruction(instruction, memory, console)
            .wrap_err_with(|| format!("Failed to execute 0x{:04X} at 0x{:04X}", instruction, pc))
    }

    /// Run program until a termination condition is met
    pub fn execute_until_halt<C: Console + ?Sized>(
        &mut self,
        memory: &mut Memory,
        console: &mut C,
    ) -> Result<ExitReason> {
        loop {
            if let Some(reason) = self.exit_reason() {
                info!("Program terminated: {}", reason);
                debug!("Registers:\n{}", self.registers);
                return Ok(reason);
            }

            self.execute(memory, console)?;
        }
    }
}

macro_rules! opcodes {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $repr:literal , )+ ) => {
        /// The sixteen opcodes, selected by bits 15-12 of an instruction
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Opcode {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl Opcode {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name) , )+
                }
            }
        }

        impl ::std::fmt::Display for Opcode {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $( Self::$name => f.write_str(stringify!($name)) , )+
                }
            }
        }
    }
}

opcodes! {
    /// Branch if a selected condition flag is set
    BR = 0x0,
    /// Add register or immediate
    ADD = 0x1,
    /// Load PC-relative
    LD = 0x2,
    /// Store PC-relative
    ST = 0x3,
    /// Jump to subroutine, PC-relative or through a register
    JSR = 0x4,
    /// Bitwise and with register or immediate
    AND = 0x5,
    /// Load base+offset
    LDR = 0x6,
    /// Store base+offset
    STR = 0x7,
    /// Return from interrupt
    RTI = 0x8,
    /// Bitwise complement
    NOT = 0x9,
    /// Load indirect
    LDI = 0xA,
    /// Store indirect
    STI = 0xB,
    /// Jump through a register, RET when the register is R7
    JMP = 0xC,
    /// Reserved, executes as a no-op
    RES = 0xD,
    /// Load effective address
    LEA = 0xE,
    /// System call
    TRAP = 0xF,
}
