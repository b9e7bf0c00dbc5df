use std::convert::TryFrom;

use color_eyre::eyre::{Result, WrapErr};
use log::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{ExitReason, Processor};
use crate::console::Console;
use crate::memory::{Byte, Memory, Word, MEMORY_SIZE};

/// Prompt written by the IN service
pub const IN_PROMPT: &str = "Enter a character: ";

/// Notice written by the HALT service
pub const HALT_NOTICE: &str = "HALT\n";

/// Trap services, selected by the low byte of a TRAP instruction
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(TryFromPrimitive, IntoPrimitive)]
pub enum TrapVector {
    /// Read a character into R0 without echo
    GETC = 0x20,
    /// Write the character in R0
    OUT = 0x21,
    /// Write the string of one character per word at R0
    PUTS = 0x22,
    /// Prompt, then read and echo a character into R0
    IN = 0x23,
    /// Write the string of two characters per word at R0
    PUTSP = 0x24,
    /// Stop the machine
    HALT = 0x25,
}

impl Processor {
    /// Runs the trap service selected by `vector`. Unknown vectors do nothing.
    pub(super) fn trap<C: Console + ?Sized>(
        &mut self,
        vector: Byte,
        memory: &mut Memory,
        console: &mut C,
    ) -> Result<()> {
        let service = match TrapVector::try_from(vector) {
            Ok(service) => service,
            Err(_) => {
                debug!("TRAP 0x{:02X}: no service, ignored", vector);
                return Ok(());
            }
        };

        debug!("TRAP {:?}", service);

        match service {
            TrapVector::GETC => {
                let value = console.read_char().wrap_err("GETC failed to read")?;
                self.registers.set_reg(0, value as Word);
            }
            TrapVector::OUT => {
                console.write_char(self.registers.reg(0) as Byte)?;
                console.flush()?;
            }
            TrapVector::PUTS => {
                for word in string_words(memory, self.registers.reg(0)) {
                    console.write_char(word as Byte)?;
                }
                console.flush()?;
            }
            TrapVector::IN => {
                console.write_str(IN_PROMPT)?;
                console.flush()?;
                let value = console.read_char().wrap_err("IN failed to read")?;
                self.registers.set_reg(0, value as Word);
                console.write_char(value)?;
                console.flush()?;
            }
            TrapVector::PUTSP => {
                'string: for word in string_words(memory, self.registers.reg(0)) {
                    for &byte in &word.to_le_bytes() {
                        if byte == 0 {
                            break 'string;
                        }
                        console.write_char(byte)?;
                    }
                }
                console.flush()?;
            }
            TrapVector::HALT => {
                console.write_str(HALT_NOTICE)?;
                console.flush()?;
                self.halt(ExitReason::Halt);
            }
        }

        Ok(())
    }
}

/// Words from `start` up to, not including, the first zero word.
///
/// The walk wraps at the end of memory and visits each address at most once.
fn string_words(memory: &Memory, start: Word) -> impl Iterator<Item = Word> + '_ {
    (0..MEMORY_SIZE)
        .map(move |offset| memory.peek(start.wrapping_add(offset as Word)))
        .take_while(|&word| word != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferConsole;
    use crate::processor::registers::Flag;
    use crate::write_instructions;

    fn trap(
        processor: &mut Processor,
        memory: &mut Memory,
        console: &mut BufferConsole,
        vector: TrapVector,
    ) -> Result<()> {
        processor.trap(vector.into(), memory, console)
    }

    #[test]
    fn test_getc() -> Result<()> {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::with_input(b"k");

        trap(&mut cpu, &mut mem, &mut console, TrapVector::GETC)?;

        assert_eq!(cpu.registers.reg(0), b'k' as Word);
        assert!(console.output.is_empty());
        assert_eq!(cpu.registers.cond, Flag::Zero);

        Ok(())
    }

    #[test]
    fn test_getc_without_input_fails() {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::new();

        assert!(trap(&mut cpu, &mut mem, &mut console, TrapVector::GETC).is_err());
    }

    #[test]
    fn test_out() -> Result<()> {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::new();

        cpu.registers.set_reg(0, 0x1241); // high byte is dropped
        trap(&mut cpu, &mut mem, &mut console, TrapVector::OUT)?;

        assert_eq!(console.output_string(), "A");

        Ok(())
    }

    #[test]
    fn test_puts() -> Result<()> {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::new();

        write_instructions!(mem : 0x4000 => 'H', 'I', 0, 'X');
        cpu.registers.set_reg(0, 0x4000);
        trap(&mut cpu, &mut mem, &mut console, TrapVector::PUTS)?;

        assert_eq!(console.output_string(), "HI");

        Ok(())
    }

    #[test]
    fn test_puts_wraps_around_memory() -> Result<()> {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::new();

        write_instructions!(mem : 0xFFFF => 'a', 'b');
        cpu.registers.set_reg(0, 0xFFFF);
        trap(&mut cpu, &mut mem, &mut console, TrapVector::PUTS)?;

        assert_eq!(console.output_string(), "ab");

        Ok(())
    }

    #[test]
    fn test_puts_without_terminator_stops() -> Result<()> {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::new();

        mem.write_array(0, &vec![b'z' as Word; MEMORY_SIZE]);
        trap(&mut cpu, &mut mem, &mut console, TrapVector::PUTS)?;

        assert_eq!(console.output.len(), MEMORY_SIZE);

        Ok(())
    }

    #[test]
    fn test_in() -> Result<()> {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::with_input(b"y");

        trap(&mut cpu, &mut mem, &mut console, TrapVector::IN)?;

        assert_eq!(cpu.registers.reg(0), b'y' as Word);
        assert_eq!(console.output_string(), "Enter a character: y");

        Ok(())
    }

    #[test]
    fn test_putsp() -> Result<()> {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::new();

        // "Hello" packed low byte first
        write_instructions!(mem : 0x4000 => 0x6548, 0x6C6C, 0x006F, 0x0000);
        cpu.registers.set_reg(0, 0x4000);
        trap(&mut cpu, &mut mem, &mut console, TrapVector::PUTSP)?;

        assert_eq!(console.output_string(), "Hello");

        Ok(())
    }

    #[test]
    fn test_putsp_stops_at_zero_low_byte() -> Result<()> {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::new();

        write_instructions!(mem : 0x4000 => 0x6948, 0x4100, 0x0000);
        cpu.registers.set_reg(0, 0x4000);
        trap(&mut cpu, &mut mem, &mut console, TrapVector::PUTSP)?;

        assert_eq!(console.output_string(), "Hi");

        Ok(())
    }

    #[test]
    fn test_halt() -> Result<()> {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::new();

        trap(&mut cpu, &mut mem, &mut console, TrapVector::HALT)?;

        assert!(!cpu.is_running());
        assert_eq!(cpu.exit_reason(), Some(ExitReason::Halt));
        assert_eq!(console.output_string(), "HALT\n");

        Ok(())
    }

    #[test]
    fn test_unknown_vector_is_ignored() -> Result<()> {
        let mut mem = Memory::default();
        let mut cpu = Processor::default();
        let mut console = BufferConsole::with_input(b"a");
        let before = cpu.registers;

        cpu.trap(0x26, &mut mem, &mut console)?;
        cpu.trap(0x00, &mut mem, &mut console)?;
        cpu.trap(0xFF, &mut mem, &mut console)?;

        assert!(cpu.is_running());
        assert_eq!(cpu.registers, before);
        assert!(console.output.is_empty());
        assert_eq!(console.input.len(), 1);

        Ok(())
    }
}
