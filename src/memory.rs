use std::fmt;
use std::io;

use crate::console::Console;

pub mod image;

pub type Byte = u8; // 1 byte
pub type Word = u16; // 2 bytes

/// Number of addressable words
pub const MEMORY_SIZE: usize = 1 << 16;

/// Keyboard status register
pub const KBSR: Word = 0xFE00;
/// Keyboard data register
pub const KBDR: Word = 0xFE02;

/// Set in KBSR while a character is waiting in KBDR
const KBSR_READY: Word = 1 << 15;

/// Emulates the 64K-word memory of the machine
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Memory {
    /// The actual data of the memory
    data: Box<[Word]>,
}

impl Default for Memory {
    /// Initializes zeroed memory
    fn default() -> Self {
        Memory {
            data: vec![0; MEMORY_SIZE].into_boxed_slice(),
        }
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.data.iter().filter(|&&word| word != 0).count();
        f.debug_struct("Memory")
            .field("size", &self.data.len())
            .field("used", &used)
            .finish()
    }
}

impl Memory {
    /// Reads a word, polling the keyboard first when `address` is [`KBSR`]
    pub fn read<C: Console + ?Sized>(
        &mut self,
        address: Word,
        console: &mut C,
    ) -> io::Result<Word> {
        if address == KBSR {
            if console.poll()? {
                self.data[KBSR as usize] = KBSR_READY;
                self.data[KBDR as usize] = console.read_char()? as Word;
            } else {
                self.data[KBSR as usize] = 0;
            }
        }

        Ok(self.data[address as usize])
    }

    /// Reads a word without touching any device
    pub fn peek(&self, address: Word) -> Word {
        self.data[address as usize]
    }

    /// Writes a word to the memory
    pub fn write(&mut self, address: Word, value: Word) {
        self.data[address as usize] = value;
    }

    /// Writes an array of words to the memory, wrapping at the end of the address space
    pub fn write_array(&mut self, address: Word, data: &[Word]) {
        let mut address = address;
        for &word in data {
            self.write(address, word);
            address = address.wrapping_add(1);
        }
    }

    /// Logs the contents of `start..=end`
    pub fn dump(&self, start: Word, end: Word) {
        for address in start..=end {
            log::info!("0x{:04X} : 0x{:04X}", address, self.peek(address));
        }
    }
}

/// Writes a block of instruction words directly into the memory
#[macro_export]
macro_rules! write_instructions {
    ( $mem:ident : $pos:expr => $( $word:expr ),+ $(,)? ) => {
        $mem.write_array($pos, &[
            $(
                $word as $crate::memory::Word,
            )+
        ]);
    };
}
