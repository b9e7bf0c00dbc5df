use color_eyre::eyre::{eyre, Result};

use lc3::console::StdConsole;
use lc3::memory::{Memory, Word};
use lc3::processor::Processor;
use lc3::write_instructions;
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// The main entrypoint. First instruction should be placed here.
const ENTRYPOINT: Word = 0x3000;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .map_err(|err| eyre!("{}", err))?; // logging

    let mut mem = Memory::default();
    let mut cpu = Processor::new(ENTRYPOINT);
    let mut console = StdConsole::new();

    // Prints the digits 9 down to 1
    write_instructions!(mem : ENTRYPOINT =>
        0x5260, // AND  R1, R1, #0
        0x1269, // ADD  R1, R1, #9
        0x2007, // loop: LD R0, ZERO
        0x1001, // ADD  R0, R0, R1
        0xF021, // OUT
        0x127F, // ADD  R1, R1, #-1
        0x03FB, // BRp  loop
        0xE003, // LEA  R0, DONE
        0xF022, // PUTS
        0xF025, // HALT
        '0',    // ZERO
        ' ', '\n', 0 // DONE
    );

    cpu.execute_until_halt(&mut mem, &mut console)?;
    mem.dump(ENTRYPOINT, ENTRYPOINT + 3);

    Ok(())
}
