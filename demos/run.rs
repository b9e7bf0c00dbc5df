use std::env;
use std::str::FromStr;

use color_eyre::eyre::{bail, eyre, Result};
use lc3::console::StdConsole;
use lc3::memory::image::Image;
use lc3::memory::Memory;
use lc3::processor::{ExitReason, Processor};
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Environment variable selecting the log level
const LOG_ENV: &str = "LC3_LOG";

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling

    let level = env::var(LOG_ENV)
        .ok()
        .and_then(|level| LevelFilter::from_str(&level).ok())
        .unwrap_or(LevelFilter::Info);
    SimpleLogger::new()
        .with_level(level)
        .init()
        .map_err(|err| eyre!("{}", err))?; // logging

    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: run <image-file>...");
    }

    let mut mem = Memory::default();
    let mut entrypoint = None;
    for path in &paths {
        let image = Image::from_file(path)?;
        entrypoint = Some(image.load_into(&mut mem));
    }

    let mut cpu = match entrypoint {
        Some(entrypoint) => Processor::new(entrypoint),
        None => Processor::default(),
    };
    let mut console = StdConsole::new();

    match cpu.execute_until_halt(&mut mem, &mut console)? {
        ExitReason::Halt => Ok(()),
        reason => bail!("program stopped abnormally: {}", reason),
    }
}
