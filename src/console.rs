use std::collections::VecDeque;
use std::io::{self, ErrorKind, IsTerminal, Read, Stdout, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

use crate::memory::Byte;

/// Character I/O used by the keyboard registers and the trap routines
pub trait Console {
    /// Returns true if a character can be read without blocking
    fn poll(&mut self) -> io::Result<bool>;

    /// Reads the next character, blocking until one is available
    fn read_char(&mut self) -> io::Result<Byte>;

    /// Writes a single character
    fn write_char(&mut self, value: Byte) -> io::Result<()>;

    /// Flushes pending output
    fn flush(&mut self) -> io::Result<()>;

    /// Writes every byte of `text`
    fn write_str(&mut self, text: &str) -> io::Result<()> {
        for byte in text.bytes() {
            self.write_char(byte)?;
        }
        Ok(())
    }
}

/// In-memory console with scripted input and captured output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferConsole {
    pub input: VecDeque<Byte>,
    pub output: Vec<Byte>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a console whose input yields the bytes of `input` in order
    pub fn with_input(input: &[Byte]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }

    /// Captured output, lossily decoded
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Console for BufferConsole {
    fn poll(&mut self) -> io::Result<bool> {
        Ok(!self.input.is_empty())
    }

    fn read_char(&mut self) -> io::Result<Byte> {
        self.input
            .pop_front()
            .ok_or_else(|| io::Error::new(ErrorKind::UnexpectedEof, "console input exhausted"))
    }

    fn write_char(&mut self, value: Byte) -> io::Result<()> {
        self.output.push(value);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Host console backed by the terminal and stdout.
///
/// On a terminal, key presses are taken from [`crossterm::event`], whose
/// zero-timeout poll lets [`Console::poll`] return without blocking. When
/// stdin is not a terminal, bytes are read from it directly and a poll
/// waits for the next byte or end of input. Terminal modes are left
/// untouched; callers that want unbuffered keystrokes must enable raw mode
/// themselves.
#[derive(Debug)]
pub struct StdConsole {
    interactive: bool,
    pending: Option<Byte>,
    exhausted: bool,
    stdout: Stdout,
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl StdConsole {
    pub fn new() -> Self {
        Self {
            interactive: io::stdin().is_terminal(),
            pending: None,
            exhausted: false,
            stdout: io::stdout(),
        }
    }

    /// Next byte of piped input, or `None` at end of input
    fn read_stdin(&mut self) -> io::Result<Option<Byte>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut buffer = [0; 1];
        loop {
            match io::stdin().lock().read(&mut buffer) {
                Ok(0) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Ok(_) => return Ok(Some(buffer[0])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

/// Translates a key press into the byte a terminal would send for it
fn key_byte(event: Event) -> Option<Byte> {
    let event = match event {
        Event::Key(event) if event.kind != KeyEventKind::Release => event,
        _ => return None,
    };

    match event.code {
        KeyCode::Char(ch) if ch.is_ascii() => {
            if event.modifiers.contains(KeyModifiers::CONTROL) && ch.is_ascii_alphabetic() {
                Some(ch.to_ascii_lowercase() as Byte & 0x1F)
            } else {
                Some(ch as Byte)
            }
        }
        KeyCode::Enter => Some(b'\n'),
        KeyCode::Tab => Some(b'\t'),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Esc => Some(0x1B),
        _ => None,
    }
}

impl Console for StdConsole {
    fn poll(&mut self) -> io::Result<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }

        if !self.interactive {
            self.pending = self.read_stdin()?;
            return Ok(self.pending.is_some());
        }

        while event::poll(Duration::ZERO)? {
            if let Some(byte) = key_byte(event::read()?) {
                self.pending = Some(byte);
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn read_char(&mut self) -> io::Result<Byte> {
        if let Some(byte) = self.pending.take() {
            return Ok(byte);
        }

        if !self.interactive {
            return self
                .read_stdin()?
                .ok_or_else(|| io::Error::new(ErrorKind::UnexpectedEof, "stdin closed"));
        }

        loop {
            if let Some(byte) = key_byte(event::read()?) {
                return Ok(byte);
            }
        }
    }

    fn write_char(&mut self, value: Byte) -> io::Result<()> {
        self.stdout.lock().write_all(&[value])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.lock().flush()
    }
}
