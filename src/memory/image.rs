//! Program images.
//!
//! An image is a sequence of big-endian words. The first word is the origin,
//! the address at which the remaining words are placed:
//!
//! ```text
//! 30 00   origin 0x3000
//! 12 62   ADD R1, R1, #2
//! F0 25   HALT
//! ```

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::fs;
use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};

use super::{Byte, Memory, Word, MEMORY_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageErrorKind {
    MissingOrigin { len: usize },
}

impl fmt::Display for ImageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageErrorKind::MissingOrigin { len } => {
                write!(f, "image of {} byte(s) has no origin word", len)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageError {
    kind: ImageErrorKind,
    context: Option<Cow<'static, str>>,
}

impl ImageError {
    fn new<C, S>(kind: ImageErrorKind, context: C) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
        }
    }

    pub fn kind(&self) -> ImageErrorKind {
        self.kind
    }
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "image error: {} - {}", self.kind, context)
        } else {
            write!(f, "image error: {}", self.kind)
        }
    }
}

impl error::Error for ImageError {}

/// A parsed program image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Address of the first payload word
    pub origin: Word,
    /// Words to place at `origin..`
    pub words: Vec<Word>,
}

impl Image {
    /// Parses big-endian image bytes. A dangling final byte is ignored.
    ///
    /// # Errors
    ///
    /// Fails if `data` is too short to hold the origin word.
    pub fn parse(data: &[Byte]) -> Result<Self, ImageError> {
        if data.len() < 2 {
            return Err(ImageError::new(
                ImageErrorKind::MissingOrigin { len: data.len() },
                "an image starts with a two byte origin",
            ));
        }

        if data.len() % 2 != 0 {
            log::warn!(
                "Image has an odd length of {} bytes, ignoring the last byte",
                data.len()
            );
        }

        let mut words = data
            .chunks_exact(2)
            .map(|pair| Word::from_be_bytes([pair[0], pair[1]]));

        // length was checked above
        let origin = words.next().unwrap_or_default();
        let words = words.collect();

        Ok(Self { origin, words })
    }

    /// Reads and parses the image at `path`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .wrap_err_with(|| format!("Failed to read image `{}`", path.display()))?;

        Self::parse(&data).wrap_err_with(|| format!("Failed to parse image `{}`", path.display()))
    }

    /// Copies the payload into `memory` and returns the origin.
    ///
    /// Words that would land past the last address are dropped.
    pub fn load_into(&self, memory: &mut Memory) -> Word {
        let room = MEMORY_SIZE - self.origin as usize;

        if self.words.len() > room {
            log::warn!(
                "Image at 0x{:04X} has {} words but only {} fit, truncating",
                self.origin,
                self.words.len(),
                room
            );
        }

        let words = &self.words[..self.words.len().min(room)];
        memory.write_array(self.origin, words);

        log::debug!(
            "Loaded {} words at 0x{:04X}",
            words.len(),
            self.origin
        );

        self.origin
    }
}
