//! Reading spills from disk.
//!
//! A spill file is a sequence of frames, each a little-endian `u32` word
//! count followed by that many little-endian `u32` spill words.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading spill files.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Spill {index} truncated: expected {expected} words")]
    TruncatedSpill { index: usize, expected: usize },

    #[error("Spill {index} declares {words} words, more than a frame may hold")]
    FrameTooLarge { index: usize, words: usize },
}

/// Largest word count accepted in a frame header.
pub const MAX_FRAME_WORDS: usize = 1 << 26;

/// Iterator over the spills of a spill file.
#[derive(Debug)]
pub struct SpillReader<R: Read> {
    reader: R,
    index: usize,
    finished: bool,
}

impl SpillReader<BufReader<File>> {
    /// Opens a spill file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, InputError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> SpillReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            index: 0,
            finished: false,
        }
    }

    /// Number of spills read so far.
    pub fn spills_read(&self) -> usize {
        self.index
    }

    /// Reads the next spill into `words`, replacing its contents.
    ///
    /// Returns `Ok(false)` at a clean end of input.
    pub fn read_into(&mut self, words: &mut Vec<u32>) -> Result<bool, InputError> {
        if self.finished {
            return Ok(false);
        }

        let count = match self.reader.read_u32::<LittleEndian>() {
            Ok(count) => count as usize,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.finished = true;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if count > MAX_FRAME_WORDS {
            self.finished = true;
            return Err(InputError::FrameTooLarge {
                index: self.index,
                words: count,
            });
        }

        words.clear();
        words.resize(count, 0);
        if let Err(e) = self.reader.read_u32_into::<LittleEndian>(words) {
            self.finished = true;
            return Err(match e.kind() {
                ErrorKind::UnexpectedEof => InputError::TruncatedSpill {
                    index: self.index,
                    expected: count,
                },
                _ => e.into(),
            });
        }

        self.index += 1;
        Ok(true)
    }
}

impl<R: Read> Iterator for SpillReader<R> {
    type Item = Result<Vec<u32>, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut words = Vec::new();
        match self.read_into(&mut words) {
            Ok(true) => Some(Ok(words)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Writes one spill frame.
pub fn write_spill<W: Write>(writer: &mut W, words: &[u32]) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(words.len() as u32)?;
    for &word in words {
        writer.write_u32::<LittleEndian>(word)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_frames() {
        let mut bytes = Vec::new();
        write_spill(&mut bytes, &[1, 2, 3]).unwrap();
        write_spill(&mut bytes, &[]).unwrap();
        write_spill(&mut bytes, &[0xFFFF_FFFF]).unwrap();

        let spills: Vec<_> = SpillReader::new(Cursor::new(bytes))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(spills, vec![vec![1, 2, 3], vec![], vec![0xFFFF_FFFF]]);
    }

    #[test]
    fn test_truncated_frame() {
        let mut bytes = Vec::new();
        write_spill(&mut bytes, &[1, 2]).unwrap();
        write_spill(&mut bytes, &[3, 4, 5]).unwrap();
        bytes.truncate(bytes.len() - 4);

        let mut reader = SpillReader::new(Cursor::new(bytes));
        assert_eq!(reader.next().unwrap().unwrap(), vec![1, 2]);
        match reader.next() {
            Some(Err(InputError::TruncatedSpill { index, expected })) => {
                assert_eq!(index, 1);
                assert_eq!(expected, 3);
            }
            other => panic!("expected truncated spill, got {:?}", other),
        }
        assert!(reader.next().is_none());
        assert_eq!(reader.spills_read(), 1);
    }

    #[test]
    fn test_oversized_frame_header() {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(u32::MAX).unwrap();
        let mut reader = SpillReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.next(),
            Some(Err(InputError::FrameTooLarge { index: 0, .. }))
        ));
    }
}
