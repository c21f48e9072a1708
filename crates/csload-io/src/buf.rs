//! Fixed-size block reads over the input, plus the first-record probe.
//!
//! The reader stage moves the input through the pipeline one block at a time;
//! the block size bounds the bytes it holds between pushes.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use csload_core::config::Dialect;

use crate::error::{Error, Result};
use crate::tokenizer::RecordSplitter;

/// Reads its source in blocks of at most `block_size` bytes.
pub struct BlockReader<R: Read> {
    inner: R,
    block_size: usize,
    bytes_read: u64,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R, block_size: usize) -> Self {
        Self {
            inner,
            block_size: block_size.max(1),
            bytes_read: 0,
        }
    }

    /// Next block, or `None` at end of input. Blocks are only short at the end.
    pub fn next_block(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut block = vec![0u8; self.block_size];
        let mut filled = 0;
        while filled < block.len() {
            match self.inner.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        block.truncate(filled);
        self.bytes_read += filled as u64;
        Ok(Some(block))
    }

    /// Total bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl BlockReader<File> {
    /// Convenience helper to open a file path.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        Ok(Self::new(file, block_size))
    }
}

/// The first record of an input: its width is the validation baseline for the
/// whole run, and its fields double as header names when the input has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstRecord {
    pub fields: Vec<String>,
}

impl FirstRecord {
    pub fn width(&self) -> usize {
        self.fields.len()
    }
}

/// Tokenize only as far as the end of the first record.
pub fn probe_first_record<P: AsRef<Path>>(path: P, dialect: Dialect) -> Result<FirstRecord> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let file = File::open(path).map_err(|e| Error::io(display.clone(), e))?;
    let fields = first_record_from(BufReader::new(file), dialect)
        .map_err(|e| Error::io(display.clone(), e))?;
    match fields {
        Some(fields) => Ok(FirstRecord { fields }),
        None => Err(Error::EmptyInput(display)),
    }
}

fn first_record_from<R: Read>(reader: R, dialect: Dialect) -> io::Result<Option<Vec<String>>> {
    let mut splitter = RecordSplitter::new(dialect);
    let mut blocks = BlockReader::new(reader, 8 * 1024);
    while let Some(block) = blocks.next_block()? {
        for &b in &block {
            if let Some(record) = splitter.push(b) {
                return Ok(Some(record));
            }
        }
    }
    Ok(splitter.finish())
}
