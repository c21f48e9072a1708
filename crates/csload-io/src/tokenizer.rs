//! Byte-level tokenizer for delimited text.
//!
//! `Tokenizer::step` is a pure state transition over one byte. When the quote
//! and escape characters coincide, a pending escape followed by an ordinary
//! byte means the previous byte was really the closing quote: the tokenizer
//! leaves quoted mode and answers `Token::Reprocess`, and the same byte must be
//! stepped again in the unquoted state. `Tokenizer::feed` runs that loop.
//!
//! `RecordSplitter` accumulates fields into records and applies the
//! end-of-stream rules.

use csload_core::config::Dialect;

/// Result of stepping one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Byte consumed, field still open.
    Continuing,
    /// Byte was a delimiter; the current field is complete.
    FieldBoundary,
    /// Byte was a newline outside quotes; the current field and record are complete.
    LineBoundary,
    /// Byte was not consumed and must be stepped again.
    Reprocess,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    dialect: Dialect,
    within_quotes: bool,
    pending_escape: bool,
    field: Vec<u8>,
}

impl Tokenizer {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            within_quotes: false,
            pending_escape: false,
            field: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn within_quotes(&self) -> bool {
        self.within_quotes
    }

    /// Bytes accumulated for the open field.
    pub fn field_len(&self) -> usize {
        self.field.len()
    }

    /// One state transition.
    pub fn step(&mut self, b: u8) -> Token {
        let Dialect {
            delimiter,
            quote,
            escape,
        } = self.dialect;

        if !self.within_quotes {
            if b == delimiter {
                return Token::FieldBoundary;
            }
            if b == b'\n' {
                if self.field.last() == Some(&b'\r') {
                    self.field.pop();
                }
                return Token::LineBoundary;
            }
            if b == quote {
                self.within_quotes = true;
            } else {
                self.field.push(b);
            }
            return Token::Continuing;
        }

        if !self.pending_escape {
            // Escape is tested first so that quote == escape starts an escape.
            if b == escape {
                self.pending_escape = true;
            } else if b == quote {
                self.within_quotes = false;
            } else {
                self.field.push(b);
            }
            return Token::Continuing;
        }

        self.pending_escape = false;
        if b == quote {
            self.field.push(quote);
        } else if b == escape {
            self.field.push(escape);
        } else if quote == escape {
            // The pending "escape" was the closing quote.
            self.within_quotes = false;
            return Token::Reprocess;
        } else {
            self.field.push(escape);
            self.field.push(b);
        }
        Token::Continuing
    }

    /// Step `b` until it is consumed.
    pub fn feed(&mut self, b: u8) -> Token {
        loop {
            match self.step(b) {
                Token::Reprocess => continue,
                token => return token,
            }
        }
    }

    /// Take the accumulated field text and reset field state.
    pub fn take_field(&mut self) -> String {
        let bytes = std::mem::take(&mut self.field);
        match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    /// Forget any quoted/escape state at end of stream.
    fn reset_quoting(&mut self) {
        self.within_quotes = false;
        self.pending_escape = false;
    }
}

/// Groups tokenizer output into records.
#[derive(Debug, Clone)]
pub struct RecordSplitter {
    tokenizer: Tokenizer,
    fields: Vec<String>,
}

impl RecordSplitter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            tokenizer: Tokenizer::new(dialect),
            fields: Vec::new(),
        }
    }

    /// Feed one byte; returns the record it completes, if any.
    pub fn push(&mut self, b: u8) -> Option<Vec<String>> {
        match self.tokenizer.feed(b) {
            Token::FieldBoundary => {
                let f = self.tokenizer.take_field();
                self.fields.push(f);
                None
            }
            Token::LineBoundary => {
                let f = self.tokenizer.take_field();
                self.fields.push(f);
                Some(std::mem::take(&mut self.fields))
            }
            Token::Continuing | Token::Reprocess => None,
        }
    }

    /// End of stream. A final field without a trailing newline still forms a
    /// record; nothing pending at all (an empty final line) yields no record.
    ///
    /// A trailing delimiter right before end of stream therefore produces a
    /// final empty field: `a,b,` ends as `["a", "b", ""]`.
    pub fn finish(&mut self) -> Option<Vec<String>> {
        self.tokenizer.reset_quoting();
        if self.tokenizer.field_len() == 0 && self.fields.is_empty() {
            return None;
        }
        let f = self.tokenizer.take_field();
        self.fields.push(f);
        Some(std::mem::take(&mut self.fields))
    }

    /// Convenience for whole in-memory inputs.
    pub fn split_all(dialect: Dialect, bytes: &[u8]) -> Vec<Vec<String>> {
        let mut splitter = Self::new(dialect);
        let mut out: Vec<Vec<String>> = bytes.iter().filter_map(|&b| splitter.push(b)).collect();
        out.extend(splitter.finish());
        out
    }
}
