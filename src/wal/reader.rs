//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{AccountError, Result};

use super::entry::{FrameHeader, HEADER_SIZE};
use super::WalEntry;

/// Reads entries from the WAL file, front to back
pub struct WalReader {
    reader: BufReader<File>,
    /// Byte length of the prefix made only of intact frames
    valid_len: u64,
    /// Set once an error has been yielded; iteration stops there
    failed: bool,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            valid_len: 0,
            failed: false,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns:
    /// - `Ok(Some(entry))`: an intact frame
    /// - `Ok(None)`: clean end of file
    /// - `Err(WalCorruption)`: torn tail or checksum failure
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header_bytes)? {
            0 => return Ok(None),
            n if n < HEADER_SIZE => {
                return Err(AccountError::WalCorruption(format!(
                    "torn header at offset {}: {} of {} bytes",
                    self.valid_len, n, HEADER_SIZE
                )))
            }
            _ => {}
        }

        let header = FrameHeader::parse(&header_bytes)?;

        let mut payload = vec![0u8; header.len as usize];
        let read = read_full(&mut self.reader, &mut payload)?;
        if read < payload.len() {
            return Err(AccountError::WalCorruption(format!(
                "torn payload at offset {}: {} of {} bytes",
                self.valid_len,
                read,
                payload.len()
            )));
        }

        let entry = WalEntry::from_parts(&header, &payload)?;
        self.valid_len += (HEADER_SIZE + payload.len()) as u64;
        Ok(Some(entry))
    }

    /// Length of the intact prefix read so far
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }
}

impl Iterator for WalReader {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` as far as the file allows; returns the number of bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
