/*
    journal.rs - Durable append-only chain history

    Every funding event and every block is appended as one frame:

        [seq:8][len:4][record:len][crc32:4]

    Frames are never rewritten. Reopening the journal replays them in order
    to rebuild the chain; a checksum or framing failure aborts the replay.
*/

use super::errors::{LedgerError, LedgerResult};
use super::types::Block;
use crate::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// One replayable change to the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// Genesis-style allocation to an account
    Funded { address: Address, amount: u64 },
    /// An appended block
    Block(Block),
}

/// `[seq:8][len:4]`
const FRAME_HEADER: u64 = 12;
const CHECKSUM_LEN: u64 = 4;

pub struct Journal {
    path: PathBuf,
    file: BufWriter<File>,
    seq: u64,
}

impl Journal {
    /// Open (or create) the journal and return it with the records already on disk
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<(Self, Vec<JournalRecord>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        let records = Self::read_all(&path)?;

        Ok((Journal { path, file: BufWriter::new(file), seq: records.len() as u64 }, records))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and flush it before returning
    pub fn append(&mut self, record: &JournalRecord) -> LedgerResult<u64> {
        let data = bincode::serialize(record)?;
        let len = u32::try_from(data.len())
            .map_err(|_| LedgerError::Storage(format!("record of {} bytes too large", data.len())))?;

        self.file.write_all(&self.seq.to_le_bytes())?;
        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(&data)?;
        self.file.write_all(&crc32fast::hash(&data).to_le_bytes())?;
        self.file.flush()?;

        let seq = self.seq;
        self.seq += 1;
        Ok(seq)
    }

    fn read_all(path: &Path) -> LedgerResult<Vec<JournalRecord>> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut consumed: u64 = 0;

        loop {
            let mut seq_buf = [0u8; 8];
            match reader.read_exact(&mut seq_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let seq = u64::from_le_bytes(seq_buf);
            if seq != records.len() as u64 {
                return Err(LedgerError::CorruptedJournal(format!(
                    "expected seq {}, found {}",
                    records.len(),
                    seq
                )));
            }

            let mut len_buf = [0u8; 4];
            read_frame_part(&mut reader, &mut len_buf, seq)?;
            let len = u32::from_le_bytes(len_buf) as usize;
            consumed += FRAME_HEADER;

            // Payload and checksum must fit in what is left of the file
            if len as u64 + CHECKSUM_LEN > size.saturating_sub(consumed) {
                return Err(LedgerError::CorruptedJournal(format!(
                    "frame at seq {} claims {} bytes, only {} left",
                    seq,
                    len,
                    size.saturating_sub(consumed)
                )));
            }

            let mut data = vec![0u8; len];
            read_frame_part(&mut reader, &mut data, seq)?;

            let mut checksum_buf = [0u8; 4];
            read_frame_part(&mut reader, &mut checksum_buf, seq)?;
            if crc32fast::hash(&data) != u32::from_le_bytes(checksum_buf) {
                return Err(LedgerError::CorruptedJournal(format!("Invalid checksum at seq {}", seq)));
            }

            consumed += len as u64 + CHECKSUM_LEN;
            records.push(bincode::deserialize(&data)?);
        }

        Ok(records)
    }
}

fn read_frame_part(reader: &mut impl Read, buf: &mut [u8], seq: u64) -> LedgerResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => LedgerError::CorruptedJournal(format!("truncated frame at seq {}", seq)),
        _ => LedgerError::from(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::H256;
    use tempfile::tempdir;

    fn block(number: u64) -> Block {
        Block {
            number,
            hash: H256([number as u8; 32]),
            parent_hash: H256::ZERO,
            timestamp: 1_700_000_000_000,
            transactions: Vec::new(),
            logs: Vec::new(),
        }
    }

    #[test]
    fn test_journal_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain").join("journal.bin");

        let (mut journal, existing) = Journal::open(&path).unwrap();
        assert!(existing.is_empty());
        journal.append(&JournalRecord::Funded { address: Address([1; 20]), amount: 5 }).unwrap();
        journal.append(&JournalRecord::Block(block(1))).unwrap();
        drop(journal);

        let (mut journal, records) = Journal::open(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], JournalRecord::Block(block(1)));
        assert_eq!(journal.append(&JournalRecord::Block(block(2))).unwrap(), 2);
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.bin");

        let (mut journal, _) = Journal::open(&path).unwrap();
        journal.append(&JournalRecord::Block(block(1))).unwrap();
        drop(journal);

        let mut bytes = std::fs::read(&path).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(Journal::open(&path), Err(LedgerError::CorruptedJournal(_))));
    }

    #[test]
    fn test_truncated_frame_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.bin");

        let (mut journal, _) = Journal::open(&path).unwrap();
        journal.append(&JournalRecord::Block(block(1))).unwrap();
        drop(journal);

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        assert!(matches!(Journal::open(&path), Err(LedgerError::CorruptedJournal(_))));
    }

    #[test]
    fn test_oversized_length_rejected_before_reading() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.bin");

        let (mut journal, _) = Journal::open(&path).unwrap();
        journal.append(&JournalRecord::Funded { address: Address([1; 20]), amount: 5 }).unwrap();
        journal.append(&JournalRecord::Block(block(1))).unwrap();
        drop(journal);

        // Second frame claims ~4 GiB of payload
        let mut bytes = std::fs::read(&path).unwrap();
        let first_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let second = 12 + first_len + 4;
        bytes[second + 8..second + 12].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        match Journal::open(&path) {
            Err(LedgerError::CorruptedJournal(msg)) => assert!(msg.contains("seq 1"), "{}", msg),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("corrupted journal opened"),
        }
    }
}
