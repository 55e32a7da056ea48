/// Splits a file into fixed-size chunks on demand.
///
/// Chunks are read lazily by index from a [`ChunkSource`], so a chunk can be
/// read again whenever it is needed and only the sender's window needs to be
/// resident. Reads may block on disk, so the session runs them as
/// [`ChunkRead`] jobs on the blocking pool rather than on its own task.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use peerdrop_types::{TransferId, total_chunks};
use sha2::{Digest, Sha256};

use crate::config::TransferConfig;
use crate::error::TransferError;

/// Random-access byte source behind a transfer.
pub trait ChunkSource: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Bytes>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChunkSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Bytes> {
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= Bytes::len(self))
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "range past end"))?;
        Ok(self.slice(start..end))
    }
}

/// File on disk, read with seek + read_exact per chunk.
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Bytes> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("file lock poisoned"))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// Indexable view of a source as `total_chunks` chunks of `chunk_size` bytes.
#[derive(Clone)]
pub struct Slicer {
    source: Arc<dyn ChunkSource>,
    chunk_size: u32,
    total_chunks: u32,
}

impl Slicer {
    /// Slice `source`. Zero-byte sources yield zero chunks unless
    /// `allow_empty` is false, in which case they are refused.
    pub fn new(
        source: Arc<dyn ChunkSource>,
        chunk_size: u32,
        allow_empty: bool,
    ) -> Result<Self, TransferError> {
        if source.is_empty() && !allow_empty {
            return Err(TransferError::EmptyFile);
        }
        let total_chunks = total_chunks(source.len(), chunk_size).ok_or_else(|| {
            TransferError::Config(format!(
                "cannot split {} bytes into chunks of {}",
                source.len(),
                chunk_size
            ))
        })?;
        Ok(Self {
            source,
            chunk_size,
            total_chunks,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.source.len()
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Byte length of chunk `index`; only the last chunk may be short.
    pub fn chunk_len(&self, index: u32) -> usize {
        let offset = index as u64 * self.chunk_size as u64;
        self.file_size()
            .saturating_sub(offset)
            .min(self.chunk_size as u64) as usize
    }

    /// Read chunk `index`. Every call reads afresh.
    pub fn chunk(&self, index: u32) -> Result<Bytes, TransferError> {
        if index >= self.total_chunks {
            return Err(TransferError::Read {
                index,
                source: io::Error::new(io::ErrorKind::InvalidInput, "chunk index out of range"),
            });
        }
        let offset = index as u64 * self.chunk_size as u64;
        self.source
            .read_at(offset, self.chunk_len(index))
            .map_err(|source| TransferError::Read { index, source })
    }

    /// Lazily read all chunks in order.
    pub fn chunks(&self) -> impl Iterator<Item = Result<Bytes, TransferError>> + '_ {
        (0..self.total_chunks).map(move |index| self.chunk(index))
    }

    /// Hex SHA-256 of the whole source, computed chunk by chunk.
    pub fn sha256(&self) -> Result<String, TransferError> {
        let mut hasher = Sha256::new();
        for chunk in self.chunks() {
            hasher.update(&chunk?);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// A source sliced and hashed, ready to announce.
pub struct PreparedSource {
    pub slicer: Slicer,
    pub sha256: Option<String>,
}

impl PreparedSource {
    /// Slice `source` with `config`'s chunk size and hash it when integrity
    /// checking is on. Hashing reads the whole source, so this blocks.
    pub fn prepare(
        source: Arc<dyn ChunkSource>,
        config: &TransferConfig,
    ) -> Result<Self, TransferError> {
        let slicer = Slicer::new(source, config.chunk_size, config.allow_empty_files)?;
        let sha256 = if config.verify_integrity {
            Some(slicer.sha256()?)
        } else {
            None
        };
        Ok(Self { slicer, sha256 })
    }
}

/// One chunk read requested by a sender.
pub struct ChunkRead {
    pub transfer_id: TransferId,
    pub index: u32,
    slicer: Slicer,
}

impl ChunkRead {
    pub fn new(transfer_id: TransferId, index: u32, slicer: Slicer) -> Self {
        Self {
            transfer_id,
            index,
            slicer,
        }
    }

    /// Perform the read. Blocking.
    pub fn run(self) -> ChunkLoaded {
        ChunkLoaded {
            transfer_id: self.transfer_id,
            index: self.index,
            result: self.slicer.chunk(self.index),
        }
    }
}

/// Outcome of a [`ChunkRead`], fed back to the sender.
#[derive(Debug)]
pub struct ChunkLoaded {
    pub transfer_id: TransferId,
    pub index: u32,
    pub result: Result<Bytes, TransferError>,
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;

    use super::*;

    const CS: u32 = 16;

    fn pattern(len: usize) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
    }

    fn slicer_for(data: &Bytes) -> Slicer {
        Slicer::new(Arc::new(data.clone()), CS, true).unwrap()
    }

    #[test]
    fn concatenation_reproduces_input() {
        let cs = CS as usize;
        for len in [0, 1, cs - 1, cs, cs + 1, cs * 5] {
            let data = pattern(len);
            let slicer = slicer_for(&data);
            assert_eq!(slicer.total_chunks() as usize, len.div_ceil(cs), "len {}", len);

            let mut joined = Vec::new();
            for chunk in slicer.chunks() {
                joined.extend_from_slice(&chunk.unwrap());
            }
            assert_eq!(joined, data.to_vec(), "len {}", len);
        }
    }

    #[test]
    fn forty_bytes_in_sixteen_byte_chunks() {
        let slicer = slicer_for(&pattern(40));
        assert_eq!(slicer.total_chunks(), 3);
        let sizes: Vec<usize> = slicer.chunks().map(|c| c.unwrap().len()).collect();
        assert_eq!(sizes, vec![16, 16, 8]);
    }

    #[test]
    fn chunks_are_rereadable() {
        let data = pattern(50);
        let slicer = slicer_for(&data);
        let first = slicer.chunk(2).unwrap();
        let again = slicer.chunk(2).unwrap();
        assert_eq!(first, again);
        assert_eq!(&first[..], &data[32..48]);
    }

    #[test]
    fn out_of_range_chunk_is_a_read_error() {
        let slicer = slicer_for(&pattern(20));
        assert!(matches!(slicer.chunk(2), Err(TransferError::Read { index: 2, .. })));
    }

    #[test]
    fn empty_file_policy() {
        let empty: Arc<dyn ChunkSource> = Arc::new(Bytes::new());
        let slicer = Slicer::new(empty.clone(), CS, true).unwrap();
        assert_eq!(slicer.total_chunks(), 0);
        assert_eq!(slicer.chunks().count(), 0);

        assert!(matches!(Slicer::new(empty, CS, false), Err(TransferError::EmptyFile)));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let result = Slicer::new(Arc::new(pattern(4)), 0, true);
        assert!(matches!(result, Err(TransferError::Config(_))));
    }

    #[test]
    fn file_source_reads_ranges() {
        let dir = std::env::temp_dir().join("peerdrop_slicer_test");
        let _ = fs::create_dir_all(&dir);
        let path = dir.join("input.bin");
        let data = pattern(37);
        fs::File::create(&path).unwrap().write_all(&data).unwrap();

        let source = FileSource::open(&path).unwrap();
        let slicer = Slicer::new(Arc::new(source), CS, true).unwrap();
        assert_eq!(slicer.total_chunks(), 3);
        assert_eq!(&slicer.chunk(2).unwrap()[..], &data[32..]);
        assert_eq!(slicer.sha256().unwrap(), slicer_for(&data).sha256().unwrap());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn prepare_hashes_only_when_verifying() {
        let data = pattern(40);
        let config = TransferConfig {
            chunk_size: CS,
            ..Default::default()
        };
        let prepared = PreparedSource::prepare(Arc::new(data.clone()), &config).unwrap();
        assert_eq!(prepared.slicer.total_chunks(), 3);
        assert_eq!(prepared.sha256, Some(hex::encode(Sha256::digest(&data))));

        let config = TransferConfig {
            verify_integrity: false,
            ..config
        };
        let prepared = PreparedSource::prepare(Arc::new(data), &config).unwrap();
        assert_eq!(prepared.sha256, None);
    }

    #[test]
    fn chunk_read_carries_its_transfer() {
        let data = pattern(40);
        let id = TransferId::new();
        let loaded = ChunkRead::new(id, 1, slicer_for(&data)).run();
        assert_eq!(loaded.transfer_id, id);
        assert_eq!(loaded.index, 1);
        assert_eq!(&loaded.result.unwrap()[..], &data[16..32]);
    }
}
