//! In-memory staging buffer for a file opened for writing.
//!
//! A staged file is a sequence of zero-filled, fixed-size chunks. Writes may
//! land at any offset; the logical length is the highest `offset + len` ever
//! written and never shrinks. Nothing reaches the store until a commit takes
//! a snapshot of the first `length` bytes.
//!
//! ```text
//! chunk_size = 4, write(b"xy", 6)
//!
//!   chunk 0     chunk 1
//!   [0 0 0 0]   [0 0 x y]     length = 8
//! ```

use bytes::Bytes;

/// Commit lifecycle of a staged file.
///
/// ```text
/// Dirty ──flush──▶ Committing ──ok──▶ Clean
///   ▲                  │
///   └──── write ───────┴──err──▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Clean,
    Dirty,
    Committing,
    Failed,
}

/// Content captured at the start of a commit.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub data: Bytes,
    pub chunk_size: u32,
    /// Write generation the snapshot was taken at
    pub generation: u64,
}

#[derive(Debug)]
pub struct StagedFile {
    chunk_size: usize,
    chunks: Vec<Box<[u8]>>,
    length: u64,
    state: CommitState,
    generation: u64,
}

impl StagedFile {
    /// New, empty, dirty file. `chunk_size` must be positive.
    pub fn new(chunk_size: u32) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        StagedFile {
            chunk_size: chunk_size as usize,
            chunks: Vec::new(),
            length: 0,
            state: CommitState::Dirty,
            generation: 0,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size as u32
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    /// True until a commit of the current content succeeds.
    pub fn is_dirty(&self) -> bool {
        self.state != CommitState::Clean
    }

    /// Copy `data` in at `offset`, allocating zero-filled chunks as needed.
    pub fn write(&mut self, data: &[u8], offset: u64) -> usize {
        if data.is_empty() {
            return 0;
        }
        let offset = offset as usize;
        let last_chunk = (offset + data.len() - 1) / self.chunk_size;
        while self.chunks.len() <= last_chunk {
            self.chunks.push(vec![0u8; self.chunk_size].into_boxed_slice());
        }

        let mut written = 0;
        while written < data.len() {
            let pos = offset + written;
            let within = pos % self.chunk_size;
            let n = (self.chunk_size - within).min(data.len() - written);
            self.chunks[pos / self.chunk_size][within..within + n]
                .copy_from_slice(&data[written..written + n]);
            written += n;
        }

        self.length = self.length.max((offset + written) as u64);
        self.state = CommitState::Dirty;
        self.generation += 1;
        written
    }

    /// Fill `buf` from `offset`; returns the byte count, 0 at or past EOF.
    ///
    /// Reads stop at the logical length, never in the zero padding of the
    /// last chunk.
    pub fn read(&self, buf: &mut [u8], offset: u64) -> usize {
        if offset >= self.length {
            return 0;
        }
        let want = buf.len().min((self.length - offset) as usize);
        let offset = offset as usize;

        let mut read = 0;
        while read < want {
            let pos = offset + read;
            let Some(chunk) = self.chunks.get(pos / self.chunk_size) else {
                break;
            };
            let within = pos % self.chunk_size;
            let n = (self.chunk_size - within).min(want - read);
            buf[read..read + n].copy_from_slice(&chunk[within..within + n]);
            read += n;
        }
        read
    }

    /// The first `len()` bytes.
    pub fn contents(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.length as usize];
        let n = self.read(&mut out, 0);
        out.truncate(n);
        out
    }

    /// Snapshot the content and enter `Committing`; `None` when clean.
    pub fn begin_commit(&mut self) -> Option<Snapshot> {
        if !self.is_dirty() {
            return None;
        }
        self.state = CommitState::Committing;
        Some(Snapshot {
            data: Bytes::from(self.contents()),
            chunk_size: self.chunk_size(),
            generation: self.generation,
        })
    }

    /// Record the outcome of the commit started at `generation`.
    ///
    /// A write that landed while the commit was in flight keeps the file
    /// dirty even if the commit succeeded.
    pub fn finish_commit(&mut self, generation: u64, ok: bool) {
        self.state = match (ok, self.generation == generation) {
            (true, true) => CommitState::Clean,
            (true, false) => CommitState::Dirty,
            (false, _) => CommitState::Failed,
        };
    }
}
