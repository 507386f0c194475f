//! Block device behind a [`DeviceQueue`].
//!
//! Callers submit sector reads and writes from any task; the queue's
//! run-loop executes them one at a time against a [`MemoryDisk`] and
//! resolves each caller's completion in submission order.

#![allow(missing_docs)]

mod disk;
pub mod wrapper;

use std::future::Future;
use std::rc::Rc;

use futures::executor::LocalSpawner;
use futures::task::{LocalSpawnExt, SpawnError};
use service_abi::{MAX_SECTORS_PER_REQUEST, SECTOR_SIZE};
use services_common::{DeviceQueue, QueueError};
use thiserror::Error;

pub use crate::disk::{DiskConfig, Fault, MemoryDisk};

#[derive(Debug)]
pub enum BlockOp {
    Read { sector: u64, buffer: Vec<u8> },
    Write { sector: u64, buffer: Vec<u8> },
}

/// Failure reported by the disk for one command.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("sector {0} is not addressable")]
    Unaddressable(u64),

    #[error("malformed command block")]
    MalformedCommand,

    #[error("bad status signature {0:#010x}")]
    BadSignature(u32),

    #[error("status tag {found} does not answer command {expected}")]
    TagMismatch { expected: u32, found: u32 },

    #[error("command failed with status {0:#04x}")]
    CommandFailed(u8),

    #[error("{0} bytes were not transferred")]
    Residue(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("length {0} is not a positive multiple of {}", SECTOR_SIZE)]
    Unaligned(usize),

    #[error("{0} sectors exceed the per-request limit of {}", MAX_SECTORS_PER_REQUEST)]
    TooLarge(usize),

    #[error("buffer of {buffer} bytes is shorter than the requested {length}")]
    ShortBuffer { buffer: usize, length: usize },

    #[error(transparent)]
    Queue(#[from] QueueError<DeviceError>),
}

pub type BlockResult<T> = Result<T, BlockError>;

/// Submission handle for a running disk.
#[derive(Clone)]
pub struct BlockQueue {
    queue: DeviceQueue<MemoryDisk>,
    disk: Rc<MemoryDisk>,
}

impl BlockQueue {
    /// Starts the run-loop for `disk` on `spawner`.
    pub fn start(disk: MemoryDisk, spawner: &LocalSpawner) -> Result<Self, SpawnError> {
        let queue: DeviceQueue<MemoryDisk> = DeviceQueue::new();
        let disk = Rc::new(disk);
        {
            let queue = queue.clone();
            let disk = Rc::clone(&disk);
            spawner.spawn_local(async move { queue.run(&disk).await })?;
        }
        Ok(Self { queue, disk })
    }

    pub fn disk(&self) -> &MemoryDisk {
        &self.disk
    }

    /// Reads `length` bytes starting at `sector` into `buffer`.
    ///
    /// The request is queued before this returns; dropping the returned
    /// future before the disk picks it up withdraws it.
    pub fn submit(
        &self,
        sector: u64,
        mut buffer: Vec<u8>,
        length: usize,
    ) -> impl Future<Output = BlockResult<Vec<u8>>> {
        let submitted = check_length(length).and_then(|()| {
            if buffer.len() < length {
                return Err(BlockError::ShortBuffer {
                    buffer: buffer.len(),
                    length,
                });
            }
            buffer.truncate(length);
            Ok(self.queue.submit(BlockOp::Read { sector, buffer }))
        });
        async move {
            let data = submitted?.await?;
            Ok::<_, BlockError>(data)
        }
    }

    pub fn read_sectors(
        &self,
        sector: u64,
        count: usize,
    ) -> impl Future<Output = BlockResult<Vec<u8>>> {
        let length = count * SECTOR_SIZE;
        self.submit(sector, vec![0; length], length)
    }

    /// Writes `data` starting at `sector`. Queued before this returns, like
    /// [`BlockQueue::submit`].
    pub fn write_sectors(&self, sector: u64, data: Vec<u8>) -> impl Future<Output = BlockResult<()>> {
        let submitted = check_length(data.len()).map(|()| {
            self.queue.submit(BlockOp::Write {
                sector,
                buffer: data,
            })
        });
        async move {
            submitted?.await?;
            Ok::<_, BlockError>(())
        }
    }

    /// Stops the run-loop; queued requests resolve as shut down.
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

fn check_length(length: usize) -> BlockResult<()> {
    if length == 0 || length % SECTOR_SIZE != 0 {
        return Err(BlockError::Unaligned(length));
    }
    let sectors = length / SECTOR_SIZE;
    if sectors > MAX_SECTORS_PER_REQUEST {
        return Err(BlockError::TooLarge(sectors));
    }
    Ok(())
}
