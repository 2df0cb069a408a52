//! Blocking `Read + Seek` over a remote file using HTTP Range requests.
//!
//! The file is split into fixed-size blocks. Reads fetch the blocks they
//! cover (concurrently, on the shared runtime) and keep them in an LRU cache,
//! so a TIFF decoder walking IFDs and a handful of tiles costs a few
//! requests rather than a full download.

use crate::cache::BlockCache;
use crate::error::{CloudError, Result};
use crate::http::HttpClient;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::trace;

/// Configuration for [`RemoteFile`].
#[derive(Debug, Clone)]
pub struct RangeReaderOptions {
    /// Bytes per fetched block (default 512 KiB).
    pub block_size: usize,
    /// Blocks kept in the LRU cache (default 64).
    pub cache_blocks: usize,
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Retries on transient failures (default 3).
    pub max_retries: u32,
}

impl Default for RangeReaderOptions {
    fn default() -> Self {
        Self {
            block_size: 512 * 1024,
            cache_blocks: 64,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Remote file opened for random access.
pub struct RemoteFile {
    url: String,
    len: u64,
    pos: u64,
    block_size: u64,
    cache: BlockCache,
    client: HttpClient,
    runtime: Arc<Runtime>,
}

impl RemoteFile {
    /// Open `url`, discovering its size with a HEAD request.
    pub fn open(url: &str, options: &RangeReaderOptions, runtime: Arc<Runtime>) -> Result<Self> {
        let client = HttpClient::new(options.request_timeout, options.max_retries)?;
        let head = runtime.block_on(client.head(url))?;
        let len = head.content_length.ok_or_else(|| CloudError::RangeNotSupported {
            url: url.to_string(),
        })?;

        Ok(Self {
            url: url.to_string(),
            len,
            pos: 0,
            block_size: options.block_size.max(1024) as u64,
            cache: BlockCache::new(options.cache_blocks),
            client,
            runtime,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// File size in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Blocks currently cached
    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }

    fn fetch_missing(&mut self, first: u64, last: u64) -> Result<()> {
        let missing: Vec<u64> = (first..=last).filter(|&b| !self.cache.contains(b)).collect();
        if missing.is_empty() {
            return Ok(());
        }
        let ranges = block_ranges(&missing, self.block_size, self.len);
        trace!(url = %self.url, blocks = missing.len(), "fetching blocks");

        let fetched = self
            .runtime
            .block_on(self.client.fetch_ranges(&self.url, &ranges))?;
        for (block, data) in missing.into_iter().zip(fetched) {
            self.cache.insert(block, data);
        }
        Ok(())
    }
}

/// `(offset, length)` of each block, the last one clipped to the file end
fn block_ranges(blocks: &[u64], block_size: u64, len: u64) -> Vec<(u64, u64)> {
    blocks
        .iter()
        .map(|&b| {
            let offset = b * block_size;
            (offset, block_size.min(len.saturating_sub(offset)))
        })
        .collect()
}

/// Keep transient failures recognisable once they pass through a decoder
fn into_io(err: CloudError) -> io::Error {
    let kind = if err.is_transient() {
        io::ErrorKind::TimedOut
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, err)
}

impl Read for RemoteFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.len {
            return Ok(0);
        }
        let end = (self.pos + buf.len() as u64).min(self.len);
        let first = self.pos / self.block_size;
        let last = (end - 1) / self.block_size;
        self.fetch_missing(first, last).map_err(into_io)?;

        let mut written = 0usize;
        for block in first..=last {
            let data = self
                .cache
                .get(block)
                .ok_or_else(|| io::Error::other(format!("block {block} evicted during read")))?;
            let block_start = block * self.block_size;
            let from = (self.pos + written as u64 - block_start) as usize;
            let to = ((end - block_start) as usize).min(data.len());
            if from >= to {
                break;
            }
            let n = to - from;
            buf[written..written + n].copy_from_slice(&data[from..to]);
            written += n;
        }

        self.pos += written as u64;
        Ok(written)
    }
}

impl Seek for RemoteFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.len.checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        match target {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of remote file",
            )),
        }
    }
}
