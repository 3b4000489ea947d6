use crate::foundation::core::PixelSize;
use crate::foundation::error::{VidmarkError, VidmarkResult};

/// An RGBA8 frame buffer borrowed from a [`PixelBufferPool`].
///
/// Pixels are tightly packed, row-major, y-down. Alpha is premultiplied (decoded video is opaque,
/// so straight and premultiplied coincide until an overlay is blended in).
#[derive(Debug)]
pub struct PixelBuffer {
    size: PixelSize,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Pool configuration.
#[derive(Debug, Clone, Copy)]
pub struct PixelBufferPoolOpts {
    /// Maximum number of buffers borrowed at once.
    pub max_outstanding: usize,
    /// Maximum number of released buffers kept for reuse.
    pub max_retained: usize,
}

impl Default for PixelBufferPoolOpts {
    fn default() -> Self {
        Self {
            max_outstanding: 4,
            max_retained: 4,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PixelBufferPoolStats {
    pub outstanding: usize,
    pub retained: usize,
    pub alloc_buffers: u64,
    pub alloc_bytes: u64,
    pub reused: u64,
}

/// Bounded pool of same-sized output buffers, owned by one pipeline for one task.
///
/// Every acquired buffer must be released before [`PixelBufferPool::close`].
#[derive(Debug)]
pub struct PixelBufferPool {
    size: PixelSize,
    opts: PixelBufferPoolOpts,
    free: Vec<Vec<u8>>,
    stats: PixelBufferPoolStats,
}

impl PixelBufferPool {
    pub fn new(size: PixelSize, opts: PixelBufferPoolOpts) -> VidmarkResult<Self> {
        if size.is_empty() {
            return Err(VidmarkError::resource(
                "pixel buffer pool requires a non-empty frame size",
            ));
        }
        if opts.max_outstanding == 0 {
            return Err(VidmarkError::resource(
                "pixel buffer pool max_outstanding must be >= 1",
            ));
        }
        Ok(Self {
            size,
            opts,
            free: Vec::new(),
            stats: PixelBufferPoolStats::default(),
        })
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn stats(&self) -> PixelBufferPoolStats {
        self.stats
    }

    /// Borrow a buffer. Contents are unspecified; callers overwrite every pixel.
    pub fn acquire(&mut self) -> VidmarkResult<PixelBuffer> {
        if self.stats.outstanding >= self.opts.max_outstanding {
            return Err(VidmarkError::resource(format!(
                "pixel buffer pool exhausted ({} buffers outstanding)",
                self.stats.outstanding
            )));
        }

        let data = match self.free.pop() {
            Some(data) => {
                self.stats.retained = self.stats.retained.saturating_sub(1);
                self.stats.reused = self.stats.reused.saturating_add(1);
                data
            }
            None => {
                let len = self.size.rgba_len();
                let mut data = Vec::new();
                data.try_reserve_exact(len).map_err(|e| {
                    VidmarkError::resource(format!(
                        "failed to allocate {}x{} pixel buffer: {e}",
                        self.size.width, self.size.height
                    ))
                })?;
                data.resize(len, 0);
                self.stats.alloc_buffers = self.stats.alloc_buffers.saturating_add(1);
                self.stats.alloc_bytes = self.stats.alloc_bytes.saturating_add(len as u64);
                data
            }
        };

        self.stats.outstanding += 1;
        Ok(PixelBuffer {
            size: self.size,
            data,
        })
    }

    /// Return a buffer to the pool.
    pub fn release(&mut self, buffer: PixelBuffer) {
        self.stats.outstanding = self.stats.outstanding.saturating_sub(1);
        if buffer.size != self.size || self.free.len() >= self.opts.max_retained {
            return;
        }
        self.free.push(buffer.data);
        self.stats.retained += 1;
    }

    /// Tear the pool down, reporting buffers that were never released.
    pub fn close(mut self) -> VidmarkResult<PixelBufferPoolStats> {
        self.free.clear();
        self.stats.retained = 0;
        if self.stats.outstanding > 0 {
            return Err(VidmarkError::resource(format!(
                "pixel buffer pool closed with {} buffers still outstanding",
                self.stats.outstanding
            )));
        }
        Ok(self.stats)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/buffer_pool.rs"]
mod tests;
