//! Dynamic data block manager
//!
//! A typed array of CPU-side blocks mirrored into one device buffer per
//! frame-in-flight. The stride between blocks is the struct size rounded up
//! to the device's minimum offset alignment. Mutating a block marks it
//! dirty for every frame slot; `flush(frame)` copies the still-dirty blocks
//! into that frame's buffer, so each frame slot sees at most one write per
//! block per mutation.

use bytemuck::Pod;

use crate::core::error::EngineError;
use crate::gpu::buffer::DeviceBuffer;

/// Smallest multiple of `align` that holds one `B`.
pub fn aligned_stride(size: usize, align: usize) -> usize {
    debug_assert!(align > 0);
    size.div_ceil(align) * align
}

/// Fixed-count manager of uniform blocks of type `B`.
pub struct DataBlockManager<B: Pod> {
    blocks: Vec<B>,
    stride: usize,
    /// Per block, a bitmask of frame slots still awaiting this block.
    dirty: Vec<u32>,
    frames: Vec<DeviceBuffer>,
    label: &'static str,
}

impl<B: Pod> DataBlockManager<B> {
    /// Precomputes the aligned stride for `block_count` blocks.
    ///
    /// `alignment` is the device's minimum uniform-buffer offset alignment.
    pub fn new(label: &'static str, alignment: usize, block_count: usize) -> Self {
        Self {
            blocks: vec![B::zeroed(); block_count],
            stride: aligned_stride(std::mem::size_of::<B>(), alignment),
            dirty: vec![0; block_count],
            frames: Vec::new(),
            label,
        }
    }

    /// Allocates one device buffer per frame-in-flight, each sized
    /// `stride * block_count`.
    ///
    /// Buffer creation failure is fatal for engine initialization and is
    /// propagated unchanged.
    pub fn create_buffers(&mut self, frames_in_flight: usize) -> Result<(), EngineError> {
        let size = (self.stride * self.blocks.len()) as u64;
        self.frames = (0..frames_in_flight)
            .map(|frame| DeviceBuffer::new(format!("{}[frame {frame}]", self.label), size))
            .collect::<Result<_, _>>()?;
        // Everything is dirty for every new frame slot
        let all = (1u32 << frames_in_flight) - 1;
        self.dirty.fill(all);
        Ok(())
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Read access to block `index`.
    pub fn block(&self, index: usize) -> &B {
        &self.blocks[index]
    }

    /// In-place mutation of block `index`; marks it dirty for every frame.
    pub fn block_mut(&mut self, index: usize) -> &mut B {
        self.mark_dirty(index);
        &mut self.blocks[index]
    }

    /// Overwrites block `index` and marks it dirty for every frame.
    pub fn set_block(&mut self, index: usize, value: B) {
        self.blocks[index] = value;
        self.mark_dirty(index);
    }

    /// Flags block `index` for re-upload to every frame slot.
    pub fn mark_dirty(&mut self, index: usize) {
        let all = if self.frames.is_empty() {
            u32::MAX
        } else {
            (1u32 << self.frames.len()) - 1
        };
        self.dirty[index] = all;
    }

    /// Copies every block still dirty for `frame` into that frame's buffer.
    ///
    /// Must complete before the command stream reading `frame` is submitted;
    /// the renderer sequences this at the top of each dispatch.
    pub fn flush(&mut self, frame: usize) {
        let bit = 1u32 << frame;
        for (index, dirty) in self.dirty.iter_mut().enumerate() {
            if *dirty & bit != 0 {
                let offset = (index * self.stride) as u64;
                self.frames[frame].write(offset, bytemuck::bytes_of(&self.blocks[index]));
                *dirty &= !bit;
            }
        }
    }

    /// Whether block `index` still has an outstanding write for `frame`.
    pub fn is_dirty(&self, index: usize, frame: usize) -> bool {
        self.dirty[index] & (1 << frame) != 0
    }

    /// Raw bytes of `frame`'s device buffer.
    pub fn frame_bytes(&self, frame: usize) -> &[u8] {
        self.frames[frame].bytes()
    }

    /// The aligned region of block `index` inside `frame`'s buffer.
    pub fn block_bytes(&self, frame: usize, index: usize) -> &[u8] {
        self.frames[frame].slice((index * self.stride) as u64, self.stride as u64)
    }
}
