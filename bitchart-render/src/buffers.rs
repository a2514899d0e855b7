//! Lifecycle management for named GPU vertex/instance/uniform buffers.
//!
//! Buffers live behind generational slotmap keys. Two update paths exist
//! and the distinction matters for streaming:
//!
//! - [`BufferArena::update`] writes into the existing allocation (growing
//!   it when too small). Fine for data the GPU is not reading this frame.
//! - [`BufferArena::replace`] orphans: a fresh buffer object is allocated
//!   on every call and the old one dropped. Per-frame streaming data must
//!   take this path so uploads never alias draws still in flight.

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Key for a buffer owned by the arena.
    pub struct BufferKey;
}

struct Entry {
    buffer: wgpu::Buffer,
    size: u64,
    usage: wgpu::BufferUsages,
    label: String,
}

/// Owns every buffer the render worker allocates and tracks total bytes.
pub struct BufferArena {
    entries: SlotMap<BufferKey, Entry>,
    total_bytes: u64,
}

impl BufferArena {
    pub fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            total_bytes: 0,
        }
    }

    pub fn create(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> BufferKey {
        let size = size.max(4);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        self.total_bytes += size;
        self.entries.insert(Entry {
            buffer,
            size,
            usage,
            label: label.to_string(),
        })
    }

    pub fn create_with_data(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        data: &[u8],
        usage: wgpu::BufferUsages,
    ) -> BufferKey {
        let key = self.create(device, label, data.len() as u64, usage);
        if !data.is_empty() {
            queue.write_buffer(self.get(key), 0, data);
        }
        key
    }

    /// Write into existing storage at `offset`, reallocating to
    /// `offset + data.len()` when the current allocation is too small.
    /// Reallocation does not preserve prior contents.
    pub fn update(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        key: BufferKey,
        data: &[u8],
        offset: u64,
    ) {
        let needed = offset + data.len() as u64;
        let entry = &self.entries[key];
        if needed > entry.size {
            let entry = &mut self.entries[key];
            self.total_bytes = self.total_bytes - entry.size + needed;
            entry.buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&entry.label),
                size: needed,
                usage: entry.usage,
                mapped_at_creation: false,
            });
            entry.size = needed;
            log::trace!("buffer '{}' grown to {} bytes", entry.label, needed);
        }
        if !data.is_empty() {
            queue.write_buffer(&self.entries[key].buffer, offset, data);
        }
    }

    /// Orphan-and-upload: the buffer object is reallocated at exactly
    /// `data.len()` bytes and the payload written in one go.
    pub fn replace(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        key: BufferKey,
        data: &[u8],
    ) {
        let entry = &mut self.entries[key];
        let size = (data.len() as u64).max(4);
        self.total_bytes = self.total_bytes - entry.size + size;
        entry.buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&entry.label),
            size,
            usage: entry.usage,
            mapped_at_creation: false,
        });
        entry.size = size;
        if !data.is_empty() {
            queue.write_buffer(&entry.buffer, 0, data);
        }
    }

    pub fn get(&self, key: BufferKey) -> &wgpu::Buffer {
        &self.entries[key].buffer
    }

    pub fn size_of(&self, key: BufferKey) -> u64 {
        self.entries[key].size
    }

    /// Bytes across all live buffers.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn destroy(&mut self, key: BufferKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.total_bytes -= entry.size;
            drop(entry.buffer);
        }
    }
}

impl Default for BufferArena {
    fn default() -> Self {
        Self::new()
    }
}
