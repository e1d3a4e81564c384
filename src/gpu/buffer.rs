//! Device-visible buffer arena
//!
//! Host-writable storage standing behind the data block managers. Creation
//! honors a fixed allocation ceiling so resource exhaustion surfaces as a
//! `DeviceResourceFailure` at creation time, exactly where a device
//! allocation would fail, instead of as an abort later.

use crate::core::error::EngineError;

/// Largest single buffer the engine will allocate (256 MiB).
pub const MAX_BUFFER_SIZE: u64 = 256 << 20;

/// One device-visible buffer.
pub struct DeviceBuffer {
    label: String,
    bytes: Vec<u8>,
}

impl DeviceBuffer {
    /// Allocates a zeroed buffer of `size` bytes.
    ///
    /// Fails with `DeviceResourceFailure` when `size` is zero or exceeds the
    /// allocation ceiling. Callers treat this as fatal for initialization.
    pub fn new(label: impl Into<String>, size: u64) -> Result<Self, EngineError> {
        let label = label.into();
        if size == 0 || size > MAX_BUFFER_SIZE {
            return Err(EngineError::device(format!(
                "buffer '{label}' of {size} bytes (limit {MAX_BUFFER_SIZE})"
            )));
        }
        Ok(Self {
            label,
            bytes: vec![0u8; size as usize],
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Writes `data` at `offset`. The region must lie inside the buffer.
    pub fn write(&mut self, offset: u64, data: &[u8]) {
        let start = offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Read view of `len` bytes at `offset`.
    pub fn slice(&self, offset: u64, len: u64) -> &[u8] {
        let start = offset as usize;
        &self.bytes[start..start + len as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_allocation_is_a_device_failure() {
        assert!(DeviceBuffer::new("huge", MAX_BUFFER_SIZE + 1).is_err());
        assert!(DeviceBuffer::new("empty", 0).is_err());
        assert!(DeviceBuffer::new("ok", 1024).is_ok());
    }

    #[test]
    fn writes_land_at_the_given_offset() {
        let mut buffer = DeviceBuffer::new("b", 16).unwrap();
        buffer.write(4, &[1, 2, 3]);
        assert_eq!(buffer.slice(4, 3), &[1, 2, 3]);
        assert_eq!(buffer.slice(0, 4), &[0, 0, 0, 0]);
    }
}
