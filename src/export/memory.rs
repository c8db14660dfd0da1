//! Available-memory readings for admission sizing.

use sysinfo::System;

/// Source of the "currently available memory" reading used for admission
/// sizing.
pub trait MemoryProbe: Send + Sync {
    /// Available memory in bytes.
    fn available_bytes(&self) -> u64;
}

/// Reads available memory from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl SystemMemory {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryProbe for SystemMemory {
    fn available_bytes(&self) -> u64 {
        let mut system = System::new();
        system.refresh_memory();
        system.available_memory()
    }
}

/// A fixed reading, for tests and for overriding the OS value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn available_bytes(&self) -> u64 {
        self.0
    }
}
