//! Error types for the engine.
//!
//! Errors fall into four groups: initialization failures (fatal, the engine
//! is never constructed), buffer range errors (internal, mapped onto
//! [`EngineError`]), recoverable caller errors, and device errors (fatal for
//! the instance that raised them).

use thiserror::Error;

/// Fatal errors raised while creating an engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitError {
    /// The engine configuration is unusable.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// The compute device (worker pool) could not be created.
    #[error("failed to create compute device: {0}")]
    DeviceCreation(String),

    /// A device buffer could not be allocated.
    #[error("failed to allocate buffer '{label}' ({bytes} bytes)")]
    BufferAllocation { label: &'static str, bytes: u64 },

    /// A compute program failed validation against the buffer store.
    #[error("failed to compile pipeline '{pipeline}': {reason}")]
    PipelineCompilation {
        pipeline: &'static str,
        reason: String,
    },
}

/// Range errors raised by device buffer reads and writes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A write would run past the end of the buffer.
    #[error("write of {len} elements at offset {offset} exceeds capacity {capacity} of '{label}'")]
    CapacityExceeded {
        label: &'static str,
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// A read would run past the end of the buffer.
    #[error("read of {len} elements at offset {offset} is outside '{label}' (capacity {capacity})")]
    OutOfRange {
        label: &'static str,
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// The buffer's storage is unusable because a kernel faulted while holding it.
    #[error("buffer '{0}' was poisoned by a faulted kernel")]
    Poisoned(&'static str),
}

/// Fatal errors raised by the compute device while executing work.
///
/// Once any of these is returned the engine instance is unusable and must be
/// replaced by a freshly initialized one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulationDeviceError {
    /// The device was destroyed or lost in an earlier failure.
    #[error("compute device lost")]
    Lost,

    /// A kernel faulted while executing.
    #[error("kernel '{pipeline}' faulted during dispatch")]
    KernelFault { pipeline: &'static str },

    /// A dispatch exceeded the device's workgroup limit.
    #[error("dispatch of {workgroups} workgroups for '{pipeline}' exceeds device limit {limit}")]
    DispatchLimit {
        pipeline: &'static str,
        workgroups: u32,
        limit: u32,
    },
}

/// Errors returned by the engine's public operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Not enough free slots for the request. Nothing was written.
    #[error("capacity exceeded: requested {requested} slots, {available} available")]
    CapacityExceeded { requested: u32, available: u32 },

    /// A constraint names a particle slot that is not occupied.
    #[error("constraint {index} references particle slot {slot}, but only {occupied} are occupied")]
    InvalidReference { index: usize, slot: u32, occupied: u32 },

    /// A constraint has parameters outside their valid range.
    #[error("constraint {index} is invalid: {reason}")]
    InvalidConstraint { index: usize, reason: &'static str },

    /// A particle template has parameters outside their valid range.
    #[error("particle template is invalid: {0}")]
    InvalidTemplate(&'static str),

    /// A readback range extends past the occupied particle slots.
    #[error("cannot read {requested} particles, only {occupied} are occupied")]
    ReadbackOutOfRange { requested: u32, occupied: u32 },

    /// The device failed; the engine must be reinitialized.
    #[error(transparent)]
    Device(#[from] SimulationDeviceError),
}

impl From<BufferError> for EngineError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::CapacityExceeded {
                offset,
                len,
                capacity,
                ..
            } => EngineError::CapacityExceeded {
                requested: len as u32,
                available: capacity.saturating_sub(offset) as u32,
            },
            BufferError::OutOfRange {
                offset, len, capacity, ..
            } => EngineError::ReadbackOutOfRange {
                requested: (offset + len) as u32,
                occupied: capacity as u32,
            },
            BufferError::Poisoned(_) => EngineError::Device(SimulationDeviceError::Lost),
        }
    }
}

/// Result alias for the engine's public operations.
pub type EngineResult<T> = Result<T, EngineError>;
