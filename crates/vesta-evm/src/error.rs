//! Interpreter error types

use thiserror::Error;
use vesta_state::StateError;

/// Frame-fatal faults.
///
/// A fault consumes all gas left in the frame and rolls the frame's state
/// changes back to its entry checkpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Out of gas
    #[error("out of gas")]
    OutOfGas,

    /// Stack underflow
    #[error("stack underflow")]
    StackUnderflow,

    /// Stack overflow
    #[error("stack overflow (max 1024)")]
    StackOverflow,

    /// Jump target is not a valid destination of the requested kind
    #[error("bad jump destination: {0}")]
    BadJumpDestination(usize),

    /// Undefined or inactive opcode
    #[error("invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Memory offset or size does not fit the address space
    #[error("out of bounds memory access")]
    OutOfBoundsMemoryAccess,

    /// State modification in a static frame
    #[error("state modification in static context")]
    StaticStateChange,

    /// RETURNDATACOPY past the end of the return buffer
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,

    /// RETURNSUB with an empty return stack
    #[error("return stack underflow")]
    ReturnStackUnderflow,

    /// JUMPSUB with a full return stack
    #[error("return stack overflow (max 1023)")]
    ReturnStackOverflow,

    /// BEGINSUB reached by ordinary execution
    #[error("invalid subroutine entry")]
    InvalidSubroutineEntry,

    /// Deployed code exceeds the size limit
    #[error("code size limit exceeded: {0} bytes")]
    CodeSizeLimit(usize),

    /// Deployed code starts with the reserved 0xEF byte
    #[error("deployed code starts with 0xef")]
    InvalidCodePrefix,

    /// Creation target already has a nonce or code
    #[error("contract address collision")]
    AddressCollision,
}

/// Interpreter errors.
///
/// Faults are recoverable at the frame boundary; state errors are not and
/// abort the whole transaction.
#[derive(Debug, Error)]
pub enum EvmError {
    /// Frame-fatal fault
    #[error("fault: {0}")]
    Fault(#[from] Fault),

    /// Failure in the state layer
    #[error("state error: {0}")]
    State(#[from] StateError),
}

/// Result type for interpreter operations
pub type EvmResult<T> = Result<T, EvmError>;
