//! Error types for FLAC decoding and encoding.

use std::io;

use thiserror::Error;

/// Result type for all fallible operations in this crate.
pub type FlacResult<T> = Result<T, FlacError>;

/// Errors produced while decoding or encoding a FLAC stream.
#[derive(Debug, Error)]
pub enum FlacError {
    // ========================================================================
    // Stream-level errors
    // ========================================================================
    #[error("invalid FLAC signature: expected \"fLaC\", found {found:?}")]
    SignatureMismatch { found: [u8; 4] },

    #[error("missing STREAMINFO block (must be the first metadata block)")]
    MissingStreamInfo,

    #[error("invalid metadata block type {0} (127 is forbidden)")]
    InvalidBlockType(u8),

    #[error("STREAMINFO body has invalid length: expected 34 bytes, found {0}")]
    InvalidStreamInfoLength(usize),

    #[error("non-zero byte in PADDING block body")]
    InvalidPadding,

    #[error("APPLICATION block shorter than its 32-bit ID")]
    TruncatedApplication,

    #[error("SEEKTABLE body length {0} is not a multiple of 18")]
    InvalidSeekTableLength(usize),

    #[error("seek point {sample} is not strictly increasing (previous {prev})")]
    SeekPointNotAscending { sample: u64, prev: u64 },

    #[error("unable to locate '=' in comment vector {vector:?}")]
    CommentMissingSeparator { vector: String },

    #[error("malformed CUESHEET: {0}")]
    InvalidCueSheet(String),

    #[error("truncated metadata block body")]
    TruncatedMetadata,

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8String(&'static str),

    // ========================================================================
    // Frame-level errors
    // ========================================================================
    #[error("invalid frame sync code: expected 0x3FFE, found {found:#06x}")]
    InvalidSyncCode { found: u16 },

    #[error("reserved bit set in frame header")]
    ReservedHeaderBit,

    #[error("reserved block size code in frame header")]
    ReservedBlockSizeCode,

    #[error("reserved sample rate code in frame header")]
    ReservedSampleRateCode,

    #[error("reserved bits-per-sample code in frame header")]
    ReservedBitsPerSampleCode,

    #[error("reserved channel assignment code {0:#06b}")]
    ReservedChannelAssignment(u8),

    #[error("block size {0} exceeds the 65535-sample limit")]
    InvalidBlockSize(u32),

    #[error("bits-per-sample unavailable: frame header and STREAMINFO both defer")]
    MissingBitsPerSample,

    #[error("frame header CRC-8 mismatch: stored {expected:#04x}, computed {computed:#04x}")]
    FrameHeaderCrcMismatch { expected: u8, computed: u8 },

    #[error("frame CRC-16 mismatch: stored {expected:#06x}, computed {computed:#06x}")]
    FrameCrcMismatch { expected: u16, computed: u16 },

    #[error("invalid UTF-8 coded number in frame header")]
    InvalidUtf8Number,

    #[error("overlong UTF-8 coded number: {value} stored in {bytes} bytes")]
    OverlongUtf8Number { value: u64, bytes: usize },

    // ========================================================================
    // Subframe-level errors
    // ========================================================================
    #[error("non-zero padding bit in subframe header")]
    InvalidSubframePadding,

    #[error("reserved subframe type code {0:#08b}")]
    ReservedSubframeType(u8),

    #[error("reserved residual coding method {0:#04b}")]
    ReservedResidualMethod(u8),

    #[error("reserved coefficient precision code (all ones)")]
    ReservedCoeffPrecision,

    #[error("negative predictor coefficient shift {0}")]
    NegativeCoeffShift(i32),

    #[error("prediction order {order} differs from coefficient count {count}")]
    CoefficientCountMismatch { order: usize, count: usize },

    #[error("wasted bits-per-sample {wasted} leaves no sample bits (bps {bps})")]
    ExcessiveWastedBits { wasted: u32, bps: u32 },

    #[error("Rice quotient exceeds the decoder limit")]
    RiceQuotientOverflow,

    #[error("residual partition arithmetic violation: block size {block_size}, \
             partition order {part_order}, prediction order {pred_order}")]
    PartitionArithmetic {
        block_size: u16,
        part_order: u8,
        pred_order: usize,
    },

    #[error("escaped partition sample width {0} exceeds 32 bits")]
    EscapeWidthTooLarge(u32),

    // ========================================================================
    // Seeking and verification
    // ========================================================================
    #[error("unable to seek to sample number {sample} (total {total})")]
    SeekOutOfRange { sample: u64, total: u64 },

    #[error("stream has no seek table and none could be built")]
    NoSeekTable,

    #[error("MD5 digest mismatch: stream may be corrupted")]
    Md5Mismatch,

    // ========================================================================
    // I/O and general errors
    // ========================================================================
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FlacError {
    /// Create an `Unsupported` error from any message.
    pub fn unsupported<S: Into<String>>(what: S) -> Self {
        FlacError::Unsupported(what.into())
    }

    /// Create an `InvalidCueSheet` error from any message.
    pub fn cue_sheet<S: Into<String>>(what: S) -> Self {
        FlacError::InvalidCueSheet(what.into())
    }
}
