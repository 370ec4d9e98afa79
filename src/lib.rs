//! Bit-exact streaming FLAC decoding and re-encoding.
//!
//! This crate parses FLAC streams down to their last bit — the stream
//! signature (with an optional ID3v2 prelude), every metadata block type,
//! sync-coded audio frames, and the subframe layer with constant,
//! verbatim, fixed and FIR prediction, Rice coded residuals, escaped
//! partitions and wasted-bits handling. Decoded frames keep their full
//! coded description, so writing them back through [`Encoder`] reproduces
//! the original stream byte for byte.
//!
//! # Layers
//!
//! - [`bitstream`]: MSB-first bit I/O with CRC tees and UTF-8 coded numbers
//! - [`crc`]: CRC-8 and CRC-16 engines
//! - [`metadata`]: the seven metadata block bodies behind one sum type
//! - [`frame`]: frame headers, channel assignments, inter-channel
//!   decorrelation
//! - [`subframe`]: prediction methods and residual coding
//! - [`stream`] / [`encoder`]: the top-level decode and encode
//!   orchestrators
//!
//! # Example
//!
//! ```no_run
//! use flac_io::Stream;
//!
//! let mut stream = Stream::open("audio.flac")?;
//! println!("{}", stream.info());
//! while let Some(frame) = stream.next_frame()? {
//!     // frame.subframes[ch].samples are decoded i32 samples
//! }
//! stream.verify_md5()?;
//! # Ok::<(), flac_io::FlacError>(())
//! ```

#![warn(clippy::unwrap_used)]
#![warn(clippy::panic)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::needless_collect)]
#![warn(clippy::missing_safety_doc)]
#![allow(clippy::identity_op)] // Explicit operations for clarity

pub mod audio;
pub mod bitstream;
pub mod constants;
pub mod crc;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod lpc;
pub mod metadata;
pub mod rice;
pub mod stream;
pub mod subframe;

pub use crate::encoder::Encoder;
pub use crate::error::{FlacError, FlacResult};
pub use crate::frame::{ChannelAssignment, Frame, FrameHeader};
pub use crate::metadata::{
    Block, BlockBody, BlockHeader, BlockType, CueSheet, Picture, SeekPoint, SeekTable, StreamInfo,
    VorbisComment,
};
pub use crate::rice::{RiceMethod, RicePartition, RicePartitioning};
pub use crate::audio::DecodedAudio;
pub use crate::stream::Stream;
pub use crate::subframe::{Predictor, Subframe, SubframeHeader};
