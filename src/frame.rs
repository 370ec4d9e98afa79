//! Audio frame parsing and serialization.
//!
//! A frame is a sync-coded header (protected by CRC-8), one subframe per
//! channel, zero padding to the next byte boundary, and a CRC-16 over the
//! whole frame. Stereo frames may store decorrelated channel pairs; the
//! side channel of such a pair needs one extra bit of range.

use std::io::{Read, Write};

use crate::bitstream::{BitReader, BitWriter};
use crate::constants::{
    bits_per_sample_code, block_size_code, sample_rate_code, BITS_PER_SAMPLE_TABLE,
    BLOCK_SIZE_TABLE, FRAME_SYNC_CODE, HeaderSuffix, SAMPLE_RATE_TABLE,
};
use crate::error::{FlacError, FlacResult};
use crate::metadata::StreamInfo;
use crate::subframe::Subframe;

/// Channel layout and inter-channel decorrelation of a frame.
///
/// Codes 0 to 7 store `count - 1` independent channels in SMPTE/ITU-R
/// order; codes 8 to 10 are the decorrelated stereo modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelAssignment {
    /// 1 channel: mono.
    Mono,
    /// 2 channels: left, right.
    Stereo,
    /// 3 channels: left, right, center.
    ThreePointZero,
    /// 4 channels: front left, front right, back left, back right.
    Quad,
    /// 5 channels: front left, front right, center, back left, back right.
    FivePointZero,
    /// 6 channels: front left, front right, center, LFE, back left,
    /// back right.
    FivePointOne,
    /// 7 channels: front left, front right, center, LFE, back center,
    /// side left, side right.
    SixPointOne,
    /// 8 channels: front left, front right, center, LFE, back left,
    /// back right, side left, side right.
    SevenPointOne,
    /// Channel 0 is the left channel, channel 1 the side (difference).
    LeftSide,
    /// Channel 0 is the side (difference), channel 1 the right channel.
    SideRight,
    /// Channel 0 is the mid (average), channel 1 the side (difference).
    MidSide,
}

impl ChannelAssignment {
    /// Parse the 4-bit channel assignment code.
    pub fn from_code(code: u8) -> FlacResult<Self> {
        match code {
            0 => Ok(ChannelAssignment::Mono),
            1 => Ok(ChannelAssignment::Stereo),
            2 => Ok(ChannelAssignment::ThreePointZero),
            3 => Ok(ChannelAssignment::Quad),
            4 => Ok(ChannelAssignment::FivePointZero),
            5 => Ok(ChannelAssignment::FivePointOne),
            6 => Ok(ChannelAssignment::SixPointOne),
            7 => Ok(ChannelAssignment::SevenPointOne),
            0b1000 => Ok(ChannelAssignment::LeftSide),
            0b1001 => Ok(ChannelAssignment::SideRight),
            0b1010 => Ok(ChannelAssignment::MidSide),
            other => Err(FlacError::ReservedChannelAssignment(other)),
        }
    }

    /// The 4-bit channel assignment code.
    pub const fn code(self) -> u8 {
        match self {
            ChannelAssignment::Mono => 0,
            ChannelAssignment::Stereo => 1,
            ChannelAssignment::ThreePointZero => 2,
            ChannelAssignment::Quad => 3,
            ChannelAssignment::FivePointZero => 4,
            ChannelAssignment::FivePointOne => 5,
            ChannelAssignment::SixPointOne => 6,
            ChannelAssignment::SevenPointOne => 7,
            ChannelAssignment::LeftSide => 0b1000,
            ChannelAssignment::SideRight => 0b1001,
            ChannelAssignment::MidSide => 0b1010,
        }
    }

    /// Number of channels (and subframes) in the frame.
    pub const fn count(self) -> usize {
        match self {
            ChannelAssignment::Mono => 1,
            ChannelAssignment::Stereo
            | ChannelAssignment::LeftSide
            | ChannelAssignment::SideRight
            | ChannelAssignment::MidSide => 2,
            ChannelAssignment::ThreePointZero => 3,
            ChannelAssignment::Quad => 4,
            ChannelAssignment::FivePointZero => 5,
            ChannelAssignment::FivePointOne => 6,
            ChannelAssignment::SixPointOne => 7,
            ChannelAssignment::SevenPointOne => 8,
        }
    }

    /// Index of the side channel in a decorrelated pair, if any. The side
    /// channel stores differences and needs one extra bit of range.
    pub const fn side_channel(self) -> Option<usize> {
        match self {
            ChannelAssignment::LeftSide | ChannelAssignment::MidSide => Some(1),
            ChannelAssignment::SideRight => Some(0),
            _ => None,
        }
    }
}

impl core::fmt::Display for ChannelAssignment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ChannelAssignment::LeftSide => write!(f, "left-side stereo"),
            ChannelAssignment::SideRight => write!(f, "side-right stereo"),
            ChannelAssignment::MidSide => write!(f, "mid-side stereo"),
            other => write!(f, "{} independent channel(s)", other.count()),
        }
    }
}

/// Decoded frame header.
///
/// `sample_rate` and `bits_per_sample` keep the coded convention: 0 means
/// "inherit from STREAMINFO". Resolution happens against the stream's
/// [`StreamInfo`] during parsing, and serialization re-derives the same
/// header codes from these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// False for fixed-block-size streams, true for variable.
    pub has_variable_block_size: bool,
    /// Block size of this frame in inter-channel samples.
    pub block_size: u16,
    /// Sample rate in Hz; 0 inherits the STREAMINFO rate.
    pub sample_rate: u32,
    pub channels: ChannelAssignment,
    /// Sample width in bits; 0 inherits the STREAMINFO width.
    pub bits_per_sample: u8,
    /// Frame number for fixed-block-size streams, otherwise the number of
    /// the frame's first sample.
    pub num: u64,
}

impl FrameHeader {
    /// Sample width with STREAMINFO inheritance applied.
    pub fn resolved_bits_per_sample(&self, info: &StreamInfo) -> FlacResult<u32> {
        let bps = if self.bits_per_sample == 0 {
            info.bits_per_sample
        } else {
            self.bits_per_sample
        };
        if bps == 0 {
            return Err(FlacError::MissingBitsPerSample);
        }
        Ok(bps as u32)
    }

    /// Sample rate with STREAMINFO inheritance applied.
    pub fn resolved_sample_rate(&self, info: &StreamInfo) -> u32 {
        if self.sample_rate == 0 {
            info.sample_rate
        } else {
            self.sample_rate
        }
    }

    /// Number of the first sample in the frame.
    pub fn first_sample_number(&self) -> u64 {
        if self.has_variable_block_size {
            self.num
        } else {
            self.num * self.block_size as u64
        }
    }
}

/// A decoded audio frame: the header plus one subframe per channel.
///
/// After [`Frame::parse`] the subframes hold fully correlated samples
/// (left/right restored from any decorrelated pair).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub subframes: Vec<Subframe>,
}

impl Frame {
    /// Parse one frame. Returns `Ok(None)` on a clean end of stream at the
    /// frame boundary.
    pub fn parse<R: Read>(
        reader: &mut BitReader<R>,
        info: &StreamInfo,
    ) -> FlacResult<Option<Frame>> {
        debug_assert!(reader.is_byte_aligned());
        reader.reset_crcs();

        let Some(first_byte) = reader.try_read_u8()? else {
            return Ok(None);
        };
        let second_byte = reader.read_bits(8)? as u8;

        let sync = ((first_byte as u16) << 6) | (second_byte >> 2) as u16;
        if sync != FRAME_SYNC_CODE {
            return Err(FlacError::InvalidSyncCode { found: sync });
        }
        if second_byte & 0b10 != 0 {
            return Err(FlacError::ReservedHeaderBit);
        }
        let has_variable_block_size = second_byte & 1 != 0;

        let block_size_code = reader.read_bits(4)? as u8;
        let sample_rate_code = reader.read_bits(4)? as u8;
        let channel_code = reader.read_bits(4)? as u8;
        let bps_code = reader.read_bits(3)? as u8;
        if reader.read_bit()? {
            return Err(FlacError::ReservedHeaderBit);
        }

        let channels = ChannelAssignment::from_code(channel_code)?;
        let bits_per_sample = match bps_code {
            0b011 | 0b111 => return Err(FlacError::ReservedBitsPerSampleCode),
            code => BITS_PER_SAMPLE_TABLE[code as usize],
        };

        let num = reader.read_utf8_coded()?;

        // Suffix fields follow the coded number, in header field order.
        let block_size = match block_size_code {
            0b0000 => return Err(FlacError::ReservedBlockSizeCode),
            0b0110 => reader.read_bits(8)? as u16 + 1,
            0b0111 => {
                let stored = reader.read_bits(16)?;
                if stored == u16::MAX as u64 {
                    return Err(FlacError::InvalidBlockSize(stored as u32 + 1));
                }
                stored as u16 + 1
            }
            code => BLOCK_SIZE_TABLE[code as usize],
        };

        let sample_rate = match sample_rate_code {
            0b1100 => reader.read_bits(8)? as u32 * 1000,
            0b1101 => reader.read_bits(16)? as u32,
            0b1110 => reader.read_bits(16)? as u32 * 10,
            0b1111 => return Err(FlacError::ReservedSampleRateCode),
            code => SAMPLE_RATE_TABLE[code as usize],
        };

        let computed_crc8 = reader.crc8();
        let stored_crc8 = reader.read_bits(8)? as u8;
        if computed_crc8 != stored_crc8 {
            return Err(FlacError::FrameHeaderCrcMismatch {
                expected: stored_crc8,
                computed: computed_crc8,
            });
        }

        let header = FrameHeader {
            has_variable_block_size,
            block_size,
            sample_rate,
            channels,
            bits_per_sample,
            num,
        };

        let bps = header.resolved_bits_per_sample(info)?;
        let mut subframes = Vec::with_capacity(channels.count());
        for ch in 0..channels.count() {
            let channel_bps = if channels.side_channel() == Some(ch) {
                bps + 1
            } else {
                bps
            };
            subframes.push(Subframe::parse(reader, block_size, channel_bps)?);
        }

        reader.align_to_byte();
        let computed_crc16 = reader.crc16();
        let stored_crc16 = reader.read_bits(16)? as u16;
        if computed_crc16 != stored_crc16 {
            return Err(FlacError::FrameCrcMismatch {
                expected: stored_crc16,
                computed: computed_crc16,
            });
        }

        let mut frame = Frame { header, subframes };
        frame.correlate();
        Ok(Some(frame))
    }

    /// Serialize the frame; the bit-exact inverse of [`Frame::parse`] for
    /// an unmodified decoded frame.
    pub fn write<W: Write>(&self, writer: &mut BitWriter<W>, info: &StreamInfo) -> FlacResult<()> {
        debug_assert!(writer.is_byte_aligned());
        let header = &self.header;
        if self.subframes.len() != header.channels.count() {
            return Err(FlacError::unsupported(format!(
                "frame with {} subframes for a {}-channel assignment",
                self.subframes.len(),
                header.channels.count()
            )));
        }

        writer.reset_crcs();
        writer.write_bits(FRAME_SYNC_CODE as u64, 14)?;
        writer.write_bit(false)?;
        writer.write_bit(header.has_variable_block_size)?;

        let (bs_code, bs_suffix) = block_size_code(header.block_size);
        let (sr_code, sr_suffix) = sample_rate_code(header.sample_rate)
            .ok_or_else(|| {
                FlacError::unsupported(format!("sample rate {} Hz", header.sample_rate))
            })?;
        let bps_code = bits_per_sample_code(header.bits_per_sample).ok_or_else(|| {
            FlacError::unsupported(format!("{}-bit samples", header.bits_per_sample))
        })?;

        writer.write_bits(bs_code as u64, 4)?;
        writer.write_bits(sr_code as u64, 4)?;
        writer.write_bits(header.channels.code() as u64, 4)?;
        writer.write_bits(bps_code as u64, 3)?;
        writer.write_bit(false)?;

        writer.write_utf8_coded(header.num)?;
        write_suffix(writer, bs_suffix)?;
        write_suffix(writer, sr_suffix)?;

        let crc8 = writer.crc8();
        writer.write_bits(crc8 as u64, 8)?;

        // Subframes encode the decorrelated buffers; work on copies so the
        // frame's samples stay correlated for the caller.
        let bps = header.resolved_bits_per_sample(info)?;
        let decorrelated = self.decorrelated_subframes();
        for (ch, subframe) in decorrelated.iter().enumerate() {
            let channel_bps = if header.channels.side_channel() == Some(ch) {
                bps + 1
            } else {
                bps
            };
            subframe.write(writer, header.block_size, channel_bps)?;
        }

        writer.align_to_byte()?;
        let crc16 = writer.crc16();
        writer.write_bits(crc16 as u64, 16)?;
        Ok(())
    }

    /// Number of the first sample in the frame.
    pub fn first_sample_number(&self) -> u64 {
        self.header.first_sample_number()
    }

    /// Feed the frame's samples to a running MD5 in the canonical form:
    /// channel-interleaved, little-endian, `ceil(bps / 8)` bytes each.
    pub fn hash(&self, context: &mut md5::Context, bps: u32) {
        let width = ((bps + 7) / 8) as usize;
        let block_size = self.header.block_size as usize;
        let mut buf = Vec::with_capacity(block_size * self.subframes.len() * width);
        for i in 0..block_size {
            for subframe in &self.subframes {
                let bytes = subframe.samples[i].to_le_bytes();
                buf.extend_from_slice(&bytes[..width]);
            }
        }
        context.consume(&buf);
    }

    /// Undo inter-channel decorrelation in place after subframe decoding.
    fn correlate(&mut self) {
        match self.header.channels {
            ChannelAssignment::LeftSide => {
                let (left, side) = stereo_pair(&mut self.subframes);
                // right = left - side, stored into channel 1.
                for (l, s) in left.iter().zip(side.iter_mut()) {
                    *s = l.wrapping_sub(*s);
                }
            }
            ChannelAssignment::SideRight => {
                let (side, right) = stereo_pair(&mut self.subframes);
                // left = right + side, stored into channel 0.
                for (s, r) in side.iter_mut().zip(right.iter()) {
                    *s = s.wrapping_add(*r);
                }
            }
            ChannelAssignment::MidSide => {
                let (mid, side) = stereo_pair(&mut self.subframes);
                for (m, s) in mid.iter_mut().zip(side.iter_mut()) {
                    // The encoder halved left+right, discarding the low
                    // bit; the side's parity restores it.
                    let sum = (*m << 1) | (*s & 1);
                    *m = sum.wrapping_add(*s) >> 1;
                    *s = sum.wrapping_sub(*s) >> 1;
                }
            }
            _ => {}
        }
    }

    /// Produce the decorrelated per-channel buffers the subframes encode.
    /// The frame's own samples are left untouched.
    fn decorrelated_subframes(&self) -> Vec<Subframe> {
        let mut subframes = self.subframes.clone();
        match self.header.channels {
            ChannelAssignment::LeftSide => {
                let (left, side) = stereo_pair(&mut subframes);
                for (l, s) in left.iter().zip(side.iter_mut()) {
                    *s = l.wrapping_sub(*s);
                }
            }
            ChannelAssignment::SideRight => {
                let (side, right) = stereo_pair(&mut subframes);
                for (s, r) in side.iter_mut().zip(right.iter()) {
                    *s = s.wrapping_sub(*r);
                }
            }
            ChannelAssignment::MidSide => {
                let (mid, side) = stereo_pair(&mut subframes);
                for (m, s) in mid.iter_mut().zip(side.iter_mut()) {
                    let (left, right) = (*m, *s);
                    // Arithmetic shift, not division: the parity of the
                    // discarded bit must land in the side channel.
                    *m = left.wrapping_add(right) >> 1;
                    *s = left.wrapping_sub(right);
                }
            }
            _ => {}
        }
        subframes
    }
}

/// Mutable views of the first two subframes' sample buffers.
fn stereo_pair(subframes: &mut [Subframe]) -> (&mut Vec<i32>, &mut Vec<i32>) {
    let (a, b) = subframes.split_at_mut(1);
    (&mut a[0].samples, &mut b[0].samples)
}

fn write_suffix<W: Write>(writer: &mut BitWriter<W>, suffix: HeaderSuffix) -> FlacResult<()> {
    match suffix {
        HeaderSuffix::None => Ok(()),
        HeaderSuffix::Bits8(value) => writer.write_bits(value as u64, 8),
        HeaderSuffix::Bits16(value) => writer.write_bits(value as u64, 16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subframe::Predictor;
    use std::io::Cursor;

    fn stream_info() -> StreamInfo {
        StreamInfo {
            block_size_min: 16,
            block_size_max: 65535,
            frame_size_min: 0,
            frame_size_max: 0,
            sample_rate: 44100,
            n_channels: 2,
            bits_per_sample: 16,
            n_samples: 0,
            md5_sum: [0; 16],
        }
    }

    fn round_trip(frame: &Frame, info: &StreamInfo) -> (Frame, Vec<u8>) {
        let mut writer = BitWriter::new(Cursor::new(Vec::new()));
        frame.write(&mut writer, info).expect("encode failed");
        let bytes = writer.into_inner().expect("finish failed").into_inner();

        let mut reader = BitReader::new(Cursor::new(bytes.clone()));
        let decoded = Frame::parse(&mut reader, info)
            .expect("decode failed")
            .expect("frame expected");
        (decoded, bytes)
    }

    fn stereo_frame(channels: ChannelAssignment, left: Vec<i32>, right: Vec<i32>) -> Frame {
        let block_size = left.len() as u16;
        Frame {
            header: FrameHeader {
                has_variable_block_size: false,
                block_size,
                sample_rate: 0,
                channels,
                bits_per_sample: 0,
                num: 0,
            },
            subframes: vec![Subframe::verbatim(left), Subframe::verbatim(right)],
        }
    }

    #[test]
    fn channel_assignment_code_space() {
        for code in 0..=0b1010u8 {
            let assignment = ChannelAssignment::from_code(code).unwrap();
            assert_eq!(assignment.code(), code);
        }
        assert_eq!(ChannelAssignment::Mono.count(), 1);
        assert_eq!(ChannelAssignment::SevenPointOne.count(), 8);
        assert_eq!(ChannelAssignment::MidSide.count(), 2);

        for code in 0b1011..=0b1111u8 {
            assert!(matches!(
                ChannelAssignment::from_code(code),
                Err(FlacError::ReservedChannelAssignment(_))
            ));
        }
    }

    #[test]
    fn side_channel_index_per_assignment() {
        assert_eq!(ChannelAssignment::LeftSide.side_channel(), Some(1));
        assert_eq!(ChannelAssignment::SideRight.side_channel(), Some(0));
        assert_eq!(ChannelAssignment::MidSide.side_channel(), Some(1));
        assert_eq!(ChannelAssignment::Stereo.side_channel(), None);
    }

    #[test]
    fn first_sample_number_depends_on_blocking_strategy() {
        let mut header = FrameHeader {
            has_variable_block_size: false,
            block_size: 4096,
            sample_rate: 0,
            channels: ChannelAssignment::Mono,
            bits_per_sample: 0,
            num: 3,
        };
        assert_eq!(header.first_sample_number(), 3 * 4096);
        header.has_variable_block_size = true;
        assert_eq!(header.first_sample_number(), 3);
    }

    #[test]
    fn mono_frame_round_trip() {
        let info = stream_info();
        let samples: Vec<i32> = (0..192).map(|i| ((i * 89) % 4001) - 2000).collect();
        let frame = Frame {
            header: FrameHeader {
                has_variable_block_size: false,
                block_size: 192,
                sample_rate: 44100,
                channels: ChannelAssignment::Mono,
                bits_per_sample: 16,
                num: 7,
            },
            subframes: vec![Subframe::verbatim(samples)],
        };

        let (decoded, _) = round_trip(&frame, &info);
        assert_eq!(decoded, frame);
    }

    #[test]
    fn stereo_decorrelation_round_trips_all_modes() {
        let info = stream_info();
        let left: Vec<i32> = (0..64).map(|i| ((i * 131) % 9173) - 4500).collect();
        let right: Vec<i32> = (0..64).map(|i| ((i * 67) % 8009) - 4000).collect();

        for channels in [
            ChannelAssignment::Stereo,
            ChannelAssignment::LeftSide,
            ChannelAssignment::SideRight,
            ChannelAssignment::MidSide,
        ] {
            let frame = stereo_frame(channels, left.clone(), right.clone());
            let (decoded, _) = round_trip(&frame, &info);
            assert_eq!(decoded.subframes[0].samples, left, "{channels:?}");
            assert_eq!(decoded.subframes[1].samples, right, "{channels:?}");
        }
    }

    #[test]
    fn mid_side_preserves_odd_sums() {
        // left + right odd exercises the discarded low bit.
        let info = stream_info();
        let left = vec![3, -3, 1, 0, i16::MAX as i32, -7, 2, 9];
        let right = vec![0, -2, 2, -1, 2, -8, 1, 4];
        let frame = stereo_frame(ChannelAssignment::MidSide, left.clone(), right.clone());
        let (decoded, _) = round_trip(&frame, &info);
        assert_eq!(decoded.subframes[0].samples, left);
        assert_eq!(decoded.subframes[1].samples, right);
    }

    #[test]
    fn write_leaves_the_frame_untouched() {
        let info = stream_info();
        let left = vec![10, 20, 30, 40];
        let right = vec![1, 2, 3, 4];
        let frame = stereo_frame(ChannelAssignment::MidSide, left.clone(), right.clone());

        let mut writer = BitWriter::new(Cursor::new(Vec::new()));
        frame.write(&mut writer, &info).unwrap();
        assert_eq!(frame.subframes[0].samples, left);
        assert_eq!(frame.subframes[1].samples, right);
    }

    #[test]
    fn inherited_fields_use_zero_codes() {
        let info = stream_info();
        let frame = stereo_frame(ChannelAssignment::Stereo, vec![0; 16], vec![0; 16]);
        let (decoded, bytes) = round_trip(&frame, &info);

        // Inherit codes survive the round trip rather than being resolved.
        assert_eq!(decoded.header.sample_rate, 0);
        assert_eq!(decoded.header.bits_per_sample, 0);
        assert_eq!(decoded.header.resolved_sample_rate(&info), 44100);
        assert_eq!(decoded.header.resolved_bits_per_sample(&info).unwrap(), 16);

        // Byte 2: block size code 0110 (16 -> 8-bit suffix), rate code 0000.
        assert_eq!(bytes[2], 0b0110_0000);
    }

    #[test]
    fn corrupted_header_fails_crc8() {
        let info = stream_info();
        let frame = stereo_frame(ChannelAssignment::Stereo, vec![1; 16], vec![2; 16]);
        let (_, mut bytes) = round_trip(&frame, &info);

        // Flip a bit in the coded number (byte 4, after sync and codes).
        bytes[4] ^= 0x01;
        let mut reader = BitReader::new(Cursor::new(bytes));
        assert!(matches!(
            Frame::parse(&mut reader, &info),
            Err(FlacError::FrameHeaderCrcMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_body_fails_crc16() {
        let info = stream_info();
        let frame = stereo_frame(ChannelAssignment::Stereo, vec![1; 16], vec![2; 16]);
        let (_, mut bytes) = round_trip(&frame, &info);

        let len = bytes.len();
        bytes[len - 3] ^= 0x10; // inside the last subframe, before the CRC
        let mut reader = BitReader::new(Cursor::new(bytes));
        assert!(matches!(
            Frame::parse(&mut reader, &info),
            Err(FlacError::FrameCrcMismatch { .. })
        ));
    }

    #[test]
    fn garbage_sync_is_rejected() {
        let info = stream_info();
        let mut reader = BitReader::new(Cursor::new(vec![0x12u8, 0x34, 0, 0]));
        assert!(matches!(
            Frame::parse(&mut reader, &info),
            Err(FlacError::InvalidSyncCode { .. })
        ));
    }

    #[test]
    fn clean_eof_yields_none() {
        let info = stream_info();
        let mut reader = BitReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(Frame::parse(&mut reader, &info).unwrap().is_none());
    }

    #[test]
    fn surround_frames_round_trip() {
        // One subframe per channel for every independent assignment.
        let info = stream_info();
        for channels in [
            ChannelAssignment::Mono,
            ChannelAssignment::ThreePointZero,
            ChannelAssignment::Quad,
            ChannelAssignment::FivePointZero,
            ChannelAssignment::FivePointOne,
            ChannelAssignment::SixPointOne,
            ChannelAssignment::SevenPointOne,
        ] {
            let subframes: Vec<Subframe> = (0..channels.count())
                .map(|ch| {
                    let samples: Vec<i32> =
                        (0..32).map(|i| ((i * 13 + ch as i32 * 101) % 1009) - 500).collect();
                    Subframe::verbatim(samples)
                })
                .collect();
            let frame = Frame {
                header: FrameHeader {
                    has_variable_block_size: false,
                    block_size: 32,
                    sample_rate: 0,
                    channels,
                    bits_per_sample: 0,
                    num: 1,
                },
                subframes,
            };
            let (decoded, _) = round_trip(&frame, &info);
            assert_eq!(decoded, frame, "{channels:?}");
        }
    }

    #[test]
    fn block_size_table_sweep_round_trips() {
        // Every directly coded block size plus both suffix forms.
        let info = stream_info();
        for block_size in [
            192u16, 576, 1152, 2304, 4608, 256, 512, 1024, 2048, 4096, 16, 254, 725, 65535,
        ] {
            let frame = Frame {
                header: FrameHeader {
                    has_variable_block_size: false,
                    block_size,
                    sample_rate: 0,
                    channels: ChannelAssignment::Mono,
                    bits_per_sample: 0,
                    num: 0,
                },
                subframes: vec![Subframe::constant(-5, block_size)],
            };
            let (decoded, _) = round_trip(&frame, &info);
            assert_eq!(decoded.header.block_size, block_size);
        }
    }

    #[test]
    fn sample_rate_table_sweep_round_trips() {
        let info = stream_info();
        for sample_rate in [
            0u32, 88200, 176400, 192000, 8000, 16000, 22050, 24000, 32000, 44100, 48000, 96000,
            39000, 35467, 384000, 655350,
        ] {
            let frame = Frame {
                header: FrameHeader {
                    has_variable_block_size: false,
                    block_size: 16,
                    sample_rate,
                    channels: ChannelAssignment::Mono,
                    bits_per_sample: 0,
                    num: 0,
                },
                subframes: vec![Subframe::constant(1, 16)],
            };
            let (decoded, _) = round_trip(&frame, &info);
            assert_eq!(decoded.header.sample_rate, sample_rate);
        }
    }

    #[test]
    fn fir_order_32_round_trip() {
        use crate::rice::{RiceMethod, RicePartition, RicePartitioning};

        let info = stream_info();
        let samples: Vec<i32> = (0..64).map(|i| ((i * 7919) % 32749) - 16374).collect();
        let coeffs: Vec<i32> = (0..32).map(|i| ((i * 37) % 255) - 127).collect();
        let frame = Frame {
            header: FrameHeader {
                has_variable_block_size: false,
                block_size: 64,
                sample_rate: 0,
                channels: ChannelAssignment::Mono,
                bits_per_sample: 0,
                num: 0,
            },
            subframes: vec![Subframe::fir(
                coeffs,
                8,
                10,
                RiceMethod::Rice2,
                RicePartitioning {
                    part_order: 0,
                    partitions: vec![RicePartition { param: 18, escaped_bps: 0 }],
                },
                samples,
            )],
        };

        let (decoded, _) = round_trip(&frame, &info);
        assert_eq!(decoded, frame);
    }

    #[test]
    fn channel_assignment_display() {
        assert_eq!(ChannelAssignment::Mono.to_string(), "1 independent channel(s)");
        assert_eq!(ChannelAssignment::MidSide.to_string(), "mid-side stereo");
    }

    #[test]
    fn md5_interleaving_is_canonical() {
        let frame = stereo_frame(
            ChannelAssignment::Stereo,
            vec![0x0102, -2],
            vec![0x0304, 5],
        );
        let mut context = md5::Context::new();
        frame.hash(&mut context, 16);
        let digest = context.compute();

        // Interleaved little-endian 16-bit: L0 R0 L1 R1.
        let reference: &[u8] = &[0x02, 0x01, 0x04, 0x03, 0xFE, 0xFF, 0x05, 0x00];
        assert_eq!(digest, md5::compute(reference));
    }

    #[test]
    fn fixed_subframe_in_frame_round_trip() {
        use crate::rice::{RiceMethod, RicePartition, RicePartitioning};

        let info = stream_info();
        // Quadratic signal: order-2 residuals are constant.
        let samples: Vec<i32> = (0..32).map(|i| i * i).collect();
        let frame = Frame {
            header: FrameHeader {
                has_variable_block_size: false,
                block_size: 32,
                sample_rate: 0,
                channels: ChannelAssignment::Mono,
                bits_per_sample: 0,
                num: 0,
            },
            subframes: vec![Subframe::fixed(
                2,
                RiceMethod::Rice,
                RicePartitioning {
                    part_order: 0,
                    partitions: vec![RicePartition { param: 1, escaped_bps: 0 }],
                },
                samples,
            )],
        };

        let (decoded, _) = round_trip(&frame, &info);
        assert_eq!(decoded, frame);
        assert_eq!(decoded.subframes[0].predictor, Predictor::Fixed);
    }
}
