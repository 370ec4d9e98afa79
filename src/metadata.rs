//! Metadata block parsing and serialization.
//!
//! A FLAC stream opens with the `fLaC` signature followed by one or more
//! metadata blocks; the first must be STREAMINFO and exactly one block
//! carries the `is_last` flag. Every block is a 4-byte header (last flag,
//! 7-bit type, 24-bit body length) followed by a typed body. All bodies
//! parse from their raw bytes and serialize back byte-identically.

use core::fmt::{Display, Formatter, Result as FmtResult};
use std::io::{Read, Write};

use log::debug;

use crate::bitstream::{BitReader, BitWriter};
use crate::constants::{MAX_BLOCK_LEN, STREAMINFO_LEN};
use crate::error::{FlacError, FlacResult};

/// Sample count of a CD frame; CD track offsets must be multiples of it.
const CD_FRAME_SAMPLES: u64 = 588;

/// Metadata block body types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    /// Types 7 to 126, reserved by the format.
    Reserved(u8),
}

impl BlockType {
    /// Parse a block type from its 7-bit code. Code 127 is forbidden: it
    /// makes the block header byte match the frame sync pattern.
    pub fn from_code(code: u8) -> FlacResult<Self> {
        match code {
            0 => Ok(BlockType::StreamInfo),
            1 => Ok(BlockType::Padding),
            2 => Ok(BlockType::Application),
            3 => Ok(BlockType::SeekTable),
            4 => Ok(BlockType::VorbisComment),
            5 => Ok(BlockType::CueSheet),
            6 => Ok(BlockType::Picture),
            127 => Err(FlacError::InvalidBlockType(127)),
            n => Ok(BlockType::Reserved(n)),
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            BlockType::StreamInfo => 0,
            BlockType::Padding => 1,
            BlockType::Application => 2,
            BlockType::SeekTable => 3,
            BlockType::VorbisComment => 4,
            BlockType::CueSheet => 5,
            BlockType::Picture => 6,
            BlockType::Reserved(n) => n,
        }
    }
}

impl Display for BlockType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BlockType::StreamInfo => write!(f, "STREAMINFO"),
            BlockType::Padding => write!(f, "PADDING"),
            BlockType::Application => write!(f, "APPLICATION"),
            BlockType::SeekTable => write!(f, "SEEKTABLE"),
            BlockType::VorbisComment => write!(f, "VORBIS_COMMENT"),
            BlockType::CueSheet => write!(f, "CUESHEET"),
            BlockType::Picture => write!(f, "PICTURE"),
            BlockType::Reserved(n) => write!(f, "RESERVED({n})"),
        }
    }
}

/// Metadata block header: last flag, type, and body length in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub is_last: bool,
    pub block_type: BlockType,
    pub length: u32,
}

/// A parsed metadata block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

/// Typed metadata block bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockBody {
    StreamInfo(StreamInfo),
    /// Zero-filled padding; only the byte count is kept.
    Padding(u32),
    Application(Application),
    SeekTable(SeekTable),
    VorbisComment(VorbisComment),
    CueSheet(CueSheet),
    Picture(Picture),
    /// Reserved types carry their body opaquely so they re-serialize
    /// byte-identically.
    Reserved { block_type: u8, data: Vec<u8> },
}

impl Block {
    /// Read one metadata block.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly before the header's
    /// first byte, the one boundary where plain end-of-stream is legal.
    pub fn read<R: Read>(reader: &mut BitReader<R>) -> FlacResult<Option<Block>> {
        let Some(header) = Block::read_header(reader)? else {
            return Ok(None);
        };

        let data = reader.read_bytes(header.length as usize)?;
        let body = BlockBody::parse(header.block_type, &data)?;

        Ok(Some(Block { header, body }))
    }

    /// Read just the 4-byte block header; `Ok(None)` on a clean end of
    /// stream before its first byte.
    pub fn read_header<R: Read>(reader: &mut BitReader<R>) -> FlacResult<Option<BlockHeader>> {
        let Some(first) = reader.try_read_u8()? else {
            return Ok(None);
        };

        let is_last = first & 0x80 != 0;
        let block_type = BlockType::from_code(first & 0x7F)?;
        let length = reader.read_bits(24)? as u32;

        debug!("metadata block {block_type}: {length} bytes, last={is_last}");

        Ok(Some(BlockHeader {
            is_last,
            block_type,
            length,
        }))
    }

    /// Consume a block body without interpreting it.
    pub fn skip_body<R: Read>(reader: &mut BitReader<R>, header: &BlockHeader) -> FlacResult<()> {
        reader.skip_bytes(header.length as u64)
    }

    /// Serialize the block with an explicit `is_last` flag.
    pub fn write<W: Write>(&self, writer: &mut BitWriter<W>, is_last: bool) -> FlacResult<()> {
        let data = self.body.to_bytes();
        if data.len() as u64 > MAX_BLOCK_LEN as u64 {
            return Err(FlacError::unsupported(format!(
                "metadata body of {} bytes exceeds the 24-bit length field",
                data.len()
            )));
        }

        let type_byte = self.body.block_type().code() | if is_last { 0x80 } else { 0 };
        writer.write_bits(type_byte as u64, 8)?;
        writer.write_bits(data.len() as u64, 24)?;
        writer.write_bytes(&data)?;
        Ok(())
    }
}

impl BlockBody {
    /// Parse a block body from its raw bytes.
    pub fn parse(block_type: BlockType, data: &[u8]) -> FlacResult<Self> {
        match block_type {
            BlockType::StreamInfo => Ok(BlockBody::StreamInfo(StreamInfo::parse(data)?)),
            BlockType::Padding => {
                if data.iter().any(|&b| b != 0) {
                    return Err(FlacError::InvalidPadding);
                }
                Ok(BlockBody::Padding(data.len() as u32))
            }
            BlockType::Application => Ok(BlockBody::Application(Application::parse(data)?)),
            BlockType::SeekTable => Ok(BlockBody::SeekTable(SeekTable::parse(data)?)),
            BlockType::VorbisComment => Ok(BlockBody::VorbisComment(VorbisComment::parse(data)?)),
            BlockType::CueSheet => Ok(BlockBody::CueSheet(CueSheet::parse(data)?)),
            BlockType::Picture => Ok(BlockBody::Picture(Picture::parse(data)?)),
            BlockType::Reserved(n) => Ok(BlockBody::Reserved {
                block_type: n,
                data: data.to_vec(),
            }),
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            BlockBody::StreamInfo(_) => BlockType::StreamInfo,
            BlockBody::Padding(_) => BlockType::Padding,
            BlockBody::Application(_) => BlockType::Application,
            BlockBody::SeekTable(_) => BlockType::SeekTable,
            BlockBody::VorbisComment(_) => BlockType::VorbisComment,
            BlockBody::CueSheet(_) => BlockType::CueSheet,
            BlockBody::Picture(_) => BlockType::Picture,
            BlockBody::Reserved { block_type, .. } => BlockType::Reserved(*block_type),
        }
    }

    /// Serialize the body to its raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            BlockBody::StreamInfo(info) => info.to_bytes().to_vec(),
            BlockBody::Padding(len) => vec![0u8; *len as usize],
            BlockBody::Application(app) => app.to_bytes(),
            BlockBody::SeekTable(table) => table.to_bytes(),
            BlockBody::VorbisComment(comment) => comment.to_bytes(),
            BlockBody::CueSheet(cue) => cue.to_bytes(),
            BlockBody::Picture(picture) => picture.to_bytes(),
            BlockBody::Reserved { data, .. } => data.clone(),
        }
    }
}

/// Byte cursor over a block body with bounds-checked primitive reads.
struct Body<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Body<'a> {
    fn new(data: &'a [u8]) -> Self {
        Body { data, pos: 0 }
    }

    fn take(&mut self, count: usize) -> FlacResult<&'a [u8]> {
        let end = self.pos.checked_add(count).ok_or(FlacError::TruncatedMetadata)?;
        if end > self.data.len() {
            return Err(FlacError::TruncatedMetadata);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> FlacResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn be_u64(&mut self) -> FlacResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    fn be_u32(&mut self) -> FlacResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn be_u16(&mut self) -> FlacResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn le_u32(&mut self) -> FlacResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn finish(&self) -> FlacResult<()> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(FlacError::TruncatedMetadata)
        }
    }
}

/// STREAMINFO: the mandatory first metadata block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// Minimum block size in samples used in the stream (16 to 65535).
    pub block_size_min: u16,
    /// Maximum block size in samples used in the stream (16 to 65535).
    pub block_size_max: u16,
    /// Minimum frame size in bytes; 0 means unknown.
    pub frame_size_min: u32,
    /// Maximum frame size in bytes; 0 means unknown.
    pub frame_size_max: u32,
    /// Sample rate in Hz (1 to 655350).
    pub sample_rate: u32,
    /// Channel count (1 to 8).
    pub n_channels: u8,
    /// Sample width in bits (4 to 32).
    pub bits_per_sample: u8,
    /// Total inter-channel samples; 0 means unknown.
    pub n_samples: u64,
    /// MD5 digest of the unencoded audio; all zero when not computed.
    pub md5_sum: [u8; 16],
}

impl StreamInfo {
    /// Parse the 34-byte STREAMINFO body.
    pub fn parse(data: &[u8]) -> FlacResult<Self> {
        if data.len() != STREAMINFO_LEN {
            return Err(FlacError::InvalidStreamInfoLength(data.len()));
        }

        let mut body = Body::new(data);
        let block_size_min = body.be_u16()?;
        let block_size_max = body.be_u16()?;

        let fs = body.take(3)?;
        let frame_size_min = u32::from_be_bytes([0, fs[0], fs[1], fs[2]]);
        let fs = body.take(3)?;
        let frame_size_max = u32::from_be_bytes([0, fs[0], fs[1], fs[2]]);

        // 20 bits sample rate, 3 bits channels-1, 5 bits bps-1, 36 bits
        // total samples, packed across 8 bytes.
        let packed = body.be_u64()?;
        let sample_rate = (packed >> 44) as u32;
        let n_channels = ((packed >> 41) & 0x7) as u8 + 1;
        let bits_per_sample = ((packed >> 36) & 0x1F) as u8 + 1;
        let n_samples = packed & 0xF_FFFF_FFFF;

        let mut md5_sum = [0u8; 16];
        md5_sum.copy_from_slice(body.take(16)?);
        body.finish()?;

        Ok(StreamInfo {
            block_size_min,
            block_size_max,
            frame_size_min,
            frame_size_max,
            sample_rate,
            n_channels,
            bits_per_sample,
            n_samples,
            md5_sum,
        })
    }

    /// Serialize to the 34-byte body.
    pub fn to_bytes(&self) -> [u8; STREAMINFO_LEN] {
        let mut bytes = [0u8; STREAMINFO_LEN];
        bytes[0..2].copy_from_slice(&self.block_size_min.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.block_size_max.to_be_bytes());
        bytes[4..7].copy_from_slice(&self.frame_size_min.to_be_bytes()[1..]);
        bytes[7..10].copy_from_slice(&self.frame_size_max.to_be_bytes()[1..]);

        let packed: u64 = ((self.sample_rate as u64) << 44)
            | (((self.n_channels - 1) as u64 & 0x7) << 41)
            | (((self.bits_per_sample - 1) as u64 & 0x1F) << 36)
            | (self.n_samples & 0xF_FFFF_FFFF);
        bytes[10..18].copy_from_slice(&packed.to_be_bytes());
        bytes[18..34].copy_from_slice(&self.md5_sum);
        bytes
    }

    /// Whether the stream declares an MD5 digest (any non-zero byte).
    pub fn has_md5(&self) -> bool {
        self.md5_sum.iter().any(|&b| b != 0)
    }
}

impl Display for StreamInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "STREAMINFO:")?;
        writeln!(f, "  block size: {}-{} samples", self.block_size_min, self.block_size_max)?;
        writeln!(f, "  frame size: {}-{} bytes", self.frame_size_min, self.frame_size_max)?;
        writeln!(f, "  sample rate: {} Hz", self.sample_rate)?;
        writeln!(f, "  channels: {}", self.n_channels)?;
        writeln!(f, "  bits per sample: {}", self.bits_per_sample)?;
        writeln!(f, "  total samples: {}", self.n_samples)?;
        write!(f, "  md5: ")?;
        for b in &self.md5_sum {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// APPLICATION: registered third-party data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    /// Registered application ID.
    pub id: u32,
    pub data: Vec<u8>,
}

impl Application {
    pub fn parse(data: &[u8]) -> FlacResult<Self> {
        if data.len() < 4 {
            return Err(FlacError::TruncatedApplication);
        }
        let mut body = Body::new(data);
        let id = body.be_u32()?;
        Ok(Application {
            id,
            data: data[4..].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.data.len());
        bytes.extend_from_slice(&self.id.to_be_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

/// One entry of a SEEKTABLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    /// First sample number of the target frame, or
    /// [`SeekPoint::PLACEHOLDER`] for an unused slot.
    pub sample_num: u64,
    /// Byte offset of the target frame header, measured from the first
    /// byte of the first frame header.
    pub offset: u64,
    /// Number of samples in the target frame.
    pub n_samples: u16,
}

impl SeekPoint {
    /// Serialized size of one seek point.
    pub const SIZE: usize = 18;

    /// Sample number marking an unused slot.
    pub const PLACEHOLDER: u64 = u64::MAX;

    pub const fn is_placeholder(&self) -> bool {
        self.sample_num == Self::PLACEHOLDER
    }
}

/// SEEKTABLE: pre-computed frame positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekTable {
    pub points: Vec<SeekPoint>,
}

impl SeekTable {
    pub fn parse(data: &[u8]) -> FlacResult<Self> {
        if data.len() % SeekPoint::SIZE != 0 {
            return Err(FlacError::InvalidSeekTableLength(data.len()));
        }

        let mut body = Body::new(data);
        let mut points = Vec::with_capacity(data.len() / SeekPoint::SIZE);
        let mut prev: Option<u64> = None;

        while body.pos < data.len() {
            let point = SeekPoint {
                sample_num: body.be_u64()?,
                offset: body.be_u64()?,
                n_samples: body.be_u16()?,
            };
            if !point.is_placeholder() {
                if let Some(prev) = prev {
                    if point.sample_num <= prev {
                        return Err(FlacError::SeekPointNotAscending {
                            sample: point.sample_num,
                            prev,
                        });
                    }
                }
                prev = Some(point.sample_num);
            }
            points.push(point);
        }

        Ok(SeekTable { points })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.points.len() * SeekPoint::SIZE);
        for point in &self.points {
            bytes.extend_from_slice(&point.sample_num.to_be_bytes());
            bytes.extend_from_slice(&point.offset.to_be_bytes());
            bytes.extend_from_slice(&point.n_samples.to_be_bytes());
        }
        bytes
    }
}

/// VORBIS_COMMENT: the vendor string and ordered name=value tags.
///
/// Tag order is preserved so a parsed block re-serializes byte-identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VorbisComment {
    pub vendor: String,
    pub tags: Vec<(String, String)>,
}

impl VorbisComment {
    pub fn parse(data: &[u8]) -> FlacResult<Self> {
        let mut body = Body::new(data);

        let vendor_len = body.le_u32()? as usize;
        let vendor = utf8(body.take(vendor_len)?, "vendor string")?;

        let n_tags = body.le_u32()? as usize;
        let mut tags = Vec::with_capacity(n_tags.min(1024));
        for _ in 0..n_tags {
            let len = body.le_u32()? as usize;
            let vector = utf8(body.take(len)?, "comment vector")?;
            match vector.split_once('=') {
                Some((name, value)) => tags.push((name.to_string(), value.to_string())),
                None => {
                    return Err(FlacError::CommentMissingSeparator { vector });
                }
            }
        }
        body.finish()?;

        Ok(VorbisComment { vendor, tags })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.vendor.len() as u32).to_le_bytes());
        bytes.extend_from_slice(self.vendor.as_bytes());
        bytes.extend_from_slice(&(self.tags.len() as u32).to_le_bytes());
        for (name, value) in &self.tags {
            let len = name.len() + 1 + value.len();
            bytes.extend_from_slice(&(len as u32).to_le_bytes());
            bytes.extend_from_slice(name.as_bytes());
            bytes.push(b'=');
            bytes.extend_from_slice(value.as_bytes());
        }
        bytes
    }

    /// First value stored under `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// CUESHEET: table of contents of the source medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueSheet {
    /// Media catalog number, up to 128 ASCII characters.
    pub mcn: String,
    /// Lead-in length in samples; meaningful only for CDs.
    pub n_lead_in_samples: u64,
    /// Whether the cue sheet describes a Compact Disc.
    pub is_compact_disc: bool,
    pub tracks: Vec<CueSheetTrack>,
}

/// One track of a cue sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueSheetTrack {
    /// Track offset in samples from the start of the audio.
    pub offset: u64,
    /// Track number: 1-99 (CD) plus the lead-out track, never 0.
    pub num: u8,
    /// International Standard Recording Code, 12 characters or empty.
    pub isrc: String,
    /// Whether the track holds audio; the stored track-type bit is 0 for
    /// audio.
    pub is_audio: bool,
    pub has_pre_emphasis: bool,
    pub indices: Vec<CueSheetTrackIndex>,
}

/// An index point within a cue sheet track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueSheetTrackIndex {
    /// Offset in samples relative to the track offset.
    pub offset: u64,
    pub num: u8,
}

impl CueSheet {
    /// Lead-out track number on a CD cue sheet.
    pub const CD_LEAD_OUT: u8 = 170;
    /// Lead-out track number on a non-CD cue sheet.
    pub const LEAD_OUT: u8 = 255;

    pub fn parse(data: &[u8]) -> FlacResult<Self> {
        let mut body = Body::new(data);

        let mcn = zero_padded_string(body.take(128)?, "media catalog number")?;
        let n_lead_in_samples = body.be_u64()?;

        let flags = body.u8()?;
        let is_compact_disc = flags & 0x80 != 0;
        if flags & 0x7F != 0 {
            return Err(FlacError::cue_sheet("reserved bits after the CD flag"));
        }
        reserved_zero(body.take(258)?)?;

        let n_tracks = body.u8()?;
        if n_tracks == 0 {
            return Err(FlacError::cue_sheet("cue sheet without a lead-out track"));
        }
        if is_compact_disc && n_tracks > 100 {
            return Err(FlacError::cue_sheet(format!(
                "{n_tracks} tracks exceed the CD limit of 100"
            )));
        }

        let mut tracks = Vec::with_capacity(n_tracks as usize);
        for i in 0..n_tracks {
            let is_lead_out = i + 1 == n_tracks;
            tracks.push(CueSheetTrack::parse(&mut body, is_compact_disc, is_lead_out)?);
        }
        body.finish()?;

        let mut seen = [false; 256];
        for track in &tracks {
            if seen[track.num as usize] {
                return Err(FlacError::cue_sheet(format!(
                    "duplicate track number {}",
                    track.num
                )));
            }
            seen[track.num as usize] = true;
        }

        Ok(CueSheet {
            mcn,
            n_lead_in_samples,
            is_compact_disc,
            tracks,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        let mut mcn = [0u8; 128];
        mcn[..self.mcn.len()].copy_from_slice(self.mcn.as_bytes());
        bytes.extend_from_slice(&mcn);

        bytes.extend_from_slice(&self.n_lead_in_samples.to_be_bytes());
        bytes.push(if self.is_compact_disc { 0x80 } else { 0 });
        bytes.extend_from_slice(&[0u8; 258]);

        bytes.push(self.tracks.len() as u8);
        for track in &self.tracks {
            track.serialize(&mut bytes);
        }
        bytes
    }
}

impl CueSheetTrack {
    fn parse(body: &mut Body<'_>, is_cd: bool, is_lead_out: bool) -> FlacResult<Self> {
        let offset = body.be_u64()?;
        let num = body.u8()?;

        if num == 0 {
            return Err(FlacError::cue_sheet("track number 0 is forbidden"));
        }
        match (is_cd, is_lead_out) {
            (true, true) if num != CueSheet::CD_LEAD_OUT => {
                return Err(FlacError::cue_sheet(format!(
                    "CD lead-out track number must be 170, found {num}"
                )));
            }
            (false, true) if num != CueSheet::LEAD_OUT => {
                return Err(FlacError::cue_sheet(format!(
                    "lead-out track number must be 255, found {num}"
                )));
            }
            (true, false) if num > 99 => {
                return Err(FlacError::cue_sheet(format!(
                    "CD track number {num} exceeds 99"
                )));
            }
            _ => {}
        }
        if is_cd && offset % CD_FRAME_SAMPLES != 0 {
            return Err(FlacError::cue_sheet(format!(
                "CD track offset {offset} is not a multiple of {CD_FRAME_SAMPLES}"
            )));
        }

        let isrc = zero_padded_string(body.take(12)?, "ISRC")?;

        // Bit 7 is the track type (0 = audio), bit 6 pre-emphasis.
        let flags = body.u8()?;
        let is_audio = flags & 0x80 == 0;
        let has_pre_emphasis = flags & 0x40 != 0;
        if flags & 0x3F != 0 {
            return Err(FlacError::cue_sheet("reserved bits in track flags"));
        }
        reserved_zero(body.take(13)?)?;

        let n_indices = body.u8()?;
        if n_indices == 0 && !is_lead_out {
            return Err(FlacError::cue_sheet(format!(
                "track {num} has no index points"
            )));
        }

        let mut indices = Vec::with_capacity(n_indices as usize);
        for _ in 0..n_indices {
            let index_offset = body.be_u64()?;
            let index_num = body.u8()?;
            reserved_zero(body.take(3)?)?;
            indices.push(CueSheetTrackIndex {
                offset: index_offset,
                num: index_num,
            });
        }

        Ok(CueSheetTrack {
            offset,
            num,
            isrc,
            is_audio,
            has_pre_emphasis,
            indices,
        })
    }

    fn serialize(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.offset.to_be_bytes());
        bytes.push(self.num);

        let mut isrc = [0u8; 12];
        isrc[..self.isrc.len()].copy_from_slice(self.isrc.as_bytes());
        bytes.extend_from_slice(&isrc);

        let mut flags = 0u8;
        if !self.is_audio {
            flags |= 0x80;
        }
        if self.has_pre_emphasis {
            flags |= 0x40;
        }
        bytes.push(flags);
        bytes.extend_from_slice(&[0u8; 13]);

        bytes.push(self.indices.len() as u8);
        for index in &self.indices {
            bytes.extend_from_slice(&index.offset.to_be_bytes());
            bytes.push(index.num);
            bytes.extend_from_slice(&[0u8; 3]);
        }
    }
}

/// PICTURE: an embedded image, typically cover art.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    /// ID3v2 APIC picture type (0 to 20).
    pub picture_type: u32,
    /// MIME type; `-->` means `data` holds a URL instead of image bytes.
    pub mime: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    /// Color depth in bits per pixel.
    pub depth: u32,
    /// Palette size for indexed images; 0 otherwise.
    pub n_palette_colors: u32,
    pub data: Vec<u8>,
}

impl Picture {
    pub fn parse(data: &[u8]) -> FlacResult<Self> {
        let mut body = Body::new(data);

        let picture_type = body.be_u32()?;
        if picture_type > 20 {
            log::warn!("picture type {picture_type} is outside the APIC range");
        }

        let mime_len = body.be_u32()? as usize;
        let mime = utf8(body.take(mime_len)?, "picture MIME type")?;
        let desc_len = body.be_u32()? as usize;
        let description = utf8(body.take(desc_len)?, "picture description")?;

        let width = body.be_u32()?;
        let height = body.be_u32()?;
        let depth = body.be_u32()?;
        let n_palette_colors = body.be_u32()?;

        let data_len = body.be_u32()? as usize;
        let image = body.take(data_len)?.to_vec();
        body.finish()?;

        Ok(Picture {
            picture_type,
            mime,
            description,
            width,
            height,
            depth,
            n_palette_colors,
            data: image,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 + self.mime.len() + self.description.len() + self.data.len());
        bytes.extend_from_slice(&self.picture_type.to_be_bytes());
        bytes.extend_from_slice(&(self.mime.len() as u32).to_be_bytes());
        bytes.extend_from_slice(self.mime.as_bytes());
        bytes.extend_from_slice(&(self.description.len() as u32).to_be_bytes());
        bytes.extend_from_slice(self.description.as_bytes());
        bytes.extend_from_slice(&self.width.to_be_bytes());
        bytes.extend_from_slice(&self.height.to_be_bytes());
        bytes.extend_from_slice(&self.depth.to_be_bytes());
        bytes.extend_from_slice(&self.n_palette_colors.to_be_bytes());
        bytes.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

fn utf8(bytes: &[u8], context: &'static str) -> FlacResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| FlacError::InvalidUtf8String(context))
}

/// Decode a fixed-width, zero-terminated text field. The bytes after the
/// terminator must also be zero so the field re-serializes identically.
fn zero_padded_string(bytes: &[u8], context: &'static str) -> FlacResult<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    if bytes[end..].iter().any(|&b| b != 0) {
        return Err(FlacError::cue_sheet(format!(
            "garbage after the terminator of the {context}"
        )));
    }
    String::from_utf8(bytes[..end].to_vec()).map_err(|_| FlacError::InvalidUtf8String(context))
}

fn reserved_zero(bytes: &[u8]) -> FlacResult<()> {
    if bytes.iter().any(|&b| b != 0) {
        return Err(FlacError::cue_sheet("non-zero reserved bytes"));
    }
    Ok(())
}
