//! Stream-level decoding: signature, metadata, frame iteration, seeking.
//!
//! A [`Stream`] owns its reader and advances strictly forward: signature
//! (skipping one optional ID3v2 prelude), the mandatory STREAMINFO block,
//! the remaining metadata blocks up to the one flagged last, then audio
//! frames until end of input. Random access is layered on top through the
//! stream's SEEKTABLE, or an on-demand table built by scanning the frames
//! once.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use log::{debug, warn};

use crate::audio::DecodedAudio;
use crate::bitstream::BitReader;
use crate::constants::{FLAC_SIGNATURE, ID3_SIGNATURE};
use crate::error::{FlacError, FlacResult};
use crate::frame::Frame;
use crate::metadata::{
    Block, BlockBody, CueSheet, Picture, SeekPoint, SeekTable, StreamInfo, VorbisComment,
};

/// A FLAC stream opened for decoding.
pub struct Stream<R> {
    reader: BitReader<R>,
    info: StreamInfo,
    blocks: Vec<Block>,
    /// Offset of the first frame header; seek point offsets are relative
    /// to this position.
    data_start: u64,
    seek_table: Option<SeekTable>,
    md5: md5::Context,
    /// Seeking skips frames, so the running digest no longer covers the
    /// whole stream.
    md5_tainted: bool,
}

impl Stream<BufReader<File>> {
    /// Open a FLAC file for decoding through a buffered reader.
    pub fn open<P: AsRef<Path>>(path: P) -> FlacResult<Self> {
        Stream::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> Stream<R> {
    /// Parse the stream signature and all metadata blocks of `reader`.
    ///
    /// The reader must be positioned at the start of the FLAC stream (or
    /// of an ID3v2 tag directly preceding it). Hand in a buffered reader;
    /// the parser issues many small reads.
    pub fn new(reader: R) -> FlacResult<Self> {
        let mut reader = BitReader::new(reader);

        let mut signature = [0u8; 4];
        reader.read_into(&mut signature)?;

        if signature[..3] == ID3_SIGNATURE {
            skip_id3v2(&mut reader)?;
            reader.read_into(&mut signature)?;
        }
        if signature != FLAC_SIGNATURE {
            return Err(FlacError::SignatureMismatch { found: signature });
        }

        let first = Block::read(&mut reader)?.ok_or(FlacError::UnexpectedEof)?;
        let BlockBody::StreamInfo(info) = first.body else {
            return Err(FlacError::MissingStreamInfo);
        };

        let mut blocks = Vec::new();
        let mut seek_table = None;
        let mut is_last = first.header.is_last;
        while !is_last {
            let block = Block::read(&mut reader)?.ok_or(FlacError::UnexpectedEof)?;
            is_last = block.header.is_last;
            if let BlockBody::SeekTable(table) = &block.body {
                seek_table = Some(table.clone());
            }
            blocks.push(block);
        }

        let data_start = reader.position();
        debug!(
            "stream opened: {} Hz, {} ch, {} bps, data at byte {data_start}",
            info.sample_rate, info.n_channels, info.bits_per_sample
        );

        Ok(Stream {
            reader,
            info,
            blocks,
            data_start,
            seek_table,
            md5: md5::Context::new(),
            md5_tainted: false,
        })
    }

    /// Like [`Stream::new`], but skip every metadata block after
    /// STREAMINFO instead of retaining it. For decode-only consumers that
    /// never look at tags, cue sheets or pictures.
    pub fn new_minimal(reader: R) -> FlacResult<Self> {
        let mut reader = BitReader::new(reader);

        let mut signature = [0u8; 4];
        reader.read_into(&mut signature)?;
        if signature[..3] == ID3_SIGNATURE {
            skip_id3v2(&mut reader)?;
            reader.read_into(&mut signature)?;
        }
        if signature != FLAC_SIGNATURE {
            return Err(FlacError::SignatureMismatch { found: signature });
        }

        let first = Block::read(&mut reader)?.ok_or(FlacError::UnexpectedEof)?;
        let BlockBody::StreamInfo(info) = first.body else {
            return Err(FlacError::MissingStreamInfo);
        };

        let mut is_last = first.header.is_last;
        while !is_last {
            let header = Block::read_header(&mut reader)?.ok_or(FlacError::UnexpectedEof)?;
            Block::skip_body(&mut reader, &header)?;
            is_last = header.is_last;
        }

        let data_start = reader.position();
        Ok(Stream {
            reader,
            info,
            blocks: Vec::new(),
            data_start,
            seek_table: None,
            md5: md5::Context::new(),
            md5_tainted: false,
        })
    }

    /// The stream's STREAMINFO.
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// All metadata blocks following STREAMINFO, in stream order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Byte offset of the first frame header.
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// The stream's SEEKTABLE block, if it carries one.
    pub fn seek_table(&self) -> Option<&SeekTable> {
        self.blocks.iter().find_map(|b| match &b.body {
            BlockBody::SeekTable(table) => Some(table),
            _ => None,
        })
    }

    /// The stream's VORBIS_COMMENT block, if it carries one.
    pub fn vorbis_comment(&self) -> Option<&VorbisComment> {
        self.blocks.iter().find_map(|b| match &b.body {
            BlockBody::VorbisComment(comment) => Some(comment),
            _ => None,
        })
    }

    /// The stream's CUESHEET block, if it carries one.
    pub fn cue_sheet(&self) -> Option<&CueSheet> {
        self.blocks.iter().find_map(|b| match &b.body {
            BlockBody::CueSheet(cue) => Some(cue),
            _ => None,
        })
    }

    /// All PICTURE blocks, in stream order.
    pub fn pictures(&self) -> impl Iterator<Item = &Picture> {
        self.blocks.iter().filter_map(|b| match &b.body {
            BlockBody::Picture(picture) => Some(picture),
            _ => None,
        })
    }

    /// Decode every remaining frame into one planar buffer.
    pub fn decode_all(&mut self) -> FlacResult<DecodedAudio> {
        let mut audio = DecodedAudio::new(
            self.info.n_channels as usize,
            self.info.bits_per_sample as u32,
            self.info.sample_rate,
        );
        while let Some(frame) = self.next_frame()? {
            audio.push_frame(&frame)?;
        }
        Ok(audio)
    }

    /// Parse the next audio frame; `Ok(None)` is the graceful end of the
    /// stream. The decoded samples also feed the running MD5 used by
    /// [`Stream::verify_md5`].
    pub fn next_frame(&mut self) -> FlacResult<Option<Frame>> {
        let Some(frame) = Frame::parse(&mut self.reader, &self.info)? else {
            return Ok(None);
        };
        let bps = frame.header.resolved_bits_per_sample(&self.info)?;
        frame.hash(&mut self.md5, bps);
        Ok(Some(frame))
    }

    /// Compare the running MD5 of all decoded samples against the digest
    /// declared in STREAMINFO. Call after [`Stream::next_frame`] has
    /// returned `None`. Streams that declare no digest verify trivially.
    pub fn verify_md5(&self) -> FlacResult<()> {
        if self.md5_tainted {
            return Err(FlacError::unsupported(
                "MD5 verification after seeking: the digest no longer covers every frame",
            ));
        }
        if !self.info.has_md5() {
            debug!("stream declares no MD5 digest; nothing to verify");
            return Ok(());
        }
        let digest = self.md5.clone().compute();
        if digest.0 != self.info.md5_sum {
            return Err(FlacError::Md5Mismatch);
        }
        Ok(())
    }
}

impl<R: Read + Seek> Stream<R> {
    /// Seek to the frame containing `sample_num` and return that frame's
    /// first sample number; the next [`Stream::next_frame`] call re-reads
    /// the containing frame.
    ///
    /// Uses the stream's SEEKTABLE when one exists, otherwise scans the
    /// stream once to build a table with one point per frame. Fails with
    /// [`FlacError::SeekOutOfRange`] when the stream declares a total
    /// sample count and `sample_num` is at or past it.
    pub fn seek(&mut self, sample_num: u64) -> FlacResult<u64> {
        if self.info.n_samples > 0 && sample_num >= self.info.n_samples {
            return Err(FlacError::SeekOutOfRange {
                sample: sample_num,
                total: self.info.n_samples,
            });
        }

        if self.seek_table.is_none() {
            self.build_seek_table()?;
        }
        let table = self.seek_table.as_ref().ok_or(FlacError::NoSeekTable)?;
        let point = search_from_start(table, sample_num)?;

        self.md5_tainted = true;
        self.reader.seek_to(self.data_start + point.offset)?;

        loop {
            let offset = self.reader.position();
            let frame = Frame::parse(&mut self.reader, &self.info)?
                .ok_or(FlacError::UnexpectedEof)?;
            let first = frame.first_sample_number();
            if first + frame.header.block_size as u64 > sample_num {
                // Rewind so the caller's next read starts at this frame.
                self.reader.seek_to(offset)?;
                return Ok(first);
            }
        }
    }

    /// Scan every frame once and record one seek point per frame.
    fn build_seek_table(&mut self) -> FlacResult<()> {
        let resume_at = self.reader.position();
        self.reader.seek_to(self.data_start)?;

        let mut points = Vec::new();
        let mut sample_num = 0u64;
        loop {
            let offset = self.reader.position();
            let Some(frame) = Frame::parse(&mut self.reader, &self.info)? else {
                break;
            };
            points.push(SeekPoint {
                sample_num,
                offset: offset - self.data_start,
                n_samples: frame.header.block_size,
            });
            sample_num += frame.header.block_size as u64;
        }

        debug!("built on-demand seek table with {} points", points.len());
        self.seek_table = Some(SeekTable { points });
        self.reader.seek_to(resume_at)
    }
}

/// Walk the table from the start and return the last point before the
/// first one whose frame reaches `sample_num`; the first point when the
/// target precedes every frame the table knows.
fn search_from_start(table: &SeekTable, sample_num: u64) -> FlacResult<SeekPoint> {
    let mut candidates = table.points.iter().filter(|p| !p.is_placeholder());
    let Some(&first) = candidates.next() else {
        return Err(FlacError::NoSeekTable);
    };

    let mut prev = first;
    for &point in std::iter::once(&first).chain(candidates) {
        if point.sample_num + point.n_samples as u64 >= sample_num {
            return Ok(prev);
        }
        prev = point;
    }
    Ok(prev)
}

/// Skip an ID3v2 tag. The reader has consumed `"ID3"` plus one version
/// byte; the remainder is one version byte, one flag byte, and a 4-byte
/// synchsafe length (seven significant bits per byte) of payload to
/// discard.
fn skip_id3v2<R: Read>(reader: &mut BitReader<R>) -> FlacResult<()> {
    reader.skip_bytes(2)?;

    let mut size_buf = [0u8; 4];
    reader.read_into(&mut size_buf)?;
    if size_buf.iter().any(|&b| b & 0x80 != 0) {
        warn!("ID3v2 length bytes with the top bit set; tag may be corrupt");
    }
    let size = ((size_buf[0] as u64 & 0x7F) << 21)
        | ((size_buf[1] as u64 & 0x7F) << 14)
        | ((size_buf[2] as u64 & 0x7F) << 7)
        | (size_buf[3] as u64 & 0x7F);

    debug!("skipping {size}-byte ID3v2 tag");
    reader.skip_bytes(size)
}
