//! Stream-level encoding: signature, metadata, frame re-serialization.
//!
//! The encoder re-serializes previously parsed [`Frame`] descriptions; it
//! makes no prediction or Rice parameter choices of its own, so a decoded
//! stream written back through it reproduces the original bytes. While
//! frames pass through, the encoder tracks the observed block and frame
//! size extrema, the sample count and a running MD5 of the unencoded
//! audio; [`Encoder::close`] patches them into STREAMINFO on seekable
//! sinks.

use std::io::{Seek, Write};

use log::debug;

use crate::bitstream::BitWriter;
use crate::constants::FLAC_SIGNATURE;
use crate::error::{FlacError, FlacResult};
use crate::frame::Frame;
use crate::metadata::{Block, BlockBody, BlockHeader, BlockType, StreamInfo};

/// A FLAC stream opened for encoding.
pub struct Encoder<W: Write> {
    writer: BitWriter<W>,
    info: StreamInfo,
    /// Whether STREAMINFO was written with the last-block flag, so the
    /// close-time rewrite reproduces the same header byte.
    stream_info_is_last: bool,
    n_frames: u64,
    n_samples: u64,
    block_size_min: u16,
    block_size_max: u16,
    frame_size_min: u32,
    frame_size_max: u32,
    md5: md5::Context,
}

impl<W: Write> Encoder<W> {
    /// Write the stream signature, STREAMINFO, and the remaining metadata
    /// blocks. The last-block flag is set on the final block regardless of
    /// the flags the blocks carry. `blocks` must not contain a STREAMINFO.
    pub fn new(sink: W, info: StreamInfo, blocks: &[Block]) -> FlacResult<Self> {
        if blocks
            .iter()
            .any(|b| b.body.block_type() == BlockType::StreamInfo)
        {
            return Err(FlacError::unsupported(
                "duplicate STREAMINFO in the metadata block list",
            ));
        }

        let mut writer = BitWriter::new(sink);
        writer.write_bytes(&FLAC_SIGNATURE)?;

        let stream_info_is_last = blocks.is_empty();
        stream_info_block(info).write(&mut writer, stream_info_is_last)?;
        for (i, block) in blocks.iter().enumerate() {
            block.write(&mut writer, i + 1 == blocks.len())?;
        }

        Ok(Encoder {
            writer,
            info,
            stream_info_is_last,
            n_frames: 0,
            n_samples: 0,
            block_size_min: 0,
            block_size_max: 0,
            frame_size_min: 0,
            frame_size_max: 0,
            md5: md5::Context::new(),
        })
    }

    /// The STREAMINFO the encoder was created with.
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Re-serialize one frame and fold its samples into the running
    /// stream statistics.
    pub fn write_frame(&mut self, frame: &Frame) -> FlacResult<()> {
        let start = self.writer.position();
        frame.write(&mut self.writer, &self.info)?;
        let frame_size = (self.writer.position() - start) as u32;

        let block_size = frame.header.block_size;
        if self.n_frames == 0 {
            self.block_size_min = block_size;
            self.block_size_max = block_size;
            self.frame_size_min = frame_size;
            self.frame_size_max = frame_size;
        } else {
            self.block_size_min = self.block_size_min.min(block_size);
            self.block_size_max = self.block_size_max.max(block_size);
            self.frame_size_min = self.frame_size_min.min(frame_size);
            self.frame_size_max = self.frame_size_max.max(frame_size);
        }

        let bps = frame.header.resolved_bits_per_sample(&self.info)?;
        frame.hash(&mut self.md5, bps);
        self.n_samples += block_size as u64;
        self.n_frames += 1;
        Ok(())
    }

    /// Flush pending writes and hand back the sink without touching
    /// STREAMINFO. For non-seekable sinks; the caller must have passed a
    /// STREAMINFO with correct totals up front.
    pub fn finish(self) -> FlacResult<W> {
        self.writer.into_inner()
    }

    /// STREAMINFO with the observed stream statistics patched in.
    fn observed_info(&self) -> StreamInfo {
        let mut info = self.info;
        if self.n_frames > 0 {
            info.block_size_min = self.block_size_min;
            info.block_size_max = self.block_size_max;
            info.frame_size_min = self.frame_size_min;
            info.frame_size_max = self.frame_size_max;
        }
        info.n_samples = self.n_samples;
        info.md5_sum = self.md5.clone().compute().0;
        info
    }
}

impl<W: Write + Seek> Encoder<W> {
    /// Flush, rewind to just past the signature, rewrite STREAMINFO with
    /// the observed block sizes, frame sizes, sample count, and the final
    /// MD5 digest, and hand back the sink.
    pub fn close(mut self) -> FlacResult<W> {
        let info = self.observed_info();
        debug!(
            "closing encoder: {} frames, {} samples, frame sizes {}-{}",
            self.n_frames, info.n_samples, info.frame_size_min, info.frame_size_max
        );

        let end = self.writer.stream_position()?;
        self.writer.seek_to(FLAC_SIGNATURE.len() as u64)?;
        stream_info_block(info).write(&mut self.writer, self.stream_info_is_last)?;
        self.writer.seek_to(end)?;
        self.writer.into_inner()
    }
}

fn stream_info_block(info: StreamInfo) -> Block {
    Block {
        header: BlockHeader {
            is_last: false,
            block_type: BlockType::StreamInfo,
            length: crate::constants::STREAMINFO_LEN as u32,
        },
        body: BlockBody::StreamInfo(info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ChannelAssignment, FrameHeader};
    use crate::rice::{RiceMethod, RicePartition, RicePartitioning};
    use crate::stream::Stream;
    use crate::subframe::Subframe;
    use std::io::Cursor;

    fn test_info() -> StreamInfo {
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

    fn one_partition(param: u32) -> RicePartitioning {
        RicePartitioning {
            part_order: 0,
            partitions: vec![RicePartition {
                param,
                escaped_bps: 0,
            }],
        }
    }

    /// A stereo frame mixing subframe types across its channels.
    fn stereo_frame(num: u64, channels: ChannelAssignment) -> Frame {
        let left: Vec<i32> = (0..256)
            .map(|i| ((i * 131 + num as i32 * 17) % 9173) - 4500)
            .collect();
        let right: Vec<i32> = left.iter().map(|&l| l / 2 + 100).collect();
        Frame {
            header: FrameHeader {
                has_variable_block_size: false,
                block_size: 256,
                sample_rate: 0,
                channels,
                bits_per_sample: 0,
                num,
            },
            subframes: vec![Subframe::verbatim(left), Subframe::verbatim(right)],
        }
    }

    /// Full re-encode identity: decode a stream, write every parsed block
    /// and frame back out, compare all bytes.
    fn assert_reencode_identity(original: &[u8]) {
        let mut stream = Stream::new(Cursor::new(original.to_vec())).expect("open failed");
        let mut encoder = Encoder::new(
            Cursor::new(Vec::new()),
            *stream.info(),
            &stream.blocks().to_vec(),
        )
        .expect("encoder failed");

        while let Some(frame) = stream.next_frame().expect("frame failed") {
            encoder.write_frame(&frame).expect("write failed");
        }

        let reencoded = encoder.close().expect("close failed").into_inner();
        assert_eq!(reencoded, original, "re-encoded stream differs");
    }

    #[test]
    fn close_patches_stream_info() {
        let mut encoder =
            Encoder::new(Cursor::new(Vec::new()), test_info(), &[]).expect("encoder failed");
        encoder
            .write_frame(&stereo_frame(0, ChannelAssignment::Stereo))
            .expect("write failed");
        encoder
            .write_frame(&stereo_frame(1, ChannelAssignment::MidSide))
            .expect("write failed");
        let bytes = encoder.close().expect("close failed").into_inner();

        let stream = Stream::new(Cursor::new(bytes)).expect("open failed");
        let info = stream.info();
        assert_eq!(info.block_size_min, 256);
        assert_eq!(info.block_size_max, 256);
        assert_eq!(info.n_samples, 512);
        assert!(info.frame_size_min > 0);
        assert!(info.frame_size_max >= info.frame_size_min);
        assert!(info.has_md5());
    }

    #[test]
    fn finish_leaves_stream_info_untouched() {
        let mut info = test_info();
        info.n_samples = 256;
        let mut encoder =
            Encoder::new(Cursor::new(Vec::new()), info, &[]).expect("encoder failed");
        encoder
            .write_frame(&stereo_frame(0, ChannelAssignment::Stereo))
            .expect("write failed");
        let bytes = encoder.finish().expect("finish failed").into_inner();

        let stream = Stream::new(Cursor::new(bytes)).expect("open failed");
        assert_eq!(stream.info().md5_sum, [0; 16]);
        assert_eq!(stream.info().n_samples, 256);
    }

    #[test]
    fn rejects_duplicate_stream_info_block() {
        let duplicate = stream_info_block(test_info());
        assert!(matches!(
            Encoder::new(Cursor::new(Vec::new()), test_info(), &[duplicate]),
            Err(FlacError::Unsupported(_))
        ));
    }

    #[test]
    fn reencode_identity_stereo_modes() {
        for channels in [
            ChannelAssignment::Stereo,
            ChannelAssignment::LeftSide,
            ChannelAssignment::SideRight,
            ChannelAssignment::MidSide,
        ] {
            let mut encoder =
                Encoder::new(Cursor::new(Vec::new()), test_info(), &[]).expect("encoder failed");
            for num in 0..3 {
                encoder
                    .write_frame(&stereo_frame(num, channels))
                    .expect("write failed");
            }
            let original = encoder.close().expect("close failed").into_inner();
            assert_reencode_identity(&original);
        }
    }

    #[test]
    fn reencode_identity_mixed_predictors() {
        // A mono stream whose frames use constant, verbatim, fixed and FIR
        // subframes, one of them with wasted bits.
        let info = StreamInfo {
            n_channels: 1,
            ..test_info()
        };

        let quadratic: Vec<i32> = (0..64).map(|i| i * i - 40 * i).collect();
        let ramp: Vec<i32> = (0..64).map(|i| ((i * 37) % 251) - 125).collect();
        let shifted: Vec<i32> = (0..64).map(|i| (((i * 23) % 101) - 50) * 8).collect();

        let mut wasted_subframe = Subframe::verbatim(shifted);
        wasted_subframe.wasted = 3;

        let subframes = [
            Subframe::constant(-713, 64),
            Subframe::verbatim(ramp.clone()),
            Subframe::fixed(2, RiceMethod::Rice, one_partition(3), quadratic),
            Subframe::fir(
                vec![49, -17, 6],
                7,
                4,
                RiceMethod::Rice2,
                one_partition(9),
                ramp,
            ),
            wasted_subframe,
        ];

        let mut encoder =
            Encoder::new(Cursor::new(Vec::new()), info, &[]).expect("encoder failed");
        for (num, subframe) in subframes.into_iter().enumerate() {
            let frame = Frame {
                header: FrameHeader {
                    has_variable_block_size: false,
                    block_size: 64,
                    sample_rate: 0,
                    channels: ChannelAssignment::Mono,
                    bits_per_sample: 0,
                    num: num as u64,
                },
                subframes: vec![subframe],
            };
            encoder.write_frame(&frame).expect("write failed");
        }
        let original = encoder.close().expect("close failed").into_inner();
        assert_reencode_identity(&original);
    }

    #[test]
    fn reencode_identity_with_metadata() {
        use crate::metadata::{Application, Picture, VorbisComment};

        let blocks = vec![
            Block {
                header: BlockHeader {
                    is_last: false,
                    block_type: BlockType::VorbisComment,
                    length: 0,
                },
                body: BlockBody::VorbisComment(VorbisComment {
                    vendor: "flac-io".to_string(),
                    tags: vec![
                        ("TITLE".to_string(), "round trip".to_string()),
                        ("TRACKNUMBER".to_string(), "3".to_string()),
                    ],
                }),
            },
            Block {
                header: BlockHeader {
                    is_last: false,
                    block_type: BlockType::Application,
                    length: 0,
                },
                body: BlockBody::Application(Application {
                    id: u32::from_be_bytes(*b"atch"),
                    data: vec![0xDE, 0xAD],
                }),
            },
            Block {
                header: BlockHeader {
                    is_last: false,
                    block_type: BlockType::Picture,
                    length: 0,
                },
                body: BlockBody::Picture(Picture {
                    picture_type: 3,
                    mime: "image/png".to_string(),
                    description: String::new(),
                    width: 1,
                    height: 1,
                    depth: 24,
                    n_palette_colors: 0,
                    data: vec![1, 2, 3, 4],
                }),
            },
            Block {
                header: BlockHeader {
                    is_last: false,
                    block_type: BlockType::Padding,
                    length: 64,
                },
                body: BlockBody::Padding(64),
            },
        ];

        let mut encoder = Encoder::new(Cursor::new(Vec::new()), test_info(), &blocks)
            .expect("encoder failed");
        encoder
            .write_frame(&stereo_frame(0, ChannelAssignment::Stereo))
            .expect("write failed");
        let original = encoder.close().expect("close failed").into_inner();
        assert_reencode_identity(&original);
    }

    #[test]
    fn reencode_identity_with_escaped_partitions() {
        let info = StreamInfo {
            n_channels: 1,
            ..test_info()
        };
        let samples: Vec<i32> = (0..32).map(|i| i * 5 - 80).collect();
        let partitioning = RicePartitioning {
            part_order: 1,
            partitions: vec![
                RicePartition { param: 0xF, escaped_bps: 7 },
                RicePartition { param: 1, escaped_bps: 0 },
            ],
        };
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
                1,
                RiceMethod::Rice,
                partitioning,
                samples,
            )],
        };

        let mut encoder =
            Encoder::new(Cursor::new(Vec::new()), info, &[]).expect("encoder failed");
        encoder.write_frame(&frame).expect("write failed");
        let original = encoder.close().expect("close failed").into_inner();
        assert_reencode_identity(&original);
    }

    #[test]
    fn variable_block_size_stream() {
        // Variable blocking: the coded number is the first sample number.
        let info = StreamInfo {
            n_channels: 1,
            block_size_min: 192,
            block_size_max: 576,
            ..test_info()
        };

        let mut encoder =
            Encoder::new(Cursor::new(Vec::new()), info, &[]).expect("encoder failed");
        let mut sample_num = 0u64;
        for block_size in [576u16, 192, 320] {
            let samples: Vec<i32> = (0..block_size as i32).map(|i| i % 64).collect();
            let frame = Frame {
                header: FrameHeader {
                    has_variable_block_size: true,
                    block_size,
                    sample_rate: 0,
                    channels: ChannelAssignment::Mono,
                    bits_per_sample: 0,
                    num: sample_num,
                },
                subframes: vec![Subframe::verbatim(samples)],
            };
            encoder.write_frame(&frame).expect("write failed");
            sample_num += block_size as u64;
        }
        let original = encoder.close().expect("close failed").into_inner();

        let mut stream = Stream::new(Cursor::new(original.clone())).expect("open failed");
        assert_eq!(stream.info().n_samples, 576 + 192 + 320);

        let first = stream
            .next_frame()
            .expect("frame failed")
            .expect("frame expected");
        assert!(first.header.has_variable_block_size);
        assert_eq!(first.first_sample_number(), 0);
        let second = stream
            .next_frame()
            .expect("frame failed")
            .expect("frame expected");
        assert_eq!(second.first_sample_number(), 576);

        assert_reencode_identity(&original);
    }
}
