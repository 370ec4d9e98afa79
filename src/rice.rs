//! Rice coding of prediction residuals.
//!
//! Residuals of fixed and FIR subframes are split into `2^partition_order`
//! partitions, each carrying its own Rice parameter. An all-ones parameter
//! escapes the partition: its residuals are then stored as raw two's
//! complement values in a fixed bit width. The decoder records the exact
//! partitioning so the encoder can reproduce the original bytes without
//! re-searching parameters.

use crate::bitstream::{BitReader, BitWriter};
use crate::constants::MAX_RICE_QUOTIENT;
use crate::error::{FlacError, FlacResult};
use std::io::{Read, Write};

/// Residual coding method: the size of the per-partition parameter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiceMethod {
    /// 4-bit Rice parameters (method code `0b00`).
    Rice,
    /// 5-bit Rice parameters (method code `0b01`).
    Rice2,
}

impl RiceMethod {
    /// Width of the per-partition parameter field in bits.
    #[inline]
    pub const fn param_bits(self) -> u32 {
        match self {
            RiceMethod::Rice => 4,
            RiceMethod::Rice2 => 5,
        }
    }

    /// All-ones parameter value marking an escaped partition.
    #[inline]
    pub const fn escape_param(self) -> u32 {
        (1 << self.param_bits()) - 1
    }

    /// 2-bit residual coding method code.
    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            RiceMethod::Rice => 0b00,
            RiceMethod::Rice2 => 0b01,
        }
    }

    pub fn from_code(code: u8) -> FlacResult<Self> {
        match code {
            0b00 => Ok(RiceMethod::Rice),
            0b01 => Ok(RiceMethod::Rice2),
            other => Err(FlacError::ReservedResidualMethod(other)),
        }
    }
}

/// One Rice partition as it appeared in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RicePartition {
    /// Rice parameter; equal to the escape value for escaped partitions.
    pub param: u32,
    /// Sample width of an escaped partition; unused otherwise.
    pub escaped_bps: u32,
}

/// Partitioning of a subframe's residuals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RicePartitioning {
    /// Partition order; the residuals span `2^part_order` partitions.
    pub part_order: u8,
    pub partitions: Vec<RicePartition>,
}

/// Fold a signed residual into the unsigned ZigZag domain.
///
/// `0, -1, 1, -2, 2, ...` map to `0, 1, 2, 3, 4, ...`.
#[inline]
pub const fn zigzag_fold(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Unfold a ZigZag value back to its signed form.
#[inline]
pub const fn zigzag_unfold(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Number of residuals in partition `index`.
///
/// The first partition is short by the prediction order because warm-up
/// samples are stored verbatim ahead of the residuals.
#[inline]
fn partition_len(block_size: u16, part_order: u8, pred_order: usize, index: usize) -> usize {
    let nparts = 1usize << part_order;
    if part_order == 0 {
        block_size as usize - pred_order
    } else if index == 0 {
        block_size as usize / nparts - pred_order
    } else {
        block_size as usize / nparts
    }
}

/// Validate the partition arithmetic of a subframe: the block size must be
/// divisible by the partition count and the first partition non-empty.
fn check_partitioning(block_size: u16, part_order: u8, pred_order: usize) -> FlacResult<()> {
    let violation = || FlacError::PartitionArithmetic {
        block_size,
        part_order,
        pred_order,
    };
    if part_order > 15 {
        return Err(violation());
    }
    let nparts = 1usize << part_order;
    if block_size as usize % nparts != 0 {
        return Err(violation());
    }
    if block_size as usize / nparts <= pred_order {
        return Err(violation());
    }
    Ok(())
}

/// Decode a residual section: 2-bit method code, 4-bit partition order,
/// then the partitions. Returns the method, the recorded partitioning and
/// the decoded residuals (`block_size - pred_order` values).
pub fn read_residual<R: Read>(
    reader: &mut BitReader<R>,
    block_size: u16,
    pred_order: usize,
) -> FlacResult<(RiceMethod, RicePartitioning, Vec<i32>)> {
    let method = RiceMethod::from_code(reader.read_bits(2)? as u8)?;
    let part_order = reader.read_bits(4)? as u8;
    check_partitioning(block_size, part_order, pred_order)?;

    let nparts = 1usize << part_order;
    let mut partitions = Vec::with_capacity(nparts);
    let mut residuals = Vec::with_capacity(block_size as usize - pred_order);

    for index in 0..nparts {
        let param = reader.read_bits(method.param_bits())? as u32;
        let nsamples = partition_len(block_size, part_order, pred_order, index);

        if param == method.escape_param() {
            let escaped_bps = reader.read_bits(5)? as u32;
            partitions.push(RicePartition { param, escaped_bps });
            for _ in 0..nsamples {
                let value = if escaped_bps == 0 {
                    0
                } else {
                    reader.read_signed(escaped_bps)?
                };
                residuals.push(value);
            }
        } else {
            partitions.push(RicePartition {
                param,
                escaped_bps: 0,
            });
            for _ in 0..nsamples {
                let quotient = reader.read_unary()?;
                if quotient >= MAX_RICE_QUOTIENT {
                    return Err(FlacError::RiceQuotientOverflow);
                }
                let remainder = if param > 0 {
                    reader.read_bits(param)?
                } else {
                    0
                };
                let folded = (quotient << param) | remainder;
                if folded > u32::MAX as u64 {
                    return Err(FlacError::RiceQuotientOverflow);
                }
                residuals.push(zigzag_unfold(folded as u32));
            }
        }
    }

    Ok((
        method,
        RicePartitioning {
            part_order,
            partitions,
        },
        residuals,
    ))
}

/// Encode a residual section from its recorded description, reproducing
/// the original partition parameters and escapes bit for bit.
pub fn write_residual<W: Write>(
    writer: &mut BitWriter<W>,
    method: RiceMethod,
    partitioning: &RicePartitioning,
    residuals: &[i32],
    block_size: u16,
    pred_order: usize,
) -> FlacResult<()> {
    let part_order = partitioning.part_order;
    check_partitioning(block_size, part_order, pred_order)?;

    let nparts = 1usize << part_order;
    if partitioning.partitions.len() != nparts {
        return Err(FlacError::PartitionArithmetic {
            block_size,
            part_order,
            pred_order,
        });
    }

    writer.write_bits(method.code() as u64, 2)?;
    writer.write_bits(part_order as u64, 4)?;

    let mut next = 0usize;
    for (index, partition) in partitioning.partitions.iter().enumerate() {
        let nsamples = partition_len(block_size, part_order, pred_order, index);
        let chunk = residuals
            .get(next..next + nsamples)
            .ok_or(FlacError::PartitionArithmetic {
                block_size,
                part_order,
                pred_order,
            })?;
        next += nsamples;

        writer.write_bits(partition.param as u64, method.param_bits())?;

        if partition.param == method.escape_param() {
            if partition.escaped_bps > 32 {
                return Err(FlacError::EscapeWidthTooLarge(partition.escaped_bps));
            }
            writer.write_bits(partition.escaped_bps as u64, 5)?;
            if partition.escaped_bps > 0 {
                for &residual in chunk {
                    writer.write_signed(residual, partition.escaped_bps)?;
                }
            }
        } else {
            let param = partition.param;
            for &residual in chunk {
                let folded = zigzag_fold(residual);
                writer.write_unary((folded >> param) as u64)?;
                if param > 0 {
                    writer.write_bits((folded & ((1 << param) - 1)) as u64, param)?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn zigzag_laws() {
        assert_eq!(zigzag_fold(0), 0);
        assert_eq!(zigzag_fold(-1), 1);
        assert_eq!(zigzag_fold(1), 2);
        assert_eq!(zigzag_fold(-2), 3);
        assert_eq!(zigzag_fold(2), 4);

        for value in [0, 1, -1, 127, -128, 40000, -40000, i32::MAX, i32::MIN] {
            assert_eq!(zigzag_unfold(zigzag_fold(value)), value, "fold {value}");
        }
        for folded in [0u32, 1, 2, 3, 1000, u32::MAX, u32::MAX - 1] {
            assert_eq!(zigzag_fold(zigzag_unfold(folded)), folded, "unfold {folded}");
        }
    }

    fn round_trip(
        method: RiceMethod,
        partitioning: &RicePartitioning,
        residuals: &[i32],
        block_size: u16,
        pred_order: usize,
    ) {
        let mut writer = BitWriter::new(Cursor::new(Vec::new()));
        write_residual(
            &mut writer,
            method,
            partitioning,
            residuals,
            block_size,
            pred_order,
        )
        .expect("encode failed");
        writer.align_to_byte().expect("align failed");
        let bytes = writer.into_inner().expect("finish failed").into_inner();

        let mut reader = BitReader::new(Cursor::new(bytes));
        let (got_method, got_partitioning, got_residuals) =
            read_residual(&mut reader, block_size, pred_order).expect("decode failed");

        assert_eq!(got_method, method);
        assert_eq!(&got_partitioning, partitioning);
        assert_eq!(got_residuals, residuals);
    }

    #[test]
    fn single_partition_round_trip() {
        let residuals: Vec<i32> = vec![0, 1, -1, 2, -2, 5, -10, 100, -100, 0, 3, -3];
        let partitioning = RicePartitioning {
            part_order: 0,
            partitions: vec![RicePartition {
                param: 4,
                escaped_bps: 0,
            }],
        };
        round_trip(RiceMethod::Rice, &partitioning, &residuals, 16, 4);
    }

    #[test]
    fn multiple_partitions_round_trip() {
        // Block of 16, order 2, partition order 2: partitions of 2, 4, 4, 4.
        let residuals: Vec<i32> = (0..14).map(|i| i - 7).collect();
        let partitioning = RicePartitioning {
            part_order: 2,
            partitions: vec![
                RicePartition { param: 0, escaped_bps: 0 },
                RicePartition { param: 1, escaped_bps: 0 },
                RicePartition { param: 3, escaped_bps: 0 },
                RicePartition { param: 5, escaped_bps: 0 },
            ],
        };
        round_trip(RiceMethod::Rice, &partitioning, &residuals, 16, 2);
    }

    #[test]
    fn escaped_partition_round_trip() {
        let residuals: Vec<i32> = vec![-128, 127, -1, 0, 1, 64, -64, 33];
        let partitioning = RicePartitioning {
            part_order: 0,
            partitions: vec![RicePartition {
                param: 0xF,
                escaped_bps: 8,
            }],
        };
        round_trip(RiceMethod::Rice, &partitioning, &residuals, 8, 0);
    }

    #[test]
    fn escaped_partition_with_zero_width() {
        // Escape width 0 stores nothing and decodes to all-zero residuals.
        let residuals = vec![0i32; 8];
        let partitioning = RicePartitioning {
            part_order: 0,
            partitions: vec![RicePartition {
                param: 0x1F,
                escaped_bps: 0,
            }],
        };
        round_trip(RiceMethod::Rice2, &partitioning, &residuals, 8, 0);
    }

    #[test]
    fn rice2_five_bit_parameters() {
        let residuals: Vec<i32> = vec![30000, -30000, 12345, -12345];
        let partitioning = RicePartitioning {
            part_order: 0,
            partitions: vec![RicePartition {
                param: 16,
                escaped_bps: 0,
            }],
        };
        round_trip(RiceMethod::Rice2, &partitioning, &residuals, 4, 0);
    }

    #[test]
    fn rejects_indivisible_partitioning() {
        let mut writer = BitWriter::new(Cursor::new(Vec::new()));
        // Block of 10 cannot split into 4 partitions.
        let partitioning = RicePartitioning {
            part_order: 2,
            partitions: vec![
                RicePartition { param: 0, escaped_bps: 0 };
                4
            ],
        };
        let result = write_residual(
            &mut writer,
            RiceMethod::Rice,
            &partitioning,
            &[0; 10],
            10,
            0,
        );
        assert!(matches!(result, Err(FlacError::PartitionArithmetic { .. })));
    }

    #[test]
    fn rejects_empty_first_partition() {
        // Block 16, partition order 2 gives 4 samples per partition; a
        // prediction order of 4 leaves partition 0 empty.
        let mut writer = BitWriter::new(Cursor::new(Vec::new()));
        writer.write_bits(0b00, 2).unwrap();
        writer.write_bits(0b0010, 4).unwrap();
        writer.align_to_byte().unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();

        let mut reader = BitReader::new(Cursor::new(bytes));
        let result = read_residual(&mut reader, 16, 4);
        assert!(matches!(result, Err(FlacError::PartitionArithmetic { .. })));
    }

    #[test]
    fn reserved_method_code_rejected() {
        let mut writer = BitWriter::new(Cursor::new(Vec::new()));
        writer.write_bits(0b10, 2).unwrap();
        writer.align_to_byte().unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();
        let mut reader = BitReader::new(Cursor::new(bytes));
        assert!(matches!(
            read_residual(&mut reader, 16, 0),
            Err(FlacError::ReservedResidualMethod(0b10))
        ));
    }
}
