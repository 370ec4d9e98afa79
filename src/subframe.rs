//! Subframe parsing and serialization.
//!
//! Each frame stores one subframe per channel. A subframe header selects
//! the prediction method (constant, verbatim, fixed polynomial, or FIR
//! with explicit coefficients) and the count of wasted bits-per-sample;
//! the body stores warm-up samples, predictor parameters and Rice coded
//! residuals. The decoded [`Subframe`] keeps the complete coded
//! description alongside the decoded samples so serialization can
//! reproduce the original bits without re-deriving any encoder decision.

use std::io::{Read, Write};

use crate::bitstream::{BitReader, BitWriter};
use crate::constants::{FIXED_COEFFS, MAX_FIXED_ORDER};
use crate::error::{FlacError, FlacResult};
use crate::lpc;
use crate::rice::{self, RiceMethod, RicePartitioning};

/// Prediction method of a subframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    /// One sample value repeated across the whole block.
    Constant,
    /// Unencoded samples.
    Verbatim,
    /// Fixed polynomial predictor of order 0 to 4.
    Fixed,
    /// FIR predictor of order 1 to 32 with explicit coefficients.
    Fir,
}

/// Subframe header: prediction method, order, and wasted bits.
///
/// Laid out as one zero padding bit, the 6-bit predictor/order code, and a
/// wasted-bits flag followed by the unary code of `wasted - 1` when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubframeHeader {
    pub predictor: Predictor,
    pub order: usize,
    pub wasted: u32,
}

impl SubframeHeader {
    pub fn parse<R: Read>(reader: &mut BitReader<R>) -> FlacResult<Self> {
        if reader.read_bit()? {
            return Err(FlacError::InvalidSubframePadding);
        }

        let type_code = reader.read_bits(6)? as u8;
        let (predictor, order) = decode_type_code(type_code)?;

        let wasted = if reader.read_bit()? {
            reader.read_unary()? as u32 + 1
        } else {
            0
        };

        Ok(SubframeHeader {
            predictor,
            order,
            wasted,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut BitWriter<W>) -> FlacResult<()> {
        writer.write_bit(false)?;
        writer.write_bits(encode_type_code(self.predictor, self.order)? as u64, 6)?;
        if self.wasted > 0 {
            writer.write_bit(true)?;
            writer.write_unary(self.wasted as u64 - 1)?;
        } else {
            writer.write_bit(false)?;
        }
        Ok(())
    }
}

/// A decoded subframe: the coded description plus the decoded samples.
///
/// `samples` holds fully decoded values: sign-extended, predicted, and
/// shifted back up by `wasted`. For a side channel the values are the
/// still-decorrelated side samples until [`crate::frame::Frame::parse`]
/// runs inter-channel correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subframe {
    pub predictor: Predictor,
    /// Prediction order; 0 for constant and verbatim subframes.
    pub order: usize,
    /// Wasted bits-per-sample stripped by the encoder.
    pub wasted: u32,
    /// Residual coding method; `None` for constant and verbatim subframes.
    pub residual_method: Option<RiceMethod>,
    /// FIR coefficient precision in bits (1 to 15); 0 when unused.
    pub coeff_precision: u32,
    /// FIR prediction right-shift; 0 when unused.
    pub coeff_shift: i32,
    /// FIR coefficients, highest lag first; empty when unused.
    pub coeffs: Vec<i32>,
    /// Residual partitioning as recorded in the stream.
    pub rice: Option<RicePartitioning>,
    pub samples: Vec<i32>,
}

impl Subframe {
    /// Build a constant subframe holding `value` for `block_size` samples.
    pub fn constant(value: i32, block_size: u16) -> Self {
        Subframe {
            predictor: Predictor::Constant,
            order: 0,
            wasted: 0,
            residual_method: None,
            coeff_precision: 0,
            coeff_shift: 0,
            coeffs: Vec::new(),
            rice: None,
            samples: vec![value; block_size as usize],
        }
    }

    /// Build a verbatim subframe around unencoded samples.
    pub fn verbatim(samples: Vec<i32>) -> Self {
        Subframe {
            predictor: Predictor::Verbatim,
            order: 0,
            wasted: 0,
            residual_method: None,
            coeff_precision: 0,
            coeff_shift: 0,
            coeffs: Vec::new(),
            rice: None,
            samples,
        }
    }

    /// Build a fixed-predictor subframe description.
    pub fn fixed(
        order: usize,
        method: RiceMethod,
        rice: RicePartitioning,
        samples: Vec<i32>,
    ) -> Self {
        Subframe {
            predictor: Predictor::Fixed,
            order,
            wasted: 0,
            residual_method: Some(method),
            coeff_precision: 0,
            coeff_shift: 0,
            coeffs: Vec::new(),
            rice: Some(rice),
            samples,
        }
    }

    /// Build an FIR subframe description.
    #[allow(clippy::too_many_arguments)]
    pub fn fir(
        coeffs: Vec<i32>,
        coeff_precision: u32,
        coeff_shift: i32,
        method: RiceMethod,
        rice: RicePartitioning,
        samples: Vec<i32>,
    ) -> Self {
        Subframe {
            predictor: Predictor::Fir,
            order: coeffs.len(),
            wasted: 0,
            residual_method: Some(method),
            coeff_precision,
            coeff_shift,
            coeffs,
            rice: Some(rice),
            samples,
        }
    }

    /// Decode one subframe. `bps` is the frame's bits-per-sample already
    /// adjusted for the side channel (+1 bit) where applicable.
    pub fn parse<R: Read>(
        reader: &mut BitReader<R>,
        block_size: u16,
        bps: u32,
    ) -> FlacResult<Subframe> {
        let SubframeHeader {
            predictor,
            order,
            wasted,
        } = SubframeHeader::parse(reader)?;

        if wasted >= bps {
            return Err(FlacError::ExcessiveWastedBits { wasted, bps });
        }
        let bps_eff = bps - wasted;
        if bps_eff > 32 {
            return Err(FlacError::unsupported(format!(
                "{bps_eff}-bit samples exceed the 32-bit sample range"
            )));
        }

        let mut subframe = match predictor {
            Predictor::Constant => {
                let value = reader.read_signed(bps_eff)?;
                Subframe::constant(value, block_size)
            }
            Predictor::Verbatim => {
                let mut samples = Vec::with_capacity(block_size as usize);
                for _ in 0..block_size {
                    samples.push(reader.read_signed(bps_eff)?);
                }
                Subframe::verbatim(samples)
            }
            Predictor::Fixed => {
                let warmup = read_warmup(reader, order, bps_eff)?;
                let (method, rice, residuals) = rice::read_residual(reader, block_size, order)?;
                let samples = lpc::restore(&warmup, &residuals, FIXED_COEFFS[order], 0)?;
                Subframe::fixed(order, method, rice, samples)
            }
            Predictor::Fir => {
                let warmup = read_warmup(reader, order, bps_eff)?;

                let precision_code = reader.read_bits(4)? as u32;
                if precision_code == 0b1111 {
                    return Err(FlacError::ReservedCoeffPrecision);
                }
                let coeff_precision = precision_code + 1;

                let coeff_shift = reader.read_signed(5)?;
                if coeff_shift < 0 {
                    return Err(FlacError::NegativeCoeffShift(coeff_shift));
                }

                let mut coeffs = Vec::with_capacity(order);
                for _ in 0..order {
                    coeffs.push(reader.read_signed(coeff_precision)?);
                }

                let (method, rice, residuals) = rice::read_residual(reader, block_size, order)?;
                let samples = lpc::restore(&warmup, &residuals, &coeffs, coeff_shift)?;
                Subframe::fir(coeffs, coeff_precision, coeff_shift, method, rice, samples)
            }
        };

        subframe.order = order;
        subframe.wasted = wasted;
        if wasted > 0 {
            for sample in &mut subframe.samples {
                *sample <<= wasted;
            }
        }

        Ok(subframe)
    }

    /// Serialize the subframe. The inverse of [`Subframe::parse`]: given an
    /// unmodified decoded subframe this reproduces the original bits.
    pub fn write<W: Write>(
        &self,
        writer: &mut BitWriter<W>,
        block_size: u16,
        bps: u32,
    ) -> FlacResult<()> {
        if self.samples.len() != block_size as usize {
            return Err(FlacError::unsupported(format!(
                "subframe holds {} samples but the frame block size is {block_size}",
                self.samples.len()
            )));
        }
        if self.wasted >= bps {
            return Err(FlacError::ExcessiveWastedBits {
                wasted: self.wasted,
                bps,
            });
        }
        let bps_eff = bps - self.wasted;

        SubframeHeader {
            predictor: self.predictor,
            order: self.order,
            wasted: self.wasted,
        }
        .write(writer)?;

        // The stored samples carry the wasted shift; emit without it. The
        // copy keeps the public samples untouched.
        let shifted: Vec<i32>;
        let emitted: &[i32] = if self.wasted > 0 {
            shifted = self.samples.iter().map(|&s| s >> self.wasted).collect();
            &shifted
        } else {
            &self.samples
        };

        match self.predictor {
            Predictor::Constant => {
                let value = emitted[0];
                if emitted.iter().any(|&s| s != value) {
                    return Err(FlacError::unsupported(
                        "constant subframe with non-constant samples",
                    ));
                }
                writer.write_signed(value, bps_eff)?;
            }
            Predictor::Verbatim => {
                for &sample in emitted {
                    writer.write_signed(sample, bps_eff)?;
                }
            }
            Predictor::Fixed => {
                if self.order > MAX_FIXED_ORDER {
                    return Err(FlacError::ReservedSubframeType(0b001000 | self.order as u8));
                }
                for &sample in &emitted[..self.order] {
                    writer.write_signed(sample, bps_eff)?;
                }
                let residuals = lpc::residuals(emitted, FIXED_COEFFS[self.order], 0)?;
                self.write_rice(writer, &residuals, block_size)?;
            }
            Predictor::Fir => {
                if self.coeffs.len() != self.order {
                    return Err(FlacError::CoefficientCountMismatch {
                        order: self.order,
                        count: self.coeffs.len(),
                    });
                }
                if self.coeff_precision == 0 || self.coeff_precision > 15 {
                    return Err(FlacError::ReservedCoeffPrecision);
                }
                for &sample in &emitted[..self.order] {
                    writer.write_signed(sample, bps_eff)?;
                }
                writer.write_bits(self.coeff_precision as u64 - 1, 4)?;
                writer.write_signed(self.coeff_shift, 5)?;
                for &coeff in &self.coeffs {
                    writer.write_signed(coeff, self.coeff_precision)?;
                }
                let residuals = lpc::residuals(emitted, &self.coeffs, self.coeff_shift)?;
                self.write_rice(writer, &residuals, block_size)?;
            }
        }

        Ok(())
    }

    fn write_rice<W: Write>(
        &self,
        writer: &mut BitWriter<W>,
        residuals: &[i32],
        block_size: u16,
    ) -> FlacResult<()> {
        let method = self
            .residual_method
            .ok_or_else(|| FlacError::unsupported("predictive subframe without a residual method"))?;
        let rice = self
            .rice
            .as_ref()
            .ok_or_else(|| FlacError::unsupported("predictive subframe without partitioning"))?;
        rice::write_residual(writer, method, rice, residuals, block_size, self.order)
    }
}

/// Decode the 6-bit predictor/order code.
fn decode_type_code(code: u8) -> FlacResult<(Predictor, usize)> {
    match code {
        0b000000 => Ok((Predictor::Constant, 0)),
        0b000001 => Ok((Predictor::Verbatim, 0)),
        0b001000..=0b001100 => Ok((Predictor::Fixed, (code & 0x07) as usize)),
        0b100000..=0b111111 => Ok((Predictor::Fir, (code & 0x1F) as usize + 1)),
        other => Err(FlacError::ReservedSubframeType(other)),
    }
}

/// Encode the 6-bit predictor/order code.
fn encode_type_code(predictor: Predictor, order: usize) -> FlacResult<u8> {
    match predictor {
        Predictor::Constant => Ok(0b000000),
        Predictor::Verbatim => Ok(0b000001),
        Predictor::Fixed if order <= MAX_FIXED_ORDER => Ok(0b001000 | order as u8),
        Predictor::Fir if (1..=32).contains(&order) => Ok(0b100000 | (order as u8 - 1)),
        _ => Err(FlacError::unsupported(format!(
            "predictor {predictor:?} with order {order}"
        ))),
    }
}

fn read_warmup<R: Read>(
    reader: &mut BitReader<R>,
    order: usize,
    bps_eff: u32,
) -> FlacResult<Vec<i32>> {
    let mut warmup = Vec::with_capacity(order);
    for _ in 0..order {
        warmup.push(reader.read_signed(bps_eff)?);
    }
    Ok(warmup)
}
