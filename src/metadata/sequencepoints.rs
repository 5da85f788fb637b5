//! Sequence point parsing and encoding for method debug information.
//!
//! Sequence points map IL offsets to source code locations. On disk they are stored per method as
//! a compressed, delta-encoded blob in the PortablePDB layout. In memory, a [`SequencePoint`]
//! refers to the instruction it describes by [`InstrId`], so it stays attached to that
//! instruction when the method body is rewritten; the blob is recomputed from the new offsets
//! when the debug symbol file is written.
//!
//! # Key Components
//!
//! - [`RawSequencePoint`] - A sequence point keyed by IL offset, as stored in the blob.
//! - [`SequencePoint`] - A sequence point anchored to an instruction handle.
//! - [`parse_sequence_points`] / [`encode_sequence_points`] - Blob codec.
//!
//! # Sequence Points Blob Format
//!
//! ```text
//! InitialDocument  compressed uint, 1-based document index
//! records:
//!   δIL offset     compressed uint; 0 on any record but the first introduces a document record
//!   [document]     compressed uint, only in document records
//!   ΔLines         compressed uint (end line - start line)
//!   ΔColumns       compressed uint if ΔLines == 0, compressed signed int otherwise
//!   start line     compressed uint for the first visible point, signed delta afterwards
//!   start column   compressed uint for the first visible point, signed delta afterwards
//! ```
//!
//! ΔLines and ΔColumns both zero mark a hidden sequence point, which has no start fields and is
//! reported with start line `0xFEEFEE`.
//!
//! # Usage Examples
//!
//! ```rust
//! use cilcover::metadata::sequencepoints::parse_sequence_points;
//!
//! // document 1; IL_0001 (10,2)-(10,7)
//! let blob: &[u8] = &[1, 1, 0, 5, 10, 2];
//! let points = parse_sequence_points(blob)?;
//! assert_eq!(points.len(), 1);
//! assert_eq!(points[0].end_col, 7);
//! # Ok::<(), cilcover::Error>(())
//! ```
//!
//! ## References
//!
//! - [PortablePDB Spec](https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#sequence-points)

use crate::{
    assembly::InstrId,
    file::{parser::Parser, writer::Writer},
    Result,
};

/// Start line reported for hidden sequence points.
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// Sequence point keyed by IL offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSequencePoint {
    /// Offset in the method's IL stream.
    pub il_offset: u32,
    /// Zero-based index into the document list of the symbol file.
    pub document: usize,
    /// Starting line in the source file.
    pub start_line: u32,
    /// Starting column in the source file.
    pub start_col: u16,
    /// Ending line in the source file.
    pub end_line: u32,
    /// Ending column in the source file.
    pub end_col: u16,
    /// True if this is a hidden sequence point (start_line == 0xFEEFEE).
    pub is_hidden: bool,
}

/// Sequence point anchored to an instruction of a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePoint {
    /// Instruction the source span belongs to.
    pub instruction: InstrId,
    /// Zero-based index into the document list of the symbol file.
    pub document: usize,
    /// Starting line in the source file (1-based).
    pub start_line: u32,
    /// Starting column in the source file (1-based).
    pub start_col: u16,
    /// Ending line in the source file (1-based, inclusive).
    pub end_line: u32,
    /// Ending column in the source file (1-based, exclusive).
    pub end_col: u16,
    /// True if this is a hidden sequence point.
    pub is_hidden: bool,
}

impl SequencePoint {
    /// Anchor `raw` to `instruction`.
    #[must_use]
    pub fn anchor(raw: &RawSequencePoint, instruction: InstrId) -> Self {
        SequencePoint {
            instruction,
            document: raw.document,
            start_line: raw.start_line,
            start_col: raw.start_col,
            end_line: raw.end_line,
            end_col: raw.end_col,
            is_hidden: raw.is_hidden,
        }
    }

    /// Key this point by `il_offset` again.
    #[must_use]
    pub fn to_raw(&self, il_offset: u32) -> RawSequencePoint {
        RawSequencePoint {
            il_offset,
            document: self.document,
            start_line: self.start_line,
            start_col: self.start_col,
            end_line: self.end_line,
            end_col: self.end_col,
            is_hidden: self.is_hidden,
        }
    }
}

fn document_index(value: u32) -> Result<usize> {
    match value.checked_sub(1) {
        Some(index) => Ok(index as usize),
        None => Err(malformed_error!("Sequence point document index 0 is invalid")),
    }
}

fn column(value: i64) -> Result<u16> {
    u16::try_from(value).map_err(|_| malformed_error!("Column {} out of range", value))
}

fn line(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("Line {} out of range", value))
}

/// Parses a sequence points blob.
///
/// # Arguments
/// * `blob` - The raw sequence points blob of one method.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated blobs and [`crate::Error::Malformed`]
/// for invalid document indexes or line/column values.
pub fn parse_sequence_points(blob: &[u8]) -> Result<Vec<RawSequencePoint>> {
    let mut points = Vec::new();
    if blob.is_empty() {
        return Ok(points);
    }

    let mut parser = Parser::new(blob);
    let mut document = document_index(parser.read_compressed_uint()?)?;
    let mut il_offset = 0_u32;
    let mut previous_visible: Option<(u32, u16)> = None;
    let mut first = true;

    while parser.has_more_data() {
        let il_offset_delta = parser.read_compressed_uint()?;
        if !first && il_offset_delta == 0 {
            document = document_index(parser.read_compressed_uint()?)?;
            continue;
        }

        il_offset = if first {
            il_offset_delta
        } else {
            il_offset
                .checked_add(il_offset_delta)
                .ok_or_else(|| malformed_error!("IL offset overflows"))?
        };
        first = false;

        let delta_lines = parser.read_compressed_uint()?;
        let delta_columns = if delta_lines == 0 {
            i64::from(parser.read_compressed_uint()?)
        } else {
            i64::from(parser.read_compressed_int()?)
        };

        if delta_lines == 0 && delta_columns == 0 {
            points.push(RawSequencePoint {
                il_offset,
                document,
                start_line: HIDDEN_LINE,
                start_col: 0,
                end_line: HIDDEN_LINE,
                end_col: 0,
                is_hidden: true,
            });
            continue;
        }

        let (start_line, start_col) = match previous_visible {
            None => (
                parser.read_compressed_uint()?,
                column(i64::from(parser.read_compressed_uint()?))?,
            ),
            Some((previous_line, previous_col)) => (
                line(i64::from(previous_line) + i64::from(parser.read_compressed_int()?))?,
                column(i64::from(previous_col) + i64::from(parser.read_compressed_int()?))?,
            ),
        };
        previous_visible = Some((start_line, start_col));

        points.push(RawSequencePoint {
            il_offset,
            document,
            start_line,
            start_col,
            end_line: line(i64::from(start_line) + i64::from(delta_lines))?,
            end_col: column(i64::from(start_col) + delta_columns)?,
            is_hidden: false,
        });
    }

    Ok(points)
}

fn signed_delta(current: i64, previous: i64) -> Result<i32> {
    i32::try_from(current - previous)
        .map_err(|_| malformed_error!("Sequence point delta {} out of range", current - previous))
}

/// Encodes sequence points into a blob.
///
/// Points must be ordered by strictly increasing IL offset.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the offsets are not strictly increasing or a value
/// does not fit the compressed encoding.
pub fn encode_sequence_points(points: &[RawSequencePoint]) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    let Some(first_point) = points.first() else {
        return Ok(writer.into_inner());
    };

    let mut document = first_point.document;
    writer.write_count(document + 1)?;

    let mut previous_offset: Option<u32> = None;
    let mut previous_visible: Option<(u32, u16)> = None;
    for point in points {
        if point.document != document {
            writer.write_compressed_uint(0)?;
            writer.write_count(point.document + 1)?;
            document = point.document;
        }

        match previous_offset {
            None => writer.write_compressed_uint(point.il_offset)?,
            Some(previous) if point.il_offset > previous => {
                writer.write_compressed_uint(point.il_offset - previous)?;
            }
            Some(previous) => {
                return Err(malformed_error!(
                    "Sequence point at IL_{:04x} does not follow IL_{:04x}",
                    point.il_offset,
                    previous
                ))
            }
        }
        previous_offset = Some(point.il_offset);

        if point.is_hidden {
            writer.write_compressed_uint(0)?;
            writer.write_compressed_uint(0)?;
            continue;
        }

        let Some(delta_lines) = point.end_line.checked_sub(point.start_line) else {
            return Err(malformed_error!(
                "Sequence point ends on line {} before it starts on line {}",
                point.end_line,
                point.start_line
            ));
        };
        let delta_columns = i64::from(point.end_col) - i64::from(point.start_col);
        writer.write_compressed_uint(delta_lines)?;
        if delta_lines == 0 {
            let Ok(delta_columns) = u32::try_from(delta_columns) else {
                return Err(malformed_error!(
                    "Single line sequence point ends at column {} before {}",
                    point.end_col,
                    point.start_col
                ));
            };
            if delta_columns == 0 {
                return Err(malformed_error!(
                    "Empty visible sequence point at IL_{:04x}",
                    point.il_offset
                ));
            }
            writer.write_compressed_uint(delta_columns)?;
        } else {
            writer.write_compressed_int(signed_delta(delta_columns, 0)?)?;
        }

        match previous_visible {
            None => {
                writer.write_compressed_uint(point.start_line)?;
                writer.write_compressed_uint(u32::from(point.start_col))?;
            }
            Some((previous_line, previous_col)) => {
                writer.write_compressed_int(signed_delta(
                    i64::from(point.start_line),
                    i64::from(previous_line),
                )?)?;
                writer.write_compressed_int(signed_delta(
                    i64::from(point.start_col),
                    i64::from(previous_col),
                )?)?;
            }
        }
        previous_visible = Some((point.start_line, point.start_col));
    }

    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible(il_offset: u32, document: usize, lines: (u32, u32), cols: (u16, u16)) -> RawSequencePoint {
        RawSequencePoint {
            il_offset,
            document,
            start_line: lines.0,
            start_col: cols.0,
            end_line: lines.1,
            end_col: cols.1,
            is_hidden: false,
        }
    }

    #[test]
    fn parse_empty_blob() {
        assert!(parse_sequence_points(&[]).unwrap().is_empty());
    }

    #[test]
    fn parse_single_sequence_point() {
        // document 1; il_offset=1, ΔLines=0, ΔColumns=5, start_line=10, start_col=2
        let points = parse_sequence_points(&[1, 1, 0, 5, 10, 2]).unwrap();
        assert_eq!(points, vec![visible(1, 0, (10, 10), (2, 7))]);
    }

    #[test]
    fn parse_hidden_sequence_point() {
        let points = parse_sequence_points(&[1, 0, 0, 0]).unwrap();
        assert_eq!(points.len(), 1);
        assert!(points[0].is_hidden);
        assert_eq!(points[0].start_line, HIDDEN_LINE);
    }

    #[test]
    fn parse_deltas_and_document_records() {
        let blob: &[u8] = &[
            1, // document 1
            0, 0, 3, 5, 9, // IL_0000 (5,9)-(5,12)
            6, 2, 0x01, 0x02, 0x05, // IL_0006 (6,6)-(8,5): ΔColumns -1, Δline +1, Δcol -3
            0, 2, // switch to document 2
            1, 0, 0, // IL_0007 hidden
            3, 0, 1, 0x10, 0x02, // IL_000a (14,7)-(14,8): Δline +8, Δcol +1
        ];

        let points = parse_sequence_points(blob).unwrap();
        assert_eq!(
            points,
            vec![
                visible(0, 0, (5, 5), (9, 12)),
                visible(6, 0, (6, 8), (6, 5)),
                RawSequencePoint {
                    il_offset: 7,
                    document: 1,
                    start_line: HIDDEN_LINE,
                    start_col: 0,
                    end_line: HIDDEN_LINE,
                    end_col: 0,
                    is_hidden: true,
                },
                visible(10, 1, (14, 14), (7, 8)),
            ]
        );

        assert_eq!(encode_sequence_points(&points).unwrap(), blob);
    }

    #[test]
    fn parse_rejects_document_zero() {
        assert!(parse_sequence_points(&[0, 0, 0, 1, 1, 1]).is_err());
    }

    #[test]
    fn encode_rejects_unordered_offsets() {
        let points = [visible(4, 0, (1, 1), (1, 2)), visible(4, 0, (2, 2), (1, 2))];
        assert!(encode_sequence_points(&points).is_err());
    }

    #[test]
    fn anchor_and_rekey() {
        let raw = visible(0x10, 2, (3, 4), (5, 1));
        let anchored = SequencePoint::anchor(&raw, InstrId(7));
        assert_eq!(anchored.instruction, InstrId(7));
        assert_eq!(anchored.to_raw(0x18), RawSequencePoint { il_offset: 0x18, ..raw });
    }
}
