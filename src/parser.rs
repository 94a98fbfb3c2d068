//! Field file parsers: extension registry, native `.vxg` format and NumPy `.npy` arrays

use crate::field::Shape;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Converts an on-disk file into a flat array of doubles. `shape_only` must
/// not read the payload; preprocess latency depends on it.
pub trait FieldParser: Send + Sync {
    fn shape_only(&self, path: &Path) -> Result<Shape>;
    fn full(&self, path: &Path) -> Result<(Shape, Vec<f64>)>;
}

/// Resolve a parser by file extension, `None` when the extension is unknown
pub fn parser_for(path: &Path) -> Option<&'static dyn FieldParser> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("vxg") => Some(&VxgParser),
        Some("npy") => Some(&NpyParser),
        _ => None,
    }
}

// ============================================================================
// Native format
// ============================================================================

/// Native field format: `VXG1` magic, three little-endian u64 dims
/// (nx, ny, nz), then nx*ny*nz little-endian f64 samples, x fastest.
pub struct VxgParser;

const VXG_MAGIC: &[u8; 4] = b"VXG1";
const VXG_HEADER_LEN: u64 = 4 + 3 * 8;

impl VxgParser {
    fn read_header(&self, reader: &mut impl Read) -> Result<Shape> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).context("file too short for header")?;
        if &magic != VXG_MAGIC {
            anyhow::bail!("bad magic: expected VXG1");
        }

        let mut dims = [0u64; 3];
        for d in &mut dims {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf).context("file too short for dims")?;
            *d = u64::from_le_bytes(buf);
        }
        Ok(Shape::from(dims))
    }
}

impl FieldParser for VxgParser {
    fn shape_only(&self, path: &Path) -> Result<Shape> {
        let mut reader = BufReader::new(File::open(path)?);
        self.read_header(&mut reader)
    }

    fn full(&self, path: &Path) -> Result<(Shape, Vec<f64>)> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let shape = self.read_header(&mut reader)?;

        let expected = shape.len() * 8;
        if file_len != VXG_HEADER_LEN + expected {
            anyhow::bail!(
                "payload is {} bytes, shape {} requires {}",
                file_len.saturating_sub(VXG_HEADER_LEN),
                shape,
                expected
            );
        }

        let mut payload = vec![0u8; expected as usize];
        reader.read_exact(&mut payload)?;
        let values = crate::field::decode_f64_le(&payload)?;
        Ok((shape, values))
    }
}

// ============================================================================
// NumPy format
// ============================================================================

/// NumPy `.npy` arrays, format version 1.0 or 2.0. Accepts `descr: '<f8'`,
/// C order, 3-D shape. The npy shape tuple is stored slowest-to-fastest, so
/// a tuple `(a, b, c)` maps to nx=c, ny=b, nz=a.
pub struct NpyParser;

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

struct NpyHeader {
    shape: Shape,
    payload_offset: u64,
}

impl NpyParser {
    fn read_header(&self, reader: &mut impl Read) -> Result<NpyHeader> {
        let mut magic = [0u8; 6];
        reader.read_exact(&mut magic).context("file too short for header")?;
        if &magic != NPY_MAGIC {
            anyhow::bail!("bad magic: not an npy file");
        }

        let mut version = [0u8; 2];
        reader.read_exact(&mut version)?;
        let (header_len, preamble) = match version[0] {
            1 => {
                let mut buf = [0u8; 2];
                reader.read_exact(&mut buf)?;
                (u16::from_le_bytes(buf) as u64, 10u64)
            }
            2 => {
                let mut buf = [0u8; 4];
                reader.read_exact(&mut buf)?;
                (u32::from_le_bytes(buf) as u64, 12u64)
            }
            v => anyhow::bail!("unsupported npy version {}.{}", v, version[1]),
        };

        let mut header = vec![0u8; header_len as usize];
        reader.read_exact(&mut header).context("truncated npy header")?;
        let header = std::str::from_utf8(&header).context("npy header is not utf-8")?;

        if !header.contains("'descr': '<f8'") && !header.contains("\"descr\": \"<f8\"") {
            anyhow::bail!("unsupported dtype: expected little-endian f8");
        }
        if header.contains("'fortran_order': True") {
            anyhow::bail!("fortran-order arrays are not supported");
        }

        let dims = parse_npy_shape(header)?;
        if dims.len() != 3 {
            anyhow::bail!("expected a 3-d array, got {} dims", dims.len());
        }

        Ok(NpyHeader {
            // npy tuples run slowest-to-fastest
            shape: Shape::new(dims[2], dims[1], dims[0]),
            payload_offset: preamble + header_len,
        })
    }
}

/// Extract the dims from the `'shape': (a, b, c)` entry of an npy header dict
fn parse_npy_shape(header: &str) -> Result<Vec<u64>> {
    let start = header
        .find("'shape':")
        .or_else(|| header.find("\"shape\":"))
        .context("npy header has no shape entry")?;
    let rest = &header[start..];
    let open = rest.find('(').context("malformed shape entry")?;
    let close = rest.find(')').context("malformed shape entry")?;

    rest[open + 1..close]
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().context("non-integer dim in shape"))
        .collect()
}

impl FieldParser for NpyParser {
    fn shape_only(&self, path: &Path) -> Result<Shape> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(self.read_header(&mut reader)?.shape)
    }

    fn full(&self, path: &Path) -> Result<(Shape, Vec<f64>)> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let header = self.read_header(&mut reader)?;

        let expected = header.shape.len() * 8;
        if file_len != header.payload_offset + expected {
            anyhow::bail!(
                "payload is {} bytes, shape {} requires {}",
                file_len.saturating_sub(header.payload_offset),
                header.shape,
                expected
            );
        }

        reader.seek(SeekFrom::Start(header.payload_offset))?;
        let mut payload = vec![0u8; expected as usize];
        reader.read_exact(&mut payload)?;
        let values = crate::field::decode_f64_le(&payload)?;
        Ok((header.shape, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Write a .vxg file whose sample at flat index i is i as f64
    pub fn write_vxg(path: &Path, shape: Shape) -> Result<Vec<f64>> {
        let values: Vec<f64> = (0..shape.len()).map(|i| i as f64).collect();
        let mut file = File::create(path)?;
        file.write_all(VXG_MAGIC)?;
        for d in [shape.nx, shape.ny, shape.nz] {
            file.write_all(&d.to_le_bytes())?;
        }
        file.write_all(&crate::field::encode_f64_le(&values))?;
        Ok(values)
    }

    fn write_npy(path: &Path, dims: (u64, u64, u64), values: &[f64]) -> Result<()> {
        let dict = format!(
            "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, {}, {}), }}",
            dims.0, dims.1, dims.2
        );
        // pad so the payload starts at a 64-byte boundary, newline-terminated
        let unpadded = 10 + dict.len() + 1;
        let padding = (64 - unpadded % 64) % 64;
        let header = format!("{}{}\n", dict, " ".repeat(padding));

        let mut file = File::create(path)?;
        file.write_all(NPY_MAGIC)?;
        file.write_all(&[1, 0])?;
        file.write_all(&(header.len() as u16).to_le_bytes())?;
        file.write_all(header.as_bytes())?;
        file.write_all(&crate::field::encode_f64_le(values))?;
        Ok(())
    }

    #[test]
    fn test_vxg_shape_only_and_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("field.vxg");
        let shape = Shape::new(4, 4, 4);
        let values = write_vxg(&path, shape).unwrap();

        let parser = parser_for(&path).unwrap();
        assert_eq!(parser.shape_only(&path).unwrap(), shape);

        let (full_shape, full_values) = parser.full(&path).unwrap();
        assert_eq!(full_shape, shape);
        assert_eq!(full_values, values);
    }

    #[test]
    fn test_vxg_rejects_truncated_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.vxg");
        write_vxg(&path, Shape::new(2, 2, 2)).unwrap();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(VXG_HEADER_LEN + 8).unwrap();

        let parser = parser_for(&path).unwrap();
        assert!(parser.shape_only(&path).is_ok());
        assert!(parser.full(&path).is_err());
    }

    #[test]
    fn test_vxg_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.vxg");
        std::fs::write(&path, b"NOPE____________________________").unwrap();
        assert!(VxgParser.shape_only(&path).is_err());
    }

    #[test]
    fn test_npy_shape_axis_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("field.npy");
        let values: Vec<f64> = (0..30).map(|i| i as f64 * 0.5).collect();
        // npy tuple (nz, ny, nx) = (2, 3, 5)
        write_npy(&path, (2, 3, 5), &values).unwrap();

        let parser = parser_for(&path).unwrap();
        let shape = parser.shape_only(&path).unwrap();
        assert_eq!(shape, Shape::new(5, 3, 2));

        let (_, full_values) = parser.full(&path).unwrap();
        assert_eq!(full_values, values);
    }

    #[test]
    fn test_npy_rejects_wrong_dtype() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f32.npy");
        let dict = "{'descr': '<f4', 'fortran_order': False, 'shape': (2, 2, 2), }\n";
        let mut file = File::create(&path).unwrap();
        file.write_all(NPY_MAGIC).unwrap();
        file.write_all(&[1, 0]).unwrap();
        file.write_all(&(dict.len() as u16).to_le_bytes()).unwrap();
        file.write_all(dict.as_bytes()).unwrap();

        assert!(NpyParser.shape_only(&path).is_err());
    }

    #[test]
    fn test_unknown_extension_has_no_parser() {
        assert!(parser_for(Path::new("field.csv")).is_none());
        assert!(parser_for(Path::new("field")).is_none());
    }
}
