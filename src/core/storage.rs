//! Weight checkpoint files.
//!
//! Layout:
//! - magic: `DYNADAPT` (8 bytes)
//! - version: u32
//! - chunks: `[tag: [u8;4]][len: u32][payload]`, repeated
//!
//! Each `SNAP` chunk is one weight snapshot. Its payload is LZ4-compressed and
//! preceded by the uncompressed length (u32); uncompressed it is
//! `rows: u32, cols: u32` followed by `rows*cols` little-endian f64 values in
//! row-major order. Snapshots are stored `(neurons × joints)`; the loader hands
//! them back transposed to `(joints × neurons)`.
//!
//! Unknown chunks are skipped for forward-compatibility.

use std::fs::{self, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::ConfigError;

pub const MAGIC: &[u8; 8] = b"DYNADAPT";
pub const VERSION_V1: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_V1;

const SNAPSHOT_TAG: [u8; 4] = *b"SNAP";
/// Upper bound on how far an LZ4 block can expand.
const MAX_LZ4_RATIO: usize = 255;

/// Dense row-major matrix of f64.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl WeightMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> io::Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "matrix data length does not match shape",
            ));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, r: usize) -> &mut [f64] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    /// Frobenius norm.
    pub fn norm(&self) -> f64 {
        self.data.iter().map(|w| w * w).sum::<f64>().sqrt()
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&w| w == 0.0)
    }
}

// =========================================================================
// Codec helpers
// =========================================================================

pub fn compress_lz4(input: &[u8]) -> Vec<u8> {
    lz4_flex::compress(input)
}

pub fn decompress_lz4(input: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
    // Strict format: raw LZ4 block with external expected size.
    lz4_flex::decompress(input, expected_size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "lz4 decompression failed"))
}

pub fn write_u32_le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f64_le<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_f64_le<R: Read>(r: &mut R) -> io::Result<f64> {
    Ok(f64::from_le_bytes(read_exact::<8, _>(r)?))
}

/// Write an LZ4 chunk: the uncompressed length (u32) followed by the
/// compressed block. `len` in the header covers both.
pub fn write_chunk_lz4<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    let compressed = compress_lz4(payload);
    let uncompressed_len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?;
    let total_len = 4u32.saturating_add(
        u32::try_from(compressed.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?,
    );

    w.write_all(&tag)?;
    write_u32_le(w, total_len)?;
    write_u32_le(w, uncompressed_len)?;
    w.write_all(&compressed)
}

pub fn read_chunk_header<R: Read>(r: &mut R) -> io::Result<([u8; 4], u32)> {
    let tag = read_exact::<4, _>(r)?;
    let len = read_u32_le(r)?;
    Ok((tag, len))
}

pub fn write_header<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_all(MAGIC)?;
    write_u32_le(w, VERSION_CURRENT)
}

fn read_header<R: Read>(r: &mut R) -> io::Result<()> {
    let magic = read_exact::<8, _>(r)?;
    if &magic != MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "bad weight file magic",
        ));
    }
    let version = read_u32_le(r)?;
    if version != VERSION_V1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported weight file version",
        ));
    }
    Ok(())
}

// =========================================================================
// Snapshots
// =========================================================================

/// Append one snapshot chunk. `transform` is `(joints × neurons)`; it is
/// written in the stored `(neurons × joints)` orientation.
pub fn write_snapshot<W: Write>(w: &mut W, transform: &WeightMatrix) -> io::Result<()> {
    let stored = transform.transpose();
    let mut payload = Vec::with_capacity(8 + stored.data.len() * 8);
    write_u32_le(&mut payload, stored.rows as u32)?;
    write_u32_le(&mut payload, stored.cols as u32)?;
    for &v in &stored.data {
        write_f64_le(&mut payload, v)?;
    }
    write_chunk_lz4(w, SNAPSHOT_TAG, &payload)
}

fn read_snapshot_payload<R: Read>(r: &mut R, len: u32) -> io::Result<WeightMatrix> {
    if len < 4 {
        return Err(invalid_data("SNAP chunk too short"));
    }
    let uncompressed_len = read_u32_le(r)? as usize;
    let compressed_len = len as usize - 4;
    let mut compressed = Vec::new();
    r.take(compressed_len as u64).read_to_end(&mut compressed)?;
    if compressed.len() != compressed_len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "SNAP chunk truncated"));
    }
    if uncompressed_len > compressed_len.saturating_mul(MAX_LZ4_RATIO) {
        return Err(invalid_data("SNAP declared size exceeds what its payload can expand to"));
    }
    let payload = decompress_lz4(&compressed, uncompressed_len)?;

    let mut cur = io::Cursor::new(payload.as_slice());
    let rows = read_u32_le(&mut cur)? as usize;
    let cols = read_u32_le(&mut cur)? as usize;
    let count = rows
        .checked_mul(cols)
        .filter(|n| n.checked_mul(8).and_then(|b| b.checked_add(8)) == Some(payload.len()))
        .ok_or_else(|| invalid_data("SNAP shape does not match payload length"))?;
    let mut data = Vec::with_capacity(count);
    for _ in 0..count {
        data.push(read_f64_le(&mut cur)?);
    }
    WeightMatrix::from_vec(rows, cols, data)
}

fn invalid_data(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Read every snapshot in the stream, in stored `(neurons × joints)` orientation.
pub fn read_snapshots<R: Read>(r: &mut R) -> io::Result<Vec<WeightMatrix>> {
    read_header(r)?;

    let mut snapshots = Vec::new();
    loop {
        let (tag, len) = match read_chunk_header(r) {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };

        let mut take = r.take(len as u64);
        if tag == SNAPSHOT_TAG {
            snapshots.push(read_snapshot_payload(&mut take, len)?);
        }
        // Drain any remaining payload bytes for unknown or partially-read chunks.
        io::copy(&mut take, &mut io::sink())?;
    }
    Ok(snapshots)
}

/// Last snapshot in the file, transposed to `(joints × neurons)`.
/// `Ok(None)` when the file exists but holds no snapshot.
pub fn load_last_snapshot(path: &Path) -> io::Result<Option<WeightMatrix>> {
    let file = fs::File::open(path)?;
    let mut r = BufReader::new(file);
    let snapshots = read_snapshots(&mut r)?;
    Ok(snapshots.last().map(WeightMatrix::transpose))
}

/// Append a snapshot to `path`, creating the file (with header) if needed.
pub fn append_snapshot(path: &Path, transform: &WeightMatrix) -> io::Result<()> {
    let fresh = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut w = BufWriter::new(file);
    if fresh {
        write_header(&mut w)?;
    }
    write_snapshot(&mut w, transform)?;
    w.flush()?;
    debug!(path = %path.display(), shape = ?transform.shape(), "weight snapshot appended");
    Ok(())
}

/// Initial transform for one population: the last checkpoint in `path` if it
/// exists, otherwise zeros of shape `(joints × neurons)`.
pub fn load_transform(
    path: Option<&Path>,
    joints: usize,
    neurons: usize,
) -> Result<WeightMatrix, ConfigError> {
    let path = match path {
        Some(p) if !p.as_os_str().is_empty() && p.is_file() => p,
        _ => {
            info!(joints, neurons, "no weight checkpoint; starting from zeros");
            return Ok(WeightMatrix::zeros(joints, neurons));
        }
    };

    let loaded = load_last_snapshot(path).map_err(|source| ConfigError::WeightFile {
        path: path.to_path_buf(),
        source,
    })?;

    let Some(transform) = loaded else {
        info!(path = %path.display(), "weight file has no snapshots; starting from zeros");
        return Ok(WeightMatrix::zeros(joints, neurons));
    };

    if transform.shape() != (joints, neurons) {
        return Err(ConfigError::WeightShape {
            path: path.to_path_buf(),
            rows: transform.rows(),
            cols: transform.cols(),
            expected_rows: joints,
            expected_cols: neurons,
        });
    }

    info!(
        path = %path.display(),
        all_zero = transform.is_zero(),
        "loaded weight checkpoint"
    );
    Ok(transform)
}
