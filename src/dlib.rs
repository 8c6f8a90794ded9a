//! Loader for dlib's `shape_predictor` serialisation format.
//!
//! Reads raw `.dat` files and bzip2-compressed `.dat.bz2` files such as
//! `shape_predictor_68_face_landmarks.dat` from the dlib-models repository:
//!
//! ```bash
//! git clone --depth 1 https://github.com/davisking/dlib-models.git
//! ```
//!
//! Layout of a serialised predictor:
//!
//! ```text
//! version (=1)
//! initial_shape   matrix<float,0,1>          [x0 y0 x1 y1 ...]
//! forests         vector<vector<tree>>       tree = splits, leaf_values
//! anchor_idx      vector<vector<ulong>>      per stage, per sampled pixel
//! deltas          vector<vector<vec2f>>      per stage, per sampled pixel
//! ```

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bzip2::read::BzDecoder;
use tracing::debug;

use crate::error::{Error, Result};
use crate::shape_predictor::{CascadeStage, PixelAnchor, RegressionTree, ShapePredictor, Split};
use crate::types::Point;

/// Decoder for dlib's variable-length primitives.
///
/// Integers: a control byte (bit 7 = sign, low nibble = byte count) followed
/// by little-endian magnitude bytes. Floats: an integer mantissa and an
/// integer exponent, value = mantissa * 2^exponent.
struct Decoder<R: Read> {
    inner: R,
}

impl<R: Read> Decoder<R> {
    fn new(inner: R) -> Self {
        Self { inner }
    }

    fn byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn int(&mut self) -> Result<i64> {
        let control = self.byte()?;
        let len = (control & 0x0F) as usize;
        if len > 8 {
            return Err(Error::InvalidModel(format!(
                "Integer field of {len} bytes"
            )));
        }

        let mut magnitude: u64 = 0;
        for i in 0..len {
            magnitude |= (self.byte()? as u64) << (8 * i);
        }

        let value = if control & 0x80 != 0 {
            -(magnitude as i128)
        } else {
            magnitude as i128
        };
        i64::try_from(value)
            .map_err(|_| Error::InvalidModel(format!("Integer {value} out of range")))
    }

    fn count(&mut self) -> Result<usize> {
        let value = self.int()?;
        usize::try_from(value)
            .map_err(|_| Error::InvalidModel(format!("Negative length or index {value}")))
    }

    fn float(&mut self) -> Result<f32> {
        let mantissa = self.int()?;
        let exponent = self.int()?;
        if mantissa == 0 {
            return Ok(0.0);
        }
        Ok((mantissa as f64 * 2f64.powi(exponent as i32)) as f32)
    }

    /// Column vector of floats; dlib writes the dimensions negated.
    fn column(&mut self) -> Result<Vec<f32>> {
        let rows = self.int()?.unsigned_abs() as usize;
        let cols = self.int()?.unsigned_abs() as usize;
        if cols != 1 {
            return Err(Error::InvalidModel(format!(
                "Expected a column vector, got {rows}x{cols}"
            )));
        }
        (0..rows).map(|_| self.float()).collect()
    }

    fn points(&mut self) -> Result<Vec<Point>> {
        let values = self.column()?;
        if values.len() % 2 != 0 {
            return Err(Error::InvalidModel(format!(
                "Odd coordinate count {}",
                values.len()
            )));
        }
        Ok(values
            .chunks_exact(2)
            .map(|xy| Point::new(xy[0] as f64, xy[1] as f64))
            .collect())
    }

    /// `vector<T>`: element count followed by the elements.
    fn vec<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let len = self.count()?;
        let mut out = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            out.push(item(self)?);
        }
        Ok(out)
    }

    fn tree(&mut self) -> Result<RegressionTree> {
        let splits = self.vec(|d| {
            Ok(Split {
                idx1: d.count()?,
                idx2: d.count()?,
                threshold: d.float()?,
            })
        })?;
        let leaves = self.vec(|d| d.points())?;
        RegressionTree::new(splits, leaves)
    }
}

/// Load a dlib shape predictor; `.bz2` files are decompressed on the fly.
pub fn load_dlib_model<P: AsRef<Path>>(path: P) -> Result<ShapePredictor> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let model = if path.extension().is_some_and(|ext| ext == "bz2") {
        load_dlib_model_from_reader(BzDecoder::new(reader))?
    } else {
        load_dlib_model_from_reader(reader)?
    };

    debug!(
        path = %path.display(),
        landmarks = model.num_landmarks(),
        stages = model.num_cascade_stages(),
        trees = model.num_trees(),
        "loaded landmark model"
    );
    Ok(model)
}

/// Load a dlib shape predictor from an uncompressed stream.
pub fn load_dlib_model_from_reader<R: Read>(reader: R) -> Result<ShapePredictor> {
    let mut d = Decoder::new(reader);

    let version = d.int()?;
    if version != 1 {
        return Err(Error::InvalidModel(format!(
            "Unsupported shape_predictor version: {version}"
        )));
    }

    let mean_shape = d.points()?;
    let forests = d.vec(|d| d.vec(|d| d.tree()))?;
    let anchors = d.vec(|d| d.vec(|d| d.count()))?;
    let deltas = d.vec(|d| {
        d.vec(|d| {
            let x = d.float()?;
            let y = d.float()?;
            Ok(Point::new(x as f64, y as f64))
        })
    })?;

    if anchors.len() != forests.len() || deltas.len() != forests.len() {
        return Err(Error::InvalidModel(format!(
            "{} forests but {} anchor sets and {} delta sets",
            forests.len(),
            anchors.len(),
            deltas.len()
        )));
    }

    let mut stages = Vec::with_capacity(forests.len());
    for (level, ((trees, anchor_idx), offsets)) in
        forests.into_iter().zip(anchors).zip(deltas).enumerate()
    {
        if anchor_idx.len() != offsets.len() {
            return Err(Error::InvalidModel(format!(
                "Stage {level}: {} anchors but {} deltas",
                anchor_idx.len(),
                offsets.len()
            )));
        }
        let pixels = anchor_idx
            .into_iter()
            .zip(offsets)
            .map(|(landmark, offset)| PixelAnchor { landmark, offset })
            .collect();
        stages.push(CascadeStage::new(pixels, trees));
    }

    ShapePredictor::new(mean_shape, stages)
}
