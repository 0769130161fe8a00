use crate::error::{Result, StarshotError};
use crate::geometry::Point;
use bumpalo::Bump;
use fitrs::{Fits, FitsData};
use std::path::Path;

/// Summary statistics of an image's intensities
#[derive(Debug, Clone, serde::Serialize)]
pub struct ImageStatistics {
    pub width: usize,
    pub height: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

/// Star-shot film or EPID frame: a read-only grid of non-negative intensities
/// plus the physical size of one pixel.
#[derive(Debug, Clone)]
pub struct StarshotImage {
    width: usize,
    height: usize,
    pixel_size_mm: f64,
    data: Vec<f32>, // Row-major, `y * width + x`
}

impl StarshotImage {
    /// Build an image from row-major samples
    pub fn from_raw(width: usize, height: usize, data: Vec<f32>, pixel_size_mm: f64) -> Result<Self> {
        if width < 2 || height < 2 {
            return Err(StarshotError::InvalidImage(format!(
                "Image must be at least 2x2 pixels, got {}x{}",
                width, height
            )));
        }
        if data.len() != width * height {
            return Err(StarshotError::InvalidImage(format!(
                "Data size mismatch: expected {} pixels, got {}",
                width * height,
                data.len()
            )));
        }
        if !(pixel_size_mm.is_finite() && pixel_size_mm > 0.0) {
            return Err(StarshotError::InvalidImage(format!(
                "Pixel size must be a positive number of millimetres, got {}",
                pixel_size_mm
            )));
        }
        if let Some(bad) = data.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(StarshotError::InvalidImage(format!(
                "Intensities must be finite and non-negative, found {}",
                bad
            )));
        }
        Ok(Self {
            width,
            height,
            pixel_size_mm,
            data,
        })
    }

    /// Load an image from disk. FITS files are recognised by extension,
    /// everything else goes through the `image` crate decoders.
    pub fn from_file(path: &Path, pixel_size_mm: f64) -> Result<Self> {
        let is_fits = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_lowercase().as_str(), "fits" | "fit" | "fts"))
            .unwrap_or(false);

        if is_fits {
            Self::from_fits_file(path, pixel_size_mm)
        } else {
            let decoded = image::open(path)?;
            Self::from_dynamic(decoded, pixel_size_mm)
        }
    }

    /// Decode an in-memory raster (PNG, TIFF, JPEG, ...)
    pub fn from_bytes(bytes: &[u8], pixel_size_mm: f64) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)?;
        Self::from_dynamic(decoded, pixel_size_mm)
    }

    fn from_dynamic(decoded: image::DynamicImage, pixel_size_mm: f64) -> Result<Self> {
        let gray = decoded.into_luma16();
        let width = gray.width() as usize;
        let height = gray.height() as usize;
        let data = gray.into_raw().into_iter().map(|v| v as f32).collect();
        Self::from_raw(width, height, data, pixel_size_mm)
    }

    /// Load the primary HDU of a FITS file, applying BZERO/BSCALE
    fn from_fits_file(path: &Path, pixel_size_mm: f64) -> Result<Self> {
        let fits = Fits::open(path).map_err(|e| {
            StarshotError::InvalidImage(format!("Failed to open FITS file {}: {}", path.display(), e))
        })?;

        let hdu = fits
            .get(0)
            .ok_or_else(|| StarshotError::InvalidImage("No primary HDU found in FITS file".to_string()))?;

        let header_int = |key: &str| -> Result<i64> {
            match hdu.value(key) {
                Some(fitrs::HeaderValue::IntegerNumber(n)) => Ok(*n as i64),
                Some(_) => Err(StarshotError::InvalidImage(format!("{} is not an integer", key))),
                None => Err(StarshotError::InvalidImage(format!("Missing {} header", key))),
            }
        };
        let header_real = |key: &str, default: f64| -> f64 {
            match hdu.value(key) {
                Some(fitrs::HeaderValue::IntegerNumber(n)) => *n as f64,
                Some(fitrs::HeaderValue::RealFloatingNumber(f)) => *f,
                _ => default,
            }
        };

        let naxis = header_int("NAXIS")?;
        if naxis < 2 {
            return Err(StarshotError::InvalidImage(format!(
                "FITS file does not contain 2D image data (NAXIS={})",
                naxis
            )));
        }
        let width = header_int("NAXIS1")? as usize;
        let height = header_int("NAXIS2")? as usize;
        let bzero = header_real("BZERO", 0.0);
        let bscale = header_real("BSCALE", 1.0);
        let physical = |raw: f64| (bzero + bscale * raw).max(0.0) as f32;

        // Only the first plane of a cube is used
        let plane = width * height;
        let data: Vec<f32> = match hdu.read_data() {
            FitsData::Characters(_) => {
                return Err(StarshotError::InvalidImage(
                    "FITS file contains character data, not image data".to_string(),
                ));
            }
            FitsData::IntegersI32(array) => array
                .data
                .iter()
                .take(plane)
                .map(|x| match x {
                    Some(v) => physical(*v as f64),
                    None => 0.0,
                })
                .collect(),
            FitsData::IntegersU32(array) => array
                .data
                .iter()
                .take(plane)
                .map(|x| match x {
                    Some(v) => physical(*v as f64),
                    None => 0.0,
                })
                .collect(),
            FitsData::FloatingPoint32(array) => array
                .data
                .iter()
                .take(plane)
                .map(|&x| if x.is_finite() { physical(x as f64) } else { 0.0 })
                .collect(),
            FitsData::FloatingPoint64(array) => array
                .data
                .iter()
                .take(plane)
                .map(|&x| if x.is_finite() { physical(x) } else { 0.0 })
                .collect(),
        };

        Self::from_raw(width, height, data, pixel_size_mm)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel_size_mm(&self) -> f64 {
        self.pixel_size_mm
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Center of the pixel grid
    pub fn geometric_center(&self) -> Point {
        Point::new((self.width - 1) as f64 / 2.0, (self.height - 1) as f64 / 2.0)
    }

    /// Bilinear interpolation for sub-pixel sampling, clamped to the grid
    pub fn bilinear_sample(&self, x: f64, y: f64) -> f64 {
        let width = self.width;
        let height = self.height;
        let x = x.max(0.0).min((width - 1) as f64);
        let y = y.max(0.0).min((height - 1) as f64);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);

        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let p00 = self.data[y0 * width + x0] as f64;
        let p10 = self.data[y0 * width + x1] as f64;
        let p01 = self.data[y1 * width + x0] as f64;
        let p11 = self.data[y1 * width + x1] as f64;

        let p0 = p00 * (1.0 - fx) + p10 * fx;
        let p1 = p01 * (1.0 - fx) + p11 * fx;
        p0 * (1.0 - fy) + p1 * fy
    }

    /// Negative of the image, for films where the spokes are dark
    pub fn inverted(&self) -> StarshotImage {
        let max = self.data.iter().copied().fold(0.0f32, f32::max);
        StarshotImage {
            width: self.width,
            height: self.height,
            pixel_size_mm: self.pixel_size_mm,
            data: self.data.iter().map(|&v| max - v).collect(),
        }
    }

    /// Intensity at quantile `q` (0-1)
    pub fn percentile(&self, q: f64) -> f32 {
        // Scratch copy for the partial sort
        let arena = Bump::new();
        let mut scratch = bumpalo::vec![in &arena];
        scratch.extend_from_slice(&self.data);
        let rank = ((scratch.len() - 1) as f64 * q.clamp(0.0, 1.0)).round() as usize;
        let (_, value, _) = scratch.select_nth_unstable_by(rank, |a, b| a.total_cmp(b));
        *value
    }

    /// Intensities at several quantiles with a single sort
    pub fn percentiles(&self, qs: &[f64]) -> Vec<f32> {
        let arena = Bump::new();
        let mut scratch = bumpalo::vec![in &arena];
        scratch.extend_from_slice(&self.data);
        scratch.sort_unstable_by(|a, b| a.total_cmp(b));
        let last = (scratch.len() - 1) as f64;
        qs.iter()
            .map(|q| scratch[(last * q.clamp(0.0, 1.0)).round() as usize])
            .collect()
    }

    /// Whether the spokes look darker than the film.
    ///
    /// Spokes cover a small share of the film, so the median sits with the
    /// background. On a normal film the bright tail above the median is the
    /// longer one; on a negative it is the dark tail below it.
    pub fn needs_inversion(&self) -> bool {
        let p = self.percentiles(&[0.04, 0.5, 0.96]);
        let (low, median, high) = (p[0] as f64, p[1] as f64, p[2] as f64);
        median - low > high - median
    }

    /// Centroid of the pixels at or above `threshold`, weighted by their
    /// excess over it. Falls back to equal weights when every qualifying
    /// pixel sits exactly on the threshold (saturated films).
    pub fn bright_centroid(&self, threshold: f32) -> Option<Point> {
        let (mut sum_w, mut sum_wx, mut sum_wy) = (0.0f64, 0.0f64, 0.0f64);
        let (mut count, mut sum_x, mut sum_y) = (0usize, 0.0f64, 0.0f64);
        for y in 0..self.height {
            let row = &self.data[y * self.width..(y + 1) * self.width];
            for (x, &v) in row.iter().enumerate() {
                if v >= threshold {
                    let w = (v - threshold) as f64;
                    sum_w += w;
                    sum_wx += w * x as f64;
                    sum_wy += w * y as f64;
                    count += 1;
                    sum_x += x as f64;
                    sum_y += y as f64;
                }
            }
        }
        if sum_w > 0.0 {
            Some(Point::new(sum_wx / sum_w, sum_wy / sum_w))
        } else if count > 0 {
            Some(Point::new(sum_x / count as f64, sum_y / count as f64))
        } else {
            None
        }
    }

    pub fn statistics(&self) -> ImageStatistics {
        let n = self.data.len() as f64;
        let mean = self.data.iter().map(|&v| v as f64).sum::<f64>() / n;
        let (min, max) = self
            .data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        ImageStatistics {
            width: self.width,
            height: self.height,
            mean,
            median: self.percentile(0.5) as f64,
            min: min as f64,
            max: max as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(width: usize, height: usize) -> StarshotImage {
        let data = (0..width * height).map(|i| (i % width) as f32).collect();
        StarshotImage::from_raw(width, height, data, 0.25).unwrap()
    }

    #[test]
    fn test_from_raw_rejects_size_mismatch() {
        let result = StarshotImage::from_raw(4, 4, vec![0.0; 15], 1.0);
        assert!(matches!(result, Err(StarshotError::InvalidImage(_))));
    }

    #[test]
    fn test_from_raw_rejects_negative_values() {
        let mut data = vec![1.0; 16];
        data[5] = -1.0;
        assert!(StarshotImage::from_raw(4, 4, data, 1.0).is_err());
    }

    #[test]
    fn test_from_raw_rejects_bad_pixel_size() {
        assert!(StarshotImage::from_raw(4, 4, vec![0.0; 16], 0.0).is_err());
        assert!(StarshotImage::from_raw(4, 4, vec![0.0; 16], f64::NAN).is_err());
    }

    #[test]
    fn test_bilinear_sample_on_ramp() {
        let img = ramp(10, 5);
        assert_relative_eq!(img.bilinear_sample(3.25, 2.7), 3.25, epsilon = 1e-9);
        assert_relative_eq!(img.bilinear_sample(9.0, 4.0), 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inverted_swaps_dark_and_bright() {
        let img = ramp(10, 5);
        let inv = img.inverted();
        assert_eq!(inv.get(0, 0), 9.0);
        assert_eq!(inv.get(9, 0), 0.0);
    }

    #[test]
    fn test_percentile_and_statistics() {
        let img = ramp(11, 3);
        assert_eq!(img.percentile(0.0), 0.0);
        assert_eq!(img.percentile(1.0), 10.0);
        let stats = img.statistics();
        assert_eq!(stats.median, 5.0);
        assert_relative_eq!(stats.mean, 5.0, epsilon = 1e-9);
        assert_eq!(stats.max, 10.0);
    }

    #[test]
    fn test_percentiles_match_percentile() {
        let img = ramp(11, 3);
        let p = img.percentiles(&[0.0, 0.5, 1.0]);
        assert_eq!(p, vec![img.percentile(0.0), img.percentile(0.5), img.percentile(1.0)]);
    }

    #[test]
    fn test_needs_inversion_follows_the_long_tail() {
        // Dim background with a few bright lines
        let data = (0..50 * 50)
            .map(|i| if i % 10 == 5 { 900.0 } else { 100.0 + (i % 7) as f32 })
            .collect();
        let img = StarshotImage::from_raw(50, 50, data, 1.0).unwrap();
        assert!(!img.needs_inversion());
        assert!(img.inverted().needs_inversion());
    }

    #[test]
    fn test_bright_centroid_finds_bright_spot() {
        let mut data = vec![0.0f32; 20 * 20];
        data[7 * 20 + 12] = 10.0;
        data[7 * 20 + 13] = 10.0;
        data[15 * 20 + 2] = 4.0;
        let img = StarshotImage::from_raw(20, 20, data, 1.0).unwrap();

        let c = img.bright_centroid(5.0).unwrap();
        assert_relative_eq!(c.x, 12.5, epsilon = 1e-9);
        assert_relative_eq!(c.y, 7.0, epsilon = 1e-9);

        // Saturated plateau: every qualifying pixel equals the threshold
        let c = img.bright_centroid(10.0).unwrap();
        assert_relative_eq!(c.x, 12.5, epsilon = 1e-9);

        assert!(img.bright_centroid(11.0).is_none());
    }

    #[test]
    fn test_from_bytes_decodes_png() {
        let mut buffer = image::GrayImage::new(8, 6);
        buffer.put_pixel(3, 2, image::Luma([200u8]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageLuma8(buffer)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let img = StarshotImage::from_bytes(&bytes, 0.4).unwrap();
        assert_eq!(img.width(), 8);
        assert_eq!(img.height(), 6);
        // 8-bit values are widened to 16-bit
        assert_eq!(img.get(3, 2), 200.0 * 257.0);
        assert_eq!(img.get(0, 0), 0.0);
    }
}
