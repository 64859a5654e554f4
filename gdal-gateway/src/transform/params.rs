//! Typed parameters shared by transform requests.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::sanitize_extension;

/// Axis-aligned extent `xmin,ymin,xmax,ymax` in the units of its spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    /// Parse `"xmin,ymin,xmax,ymax"`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!(
                "bbox must have 4 comma-separated components (xmin,ymin,xmax,ymax), got {}",
                parts.len()
            ));
        }

        let mut values = [0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("bbox component '{part}' is not a finite number"))?;
        }

        let [xmin, ymin, xmax, ymax] = values;
        if xmin >= xmax || ymin >= ymax {
            return Err(format!(
                "bbox is empty or inverted: xmin={xmin} xmax={xmax} ymin={ymin} ymax={ymax}"
            ));
        }

        Ok(Self {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.xmin, self.ymin, self.xmax, self.ymax)
    }
}

/// Spatial reference in `AUTHORITY:CODE` form, e.g. `EPSG:4326`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpatialRef(String);

impl SpatialRef {
    /// Accepts a bare EPSG code (`4326`) or `AUTH:CODE` (`epsg:4326`, `ESRI:102100`).
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let (authority, code) = match raw.split_once(':') {
            Some((authority, code)) => (authority.trim(), code.trim()),
            None => ("EPSG", raw),
        };

        let alnum = |s: &str| {
            !s.is_empty() && s.len() <= 16 && s.chars().all(|c| c.is_ascii_alphanumeric())
        };
        if !alnum(authority) || !alnum(code) {
            return Err(format!(
                "invalid spatial reference '{raw}', expected e.g. 4326 or EPSG:4326"
            ));
        }
        if authority.eq_ignore_ascii_case("EPSG") && !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("EPSG code must be numeric, got '{code}'"));
        }

        Ok(Self(format!("{}:{}", authority.to_ascii_uppercase(), code)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpatialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// GDAL/OGR driver short name used as an output format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputFormat(String);

/// Driver name → file extension for the drivers people actually ask for.
const KNOWN_EXTENSIONS: &[(&str, &str)] = &[
    ("GTiff", "tif"),
    ("COG", "tif"),
    ("PNG", "png"),
    ("JPEG", "jpg"),
    ("GIF", "gif"),
    ("BMP", "bmp"),
    ("WEBP", "webp"),
    ("netCDF", "nc"),
    ("HFA", "img"),
    ("AAIGrid", "asc"),
    ("GeoJSON", "geojson"),
    ("GeoJSONSeq", "geojsonl"),
    ("GPKG", "gpkg"),
    ("KML", "kml"),
    ("GML", "gml"),
    ("CSV", "csv"),
    ("FlatGeobuf", "fgb"),
    ("ESRI Shapefile", "shp"),
    ("MapInfo File", "tab"),
];

impl OutputFormat {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= 32
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'));
        if !valid {
            return Err(format!("invalid output format '{raw}'"));
        }

        // Normalize case for known drivers so the extension lookup is stable.
        let canonical = KNOWN_EXTENSIONS
            .iter()
            .find(|(driver, _)| driver.eq_ignore_ascii_case(raw))
            .map(|(driver, _)| (*driver).to_string())
            .unwrap_or_else(|| raw.to_string());
        Ok(Self(canonical))
    }

    pub fn driver(&self) -> &str {
        &self.0
    }

    /// File extension for outputs of this driver.
    pub fn extension(&self) -> String {
        KNOWN_EXTENSIONS
            .iter()
            .find(|(driver, _)| *driver == self.0)
            .map(|(_, ext)| (*ext).to_string())
            .or_else(|| sanitize_extension(&self.0))
            .unwrap_or_else(|| "bin".to_string())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File extension for a WMS image MIME type (`image/png` → `png`).
pub fn image_format_extension(mime: &str) -> String {
    let subtype = mime
        .split(';')
        .next()
        .unwrap_or(mime)
        .rsplit('/')
        .next()
        .unwrap_or(mime)
        .trim()
        .to_ascii_lowercase();
    match subtype.as_str() {
        "jpeg" | "jpg" => "jpg".to_string(),
        "tiff" | "geotiff" => "tif".to_string(),
        other => sanitize_extension(other).unwrap_or_else(|| "bin".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_parse() {
        let bbox = BoundingBox::parse("10,45,11,46").unwrap();
        assert_eq!(bbox.xmin, 10.0);
        assert_eq!(bbox.ymax, 46.0);
        assert_eq!(bbox.to_string(), "10,45,11,46");
    }

    #[test]
    fn test_bbox_parse_tolerates_whitespace() {
        let bbox = BoundingBox::parse(" -180 , -90, 180 ,90 ").unwrap();
        assert_eq!(bbox.xmin, -180.0);
        assert_eq!(bbox.ymin, -90.0);
    }

    #[test]
    fn test_bbox_parse_rejects_malformed() {
        assert!(BoundingBox::parse("10,45,11").unwrap_err().contains("4 comma-separated"));
        assert!(BoundingBox::parse("").is_err());
        assert!(BoundingBox::parse("a,45,11,46").is_err());
        assert!(BoundingBox::parse("10,45,11,NaN").is_err());
        assert!(BoundingBox::parse("11,45,10,46").unwrap_err().contains("inverted"));
    }

    #[test]
    fn test_spatial_ref_parse() {
        assert_eq!(SpatialRef::parse("4326").unwrap().as_str(), "EPSG:4326");
        assert_eq!(SpatialRef::parse("epsg:3857").unwrap().as_str(), "EPSG:3857");
        assert_eq!(SpatialRef::parse("ESRI:102100").unwrap().as_str(), "ESRI:102100");
        assert!(SpatialRef::parse("EPSG:abc").is_err());
        assert!(SpatialRef::parse("4326; rm -rf /").is_err());
        assert!(SpatialRef::parse("").is_err());
    }

    #[test]
    fn test_output_format_extension() {
        assert_eq!(OutputFormat::parse("GTiff").unwrap().extension(), "tif");
        assert_eq!(OutputFormat::parse("png").unwrap().driver(), "PNG");
        assert_eq!(OutputFormat::parse("geojson").unwrap().extension(), "geojson");
        assert_eq!(OutputFormat::parse("ESRI Shapefile").unwrap().extension(), "shp");
        assert_eq!(OutputFormat::parse("Zarr").unwrap().extension(), "zarr");
        assert!(OutputFormat::parse("../x").is_err());
        assert!(OutputFormat::parse("").is_err());
    }

    #[test]
    fn test_image_format_extension() {
        assert_eq!(image_format_extension("image/png"), "png");
        assert_eq!(image_format_extension("image/jpeg"), "jpg");
        assert_eq!(image_format_extension("image/tiff"), "tif");
        assert_eq!(image_format_extension("image/png; mode=8bit"), "png");
    }
}
