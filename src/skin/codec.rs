use std::io::Cursor;
use std::path::PathBuf;

use image::{ImageFormat, RgbaImage};
use serde::Deserialize;

use crate::skin::artifact::Skin;

/// Files produced for one cacheable artifact. Purely in-memory; the
/// store decides whether and where they land on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinFiles {
    /// Directory path relative to the store base, derived from the
    /// geometry identifier with dots turned into path separators.
    pub rel_path: PathBuf,
    pub png: Vec<u8>,
    pub geometry: Vec<u8>,
}

#[derive(Debug)]
pub enum SkinEncodeError {
    /// Pixel buffer length disagrees with the declared bounds.
    Dimensions {
        width: u32,
        height: u32,
        actual: usize,
    },
    Png(String),
}

impl std::fmt::Display for SkinEncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkinEncodeError::Dimensions {
                width,
                height,
                actual,
            } => write!(
                f,
                "pixel buffer holds {} bytes, want {}x{}x4",
                actual, width, height
            ),
            SkinEncodeError::Png(message) => write!(f, "png encode failed: {}", message),
        }
    }
}

impl std::error::Error for SkinEncodeError {}

#[derive(Debug)]
pub enum SkinDecodeError {
    Png(String),
    Geometry(String),
}

impl std::fmt::Display for SkinDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkinDecodeError::Png(message) => write!(f, "png decode failed: {}", message),
            SkinDecodeError::Geometry(message) => {
                write!(f, "geometry document invalid: {}", message)
            }
        }
    }
}

impl std::error::Error for SkinDecodeError {}

// Missing keys decode to empty strings rather than failing; upstream
// servers ship geometry documents in several dialects.
#[derive(Debug, Default, Deserialize)]
struct GeometryDescription {
    #[serde(default)]
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct GeometryEntry {
    #[serde(default)]
    description: GeometryDescription,
}

#[derive(Debug, Deserialize)]
struct GeometryDocument {
    #[serde(rename = "minecraft:geometry", default)]
    entries: Vec<GeometryEntry>,
}

/// Model identifier named by the first geometry entry, or `None` when
/// the document does not parse or names no model. Both are normal
/// nothing-to-cache outcomes (persona-only skins carry no geometry).
pub fn geometry_identifier(geometry: &[u8]) -> Option<String> {
    let document: GeometryDocument = serde_json::from_slice(geometry).ok()?;
    let entry = document.entries.into_iter().next()?;
    Some(entry.description.identifier)
}

/// Dotted model identifier to a relative directory path.
pub fn sanitize_identifier(identifier: &str) -> PathBuf {
    PathBuf::from(identifier.replace('.', std::path::MAIN_SEPARATOR_STR))
}

/// Plans the on-disk representation of a wire artifact: `Ok(None)` when
/// the artifact is not cacheable (unparseable or empty geometry, or a
/// persona model), `Err` only for a genuinely broken artifact. Performs
/// no filesystem access.
pub fn plan_files(skin: &Skin) -> Result<Option<SkinFiles>, SkinEncodeError> {
    let Some(identifier) = geometry_identifier(&skin.geometry) else {
        return Ok(None);
    };
    if identifier.contains("persona") {
        return Ok(None);
    }
    if !skin.dimensions_valid() {
        return Err(SkinEncodeError::Dimensions {
            width: skin.width,
            height: skin.height,
            actual: skin.pixel_data.len(),
        });
    }
    let png = encode_png(skin)?;
    Ok(Some(SkinFiles {
        rel_path: sanitize_identifier(&identifier),
        png,
        geometry: skin.geometry.clone(),
    }))
}

/// Synthesizes a wire artifact from a stored PNG and geometry document.
/// The identity token comes from the calling session's context, never
/// from the files.
pub fn skin_from_files(
    png: &[u8],
    geometry: &[u8],
    skin_id: String,
) -> Result<Skin, SkinDecodeError> {
    serde_json::from_slice::<serde_json::Value>(geometry)
        .map_err(|err| SkinDecodeError::Geometry(err.to_string()))?;
    let decoded = image::load_from_memory_with_format(png, ImageFormat::Png)
        .map_err(|err| SkinDecodeError::Png(err.to_string()))?;
    let rgba = decoded.into_rgba16();
    let (width, height) = rgba.dimensions();
    // Channels are widened to 16 bits and narrowed back with a plain
    // cast. For 16-bit sources this keeps the LOW byte of each sample,
    // matching the behavior the cache format was captured with.
    let pixel_data: Vec<u8> = rgba.as_raw().iter().map(|&sample| sample as u8).collect();
    Ok(Skin::synthesized(
        skin_id,
        width,
        height,
        pixel_data,
        geometry.to_vec(),
    ))
}

fn encode_png(skin: &Skin) -> Result<Vec<u8>, SkinEncodeError> {
    let image = RgbaImage::from_raw(skin.width, skin.height, skin.pixel_data.clone()).ok_or(
        SkinEncodeError::Dimensions {
            width: skin.width,
            height: skin.height,
            actual: skin.pixel_data.len(),
        },
    )?;
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| SkinEncodeError::Png(err.to_string()))?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;
    use image::Rgba;

    const GEOMETRY: &[u8] =
        br#"{"minecraft:geometry":[{"description":{"identifier":"geometry.test.model"}}]}"#;

    fn test_skin(geometry: &[u8]) -> Skin {
        let pixel_data: Vec<u8> = (0u8..24).collect();
        Skin::synthesized("id".to_string(), 3, 2, pixel_data, geometry.to_vec())
    }

    #[test]
    fn plan_produces_sanitized_path() {
        let files = plan_files(&test_skin(GEOMETRY))
            .expect("plan")
            .expect("cacheable");
        assert_eq!(files.rel_path, PathBuf::from("geometry/test/model"));
        assert_eq!(files.geometry, GEOMETRY);
    }

    #[test]
    fn plan_skips_unparseable_geometry() {
        let result = plan_files(&test_skin(b"not json")).expect("plan");
        assert!(result.is_none());
    }

    #[test]
    fn plan_skips_empty_geometry() {
        let result = plan_files(&test_skin(br#"{"minecraft:geometry":[]}"#)).expect("plan");
        assert!(result.is_none());
        let result = plan_files(&test_skin(b"{}")).expect("plan");
        assert!(result.is_none());
    }

    #[test]
    fn plan_skips_persona_model() {
        let geometry =
            br#"{"minecraft:geometry":[{"description":{"identifier":"geometry.persona.custom"}}]}"#;
        let result = plan_files(&test_skin(geometry)).expect("plan");
        assert!(result.is_none());
    }

    #[test]
    fn plan_rejects_dimension_mismatch() {
        let mut skin = test_skin(GEOMETRY);
        skin.pixel_data.pop();
        match plan_files(&skin) {
            Err(SkinEncodeError::Dimensions { actual, .. }) => assert_eq!(actual, 23),
            other => panic!("expected dimension error, got {:?}", other),
        }
    }

    #[test]
    fn pixel_packing_survives_png_roundtrip() {
        let skin = test_skin(GEOMETRY);
        let files = plan_files(&skin).expect("plan").expect("cacheable");
        let decoded = image::load_from_memory_with_format(&files.png, ImageFormat::Png)
            .expect("decode")
            .into_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.as_raw().as_slice(), skin.pixel_data.as_slice());
    }

    #[test]
    fn files_to_wire_to_files_is_lossless_for_8bit() {
        let skin = test_skin(GEOMETRY);
        let files = plan_files(&skin).expect("plan").expect("cacheable");

        let synthesized =
            skin_from_files(&files.png, &files.geometry, "fresh-id".to_string()).expect("decode");
        assert_eq!(synthesized.skin_id, "fresh-id");
        assert_eq!(synthesized.width, 3);
        assert_eq!(synthesized.height, 2);
        assert_eq!(synthesized.pixel_data, skin.pixel_data);
        assert_eq!(synthesized.geometry, skin.geometry);

        let replanned = plan_files(&synthesized).expect("plan").expect("cacheable");
        assert_eq!(replanned.rel_path, files.rel_path);
        let repixels = image::load_from_memory_with_format(&replanned.png, ImageFormat::Png)
            .expect("decode")
            .into_rgba8();
        assert_eq!(repixels.as_raw().as_slice(), skin.pixel_data.as_slice());
    }

    #[test]
    fn sixteen_bit_samples_keep_low_byte() {
        let wide: ImageBuffer<Rgba<u16>, Vec<u16>> =
            ImageBuffer::from_fn(2, 1, |x, _| match x {
                0 => Rgba([0x1234, 0xff00, 0x00ff, 0xffff]),
                _ => Rgba([0xabcd, 0x0102, 0x8081, 0xffff]),
            });
        let mut png = Vec::new();
        wide.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .expect("encode 16-bit png");

        let skin = skin_from_files(&png, b"{}", "id".to_string()).expect("decode");
        assert_eq!(
            skin.pixel_data,
            vec![0x34, 0x00, 0xff, 0xff, 0xcd, 0x02, 0x81, 0xff]
        );
    }

    #[test]
    fn files_to_wire_rejects_bad_geometry_json() {
        let files = plan_files(&test_skin(GEOMETRY))
            .expect("plan")
            .expect("cacheable");
        match skin_from_files(&files.png, b"{ broken", "id".to_string()) {
            Err(SkinDecodeError::Geometry(_)) => {}
            other => panic!("expected geometry error, got {:?}", other),
        }
    }

    #[test]
    fn files_to_wire_rejects_bad_png() {
        match skin_from_files(b"not a png", b"{}", "id".to_string()) {
            Err(SkinDecodeError::Png(_)) => {}
            other => panic!("expected png error, got {:?}", other),
        }
    }

    #[test]
    fn identifier_defaults_when_description_missing() {
        let identifier = geometry_identifier(br#"{"minecraft:geometry":[{}]}"#);
        assert_eq!(identifier, Some(String::new()));
    }
}
