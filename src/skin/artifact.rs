/// Resource patch substituted when an artifact is synthesized from disk
/// instead of read off the wire.
pub const DEFAULT_RESOURCE_PATCH: &str =
    r#"{"geometry":{"default":"geometry.hive.costume.thecrow"},"animations":{}}"#;

/// A player appearance as carried by the wire protocol: packed pixels,
/// the geometry model document, and the metadata that travels with them.
#[derive(Debug, Clone, PartialEq)]
pub struct Skin {
    pub skin_id: String,
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA bytes, 4 per pixel. Must hold exactly
    /// `width * height * 4` bytes; both codec directions check this.
    pub pixel_data: Vec<u8>,
    /// Geometry document bytes, verbatim JSON.
    pub geometry: Vec<u8>,
    /// JSON document binding the geometry name to the model identifier.
    pub resource_patch: Vec<u8>,
    pub animations: Vec<SkinAnimation>,
    pub persona_pieces: Vec<PersonaPiece>,
    pub piece_tint_colours: Vec<PieceTintColour>,
    pub arm_size: String,
    pub skin_colour: String,
    pub premium: bool,
    pub persona: bool,
    pub trusted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkinAnimation {
    pub width: u32,
    pub height: u32,
    pub image: Vec<u8>,
    pub animation_type: u32,
    pub frame_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonaPiece {
    pub piece_id: String,
    pub piece_type: String,
    pub pack_id: String,
    pub default_piece: bool,
    pub product_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PieceTintColour {
    pub piece_type: String,
    pub colours: Vec<String>,
}

impl Skin {
    /// Expected pixel buffer length for the declared bounds, or `None`
    /// when `width * height * 4` overflows.
    pub fn expected_pixel_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)
    }

    pub fn dimensions_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.expected_pixel_len() == Some(self.pixel_data.len())
    }

    /// An artifact built from decoded image pixels and a geometry file,
    /// with every metadata field at its synthesis default.
    pub fn synthesized(
        skin_id: String,
        width: u32,
        height: u32,
        pixel_data: Vec<u8>,
        geometry: Vec<u8>,
    ) -> Self {
        Self {
            skin_id,
            width,
            height,
            pixel_data,
            geometry,
            resource_patch: DEFAULT_RESOURCE_PATCH.as_bytes().to_vec(),
            animations: Vec::new(),
            persona_pieces: Vec::new(),
            piece_tint_colours: Vec::new(),
            arm_size: "wide".to_string(),
            skin_colour: String::new(),
            premium: false,
            persona: false,
            trusted: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_defaults() {
        let skin = Skin::synthesized("id".to_string(), 2, 2, vec![0; 16], b"{}".to_vec());
        assert!(skin.trusted);
        assert!(!skin.premium);
        assert!(!skin.persona);
        assert_eq!(skin.arm_size, "wide");
        assert_eq!(skin.skin_colour, "");
        assert_eq!(skin.resource_patch, DEFAULT_RESOURCE_PATCH.as_bytes());
        assert!(skin.animations.is_empty());
        assert!(skin.persona_pieces.is_empty());
        assert!(skin.piece_tint_colours.is_empty());
        assert!(skin.dimensions_valid());
    }

    #[test]
    fn dimension_check_rejects_short_buffer() {
        let skin = Skin::synthesized("id".to_string(), 2, 2, vec![0; 15], b"{}".to_vec());
        assert!(!skin.dimensions_valid());
    }

    #[test]
    fn dimension_check_rejects_zero_bounds() {
        let skin = Skin::synthesized("id".to_string(), 0, 2, Vec::new(), b"{}".to_vec());
        assert!(!skin.dimensions_valid());
    }
}
