use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which gene layout a DNA string was produced under. The byte format
/// is positional and untagged, so decoding with the wrong variant
/// silently shifts every gene after the first divergence.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVariant {
    Vanilla,
    Epe,
}

impl std::str::FromStr for SchemaVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vanilla" => Ok(SchemaVariant::Vanilla),
            "epe" => Ok(SchemaVariant::Epe),
            other => Err(format!("unknown schema variant: {other}")),
        }
    }
}

impl std::fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaVariant::Vanilla => write!(f, "vanilla"),
            SchemaVariant::Epe => write!(f, "epe"),
        }
    }
}

/// The three color genes carry four meaningful raw bytes (two palette
/// coordinate pairs) instead of the template/value convention.
pub const COLOR_GENES: &[&str] = &["hair_color", "skin_color", "eye_color"];

// Gene order IS the binary layout: the gene at index i owns bytes
// [4*i, 4*i + 4) of the decoded buffer. Never reorder, insert into the
// middle of, or rename entries in these tables; every previously
// exported DNA string depends on them.
pub const VANILLA_GENES: &[&str] = &[
    "hair_color",
    "skin_color",
    "eye_color",
    "gene_chin_forward",
    "gene_chin_height",
    "gene_chin_width",
    "gene_eye_angle",
    "gene_eye_depth",
    "gene_eye_height",
    "gene_eye_distance",
    "gene_eye_shut",
    "gene_forehead_angle",
    "gene_forehead_brow_height",
    "gene_forehead_roundness",
    "gene_forehead_width",
    "gene_forehead_height",
    "gene_head_height",
    "gene_head_width",
    "gene_head_profile",
    "gene_head_top_height",
    "gene_head_top_width",
    "gene_jaw_angle",
    "gene_jaw_forward",
    "gene_jaw_height",
    "gene_jaw_width",
    "gene_mouth_corner_depth",
    "gene_mouth_corner_height",
    "gene_mouth_forward",
    "gene_mouth_height",
    "gene_mouth_width",
    "gene_mouth_upper_lip_size",
    "gene_mouth_lower_lip_size",
    "gene_mouth_open",
    "gene_neck_length",
    "gene_neck_width",
    "gene_bs_cheek_forward",
    "gene_bs_cheek_height",
    "gene_bs_cheek_width",
    "gene_bs_ear_angle",
    "gene_bs_ear_inner_shape",
    "gene_bs_ear_bend",
    "gene_bs_ear_outward",
    "gene_bs_ear_size",
    "gene_bs_eye_corner_depth",
    "gene_bs_eye_fold_shape",
    "gene_bs_eye_size",
    "gene_bs_eye_upper_lid_size",
    "gene_bs_forehead_brow_curve",
    "gene_bs_forehead_brow_forward",
    "gene_bs_forehead_brow_inner_height",
    "gene_bs_forehead_brow_outer_height",
    "gene_bs_forehead_brow_width",
    "gene_bs_jaw_def",
    "gene_bs_mouth_lower_lip_def",
    "gene_bs_mouth_lower_lip_full",
    "gene_bs_mouth_lower_lip_pad",
    "gene_bs_mouth_lower_lip_width",
    "gene_bs_mouth_philtrum_def",
    "gene_bs_mouth_philtrum_shape",
    "gene_bs_mouth_philtrum_width",
    "gene_bs_mouth_upper_lip_def",
    "gene_bs_mouth_upper_lip_full",
    "gene_bs_mouth_upper_lip_profile",
    "gene_bs_mouth_upper_lip_width",
    "gene_bs_nose_forward",
    "gene_bs_nose_height",
    "gene_bs_nose_length",
    "gene_bs_nose_nostril_height",
    "gene_bs_nose_nostril_width",
    "gene_bs_nose_profile",
    "gene_bs_nose_ridge_angle",
    "gene_bs_nose_ridge_width",
    "gene_bs_nose_size",
    "gene_bs_nose_tip_angle",
    "gene_bs_nose_tip_forward",
    "gene_bs_nose_tip_width",
    "face_detail_cheek_def",
    "face_detail_cheek_fat",
    "face_detail_chin_cleft",
    "face_detail_chin_def",
    "face_detail_eye_lower_lid_def",
    "face_detail_eye_socket",
    "face_detail_nasolabial",
    "face_detail_nose_ridge_def",
    "face_detail_temple_def",
    "expression_brow_wrinkles",
    "expression_eye_wrinkles",
    "expression_forehead_wrinkles",
    "hairstyles",
    "beards",
];

// EPE layout: the vanilla list without its trailing accessory pair,
// then the extended genes, then the same accessory pair re-appended so
// hairstyle/beard stay the last two slots in both variants.
pub const EPE_GENES: &[&str] = &[
    "hair_color",
    "skin_color",
    "eye_color",
    "gene_chin_forward",
    "gene_chin_height",
    "gene_chin_width",
    "gene_eye_angle",
    "gene_eye_depth",
    "gene_eye_height",
    "gene_eye_distance",
    "gene_eye_shut",
    "gene_forehead_angle",
    "gene_forehead_brow_height",
    "gene_forehead_roundness",
    "gene_forehead_width",
    "gene_forehead_height",
    "gene_head_height",
    "gene_head_width",
    "gene_head_profile",
    "gene_head_top_height",
    "gene_head_top_width",
    "gene_jaw_angle",
    "gene_jaw_forward",
    "gene_jaw_height",
    "gene_jaw_width",
    "gene_mouth_corner_depth",
    "gene_mouth_corner_height",
    "gene_mouth_forward",
    "gene_mouth_height",
    "gene_mouth_width",
    "gene_mouth_upper_lip_size",
    "gene_mouth_lower_lip_size",
    "gene_mouth_open",
    "gene_neck_length",
    "gene_neck_width",
    "gene_bs_cheek_forward",
    "gene_bs_cheek_height",
    "gene_bs_cheek_width",
    "gene_bs_ear_angle",
    "gene_bs_ear_inner_shape",
    "gene_bs_ear_bend",
    "gene_bs_ear_outward",
    "gene_bs_ear_size",
    "gene_bs_eye_corner_depth",
    "gene_bs_eye_fold_shape",
    "gene_bs_eye_size",
    "gene_bs_eye_upper_lid_size",
    "gene_bs_forehead_brow_curve",
    "gene_bs_forehead_brow_forward",
    "gene_bs_forehead_brow_inner_height",
    "gene_bs_forehead_brow_outer_height",
    "gene_bs_forehead_brow_width",
    "gene_bs_jaw_def",
    "gene_bs_mouth_lower_lip_def",
    "gene_bs_mouth_lower_lip_full",
    "gene_bs_mouth_lower_lip_pad",
    "gene_bs_mouth_lower_lip_width",
    "gene_bs_mouth_philtrum_def",
    "gene_bs_mouth_philtrum_shape",
    "gene_bs_mouth_philtrum_width",
    "gene_bs_mouth_upper_lip_def",
    "gene_bs_mouth_upper_lip_full",
    "gene_bs_mouth_upper_lip_profile",
    "gene_bs_mouth_upper_lip_width",
    "gene_bs_nose_forward",
    "gene_bs_nose_height",
    "gene_bs_nose_length",
    "gene_bs_nose_nostril_height",
    "gene_bs_nose_nostril_width",
    "gene_bs_nose_profile",
    "gene_bs_nose_ridge_angle",
    "gene_bs_nose_ridge_width",
    "gene_bs_nose_size",
    "gene_bs_nose_tip_angle",
    "gene_bs_nose_tip_forward",
    "gene_bs_nose_tip_width",
    "face_detail_cheek_def",
    "face_detail_cheek_fat",
    "face_detail_chin_cleft",
    "face_detail_chin_def",
    "face_detail_eye_lower_lid_def",
    "face_detail_eye_socket",
    "face_detail_nasolabial",
    "face_detail_nose_ridge_def",
    "face_detail_temple_def",
    "expression_brow_wrinkles",
    "expression_eye_wrinkles",
    "expression_forehead_wrinkles",
    "gene_bs_chin_cleft",
    "gene_bs_chin_def",
    "gene_bs_chin_forward",
    "gene_bs_eye_both_lid",
    "gene_bs_eye_lower_lid_def",
    "gene_bs_eye_shape",
    "gene_bs_eye_spacing",
    "gene_bs_forehead_def",
    "gene_bs_forehead_height",
    "gene_bs_head_shape",
    "gene_bs_jaw_line",
    "gene_bs_mouth_def",
    "gene_bs_mouth_shape",
    "gene_bs_neck_def",
    "gene_bs_nose_curve",
    "gene_bs_nose_def",
    "face_detail_brow_def",
    "face_detail_eye_upper_lid_def",
    "face_detail_jaw_line_def",
    "face_detail_lip_def",
    "face_detail_neck_def",
    "expression_mouth_wrinkles",
    "expression_nose_wrinkles",
    "complexion",
    "complexion_secondary",
    "gene_height",
    "gene_bs_body_type",
    "gene_bs_body_shape",
    "gene_age",
    "gene_eyebrows_shape",
    "gene_eyebrows_fullness",
    "eye_accessory",
    "eyelashes_accessory",
    "hairstyles",
    "beards",
];

pub fn schema_for(variant: SchemaVariant) -> &'static [&'static str] {
    match variant {
        SchemaVariant::Vanilla => VANILLA_GENES,
        SchemaVariant::Epe => EPE_GENES,
    }
}

/// Byte offset of the gene at schema index `index`.
pub fn byte_offset(index: usize) -> usize {
    index * 4
}

/// Required decoded buffer length for a variant.
pub fn buffer_len(variant: SchemaVariant) -> usize {
    schema_for(variant).len() * 4
}

pub fn is_color_gene(gene_id: &str) -> bool {
    COLOR_GENES.contains(&gene_id)
}

/// Centered morph sliders sit at 128 when absent; detail, expression,
/// color and asset-picking genes accumulate from 0.
pub fn is_half_default(gene_id: &str) -> bool {
    gene_id.starts_with("gene_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_share_common_prefix() {
        let common = VANILLA_GENES.len() - 2;
        assert_eq!(&VANILLA_GENES[..common], &EPE_GENES[..common]);
    }

    #[test]
    fn variants_share_final_pair() {
        assert_eq!(&VANILLA_GENES[VANILLA_GENES.len() - 2..], &["hairstyles", "beards"]);
        assert_eq!(&EPE_GENES[EPE_GENES.len() - 2..], &["hairstyles", "beards"]);
    }

    #[test]
    fn epe_is_strictly_longer() {
        assert!(EPE_GENES.len() > VANILLA_GENES.len());
    }

    #[test]
    fn no_duplicate_gene_ids() {
        for table in [VANILLA_GENES, EPE_GENES] {
            let mut seen = std::collections::HashSet::new();
            for gene in table {
                assert!(seen.insert(*gene), "duplicate gene id {gene}");
            }
        }
    }

    #[test]
    fn byte_offsets_are_four_per_gene() {
        assert_eq!(byte_offset(0), 0);
        assert_eq!(byte_offset(3), 12);
        assert_eq!(byte_offset(VANILLA_GENES.len()), buffer_len(SchemaVariant::Vanilla));
    }

    #[test]
    fn half_default_classification() {
        assert!(is_half_default("gene_chin_forward"));
        assert!(is_half_default("gene_bs_nose_profile"));
        assert!(!is_half_default("hair_color"));
        assert!(!is_half_default("face_detail_cheek_def"));
        assert!(!is_half_default("hairstyles"));
    }
}
