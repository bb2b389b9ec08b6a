use clap::ValueEnum;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::morph::{GeneKey, MorphFileModel, MorphMode, MorphRecord, MorphValue, Provenance};
use crate::schema::is_half_default;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PatchMode {
    /// Randomized "sweet spot" mix of the two sources.
    Blend,
    /// Deterministic mode-aware merge of the overlay onto the base.
    Apply,
}

impl std::fmt::Display for PatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchMode::Blend => write!(f, "blend"),
            PatchMode::Apply => write!(f, "apply"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatchSettings {
    pub seed: u64,
    pub mode: PatchMode,
}

/// Numeric reading of a record value. Range expressions average the
/// numbers found between their braces.
fn float_value(value: &MorphValue) -> f64 {
    match value {
        MorphValue::Number(n) => *n,
        MorphValue::Range(range) => {
            let numbers: Vec<f64> = range
                .trim_matches(|c| c == '{' || c == '}')
                .split_whitespace()
                .filter_map(|tok| tok.parse().ok())
                .collect();
            if numbers.is_empty() {
                0.0
            } else {
                numbers.iter().sum::<f64>() / numbers.len() as f64
            }
        }
    }
}

/// Maps a float-space value (bare number or range expression) into
/// byte space: clamp to [0, 1], scale by 255, round.
pub fn normalize_to_byte(value: &MorphValue) -> u8 {
    (float_value(value).clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Byte-space reading of a record: byte-domain sources already store
/// raw bytes, mod-file sources store game floats.
pub(crate) fn resolve_record_byte(record: &MorphRecord, byte_domain: bool) -> u8 {
    if byte_domain {
        match &record.value {
            MorphValue::Number(n) => n.clamp(0.0, 255.0).round() as u8,
            // A range on a byte-domain record should not happen, but
            // the float path degrades gracefully.
            MorphValue::Range(_) => normalize_to_byte(&record.value),
        }
    } else {
        normalize_to_byte(&record.value)
    }
}

/// Byte-space value of a gene in a model, with the conventional
/// defaults for absent genes: 128 for centered morphs, 0 otherwise.
fn resolve_gene_byte(model: &MorphFileModel, gene_id: &str) -> u8 {
    match model.get_gene(gene_id) {
        Some(record) => resolve_record_byte(record, model.is_byte_domain()),
        None => {
            if is_half_default(gene_id) {
                128
            } else {
                0
            }
        }
    }
}

fn template_of<'a>(model: &'a MorphFileModel, gene_id: &str) -> &'a str {
    model
        .get_gene(gene_id)
        .map(|r| r.template.as_str())
        .unwrap_or("")
}

/// Sweet-spot draw: uniform integer around the midpoint of the two
/// inputs, with a spread proportional to how far apart they are. Equal
/// inputs always return themselves.
fn blend_byte(rng: &mut StdRng, a: u8, b: u8) -> u8 {
    let mid = (f64::from(a) + f64::from(b)) / 2.0;
    let spread = (f64::from(a) - f64::from(b)).abs() / 4.0;
    let lo = ((mid - spread).round() as i32).max(0);
    let hi = ((mid + spread).round() as i32).min(255);
    rng.gen_range(lo..=hi) as u8
}

fn clamp_to_byte(float: f64) -> u8 {
    (float * 255.0).clamp(0.0, 255.0).round() as u8
}

/// Applies one mod-file record onto a base byte value, honoring the
/// record's semantic mode. Returns the new byte and template.
fn apply_mod_record(
    record: &MorphRecord,
    base_byte: u8,
    base_template: &str,
) -> (u8, String) {
    let base_float = f64::from(base_byte) / 255.0;
    let overlay_float = float_value(&record.value);

    match record.mode {
        MorphMode::Replace => (clamp_to_byte(overlay_float), record.template.clone()),
        MorphMode::Add => {
            let template = if record.template.is_empty() {
                base_template.to_string()
            } else {
                record.template.clone()
            };
            (clamp_to_byte(base_float + overlay_float), template)
        }
        MorphMode::Modify => {
            if record.template.is_empty() || record.template == base_template {
                (clamp_to_byte(base_float + overlay_float), base_template.to_string())
            } else {
                (base_byte, base_template.to_string())
            }
        }
        MorphMode::ModifyMultiply => {
            if record.template.is_empty() || record.template == base_template {
                (clamp_to_byte(base_float * overlay_float), base_template.to_string())
            } else {
                (base_byte, base_template.to_string())
            }
        }
        // Byte-domain modes inside a mod-file model are hand-made
        // records; treat them as replace.
        MorphMode::Dna | MorphMode::Patch => {
            (clamp_to_byte(overlay_float), record.template.clone())
        }
    }
}

/// Computes a patched gene set across `gene_ids` from two sources.
/// Pure apart from the seeded RNG: the same inputs and seed produce
/// the same output.
pub fn patch(
    base: &MorphFileModel,
    overlay: &MorphFileModel,
    settings: &PatchSettings,
    gene_ids: &[&str],
) -> MorphFileModel {
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut records = Vec::with_capacity(gene_ids.len());

    for gene in gene_ids {
        let a = resolve_gene_byte(base, gene);
        let b = resolve_gene_byte(overlay, gene);
        let base_template = template_of(base, gene);
        let overlay_template = template_of(overlay, gene);

        let (value, template) = match settings.mode {
            PatchMode::Blend => {
                let template = if overlay_template.is_empty() {
                    base_template
                } else {
                    overlay_template
                };
                (blend_byte(&mut rng, a, b), template.to_string())
            }
            PatchMode::Apply => {
                if overlay.is_byte_domain() {
                    // A DNA source defines the whole genome: plain
                    // overwrite, template from overlay if present.
                    let template = if overlay_template.is_empty() {
                        base_template
                    } else {
                        overlay_template
                    };
                    (b, template.to_string())
                } else {
                    match overlay.get_gene(gene) {
                        Some(record) => apply_mod_record(record, a, base_template),
                        // No modifier for this gene: base wins.
                        None => (a, base_template.to_string()),
                    }
                }
            }
        };

        records.push((
            GeneKey::first(gene),
            MorphRecord {
                mode: MorphMode::Patch,
                template,
                value: MorphValue::Number(f64::from(value)),
            },
        ));
    }

    MorphFileModel {
        name: format!("{} + {}", base.name, overlay.name),
        provenance: Provenance::Patch,
        raw_text: None,
        records,
        modified: false,
    }
}
