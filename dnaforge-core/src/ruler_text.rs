use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{ByteGenome, DEFAULT_GENE_BYTES};
use crate::schema::{is_color_gene, schema_for, SchemaVariant};
use crate::{format_error, Result};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sex::Male => write!(f, "male"),
            Sex::Female => write!(f, "female"),
        }
    }
}

/// Synthesized template label for the text emission. This is lossy on
/// purpose: the raw bytes do not record which template the value was
/// authored under, so every gene gets its `_pos` variant. Kept for
/// compatibility with the text format as it has always been emitted.
fn synthetic_template(gene_id: &str) -> String {
    let stem = gene_id
        .strip_prefix("gene_bs_")
        .or_else(|| gene_id.strip_prefix("gene_"))
        .unwrap_or(gene_id);
    format!("{stem}_pos")
}

/// Renders a genome as a ruler-designer text block. Color genes carry
/// all four raw bytes; every other gene emits its dominant and
/// recessive value bytes behind the synthetic `_pos` template label.
pub fn to_text(genome: &ByteGenome, sex: Sex, variant: SchemaVariant) -> String {
    let mut out = String::new();
    out.push_str("ruler_designer_1={\n");
    out.push_str(&format!("\ttype={sex}\n"));
    out.push_str("\tid=0\n");
    out.push_str("\tgenes={\n");

    for gene in schema_for(variant) {
        let bytes = genome.get_or_default(gene);
        if is_color_gene(gene) {
            out.push_str(&format!(
                "\t\t{}={{ {} {} {} {} }}\n",
                gene, bytes[0], bytes[1], bytes[2], bytes[3]
            ));
        } else {
            let template = synthetic_template(gene);
            out.push_str(&format!(
                "\t\t{}={{ \"{}\" {} \"{}\" {} }}\n",
                gene, template, bytes[1], template, bytes[3]
            ));
        }
    }

    out.push_str("\t}\n");
    out.push_str("}\n");
    out
}

fn parse_int_byte(token: &str) -> u8 {
    token.parse::<i64>().unwrap_or(0).clamp(0, 255) as u8
}

/// Parses ruler-designer text back into a genome. Deliberately
/// lenient: a gene block only needs to contain enough integers (four
/// for colors, two for everything else) somewhere between its braces;
/// quoted template labels and ordering are ignored. Genes absent from
/// the text get the neutral default. Fails only when no `genes={`
/// block exists at all.
pub fn from_text(text: &str, variant: SchemaVariant) -> Result<ByteGenome> {
    let genes_block = Regex::new(r"\bgenes\s*=\s*\{").expect("valid regex");
    if !genes_block.is_match(text) {
        return Err(format_error("no genes block found", text));
    }

    // Leaf blocks only: the [^{}] body cannot span the nested outer
    // structures, so this collects exactly the per-gene entries.
    let leaf = Regex::new(r"([A-Za-z0-9_]+)\s*=\s*\{([^{}]*)\}").expect("valid regex");
    let quoted = Regex::new(r#""[^"]*""#).expect("valid regex");
    let integer = Regex::new(r"-?\d+").expect("valid regex");

    let mut bodies = std::collections::HashMap::new();
    for cap in leaf.captures_iter(text) {
        let name = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = cap.get(2).map(|m| m.as_str()).unwrap_or("");
        // First definition wins.
        bodies.entry(name).or_insert(body);
    }

    let mut genome = ByteGenome::new();
    for gene in schema_for(variant) {
        let Some(body) = bodies.get(gene) else {
            debug!(gene = %gene, "gene missing from ruler-designer text, defaulted");
            genome.set(gene, DEFAULT_GENE_BYTES);
            continue;
        };

        // Quoted labels may themselves contain digits; drop them
        // before scanning for values.
        let stripped = quoted.replace_all(body, " ");
        let ints: Vec<u8> = integer
            .find_iter(&stripped)
            .map(|m| parse_int_byte(m.as_str()))
            .collect();

        let bytes = if is_color_gene(gene) {
            match ints.as_slice() {
                [b0, b1, b2, b3, ..] => [*b0, *b1, *b2, *b3],
                _ => DEFAULT_GENE_BYTES,
            }
        } else {
            match ints.as_slice() {
                [b1, b3, ..] => [0, *b1, 0, *b3],
                _ => DEFAULT_GENE_BYTES,
            }
        };
        genome.set(gene, bytes);
    }

    Ok(genome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DnaError;

    #[test]
    fn emits_color_genes_with_all_four_bytes() {
        let mut genome = ByteGenome::new();
        genome.set("hair_color", [12, 34, 56, 78]);
        let text = to_text(&genome, Sex::Male, SchemaVariant::Vanilla);
        assert!(text.contains("hair_color={ 12 34 56 78 }"));
        assert!(text.contains("type=male"));
    }

    #[test]
    fn emits_morph_genes_with_synthetic_pos_template() {
        let mut genome = ByteGenome::new();
        genome.set("gene_chin_forward", [3, 200, 7, 55]);
        let text = to_text(&genome, Sex::Female, SchemaVariant::Vanilla);
        assert!(text.contains("gene_chin_forward={ \"chin_forward_pos\" 200 \"chin_forward_pos\" 55 }"));
        assert!(text.contains("type=female"));
    }

    #[test]
    fn round_trip_keeps_value_bytes() {
        let mut genome = ByteGenome::new();
        for (i, gene) in schema_for(SchemaVariant::Vanilla).iter().enumerate() {
            let b = (i % 256) as u8;
            genome.set(gene, [0, b, 0, b.wrapping_add(1)]);
        }
        let text = to_text(&genome, Sex::Male, SchemaVariant::Vanilla);
        let parsed = from_text(&text, SchemaVariant::Vanilla).unwrap();
        for (i, gene) in schema_for(SchemaVariant::Vanilla).iter().enumerate() {
            let b = (i % 256) as u8;
            assert_eq!(parsed.get(gene), Some([0, b, 0, b.wrapping_add(1)]), "gene {gene}");
        }
    }

    #[test]
    fn parse_accepts_foreign_template_labels_and_order() {
        let text = r#"
ruler_designer_77={
	type=male
	id=0
	genes={
		gene_jaw_width={ "jaw_width_neg" 90 "jaw_width_neg" 110 }
		hair_color={ 1 2 3 4 }
	}
}
"#;
        let genome = from_text(text, SchemaVariant::Vanilla).unwrap();
        assert_eq!(genome.get("gene_jaw_width"), Some([0, 90, 0, 110]));
        assert_eq!(genome.get("hair_color"), Some([1, 2, 3, 4]));
        // Everything else defaults.
        assert_eq!(genome.get("gene_chin_forward"), Some(DEFAULT_GENE_BYTES));
    }

    #[test]
    fn parse_ignores_digits_inside_quoted_labels() {
        let text = r#"genes={ gene_jaw_width={ "variant2_pos" 90 "variant2_pos" 110 } }"#;
        let genome = from_text(text, SchemaVariant::Vanilla).unwrap();
        assert_eq!(genome.get("gene_jaw_width"), Some([0, 90, 0, 110]));
    }

    #[test]
    fn parse_without_genes_block_is_a_format_error() {
        let err = from_text("nothing here", SchemaVariant::Vanilla).unwrap_err();
        assert!(matches!(err, DnaError::Format(_)));
    }

    #[test]
    fn unrecognized_gene_blocks_are_ignored() {
        let text = "genes={ gene_from_some_other_mod={ 1 2 3 4 } gene_jaw_width={ 9 9 } }";
        let genome = from_text(text, SchemaVariant::Vanilla).unwrap();
        assert_eq!(genome.get("gene_jaw_width"), Some([0, 9, 0, 9]));
        assert_eq!(genome.get("gene_from_some_other_mod"), None);
    }
}
