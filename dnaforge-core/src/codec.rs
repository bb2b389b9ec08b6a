use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::{byte_offset, schema_for, SchemaVariant};
use crate::{format_error, Result};

/// Neutral slot for a gene the source buffer did not cover: template
/// id 0 with the half value on both the dominant and recessive side.
pub const DEFAULT_GENE_BYTES: [u8; 4] = [0, 127, 0, 127];

/// A decoded genome: gene id -> (dominant id, dominant value,
/// recessive id, recessive value).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteGenome {
    genes: HashMap<String, [u8; 4]>,
}

impl ByteGenome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, gene_id: &str) -> Option<[u8; 4]> {
        self.genes.get(gene_id).copied()
    }

    /// The gene's bytes, or the neutral default if absent.
    pub fn get_or_default(&self, gene_id: &str) -> [u8; 4] {
        self.get(gene_id).unwrap_or(DEFAULT_GENE_BYTES)
    }

    pub fn set(&mut self, gene_id: &str, bytes: [u8; 4]) {
        self.genes.insert(gene_id.to_string(), bytes);
    }

    /// Overwrites one byte slot (0..4) of a gene, materialising the
    /// gene at its default first if it was absent.
    pub fn set_byte(&mut self, gene_id: &str, slot: usize, value: u8) {
        let entry = self
            .genes
            .entry(gene_id.to_string())
            .or_insert(DEFAULT_GENE_BYTES);
        entry[slot] = value;
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Strips the characters a pasted DNA string commonly picks up on its
/// way through save files and clipboards.
fn clean_base64(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '"')
        .collect()
}

fn decode_base64(input: &str) -> Result<Vec<u8>> {
    let cleaned = clean_base64(input);
    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|_| format_error("input is not valid Base64", input))
}

/// Decodes a Base64 DNA string into a named genome. Decoding is total
/// over the schema: a buffer shorter than the layout requires fills the
/// uncovered genes with the neutral default instead of failing, so DNA
/// exported under an older, shorter schema still loads.
pub fn decode(base64_input: &str, variant: SchemaVariant) -> Result<ByteGenome> {
    let bytes = decode_base64(base64_input)?;

    let mut genome = ByteGenome::new();
    let mut defaulted = 0usize;
    for (i, gene) in schema_for(variant).iter().enumerate() {
        let start = byte_offset(i);
        let end = start + 4;
        let slot = if end <= bytes.len() {
            [bytes[start], bytes[start + 1], bytes[start + 2], bytes[start + 3]]
        } else {
            defaulted += 1;
            DEFAULT_GENE_BYTES
        };
        genome.set(gene, slot);
    }

    if defaulted > 0 {
        debug!(defaulted, %variant, "DNA buffer shorter than schema, defaulted tail genes");
    }

    Ok(genome)
}

/// Encodes a genome back to Base64 in schema order. Genes missing from
/// the map are emitted at the neutral default so the output buffer is
/// always exactly `4 * schema_len` bytes.
pub fn encode(genome: &ByteGenome, variant: SchemaVariant) -> String {
    let schema = schema_for(variant);
    let mut bytes = Vec::with_capacity(schema.len() * 4);
    for gene in schema {
        bytes.extend_from_slice(&genome.get_or_default(gene));
    }
    STANDARD.encode(&bytes)
}

/// Ports an old DNA string onto a newer template by raw byte-prefix
/// copy: the first `min(len)` bytes come from `old`, the rest keep the
/// template's values. No schema is involved, so this works across
/// layout revisions as long as the grown schema only appended genes.
pub fn graft(old_b64: &str, template_b64: &str) -> Result<String> {
    let old = decode_base64(old_b64)?;
    let mut out = decode_base64(template_b64)?;

    let n = old.len().min(out.len());
    out[..n].copy_from_slice(&old[..n]);

    Ok(STANDARD.encode(&out))
}
