use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::ByteGenome;
use crate::schema::{schema_for, SchemaVariant};

/// Semantic mode of a morph record. `Dna` and `Patch` never appear in
/// mod files; they tag records sourced from a binary genome or
/// computed by the patch engine, where the value is a raw byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphMode {
    Replace,
    Add,
    Modify,
    ModifyMultiply,
    Dna,
    Patch,
}

impl std::fmt::Display for MorphMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MorphMode::Replace => "replace",
            MorphMode::Add => "add",
            MorphMode::Modify => "modify",
            MorphMode::ModifyMultiply => "modify_multiply",
            MorphMode::Dna => "dna",
            MorphMode::Patch => "patch",
        };
        write!(f, "{s}")
    }
}

impl MorphMode {
    /// Parses a mode token from a mod file. Only the four mod-file
    /// modes are accepted; anything else falls back to `Replace`,
    /// matching the leniency policy for per-record oddities.
    fn from_mod_token(token: &str) -> MorphMode {
        match token {
            "replace" => MorphMode::Replace,
            "add" => MorphMode::Add,
            "modify" => MorphMode::Modify,
            "modify_multiply" => MorphMode::ModifyMultiply,
            other => {
                warn!(mode = other, "unknown morph mode, treating as replace");
                MorphMode::Replace
            }
        }
    }
}

/// A record's value: a single number, or a verbatim range expression
/// kept as the original `{ a b }` text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphValue {
    Number(f64),
    Range(String),
}

/// In-memory identity of a record. A mod file may define the same gene
/// several times, so identity is the gene id plus a 1-based occurrence
/// index, rendered `gene_id` for the first and `gene_id#N` after that.
/// The suffix never reaches serialized output.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GeneKey {
    pub id: String,
    pub occurrence: u32,
}

impl GeneKey {
    pub fn first(id: &str) -> Self {
        Self { id: id.to_string(), occurrence: 1 }
    }

    pub fn nth(id: &str, occurrence: u32) -> Self {
        Self { id: id.to_string(), occurrence }
    }
}

impl std::fmt::Display for GeneKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.occurrence <= 1 {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}#{}", self.id, self.occurrence)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MorphRecord {
    pub mode: MorphMode,
    pub template: String,
    pub value: MorphValue,
}

/// Where a model's records came from. Everything except `ModFile`
/// stores values in byte space (0..=255); mod-file records store the
/// game's float space.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    ModFile,
    Dna,
    Default,
    Pasted,
    Patch,
}

impl Provenance {
    pub fn is_byte_domain(self) -> bool {
        !matches!(self, Provenance::ModFile)
    }
}

/// One loaded source in the working set: a parsed mod file, a decoded
/// DNA baseline, a synthetic default, or a computed patch result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MorphFileModel {
    pub name: String,
    pub provenance: Provenance,
    /// Original file text, kept verbatim so re-serialization can
    /// preserve untouched content byte-for-byte.
    pub raw_text: Option<String>,
    /// Records in document / schema order.
    pub records: Vec<(GeneKey, MorphRecord)>,
    pub modified: bool,
}

impl MorphFileModel {
    pub fn get(&self, key: &GeneKey) -> Option<&MorphRecord> {
        self.records.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    /// First occurrence of a gene id, the one patch math works with.
    pub fn get_gene(&self, gene_id: &str) -> Option<&MorphRecord> {
        self.records
            .iter()
            .find(|(k, _)| k.id == gene_id && k.occurrence == 1)
            .map(|(_, r)| r)
    }

    /// Inserts or overwrites a record and marks the model modified.
    pub fn set(&mut self, key: GeneKey, record: MorphRecord) {
        if let Some(slot) = self.records.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = record;
        } else {
            self.records.push((key, record));
        }
        self.modified = true;
    }

    pub fn remove(&mut self, key: &GeneKey) -> Option<MorphRecord> {
        let pos = self.records.iter().position(|(k, _)| k == key)?;
        self.modified = true;
        Some(self.records.remove(pos).1)
    }

    pub fn is_byte_domain(&self) -> bool {
        self.provenance.is_byte_domain()
    }

    /// Projects a decoded genome into record form: one record per
    /// schema gene, carrying the dominant-value byte. Binary-sourced
    /// records are conceptually "replace with raw byte", tagged `Dna`.
    pub fn from_genome(name: &str, genome: &ByteGenome, variant: SchemaVariant) -> Self {
        let records = schema_for(variant)
            .iter()
            .map(|gene| {
                let bytes = genome.get_or_default(gene);
                (
                    GeneKey::first(gene),
                    MorphRecord {
                        mode: MorphMode::Dna,
                        template: String::new(),
                        value: MorphValue::Number(f64::from(bytes[1])),
                    },
                )
            })
            .collect();
        Self {
            name: name.to_string(),
            provenance: Provenance::Dna,
            raw_text: None,
            records,
            modified: false,
        }
    }

    /// A synthetic neutral baseline: every schema gene at the half
    /// value, same shape a default-decoded genome would produce.
    pub fn default_for(name: &str, variant: SchemaVariant) -> Self {
        let mut model = Self::from_genome(name, &ByteGenome::new(), variant);
        model.provenance = Provenance::Default;
        model
    }

    /// Collapses the model back into a genome for Base64 export. Each
    /// record's byte value lands on both the dominant and recessive
    /// side with template id 0.
    pub fn to_genome(&self, variant: SchemaVariant) -> ByteGenome {
        let byte_domain = self.is_byte_domain();
        let mut genome = ByteGenome::new();
        for gene in schema_for(variant) {
            let bytes = match self.get_gene(gene) {
                Some(record) => {
                    let v = crate::patch::resolve_record_byte(record, byte_domain);
                    [0, v, 0, v]
                }
                None => crate::codec::DEFAULT_GENE_BYTES,
            };
            genome.set(gene, bytes);
        }
        genome
    }
}

/// Caller-owned collection of loaded sources. There is deliberately no
/// module-level state: callers hold a `WorkingSet`, mutate it through
/// these methods, and `snapshot` hands out an independent copy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingSet {
    models: Vec<MorphFileModel>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model, replacing any existing model with the same name.
    pub fn add(&mut self, model: MorphFileModel) {
        if let Some(slot) = self.models.iter_mut().find(|m| m.name == model.name) {
            *slot = model;
        } else {
            self.models.push(model);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<MorphFileModel> {
        let pos = self.models.iter().position(|m| m.name == name)?;
        Some(self.models.remove(pos))
    }

    pub fn get(&self, name: &str) -> Option<&MorphFileModel> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MorphFileModel> {
        self.models.iter_mut().find(|m| m.name == name)
    }

    pub fn models(&self) -> &[MorphFileModel] {
        &self.models
    }

    pub fn snapshot(&self) -> Vec<MorphFileModel> {
        self.models.clone()
    }
}

/// One recognized `morph = { ... }` block in a source text. Offsets
/// are byte positions into the original text, end exclusive, so the
/// serializer can splice replacements at exact boundaries.
#[derive(Clone, Debug, PartialEq)]
pub struct MorphBlock {
    pub start: usize,
    pub end: usize,
    pub key: GeneKey,
    pub raw: String,
}

/// Blanks `#` line comments with spaces, leaving byte offsets and
/// newlines intact and quoted strings untouched.
fn mask_comments(text: &str) -> String {
    #[derive(Copy, Clone, PartialEq)]
    enum State {
        Normal,
        InQuote,
        InComment,
    }

    let mut bytes = text.as_bytes().to_vec();
    let mut state = State::Normal;
    for b in bytes.iter_mut() {
        match state {
            State::Normal => match *b {
                b'"' => state = State::InQuote,
                b'#' => {
                    state = State::InComment;
                    *b = b' ';
                }
                _ => {}
            },
            State::InQuote => {
                if *b == b'"' {
                    state = State::Normal;
                }
            }
            State::InComment => {
                if *b == b'\n' {
                    state = State::Normal;
                } else {
                    *b = b' ';
                }
            }
        }
    }

    // Masking only ever turns bytes into ASCII spaces, and multi-byte
    // characters can only occur wholly inside a comment, so the result
    // is still valid UTF-8.
    String::from_utf8(bytes).unwrap_or_else(|_| text.to_string())
}

/// Walks from the opening brace at `open`, returning the exclusive end
/// offset of the matching close brace. Braces inside quoted strings do
/// not count. `None` means the block never closes.
fn balanced_block_end(masked: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_quote = false;
    for (i, &b) in masked.iter().enumerate().skip(open) {
        if in_quote {
            if b == b'"' {
                in_quote = false;
            }
            continue;
        }
        match b {
            b'"' => in_quote = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

struct FieldExtractor {
    gene: Regex,
    mode: Regex,
    template: Regex,
    value: Regex,
    range: Regex,
}

impl FieldExtractor {
    fn new() -> Self {
        Self {
            gene: Regex::new(r#"\bgene\s*=\s*"?([A-Za-z0-9_.]+)"?"#).expect("valid regex"),
            mode: Regex::new(r#"\bmode\s*=\s*"?([A-Za-z_]+)"?"#).expect("valid regex"),
            template: Regex::new(r#"\btemplate\s*=\s*"?([A-Za-z0-9_.]+)"?"#).expect("valid regex"),
            value: Regex::new(r"\bvalue\s*=\s*(-?[0-9]+(?:\.[0-9]+)?)").expect("valid regex"),
            range: Regex::new(r"\brange\s*=\s*\{([^{}]*)\}").expect("valid regex"),
        }
    }
}

/// Parses the fields of one masked block body. Returns `None` when no
/// gene id can be found, in which case the block is discarded.
fn extract_record(ex: &FieldExtractor, masked_block: &str, original_block: &str) -> Option<(String, MorphRecord)> {
    let gene = ex.gene.captures(masked_block)?.get(1)?.as_str().to_string();

    let mode = match ex.mode.captures(masked_block) {
        Some(c) => MorphMode::from_mod_token(c.get(1).map(|m| m.as_str()).unwrap_or("")),
        None => MorphMode::Replace,
    };

    let template = ex
        .template
        .captures(masked_block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let value = if let Some(c) = ex.value.captures(masked_block) {
        let n = c.get(1).map(|m| m.as_str()).unwrap_or("0");
        MorphValue::Number(n.parse().unwrap_or(0.0))
    } else if let Some(c) = ex.range.captures(masked_block) {
        // Match positions on the masked text are valid offsets into
        // the original, so the range body is taken verbatim from it.
        let m = c.get(1).expect("range group");
        MorphValue::Range(format!("{{{}}}", &original_block[m.start()..m.end()]))
    } else {
        debug!(gene = %gene, "morph block without value or range, defaulting to 0");
        MorphValue::Number(0.0)
    };

    Some((gene, MorphRecord { mode, template, value }))
}

/// Block-location and record-extraction pass shared by the parser and
/// the serializer. Duplicate blocks whose gene, mode, template and
/// value all match an earlier block resolve to the earlier block's
/// key; genuinely different repeats get `gene#2`, `gene#3`, ... in
/// document order.
pub(crate) fn scan_morph_blocks(text: &str) -> (Vec<MorphBlock>, Vec<(GeneKey, MorphRecord)>) {
    let masked = mask_comments(text);
    let masked_bytes = masked.as_bytes();
    let ex = FieldExtractor::new();
    let block_start = Regex::new(r"\bmorph\s*=\s*\{").expect("valid regex");

    let mut blocks = Vec::new();
    let mut records: Vec<(GeneKey, MorphRecord)> = Vec::new();
    let mut cursor = 0usize;

    for m in block_start.find_iter(&masked) {
        if m.start() < cursor {
            // Inside a block we already consumed.
            continue;
        }
        let open = m.end() - 1;
        let Some(end) = balanced_block_end(masked_bytes, open) else {
            warn!(offset = m.start(), "unterminated morph block dropped");
            continue;
        };
        cursor = end;

        let masked_block = &masked[m.start()..end];
        let original_block = &text[m.start()..end];
        let Some((gene, record)) = extract_record(&ex, masked_block, original_block) else {
            debug!(offset = m.start(), "morph block without gene id discarded");
            continue;
        };

        // Structural duplicate of an earlier record collapses onto its
        // key; otherwise this occurrence gets the next free index.
        let mut occurrence = 0u32;
        let mut duplicate_of = None;
        for (k, r) in &records {
            if k.id == gene {
                occurrence = occurrence.max(k.occurrence);
                if *r == record {
                    duplicate_of = Some(k.clone());
                }
            }
        }

        let key = match duplicate_of {
            Some(key) => key,
            None => {
                let key = GeneKey::nth(&gene, occurrence + 1);
                records.push((key.clone(), record));
                key
            }
        };

        blocks.push(MorphBlock {
            start: m.start(),
            end,
            key,
            raw: original_block.to_string(),
        });
    }

    (blocks, records)
}

/// Locates every recognized morph block in a text. Used by the
/// serializer for exact-offset splicing.
pub fn find_morph_blocks(text: &str) -> Vec<MorphBlock> {
    scan_morph_blocks(text).0
}

/// Parses mod-file text into a model, retaining the raw text for
/// byte-preserving re-serialization.
pub fn parse_morph_file(name: &str, text: &str) -> MorphFileModel {
    let (_, records) = scan_morph_blocks(text);
    MorphFileModel {
        name: name.to_string(),
        provenance: Provenance::ModFile,
        raw_text: Some(text.to_string()),
        records,
        modified: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_block() {
        let text = r#"
morph = {
    mode = add
    gene = gene_chin_forward
    template = chin_forward_pos
    value = 0.35
}
"#;
        let model = parse_morph_file("test", text);
        assert_eq!(model.records.len(), 1);
        let (key, record) = &model.records[0];
        assert_eq!(key, &GeneKey::first("gene_chin_forward"));
        assert_eq!(record.mode, MorphMode::Add);
        assert_eq!(record.template, "chin_forward_pos");
        assert_eq!(record.value, MorphValue::Number(0.35));
    }

    #[test]
    fn mode_defaults_to_replace_and_template_to_empty() {
        let text = "morph = { gene = gene_jaw_width value = 0.5 }";
        let model = parse_morph_file("test", text);
        let record = model.get_gene("gene_jaw_width").unwrap();
        assert_eq!(record.mode, MorphMode::Replace);
        assert_eq!(record.template, "");
    }

    #[test]
    fn unknown_mode_falls_back_to_replace() {
        let text = "morph = { mode = overwrite gene = gene_jaw_width value = 0.5 }";
        let model = parse_morph_file("test", text);
        assert_eq!(model.get_gene("gene_jaw_width").unwrap().mode, MorphMode::Replace);
    }

    #[test]
    fn braces_inside_quoted_strings_do_not_close_blocks() {
        let text = r#"morph = { gene = gene_eye_angle template = "a { weird } name" value = 0.25 } trailing"#;
        let blocks = find_morph_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].raw.ends_with("0.25 }"));
        assert_eq!(&text[blocks[0].end..], " trailing");
    }

    #[test]
    fn unterminated_block_is_dropped() {
        let text = "morph = { gene = gene_eye_angle value = 0.25";
        assert!(find_morph_blocks(text).is_empty());
        assert!(parse_morph_file("t", text).records.is_empty());
    }

    #[test]
    fn block_without_gene_is_discarded() {
        let text = "morph = { mode = add value = 0.25 }";
        assert!(parse_morph_file("t", text).records.is_empty());
    }

    #[test]
    fn commented_out_blocks_are_ignored() {
        let text = r#"
# morph = { gene = gene_jaw_width value = 0.9 }
morph = { gene = gene_jaw_height value = 0.1 }
"#;
        let model = parse_morph_file("t", text);
        assert_eq!(model.records.len(), 1);
        assert!(model.get_gene("gene_jaw_height").is_some());
        assert!(model.get_gene("gene_jaw_width").is_none());
    }

    #[test]
    fn comment_inside_quote_is_not_a_comment() {
        let text = r#"morph = { gene = gene_jaw_width template = "keep#this" value = 0.1 }"#;
        let model = parse_morph_file("t", text);
        assert_eq!(model.records.len(), 1);
    }

    #[test]
    fn identical_duplicates_collapse_to_one_record() {
        let text = r#"
morph = { gene = gene_jaw_width mode = add value = 0.2 }
morph = { gene = gene_jaw_width mode = add value = 0.2 }
"#;
        let (blocks, records) = scan_morph_blocks(text);
        assert_eq!(records.len(), 1);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].key, blocks[1].key);
    }

    #[test]
    fn differing_duplicates_get_suffixed_keys() {
        let text = r#"
morph = { gene = gene_jaw_width value = 0.2 }
morph = { gene = gene_jaw_width value = 0.7 }
"#;
        let model = parse_morph_file("t", text);
        assert_eq!(model.records.len(), 2);
        assert_eq!(model.records[0].0, GeneKey::nth("gene_jaw_width", 1));
        assert_eq!(model.records[1].0, GeneKey::nth("gene_jaw_width", 2));
        assert_eq!(model.records[1].0.to_string(), "gene_jaw_width#2");
    }

    #[test]
    fn range_value_is_kept_verbatim() {
        let text = "morph = { gene = gene_jaw_width range = { 0.1 0.9 } }";
        let model = parse_morph_file("t", text);
        assert_eq!(
            model.get_gene("gene_jaw_width").unwrap().value,
            MorphValue::Range("{ 0.1 0.9 }".to_string())
        );
    }

    #[test]
    fn set_and_remove_mark_model_modified() {
        let mut model = parse_morph_file("t", "morph = { gene = gene_jaw_width value = 0.5 }");
        assert!(!model.modified);
        model.set(
            GeneKey::first("gene_jaw_width"),
            MorphRecord {
                mode: MorphMode::Replace,
                template: String::new(),
                value: MorphValue::Number(0.9),
            },
        );
        assert!(model.modified);
        assert!(model.remove(&GeneKey::first("gene_jaw_width")).is_some());
        assert!(model.records.is_empty());
    }

    #[test]
    fn working_set_replaces_models_by_name() {
        let mut set = WorkingSet::new();
        set.add(parse_morph_file("a", "morph = { gene = gene_jaw_width value = 0.1 }"));
        set.add(parse_morph_file("b", "morph = { gene = gene_jaw_width value = 0.2 }"));
        set.add(parse_morph_file("a", "morph = { gene = gene_jaw_width value = 0.3 }"));
        assert_eq!(set.models().len(), 2);
        assert_eq!(
            set.get("a").unwrap().get_gene("gene_jaw_width").unwrap().value,
            MorphValue::Number(0.3)
        );

        let snapshot = set.snapshot();
        assert!(set.remove("a").is_some());
        assert_eq!(set.models().len(), 1);
        // The snapshot is unaffected by later mutation.
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn from_genome_uses_dominant_value_byte() {
        let mut genome = ByteGenome::new();
        genome.set("hair_color", [1, 2, 3, 4]);
        let model = MorphFileModel::from_genome("dna", &genome, SchemaVariant::Vanilla);
        let record = model.get_gene("hair_color").unwrap();
        assert_eq!(record.mode, MorphMode::Dna);
        assert_eq!(record.value, MorphValue::Number(2.0));
        assert_eq!(model.records.len(), schema_for(SchemaVariant::Vanilla).len());
    }

    #[test]
    fn to_genome_mirrors_value_on_both_sides() {
        let mut genome = ByteGenome::new();
        genome.set("gene_chin_forward", [9, 200, 9, 10]);
        let model = MorphFileModel::from_genome("dna", &genome, SchemaVariant::Vanilla);
        let back = model.to_genome(SchemaVariant::Vanilla);
        assert_eq!(back.get("gene_chin_forward"), Some([0, 200, 0, 200]));
    }
}
