use std::collections::{HashMap, HashSet};

use crate::morph::{scan_morph_blocks, GeneKey, MorphFileModel, MorphMode, MorphRecord, MorphValue};

/// Formats a record value for mod-file output. Values above 1 are raw
/// bytes and get scaled back into the game's float space first.
fn format_value(v: f64) -> String {
    let v = if v > 1.0 { v / 255.0 } else { v };
    format!("{v:.3}")
}

/// Byte-domain modes never appear in mod files; their records are
/// conceptually "replace with raw byte".
fn mod_file_mode(mode: MorphMode) -> MorphMode {
    match mode {
        MorphMode::Dna | MorphMode::Patch => MorphMode::Replace,
        other => other,
    }
}

fn format_block(key: &GeneKey, record: &MorphRecord) -> String {
    let mut out = String::from("morph = {\n");
    out.push_str(&format!("\tmode = {}\n", mod_file_mode(record.mode)));
    // Bare gene id: the #N occurrence suffix is in-memory identity
    // only and must never reach serialized output.
    out.push_str(&format!("\tgene = {}\n", key.id));
    if !record.template.is_empty() {
        out.push_str(&format!("\ttemplate = {}\n", record.template));
    }
    match &record.value {
        MorphValue::Range(range) => out.push_str(&format!("\trange = {range}\n")),
        MorphValue::Number(v) => out.push_str(&format!("\tvalue = {}\n", format_value(*v))),
    }
    out.push('}');
    out
}

/// Re-emits a mod file from its original text and a (possibly edited)
/// record set. Only the byte ranges of recognized morph blocks are
/// touched: blocks whose record changed since parse are re-formatted,
/// blocks whose record is unchanged or whose key was deleted are
/// copied through byte-for-byte, and all text between blocks is
/// preserved verbatim. Records never seen in the original are appended
/// as new blocks just before the document's final closing brace, or at
/// the end when there is none.
pub fn serialize_morph_file(original: &str, model: &MorphFileModel) -> String {
    let (blocks, parsed) = scan_morph_blocks(original);
    let parsed: HashMap<&GeneKey, &MorphRecord> = parsed.iter().map(|(k, r)| (k, r)).collect();

    let mut out = String::with_capacity(original.len());
    let mut consumed: HashSet<GeneKey> = HashSet::new();
    let mut cursor = 0usize;

    for block in &blocks {
        out.push_str(&original[cursor..block.start]);
        match model.get(&block.key) {
            Some(record) => {
                if parsed.get(&block.key) == Some(&record) {
                    // Unedited since parse: keep the author's exact
                    // formatting.
                    out.push_str(&original[block.start..block.end]);
                } else {
                    out.push_str(&format_block(&block.key, record));
                }
                consumed.insert(block.key.clone());
            }
            // Deleted from the working set: leave the original block
            // alone rather than dropping text we do not own.
            None => out.push_str(&original[block.start..block.end]),
        }
        cursor = block.end;
    }
    out.push_str(&original[cursor..]);

    let mut appendix = String::new();
    for (key, record) in &model.records {
        if !consumed.contains(key) {
            appendix.push_str(&format_block(key, record));
            appendix.push('\n');
        }
    }

    if appendix.is_empty() {
        return out;
    }

    match out.rfind('}') {
        Some(pos) => {
            let mut spliced = String::with_capacity(out.len() + appendix.len() + 1);
            spliced.push_str(&out[..pos]);
            spliced.push_str(&appendix);
            spliced.push_str(&out[pos..]);
            spliced
        }
        None => {
            // Best effort when the document has no closing brace.
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&appendix);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morph::{find_morph_blocks, parse_morph_file};

    const SOURCE: &str = r#"# portrait tweaks
some_directive = yes
morph = {
	mode = add
	gene = gene_jaw_width
	value = 0.200
}
# keep me
morph = {
	mode = replace
	gene = gene_chin_forward
	template = chin_forward_pos
	value = 0.400
}
morph = {
	mode = modify
	gene = gene_eye_angle
	value = 0.600
}
"#;

    #[test]
    fn unedited_round_trip_is_byte_identical() {
        let model = parse_morph_file("t", SOURCE);
        let out = serialize_morph_file(SOURCE, &model);
        assert_eq!(out, SOURCE);
    }

    #[test]
    fn editing_one_gene_leaves_other_blocks_byte_identical() {
        let mut model = parse_morph_file("t", SOURCE);
        let key = GeneKey::first("gene_jaw_width");
        let mut record = model.get(&key).unwrap().clone();
        record.value = MorphValue::Number(0.9);
        model.set(key, record);

        let out = serialize_morph_file(SOURCE, &model);
        let before = find_morph_blocks(SOURCE);
        let after = find_morph_blocks(&out);
        assert_eq!(after.len(), 3);
        assert!(out.contains("value = 0.900"));
        // The two untouched blocks survive byte-for-byte.
        assert_eq!(before[1].raw, after[1].raw);
        assert_eq!(before[2].raw, after[2].raw);
        // So does all non-block text.
        assert!(out.starts_with("# portrait tweaks\nsome_directive = yes\n"));
        assert!(out.contains("\n# keep me\n"));
    }

    #[test]
    fn deleted_key_copies_original_block_unchanged() {
        let mut model = parse_morph_file("t", SOURCE);
        model.remove(&GeneKey::first("gene_chin_forward"));
        let out = serialize_morph_file(SOURCE, &model);
        // The original block text survives verbatim, tabs and all.
        assert!(out.contains("\tgene = gene_chin_forward\n\ttemplate = chin_forward_pos\n\tvalue = 0.400"));
    }

    #[test]
    fn new_gene_appends_before_final_closing_brace() {
        let source = "genes = {\nmorph = { gene = gene_jaw_width value = 0.2 }\n}\n";
        let mut model = parse_morph_file("t", source);
        model.set(
            GeneKey::first("gene_neck_length"),
            MorphRecord {
                mode: MorphMode::Replace,
                template: String::new(),
                value: MorphValue::Number(0.75),
            },
        );
        let out = serialize_morph_file(source, &model);
        let appended = out.find("gene = gene_neck_length").unwrap();
        let last_brace = out.rfind('}').unwrap();
        assert!(appended < last_brace);
        assert!(out.ends_with("}\n"));
    }

    #[test]
    fn new_gene_appends_at_end_without_closing_brace() {
        let source = "nothing here\n";
        let mut model = parse_morph_file("t", source);
        model.set(
            GeneKey::first("gene_neck_length"),
            MorphRecord {
                mode: MorphMode::Add,
                template: "neck_pos".to_string(),
                value: MorphValue::Number(0.5),
            },
        );
        let out = serialize_morph_file(source, &model);
        assert!(out.starts_with("nothing here\n"));
        assert!(out.contains("morph = {\n\tmode = add\n\tgene = gene_neck_length\n\ttemplate = neck_pos\n\tvalue = 0.500\n}"));
    }

    #[test]
    fn raw_byte_values_are_rescaled_on_output() {
        let source = "morph = { gene = gene_jaw_width value = 0.2 }";
        let mut model = parse_morph_file("t", source);
        let key = GeneKey::first("gene_jaw_width");
        let mut record = model.get(&key).unwrap().clone();
        record.value = MorphValue::Number(204.0);
        model.set(key, record);
        let out = serialize_morph_file(source, &model);
        assert!(out.contains("value = 0.800"));
    }

    #[test]
    fn edited_range_records_re_emit_the_range() {
        let source = "morph = { gene = gene_jaw_width range = { 0.1 0.9 } }";
        let mut model = parse_morph_file("t", source);
        let key = GeneKey::first("gene_jaw_width");
        let mut record = model.get(&key).unwrap().clone();
        record.mode = MorphMode::Add;
        model.set(key, record);
        let out = serialize_morph_file(source, &model);
        assert!(out.contains("\tmode = add\n"));
        assert!(out.contains("\trange = { 0.1 0.9 }\n"));
    }

    #[test]
    fn occurrence_suffix_never_reaches_output() {
        let source = "morph = { gene = gene_jaw_width value = 0.2 }\nmorph = { gene = gene_jaw_width value = 0.7 }\n";
        let model = parse_morph_file("t", source);
        assert_eq!(model.records[1].0.to_string(), "gene_jaw_width#2");
        let out = serialize_morph_file(source, &model);
        assert!(!out.contains('#'));
        assert_eq!(out.matches("gene = gene_jaw_width").count(), 2);
    }
}
