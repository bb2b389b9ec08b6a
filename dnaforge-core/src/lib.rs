use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

pub mod codec;
pub mod morph;
pub mod patch;
pub mod ruler_text;
pub mod schema;
pub mod serializer;

pub use codec::{decode, encode, graft, ByteGenome};
pub use morph::{
    find_morph_blocks, parse_morph_file, GeneKey, MorphBlock, MorphFileModel, MorphMode,
    MorphRecord, MorphValue, Provenance, WorkingSet,
};
pub use patch::{normalize_to_byte, patch, PatchMode, PatchSettings};
pub use ruler_text::Sex;
pub use schema::{schema_for, SchemaVariant};
pub use serializer::serialize_morph_file;

#[derive(Debug, Error)]
pub enum DnaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("format error: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, DnaError>;

/// Builds a `Format` error that quotes the offending input, truncated
/// so a pasted save-game blob does not flood the message.
pub(crate) fn format_error(context: &str, input: &str) -> DnaError {
    const MAX_QUOTED: usize = 48;
    let mut quoted: String = input.chars().take(MAX_QUOTED).collect();
    if input.chars().count() > MAX_QUOTED {
        quoted.push_str("...");
    }
    DnaError::Format(format!("{context}: {quoted:?}"))
}

/// Collects every `.txt` file under a mod directory, sorted for stable
/// output. CK3 mods keep gene/morph definitions spread across plain
/// text files in nested folders.
pub fn collect_mod_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(DnaError::Format(format!(
            "mod directory does not exist: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| DnaError::Format(format!("walk failed: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_txt = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        if is_txt {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}
