use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use dnaforge_core::{
    codec, collect_mod_files, find_morph_blocks, parse_morph_file, patch, ruler_text,
    serialize_morph_file, DnaError, MorphFileModel, PatchMode, PatchSettings, Provenance, Result,
    SchemaVariant, Sex,
};

#[derive(Debug, Parser)]
#[command(name = "dnaforge", version, about = "Crusader Kings III character DNA toolkit")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PatchOutput {
    /// Base64 DNA string.
    Dna,
    /// Mod-file morph blocks.
    Mod,
    /// JSON record dump.
    Json,
}

impl std::fmt::Display for PatchOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchOutput::Dna => write!(f, "dna"),
            PatchOutput::Mod => write!(f, "mod"),
            PatchOutput::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode a Base64 DNA string into ruler-designer text.
    Decode {
        /// DNA string, or path to a file containing one.
        input: String,
        #[arg(long, value_enum, default_value_t = SchemaVariant::Vanilla)]
        variant: SchemaVariant,
        #[arg(long, value_enum, default_value_t = Sex::Male)]
        sex: Sex,
        /// Emit the decoded genome as JSON instead.
        #[arg(long)]
        json: bool,
        /// Write to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Encode ruler-designer text back into a Base64 DNA string.
    Encode {
        /// Path to a ruler-designer text file.
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = SchemaVariant::Vanilla)]
        variant: SchemaVariant,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Port an old DNA string onto a newer, longer template string.
    Graft {
        /// Old DNA (string or file).
        old: String,
        /// Template DNA (string or file).
        template: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Parse a mod file and report its morph blocks.
    Parse {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Blend or apply two gene sources into a patched gene set.
    Patch {
        /// Base source: Base64 DNA (string or file) or a mod file.
        base: String,
        /// Overlay source: Base64 DNA (string or file) or a mod file.
        overlay: String,
        #[arg(long, value_enum, default_value_t = PatchMode::Apply)]
        mode: PatchMode,
        /// Seed for the blend-mode random draws.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, value_enum, default_value_t = SchemaVariant::Vanilla)]
        variant: SchemaVariant,
        #[arg(long, value_enum, default_value_t = PatchOutput::Dna)]
        format: PatchOutput,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Walk a mod directory and report morph blocks per file.
    Scan {
        root: PathBuf,
    },
}

/// Reads the argument as a file when it names one, otherwise treats it
/// as inline (pasted) text.
fn read_input(arg: &str) -> Result<(String, bool)> {
    let path = Path::new(arg);
    if path.is_file() {
        Ok((fs::read_to_string(path)?, true))
    } else {
        Ok((arg.to_string(), false))
    }
}

/// Loads a patch source: text with at least one morph block is parsed
/// into records, and anything else is decoded as Base64 DNA. The
/// block scan is the discriminator because every letter of "morph" is
/// in the Base64 alphabet, so a plain substring check would misroute
/// some pasted DNA strings.
fn load_source(arg: &str, variant: SchemaVariant) -> Result<MorphFileModel> {
    let (text, from_file) = read_input(arg)?;
    if !find_morph_blocks(&text).is_empty() {
        return Ok(parse_morph_file(arg, &text));
    }
    let genome = codec::decode(&text, variant)?;
    let mut model = MorphFileModel::from_genome(arg, &genome, variant);
    if !from_file {
        model.provenance = Provenance::Pasted;
    }
    Ok(model)
}

fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            Ok(())
        }
        None => {
            println!("{content}");
            Ok(())
        }
    }
}

fn to_json(value: &impl serde::Serialize) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| DnaError::Format(format!("JSON encoding failed: {e}")))
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Decode { input, variant, sex, json, output } => {
            let (text, _) = read_input(&input)?;
            let genome = codec::decode(&text, variant)?;
            let rendered = if json {
                to_json(&genome)?
            } else {
                ruler_text::to_text(&genome, sex, variant)
            };
            write_output(output.as_ref(), &rendered)
        }

        Command::Encode { input, variant, output } => {
            let text = fs::read_to_string(&input)?;
            let genome = ruler_text::from_text(&text, variant)?;
            write_output(output.as_ref(), &codec::encode(&genome, variant))
        }

        Command::Graft { old, template, output } => {
            let (old_text, _) = read_input(&old)?;
            let (template_text, _) = read_input(&template)?;
            write_output(output.as_ref(), &codec::graft(&old_text, &template_text)?)
        }

        Command::Parse { input, json } => {
            let text = fs::read_to_string(&input)?;
            let model = parse_morph_file(&input.display().to_string(), &text);
            if json {
                println!("{}", to_json(&model.records)?);
            } else {
                for (key, record) in &model.records {
                    println!("{key}: mode={} template={:?} value={:?}", record.mode, record.template, record.value);
                }
                println!("{} record(s)", model.records.len());
            }
            Ok(())
        }

        Command::Patch { base, overlay, mode, seed, variant, format, output } => {
            let base_model = load_source(&base, variant)?;
            let overlay_model = load_source(&overlay, variant)?;
            let settings = PatchSettings { seed, mode };
            let genes = dnaforge_core::schema_for(variant);
            let result = patch(&base_model, &overlay_model, &settings, genes);

            let rendered = match format {
                PatchOutput::Dna => codec::encode(&result.to_genome(variant), variant),
                PatchOutput::Mod => {
                    // Surgical update when the overlay was a mod file,
                    // fresh blocks otherwise.
                    let original = overlay_model.raw_text.as_deref().unwrap_or("");
                    serialize_morph_file(original, &result)
                }
                PatchOutput::Json => to_json(&result.records)?,
            };
            write_output(output.as_ref(), &rendered)
        }

        Command::Scan { root } => {
            let files = collect_mod_files(&root)?;
            let mut total = 0usize;
            for file in &files {
                let text = fs::read_to_string(file)?;
                let count = parse_morph_file(&file.display().to_string(), &text).records.len();
                if count > 0 {
                    println!("{}: {count} morph record(s)", file.display());
                }
                total += count;
            }
            println!("{} file(s), {total} record(s)", files.len());
            Ok(())
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(err) = run(args.command) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dna_string_spelling_morph_still_decodes_as_dna() {
        // Every letter of "morph" is a Base64 character, so this is a
        // legitimate pasted DNA string, not a mod file.
        let model = load_source("AAmorphA", SchemaVariant::Vanilla).unwrap();
        assert_eq!(model.provenance, Provenance::Pasted);
        assert!(!model.records.is_empty());
    }

    #[test]
    fn inline_morph_block_loads_as_mod_file() {
        let source = "morph = { gene = gene_jaw_width value = 0.5 }";
        let model = load_source(source, SchemaVariant::Vanilla).unwrap();
        assert_eq!(model.provenance, Provenance::ModFile);
        assert_eq!(model.records.len(), 1);
    }
}
