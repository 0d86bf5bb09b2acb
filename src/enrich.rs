use std::collections::HashMap;
use std::path::{Path, PathBuf};

use similar::{ChangeTag, TextDiff};

use crate::analyzer::{self, CodeContext};
use crate::mutants::{EnrichedMutation, RawMutation, package_of, simple_class_name};
use crate::synth;

/// Resolves mutations against a set of source roots, reading each file once.
pub struct Enricher {
    source_roots: Vec<PathBuf>,
    cache: HashMap<PathBuf, Option<String>>,
}

impl Enricher {
    pub fn new(source_roots: Vec<PathBuf>) -> Self {
        Enricher {
            source_roots,
            cache: HashMap::new(),
        }
    }

    /// Never fails: anything the analyzer cannot place comes back unenhanced.
    pub fn enrich(&mut self, raw: RawMutation) -> EnrichedMutation {
        let Some(path) = self.locate(&raw) else {
            tracing::debug!(class = %raw.mutated_class, "no source file found");
            return EnrichedMutation::unenhanced(raw);
        };
        let Some(source) = self.read(&path) else {
            return EnrichedMutation::unenhanced(raw);
        };

        let ctx = analyzer::extract_from_source(source, &raw.mutated_class, &raw.mutated_method, raw.line_number);
        if ctx.is_empty() {
            return EnrichedMutation::unenhanced(raw);
        }
        build(raw, ctx)
    }

    pub fn enrich_all(&mut self, raws: Vec<RawMutation>) -> Vec<EnrichedMutation> {
        raws.into_iter().map(|raw| self.enrich(raw)).collect()
    }

    /// `<root>/<package path>/<source file>` under the first root that has it.
    fn locate(&self, raw: &RawMutation) -> Option<PathBuf> {
        let file_name = if raw.source_file.is_empty() {
            format!("{}.java", simple_class_name(&raw.mutated_class))
        } else {
            raw.source_file.clone()
        };
        let package = if raw.package_name.is_empty() {
            package_of(&raw.mutated_class)
        } else {
            raw.package_name.as_str()
        };
        let relative: PathBuf = package
            .split('.')
            .filter(|p| !p.is_empty())
            .collect::<PathBuf>()
            .join(file_name);
        self.source_roots
            .iter()
            .map(|root| root.join(&relative))
            .find(|candidate| candidate.is_file())
    }

    fn read(&mut self, path: &Path) -> Option<&str> {
        self.cache
            .entry(path.to_path_buf())
            .or_insert_with(|| match std::fs::read_to_string(path) {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::debug!("cannot read {}: {e}", path.display());
                    None
                }
            })
            .as_deref()
    }
}

fn build(mut raw: RawMutation, ctx: CodeContext) -> EnrichedMutation {
    let mutated = synth::synthesize(&ctx.statement_text, &raw.mutator_id, &raw.description);
    if !ctx.package_name.is_empty() {
        raw.package_name = ctx.package_name.clone();
    }
    if ctx.method_start_line > 0 {
        raw.first_line = ctx.method_start_line;
        raw.last_line = ctx.method_end_line.max(ctx.method_start_line);
    }
    let diff = generate_diff(&ctx.statement_text, &mutated);
    EnrichedMutation {
        raw,
        original_code_snippet: ctx.statement_text,
        synthesized_mutated_snippet: mutated,
        block_id: ctx.block_id,
        diff,
    }
}

pub fn generate_diff(original: &str, mutated: &str) -> String {
    let diff = TextDiff::from_lines(original, mutated);
    let mut output = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "- ",
            ChangeTag::Insert => "+ ",
            ChangeTag::Equal => continue,
        };
        output.push_str(sign);
        output.push_str(&change.to_string());
    }
    output
}
