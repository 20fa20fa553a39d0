//! Instructions for the generative transforms.
//!
//! Every instruction is plain configuration: callers can replace any of them
//! through [`crate::config::PipelineConfigBuilder::prompts`]. The constants
//! here are the defaults.

use crate::element::MediaKind;
use serde::{Deserialize, Serialize};

/// Map phase: summarize one page of text.
pub const PAGE_SUMMARY_PROMPT: &str = r##"Please summarize the text according to the following REQUEST.

REQUEST:
1. Summarize the main points in bullet points.
2. Write the summary in the same language as the text.
3. DO NOT translate any technical terms.
4. DO NOT include any unnecessary information.
5. The summary must include important entities and numerical values.
6. Keep the markdown format and precede each section heading and subheading with # or ##.
7. Do not add a "# SUMMARY" heading."##;

/// Reduce phase: merge a list of page summaries into one.
pub const PAPER_SUMMARY_PROMPT: &str = r##"You are a professional summarizer.
You are given a list of summaries of the parts of one document. Produce a single summary of 1 to 10 lines.

REQUEST:
1. Extract the main points from the list of summaries.
2. Write the final summary as bullet points.
3. Start each bullet with an emoji that fits its meaning.
4. Write the summary in the same language as the summaries.
5. DO NOT translate any technical terms.
6. DO NOT include any unnecessary information.
7. Do not add a "# SUMMARY" heading."##;

/// Translation of summaries and document blocks. `{language}` is replaced
/// with the target language.
pub const TRANSLATION_PROMPT: &str = r#"You are a translator specializing in academic papers.
Translate the given English markdown into {language}.

REQUEST:
1. Do not translate technical terms or key concepts; keep them in English (e.g. Cross Attention, Transformer).
2. Keep the original meaning without adding information.
3. Preserve important entities and numerical values.
4. Keep every markdown marker (#, ##, -, 1., |, ![]()) exactly where it is.
5. Never translate headings; keep them in English.
6. Write math in markdown LaTeX.
7. Output only the translation."#;

pub const IMAGE_CAPTION_PROMPT: &str = r#"You are an expert reader of academic figures.
Describe the figure in the attached image in two to four sentences: what it shows, the axes or components, and the key takeaway.
Use any provided context text. Output only the description."#;

pub const TABLE_CAPTION_PROMPT: &str = r#"You are an expert reader of academic tables.
Summarize the table in the attached image in two to four sentences: what is compared, the metrics, and the best results with their values.
Use any provided context text. Output only the summary."#;

pub const EQUATION_CAPTION_PROMPT: &str = r#"You are an expert in mathematical notation.
Explain the equation in the attached image in one or two sentences: what it computes and what its main symbols mean.
Use any provided context text. Output only the explanation."#;

/// The full set of instructions used by one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompts {
    pub page_summary: String,
    pub paper_summary: String,
    pub translation: String,
    pub image_caption: String,
    pub table_caption: String,
    pub equation_caption: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            page_summary: PAGE_SUMMARY_PROMPT.to_string(),
            paper_summary: PAPER_SUMMARY_PROMPT.to_string(),
            translation: TRANSLATION_PROMPT.to_string(),
            image_caption: IMAGE_CAPTION_PROMPT.to_string(),
            table_caption: TABLE_CAPTION_PROMPT.to_string(),
            equation_caption: EQUATION_CAPTION_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    /// The translation instruction with the target language filled in.
    pub fn translation_for(&self, language: &str) -> String {
        self.translation.replace("{language}", language)
    }

    pub fn caption_for(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Image => &self.image_caption,
            MediaKind::Table => &self.table_caption,
            MediaKind::Equation => &self.equation_caption,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_prompt_fills_language() {
        let prompts = Prompts::default();
        let rendered = prompts.translation_for("Korean");
        assert!(rendered.contains("into Korean"));
        assert!(!rendered.contains("{language}"));
    }

    #[test]
    fn caption_prompts_differ_per_kind() {
        let prompts = Prompts::default();
        assert_ne!(
            prompts.caption_for(MediaKind::Image),
            prompts.caption_for(MediaKind::Equation)
        );
        assert!(prompts.caption_for(MediaKind::Table).contains("table"));
    }
}
