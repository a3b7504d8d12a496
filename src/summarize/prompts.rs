//! Prompt builders for summary sections.
//!
//! Wording here is deliberately plain; the structure (section / partial /
//! combine) is what the map-reduce flow depends on.

use super::Section;

/// Version tag stored in summary metadata so cached summaries can be
/// invalidated when prompt structure changes.
pub const PROMPT_VERSION: &str = "1.0";

/// Delimiter between partial results fed to the combine call.
pub const PARTIAL_DELIMITER: &str = "\n\n---\n\n";

/// Instructions for one section, applied to a complete transcript.
pub fn section_instructions(section: Section) -> &'static str {
    match section {
        Section::ExecutiveSummary => {
            "Write a concise executive summary of this podcast episode. \
             Start by identifying the podcast, episode, host, and date when \
             provided, then give a short overview and 3-6 bullet points \
             covering the core topics. Summarize only what was actually \
             discussed; do not add interpretations or conclusions that are \
             not in the transcript."
        }
        Section::KeyThemes => {
            "Identify 5-10 key themes discussed in this episode. Only \
             include themes that are explicitly discussed, supported by \
             specific examples from the conversation. Number each theme and \
             format as: Number. Theme Title - brief explanation. Plain text \
             only, no markdown."
        }
        Section::NotableQuotes => {
            "Extract 5-15 of the most insightful or memorable quotes. Only \
             include quotes that appear verbatim in the transcript; never \
             paraphrase. Prefer complete thoughts of 1-4 sentences over \
             fragments. Number each quote and format as: Number. \"Quote\" - \
             context when needed. Plain text only, no markdown."
        }
        Section::ActionableInsights => {
            "Extract 5-10 actionable takeaways a listener could implement. \
             Only include insights explicitly mentioned or clearly implied \
             in the transcript, and quote named techniques exactly as said. \
             Number each insight and format as: Number. Title - explanation. \
             Plain text only, no markdown."
        }
    }
}

/// System prompt carrying episode metadata context.
pub fn system_prompt(metadata_header: &str) -> String {
    if metadata_header.is_empty() {
        "You are analyzing a podcast transcript.".to_string()
    } else {
        format!("You are analyzing a podcast transcript.\n{metadata_header}")
    }
}

/// Direct-path prompt: the full transcript in one call.
pub fn direct_prompt(section: Section, transcript: &str) -> String {
    format!(
        "{}\n\nCOMPLETE TRANSCRIPT:\n{}",
        section_instructions(section),
        transcript
    )
}

/// Map-step prompt for one transcript chunk.
///
/// The model is told this is part i of N so it does not assume it has the
/// full conversation.
pub fn partial_prompt(section: Section, chunk: &str, index: usize, total: usize) -> String {
    format!(
        "You are seeing part {part} of {total} of a longer podcast \
         transcript; other parts are processed separately. Apply the \
         following instructions to this part only, without assuming \
         knowledge of the rest.\n\n{instructions}\n\nTRANSCRIPT PART \
         {part} OF {total}:\n{chunk}",
        part = index + 1,
        total = total,
        instructions = section_instructions(section),
    )
}

/// Reduce-step prompt merging partial results into one cohesive section.
pub fn combine_prompt(section: Section, partials: &str) -> String {
    format!(
        "Below are partial results produced from consecutive parts of one \
         podcast transcript, separated by '---'. Merge them into a single \
         cohesive result, removing duplicate or overlapping content while \
         preserving the original ordering of the conversation. The merged \
         result must satisfy these instructions:\n\n{}\n\nPARTIAL \
         RESULTS:\n{}",
        section_instructions(section),
        partials
    )
}
