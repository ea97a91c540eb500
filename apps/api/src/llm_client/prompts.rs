// Shared prompt constants and prompt-building utilities.
// Stage-specific templates live in pipeline/prompts.rs.
// This file contains cross-cutting prompt fragments.

/// Appended to every stage's system instruction.
pub const MARKDOWN_ONLY_SYSTEM: &str = "Respond in clean GitHub-flavoured Markdown only. \
    Do NOT wrap the whole answer in a code fence. \
    Do NOT include preambles, apologies or notes about being an AI.";

/// Appended to every stage task. The model must not invent postings or facts.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Base every statement on the material provided in this prompt. \
    Do NOT invent companies, job postings, salaries or URLs. \
    If information is missing, say that it is not available.";
