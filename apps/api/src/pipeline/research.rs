//! Research stage — search, optional deep fetch, then one model call.
//!
//! Deep search degrades in place: a page that cannot be fetched keeps its
//! snippet, and a fixed-format notice is written both into the evidence shown to
//! the model and into the stage's own output. Fetch failures never reach the
//! caller.

use std::fmt;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::pipeline::prompts::build_stage_prompt;
use crate::pipeline::{
    invoke_stage, Collaborators, PipelineError, SearchPreferences, Stage, StageContext,
    StageOutput, WorkArrangement,
};
use crate::search::{FetchFailure, PageFetcher, SearchResult};

/// Heading of the section appended to the research output when pages degraded.
pub const DEEP_SEARCH_NOTES_HEADING: &str = "## Deep Search Notes";

/// Substitute for a page that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackNotice {
    pub url: String,
    pub reason: FetchFailure,
}

impl fmt::Display for FallbackNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Full posting unavailable for {}: {}. Using search snippet only.]",
            self.url, self.reason
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContent {
    /// Deep search off.
    SnippetOnly,
    FullText(String),
    Degraded(FallbackNotice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingEvidence {
    pub result: SearchResult,
    pub page: PageContent,
}

/// Everything the research prompt is built from, in search rank order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResearchEvidence {
    pub postings: Vec<PostingEvidence>,
}

impl ResearchEvidence {
    pub fn notices(&self) -> impl Iterator<Item = &FallbackNotice> {
        self.postings.iter().filter_map(|p| match &p.page {
            PageContent::Degraded(notice) => Some(notice),
            _ => None,
        })
    }

    /// Markdown rendering placed under SEARCH RESULTS in the research prompt.
    pub fn render(&self) -> String {
        if self.postings.is_empty() {
            return "No search results were returned for this query.".to_string();
        }

        let mut out = String::new();
        for (i, posting) in self.postings.iter().enumerate() {
            let r = &posting.result;
            out.push_str(&format!(
                "### Result {}: {}\n- Source: {}\n- URL: {}\n- Snippet: {}\n",
                i + 1,
                r.title,
                r.source,
                r.url,
                r.snippet
            ));
            match &posting.page {
                PageContent::SnippetOnly => {}
                PageContent::FullText(text) => {
                    out.push_str(&format!("- Full posting:\n{text}\n"));
                }
                PageContent::Degraded(notice) => {
                    out.push_str(&format!("- {notice}\n"));
                }
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

/// Query sent to the search collaborator.
pub fn search_query(preferences: &SearchPreferences) -> String {
    let topic = preferences.topic.trim();
    match preferences.work_arrangement {
        WorkArrangement::Any => format!("{topic} jobs"),
        other => format!("{topic} {} jobs", other.label()),
    }
}

/// Runs the research stage against the given collaborators.
pub async fn run(
    preferences: &SearchPreferences,
    collaborators: &Collaborators,
    context: &StageContext,
) -> Result<StageOutput, PipelineError> {
    let query = search_query(preferences);
    let results = collaborators
        .search
        .search(&query)
        .await
        .map_err(|source| PipelineError::Search {
            stage: Stage::Research,
            source,
        })?;
    info!("Search {:?} returned {} results", query, results.len());

    let evidence = if preferences.deep_search {
        deep_evidence(results, collaborators.fetcher.as_ref()).await
    } else {
        snippet_evidence(results)
    };

    let rendered = evidence.render();
    let prompt = build_stage_prompt(
        Stage::Research,
        preferences,
        "",
        Some(&rendered),
        context,
    );
    let mut output = invoke_stage(Stage::Research, &prompt, collaborators.model.as_ref()).await?;

    let notes = notes_section(&evidence);
    if !notes.is_empty() {
        output.text = format!("{}\n\n{}", output.text.trim_end(), notes);
    }
    Ok(output)
}

fn snippet_evidence(results: Vec<SearchResult>) -> ResearchEvidence {
    ResearchEvidence {
        postings: results
            .into_iter()
            .map(|result| PostingEvidence {
                result,
                page: PageContent::SnippetOnly,
            })
            .collect(),
    }
}

/// Fetches every result concurrently; each failure only affects its own posting.
pub async fn deep_evidence(
    results: Vec<SearchResult>,
    fetcher: &dyn PageFetcher,
) -> ResearchEvidence {
    let pages = join_all(results.iter().map(|r| fetcher.fetch_page(&r.url))).await;

    let postings = results
        .into_iter()
        .zip(pages)
        .map(|(result, page)| {
            let page = match page {
                Ok(text) => PageContent::FullText(text),
                Err(reason) => {
                    warn!("Deep search fell back to snippet for {}: {}", result.url, reason);
                    PageContent::Degraded(FallbackNotice {
                        url: result.url.clone(),
                        reason,
                    })
                }
            };
            PostingEvidence { result, page }
        })
        .collect();

    ResearchEvidence { postings }
}

/// One line per degraded URL under a fixed heading; empty when nothing degraded.
pub fn notes_section(evidence: &ResearchEvidence) -> String {
    let lines: Vec<String> = evidence.notices().map(|n| format!("- {n}")).collect();
    if lines.is_empty() {
        return String::new();
    }
    format!("{DEEP_SEARCH_NOTES_HEADING}\n\n{}", lines.join("\n"))
}
