//! Downloads and on-page HTML for a finished run.

use pulldown_cmark::{html, Event, Options, Parser};
use serde::{Deserialize, Serialize};

use crate::pipeline::{PipelineResult, Stage};

/// What can be downloaded: one stage's output, or the combined report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportSection {
    Research,
    GapAnalysis,
    Compose,
    Full,
}

impl ExportSection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "full" => Some(ExportSection::Full),
            other => Stage::from_key(other).map(ExportSection::from),
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            ExportSection::Research => "job_list",
            ExportSection::GapAnalysis => "match_analysis",
            ExportSection::Compose => "application_docs",
            ExportSection::Full => "full_report",
        }
    }

    /// The stage this section shows; `None` for the combined report.
    pub fn stage(self) -> Option<Stage> {
        match self {
            ExportSection::Research => Some(Stage::Research),
            ExportSection::GapAnalysis => Some(Stage::GapAnalysis),
            ExportSection::Compose => Some(Stage::Compose),
            ExportSection::Full => None,
        }
    }

    pub fn title(self) -> &'static str {
        self.stage().map_or("Complete Report", Stage::label)
    }

    pub fn markdown(self, result: &PipelineResult) -> &str {
        match self.stage() {
            Some(stage) => &result.output(stage).text,
            None => &result.full_text,
        }
    }
}

impl From<Stage> for ExportSection {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Research => ExportSection::Research,
            Stage::GapAnalysis => ExportSection::GapAnalysis,
            Stage::Compose => ExportSection::Compose,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

/// `job_list_Backend_Engineer.md` and friends. Spaces become underscores;
/// anything that could break a `Content-Disposition` header is dropped.
pub fn file_name(section: ExportSection, topic: &str, format: ExportFormat) -> String {
    let topic: String = topic
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('_'),
            c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') => Some(c),
            _ => None,
        })
        .collect();
    format!("{}_{}.{}", section.file_stem(), topic, format.extension())
}

/// Markdown → HTML for the results page. Raw HTML in model output is shown as
/// text, never injected.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// One section as the results page shows it.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedSection {
    pub section: ExportSection,
    pub title: &'static str,
    pub markdown: String,
    pub html: String,
}

pub fn rendered_sections(result: &PipelineResult) -> Vec<RenderedSection> {
    [
        ExportSection::Research,
        ExportSection::GapAnalysis,
        ExportSection::Compose,
        ExportSection::Full,
    ]
    .into_iter()
    .map(|section| {
        let markdown = section.markdown(result).to_string();
        RenderedSection {
            section,
            title: section.title(),
            html: markdown_to_html(&markdown),
            markdown,
        }
    })
    .collect()
}
