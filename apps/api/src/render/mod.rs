//! Markdown report → paginated A4 PDF.
//!
//! # Architecture
//! - `layout_document` is pure: it turns markdown into pages of placed text runs
//!   using the static Helvetica metrics. All pagination decisions happen here.
//! - `render_pdf` only replays the layout through printpdf's built-in fonts.
//!   It is CPU-bound; async callers run it via `tokio::task::spawn_blocking`.
//!
//! Coordinates are millimetres with the origin at the bottom-left of the page,
//! `y_mm` being the text baseline.

pub mod markdown;
pub mod metrics;

use printpdf::{BuiltinFont, Mm, PdfDocument};
use thiserror::Error;

use markdown::{classify_line, strip_inline, to_pdf_charset, LineKind};
use metrics::{get_metrics, FontFace};

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_MM: f32 = 20.0;

const PT_TO_MM: f32 = 0.352_778;
const LINE_SPACING: f32 = 1.35;

const TITLE_SIZE: f32 = 18.0;
const BODY_SIZE: f32 = 10.5;
const RULE_SIZE: f32 = 8.0;

/// Left indent of list text, relative to the margin.
const LIST_INDENT_MM: f32 = 8.0;
const LIST_MARKER_MM: f32 = 2.0;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("PDF font error: {0}")]
    Font(String),

    #[error("PDF serialization failed: {0}")]
    Serialize(String),
}

/// One line of text at a fixed position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x_mm: f32,
    pub y_mm: f32,
    pub size_pt: f32,
    pub face: FontFace,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub runs: Vec<TextRun>,
}

struct Style {
    size_pt: f32,
    face: FontFace,
    space_before_mm: f32,
}

fn heading_style(level: u8) -> Style {
    match level {
        1 => Style { size_pt: 16.0, face: FontFace::Bold, space_before_mm: 5.0 },
        2 => Style { size_pt: 13.5, face: FontFace::Bold, space_before_mm: 4.0 },
        _ => Style { size_pt: 11.5, face: FontFace::Bold, space_before_mm: 3.0 },
    }
}

const BODY: Style = Style { size_pt: BODY_SIZE, face: FontFace::Regular, space_before_mm: 0.0 };

fn line_height_mm(size_pt: f32) -> f32 {
    size_pt * LINE_SPACING * PT_TO_MM
}

/// Top-down cursor that opens a new page whenever the next line would cross
/// the bottom margin.
struct Cursor {
    pages: Vec<PageLayout>,
    /// Distance from the top edge to the top of the next line.
    top_mm: f32,
}

impl Cursor {
    fn new() -> Self {
        Self {
            pages: vec![PageLayout::default()],
            top_mm: MARGIN_MM,
        }
    }

    fn at_page_top(&self) -> bool {
        self.top_mm <= MARGIN_MM
    }

    /// Vertical gap, dropped at the top of a page.
    fn space(&mut self, mm: f32) {
        if !self.at_page_top() {
            self.top_mm += mm;
        }
    }

    fn place(&mut self, text: String, x_mm: f32, size_pt: f32, face: FontFace) {
        let height = line_height_mm(size_pt);
        if self.top_mm + height > PAGE_HEIGHT_MM - MARGIN_MM && !self.at_page_top() {
            self.pages.push(PageLayout::default());
            self.top_mm = MARGIN_MM;
        }
        let baseline_from_top = self.top_mm + size_pt * PT_TO_MM * 1.05;
        if let Some(page) = self.pages.last_mut() {
            page.runs.push(TextRun {
                text,
                x_mm,
                y_mm: PAGE_HEIGHT_MM - baseline_from_top,
                size_pt,
                face,
            });
        }
        self.top_mm += height;
    }

    /// Wraps `text` into the column starting at `indent_mm`. An optional
    /// marker is placed on the first line, left of the column.
    fn paragraph(&mut self, text: &str, style: &Style, indent_mm: f32, marker: Option<&str>) {
        self.space(style.space_before_mm);
        let column_mm = PAGE_WIDTH_MM - 2.0 * MARGIN_MM - indent_mm;
        let max_em = column_mm / (style.size_pt * PT_TO_MM);
        let lines = get_metrics(style.face).wrap(&prepare(text), max_em);

        for (i, line) in lines.into_iter().enumerate() {
            if i == 0 {
                if let Some(marker) = marker {
                    // Keep the marker on the same page as its first line.
                    let height = line_height_mm(style.size_pt);
                    if self.top_mm + height > PAGE_HEIGHT_MM - MARGIN_MM {
                        self.pages.push(PageLayout::default());
                        self.top_mm = MARGIN_MM;
                    }
                    if let Some(page) = self.pages.last_mut() {
                        page.runs.push(TextRun {
                            text: marker.to_string(),
                            x_mm: MARGIN_MM + LIST_MARKER_MM,
                            y_mm: PAGE_HEIGHT_MM - (self.top_mm + style.size_pt * PT_TO_MM * 1.05),
                            size_pt: style.size_pt,
                            face: style.face,
                        });
                    }
                }
            }
            self.place(line, MARGIN_MM + indent_mm, style.size_pt, style.face);
        }
    }

    fn rule(&mut self) {
        self.space(1.5);
        let dash_em = get_metrics(FontFace::Regular).measure_str("-");
        let count = ((PAGE_WIDTH_MM - 2.0 * MARGIN_MM) / (RULE_SIZE * PT_TO_MM) / dash_em) as usize;
        self.place("-".repeat(count), MARGIN_MM, RULE_SIZE, FontFace::Regular);
        self.space(1.5);
    }
}

fn prepare(text: &str) -> String {
    to_pdf_charset(&strip_inline(text))
}

/// Lays out the report: a bold title followed by the classified markdown lines.
pub fn layout_document(title: &str, markdown_text: &str) -> Vec<PageLayout> {
    let mut cursor = Cursor::new();
    cursor.paragraph(
        title,
        &Style { size_pt: TITLE_SIZE, face: FontFace::Bold, space_before_mm: 0.0 },
        0.0,
        None,
    );
    cursor.space(3.0);

    for line in markdown_text.lines() {
        match classify_line(line) {
            LineKind::Heading { level, text } => {
                cursor.paragraph(text, &heading_style(level), 0.0, None);
                cursor.space(1.0);
            }
            LineKind::Bullet(text) => cursor.paragraph(text, &BODY, LIST_INDENT_MM, Some("-")),
            LineKind::Numbered { marker, text } => {
                cursor.paragraph(text, &BODY, LIST_INDENT_MM, Some(marker))
            }
            LineKind::Rule => cursor.rule(),
            LineKind::Blank => cursor.space(line_height_mm(BODY_SIZE) * 0.5),
            LineKind::Body(text) => cursor.paragraph(text, &BODY, 0.0, None),
        }
    }

    cursor.pages
}

/// Renders markdown to PDF bytes with the built-in Helvetica faces.
pub fn render_pdf(title: &str, markdown_text: &str) -> Result<Vec<u8>, RenderError> {
    let pages = layout_document(title, markdown_text);

    let (doc, first_page, first_layer) = PdfDocument::new(
        to_pdf_charset(title),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Layer 1",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RenderError::Font(format!("{e:?}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| RenderError::Font(format!("{e:?}")))?;

    for (i, page) in pages.iter().enumerate() {
        let (page_index, layer_index) = if i == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1")
        };
        let layer = doc.get_page(page_index).get_layer(layer_index);
        for run in &page.runs {
            let font = match run.face {
                FontFace::Regular => &regular,
                FontFace::Bold => &bold,
            };
            layer.use_text(
                run.text.clone(),
                run.size_pt,
                Mm(run.x_mm),
                Mm(run.y_mm),
                font,
            );
        }
    }

    doc.save_to_bytes()
        .map_err(|e| RenderError::Serialize(format!("{e:?}")))
}
