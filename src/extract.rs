//! Page-marked text extraction from the canonical PDF.
//!
//! Every page contributes one segment, in physical order, prefixed with a
//! marker line the classifier uses to cite the page a story came from:
//!
//! ```text
//!
//! --- Página 1 ---
//! <text of page 1>
//! --- Página 2 ---
//! <text of page 2>
//! ```

use crate::error::{PipelineError, Result};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Text of one physical page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSegment {
    /// 1-based page number.
    pub page: u32,
    pub text: String,
}

/// All page segments of one edition, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedCorpus {
    pub segments: Vec<PageSegment>,
}

pub fn page_marker(page: u32) -> String {
    format!("\n--- Página {page} ---\n")
}

impl ExtractedCorpus {
    pub fn page_count(&self) -> usize {
        self.segments.len()
    }

    /// The single string sent to the classifier.
    pub fn render(&self) -> String {
        let mut corpus = String::new();
        for segment in &self.segments {
            corpus.push_str(&page_marker(segment.page));
            corpus.push_str(&segment.text);
        }
        corpus
    }

    /// Character (not byte) count of the rendered corpus.
    pub fn char_count(&self) -> usize {
        self.render().chars().count()
    }
}

/// Open the PDF at `path` and extract every page.
///
/// A page whose text cannot be decoded contributes an empty segment so page
/// numbering stays aligned with the physical document. A file that cannot be
/// opened or parsed at all is an `Extraction` error.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn extract_corpus(path: &Path) -> Result<ExtractedCorpus> {
    let document = lopdf::Document::load(path).map_err(|e| PipelineError::Extraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let pages = document.get_pages();
    info!(pages = pages.len(), "Opened PDF");

    let mut segments = Vec::with_capacity(pages.len());
    for (&page, _) in pages.iter() {
        let text = match document.extract_text(&[page]) {
            Ok(text) => text,
            Err(e) => {
                warn!(page, error = %e, "Could not extract page text; using empty segment");
                String::new()
            }
        };
        debug!(page, chars = text.chars().count(), "Extracted page");
        segments.push(PageSegment { page, text });
    }

    let corpus = ExtractedCorpus { segments };
    info!(
        pages = corpus.page_count(),
        chars = corpus.char_count(),
        "Extraction complete"
    );
    Ok(corpus)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::{Document, Object, Stream, dictionary};

    /// A PDF with one Helvetica text line per page.
    pub(crate) fn pdf_with_pages(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut page_ids = Vec::new();
        for text in page_texts {
            let content = format!(
                "BT /F1 12 Tf 100 700 Td ({}) Tj ET",
                text.replace('\\', "\\\\")
                    .replace('(', "\\(")
                    .replace(')', "\\)")
            );
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            page_ids.push(doc.add_object(dictionary! {
                "Type" => "Page",
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            }));
        }

        let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_texts.len() as i64),
        });
        for page_id in &page_ids {
            if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(*page_id) {
                dict.set("Parent", pages_id);
            }
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn write_pdf(dir: &Path, page_texts: &[&str]) -> std::path::PathBuf {
        let path = dir.join("edicao.pdf");
        std::fs::write(&path, pdf_with_pages(page_texts)).unwrap();
        path
    }

    #[test]
    fn test_three_pages_are_marked_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_pdf(
            tmp.path(),
            &["Capa do dia", "Sessao da Camara de Vereadores", "Esportes"],
        );

        let corpus = extract_corpus(&path).unwrap();

        assert_eq!(corpus.page_count(), 3);
        assert_eq!(
            corpus.segments.iter().map(|s| s.page).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(corpus.segments[1].text.contains("Camara"));

        let rendered = corpus.render();
        let p1 = rendered.find("--- Página 1 ---").unwrap();
        let p2 = rendered.find("--- Página 2 ---").unwrap();
        let p3 = rendered.find("--- Página 3 ---").unwrap();
        let council = rendered.find("Camara").unwrap();
        assert!(p1 < p2 && p2 < council && council < p3);
        assert!(rendered.starts_with("\n--- Página 1 ---\n"));
    }

    #[test]
    fn test_single_page() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_pdf(tmp.path(), &["Unica pagina"]);

        let corpus = extract_corpus(&path).unwrap();

        assert_eq!(corpus.page_count(), 1);
        assert_eq!(corpus.render().matches("--- Página").count(), 1);
    }

    #[test]
    fn test_zero_pages_yields_empty_corpus() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_pdf(tmp.path(), &[]);

        let corpus = extract_corpus(&path).unwrap();

        assert_eq!(corpus.page_count(), 0);
        assert_eq!(corpus.render(), "");
        assert_eq!(corpus.char_count(), 0);
    }

    #[test]
    fn test_char_count_counts_characters_not_bytes() {
        let corpus = ExtractedCorpus {
            segments: vec![PageSegment {
                page: 1,
                text: "Câmara".into(),
            }],
        };
        // "\n--- Página 1 ---\n" is 18 characters.
        assert_eq!(corpus.char_count(), 18 + 6);
    }

    #[test]
    fn test_corrupt_file_is_extraction_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"<html>not a pdf</html>").unwrap();

        let err = extract_corpus(&path).unwrap_err();

        assert!(matches!(err, PipelineError::Extraction { .. }));
        assert_eq!(err.exit_code(), 5);
    }
}
