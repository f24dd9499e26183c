//! File interpreter: bounded previews of downloaded attachments.
//!
//! PDFs become the text of their first pages; CSVs become a markdown table of
//! the header plus the first rows. Anything else is rejected outright so the
//! oracle knows to fall back to `run_code`.

use async_trait::async_trait;
use quizpilot_config::InterpreterConfig;
use quizpilot_core::action::{FileKind, INTERPRET_FILE, InterpretArgs, parse_args};
use quizpilot_core::error::ToolError;
use quizpilot_core::tool::{Tool, ToolResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::truncate_chars;

/// The head of a CSV file. Every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePreview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Data rows in the whole file, not just the preview
    pub total_rows: usize,
}

impl TablePreview {
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&markdown_row(&self.headers));
        out.push_str(&markdown_row(&vec!["---".to_string(); self.headers.len()]));
        for row in &self.rows {
            out.push_str(&markdown_row(row));
        }
        out
    }
}

fn markdown_row(cells: &[String]) -> String {
    let escaped: Vec<String> = cells
        .iter()
        .map(|c| c.replace('|', "\\|").replace(['\r', '\n'], " "))
        .collect();
    format!("| {} |\n", escaped.join(" | "))
}

/// Parse CSV bytes into a preview of at most `max_rows` data rows.
pub fn preview_csv(bytes: &[u8], max_rows: usize) -> Result<TablePreview, ToolError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| failed(format!("invalid CSV header: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() {
        return Err(failed("CSV file has no header row".into()));
    }

    let width = headers.len();
    let mut rows = Vec::new();
    let mut total_rows = 0;
    for record in reader.records() {
        let record = record.map_err(|e| failed(format!("invalid CSV row {}: {e}", total_rows + 1)))?;
        total_rows += 1;
        if rows.len() < max_rows {
            let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }
    }

    Ok(TablePreview {
        headers,
        rows,
        total_rows,
    })
}

/// Text of the first `max_pages` pages, joined and capped at `max_chars`.
pub async fn preview_pdf(bytes: Vec<u8>, max_pages: usize, max_chars: usize) -> Result<String, ToolError> {
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| failed(format!("PDF parser crashed: {e}")))?
        .map_err(|e| failed(format!("could not extract PDF text: {e}")))?;

    let total = pages.len();
    let shown = total.min(max_pages);
    let text = pages[..shown]
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(format!(
        "PDF text (pages 1-{shown} of {total}):\n{}",
        truncate_chars(&text, max_chars)
    ))
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: INTERPRET_FILE.into(),
        reason,
    }
}

pub struct InterpretTool {
    settings: InterpreterConfig,
    run_dir: PathBuf,
}

impl InterpretTool {
    pub fn new(settings: InterpreterConfig, run_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            run_dir: run_dir.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.run_dir.join(path)
        }
    }
}

#[async_trait]
impl Tool for InterpretTool {
    fn name(&self) -> &str {
        INTERPRET_FILE
    }

    fn description(&self) -> &str {
        "Preview a downloaded PDF (text of the first pages) or CSV (header and first rows as a markdown table). \
         Other formats are rejected; use run_code for them or for full-file analysis."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Local path returned by download_file (relative paths resolve in the working directory)"
                },
                "kind": {
                    "type": "string",
                    "enum": ["pdf", "csv"],
                    "description": "File format; inferred from the extension when omitted"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: InterpretArgs = parse_args(INTERPRET_FILE, arguments)?;
        let kind = args
            .kind
            .or_else(|| FileKind::from_extension(&args.path))
            .ok_or_else(|| {
                ToolError::Unsupported(format!(
                    "cannot interpret '{}': only PDF and CSV files are supported",
                    args.path
                ))
            })?;

        let path = self.resolve(&args.path);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| failed(format!("cannot read {}: {e}", path.display())))?;

        debug!(path = %path.display(), %kind, bytes = bytes.len(), "Interpreting file");

        match kind {
            FileKind::Pdf => {
                let text = preview_pdf(bytes, self.settings.pdf_max_pages, self.settings.max_chars).await?;
                Ok(ToolResult::ok(text))
            }
            FileKind::Csv => {
                let preview = preview_csv(&bytes, self.settings.csv_preview_rows)?;
                let output = format!(
                    "CSV preview ({} of {} rows, {} columns):\n{}",
                    preview.rows.len(),
                    preview.total_rows,
                    preview.headers.len(),
                    preview.to_markdown()
                );
                let data = serde_json::to_value(&preview)
                    .map_err(|e| failed(format!("cannot encode preview: {e}")))?;
                Ok(ToolResult::ok(output).with_data(data))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A PDF with one Courier line per page.
    fn pdf_with_pages(lines: &[&str]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{Document, Object, Stream, dictionary};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Count" => lines.len() as i64,
            "Kids" => kids,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn header_cells(markdown: &str) -> usize {
        let header = markdown.lines().next().unwrap();
        header.trim().trim_matches('|').split('|').count()
    }

    #[test]
    fn csv_markdown_keeps_header_width() {
        let csv = "city,population,area\nOslo,709000,454\nBergen,291000\nTromso,77000,2521,extra\n";
        let preview = preview_csv(csv.as_bytes(), 20).unwrap();
        assert_eq!(preview.headers, vec!["city", "population", "area"]);
        assert_eq!(preview.total_rows, 3);
        assert!(preview.rows.iter().all(|r| r.len() == 3));
        assert_eq!(preview.rows[1][2], "");

        let markdown = preview.to_markdown();
        assert_eq!(header_cells(&markdown), 3);
        for line in markdown.lines() {
            assert_eq!(line.matches(" | ").count(), 2, "{line}");
        }
    }

    #[test]
    fn csv_preview_is_bounded() {
        let mut csv = String::from("n\n");
        for i in 0..50 {
            csv.push_str(&format!("{i}\n"));
        }
        let preview = preview_csv(csv.as_bytes(), 20).unwrap();
        assert_eq!(preview.rows.len(), 20);
        assert_eq!(preview.total_rows, 50);
        assert_eq!(preview.rows[19][0], "19");
    }

    #[test]
    fn markdown_escapes_pipes() {
        let preview = TablePreview {
            headers: vec!["expr".into()],
            rows: vec![vec!["a|b".into()]],
            total_rows: 1,
        };
        assert!(preview.to_markdown().contains("a\\|b"));
    }

    #[tokio::test]
    async fn interprets_csv_relative_to_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scores.csv"), "name,score\nada,10\nbob,7\n").unwrap();
        let tool = InterpretTool::new(InterpreterConfig::default(), dir.path());

        let result = tool
            .execute(serde_json::json!({"path": "scores.csv"}))
            .await
            .unwrap();
        assert!(result.output.contains("| name | score |"));
        assert!(result.output.contains("| ada | 10 |"));
        assert_eq!(result.data.unwrap()["total_rows"], 2);
    }

    #[tokio::test]
    async fn unsupported_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp3"), b"ID3").unwrap();
        let tool = InterpretTool::new(InterpreterConfig::default(), dir.path());

        let err = tool
            .execute(serde_json::json!({"path": "clip.mp3"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unsupported(_)));
    }

    #[tokio::test]
    async fn explicit_kind_overrides_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("export.txt"), "a,b\n1,2\n").unwrap();
        let tool = InterpretTool::new(InterpreterConfig::default(), dir.path());

        let result = tool
            .execute(serde_json::json!({"path": "export.txt", "kind": "csv"}))
            .await
            .unwrap();
        assert!(result.output.contains("| a | b |"));
    }

    #[tokio::test]
    async fn pdf_preview_stops_at_page_limit() {
        let bytes = pdf_with_pages(&["alpha", "bravo", "charlie"]);
        let text = preview_pdf(bytes, 2, 4000).await.unwrap();

        assert!(text.starts_with("PDF text (pages 1-2 of 3):"), "{text}");
        assert!(text.contains("alpha"));
        assert!(text.contains("bravo"));
        assert!(!text.contains("charlie"));
    }

    #[tokio::test]
    async fn pdf_preview_is_capped_at_max_chars() {
        let bytes = pdf_with_pages(&["alpha", "bravo", "charlie"]);
        let text = preview_pdf(bytes, 5, 8).await.unwrap();

        assert!(text.starts_with("PDF text (pages 1-3 of 3):"), "{text}");
        assert!(text.contains("alpha"));
        assert!(text.contains("[truncated"));
        assert!(!text.contains("charlie"));
    }

    #[tokio::test]
    async fn interprets_pdf_with_configured_page_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), pdf_with_pages(&["alpha", "bravo"])).unwrap();
        let settings = InterpreterConfig {
            pdf_max_pages: 1,
            ..InterpreterConfig::default()
        };
        let tool = InterpretTool::new(settings, dir.path());

        let result = tool
            .execute(serde_json::json!({"path": "report.pdf"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("pages 1-1 of 2"), "{}", result.output);
        assert!(result.output.contains("alpha"));
        assert!(!result.output.contains("bravo"));
    }

    #[tokio::test]
    async fn corrupt_pdf_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"not a pdf at all").unwrap();
        let tool = InterpretTool::new(InterpreterConfig::default(), dir.path());

        let err = tool
            .execute(serde_json::json!({"path": "broken.pdf"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = InterpretTool::new(InterpreterConfig::default(), dir.path());
        let err = tool
            .execute(serde_json::json!({"path": "nope.csv"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
