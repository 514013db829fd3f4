//! Single-page PDF prediction reports
//!
//! Reports use the base-14 Helvetica faces, so no font data is embedded.

use chrono::NaiveDateTime;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{PredictorError, Result};
use crate::ledger::PredictionRecord;

pub const REPORT_TITLE: &str = "Health Insurance Cost Prediction Report";

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const TITLE_SIZE: i64 = 16;
const BODY_SIZE: i64 = 12;
const LINE_HEIGHT: i64 = 20;

const FILENAME_PREFIX: &str = "prediction_report_";
const FILENAME_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

fn sanitize_username(username: &str) -> String {
    username
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `prediction_report_<username>_<YYYYmmdd_HHMMSS>.pdf`
pub fn report_filename(username: &str, timestamp: &NaiveDateTime) -> String {
    format!(
        "{FILENAME_PREFIX}{}_{}.pdf",
        sanitize_username(username),
        timestamp.format(FILENAME_TIME_FORMAT)
    )
}

/// Whether `filename` is a report `report_filename` would produce for `username`
pub fn report_belongs_to(filename: &str, username: &str) -> bool {
    let prefix = format!("{FILENAME_PREFIX}{}_", sanitize_username(username));
    filename
        .strip_prefix(&prefix)
        .and_then(|rest| rest.strip_suffix(".pdf"))
        .is_some_and(|stamp| NaiveDateTime::parse_from_str(stamp, FILENAME_TIME_FORMAT).is_ok())
}

/// Latin-1 bytes for a WinAnsi text string
///
/// Characters WinAnsi cannot show as their Latin-1 selves become `?`; line
/// breaks become spaces.
fn latin1(text: &str) -> Vec<u8> {
    text.chars()
        .filter_map(|c| match c {
            '\n' | '\r' => Some(b' '),
            c if (c as u32) < 0x20 => None,
            c if (0x7F..0xA0).contains(&(c as u32)) => Some(b'?'),
            c if (c as u32) <= 0xFF => Some(c as u32 as u8),
            _ => Some(b'?'),
        })
        .collect()
}

fn text_line(font: &str, size: i64, x: i64, y: i64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), Object::Integer(size)]),
        Operation::new("Td", vec![Object::Integer(x), Object::Integer(y)]),
        Operation::new("Tj", vec![Object::string_literal(latin1(text))]),
        Operation::new("ET", vec![]),
    ]
}

fn pdf_error(e: impl std::fmt::Display) -> PredictorError {
    PredictorError::Internal(format!("PDF rendering failed: {e}"))
}

/// Render a record as a one-page A4 PDF document
pub fn render(record: &PredictionRecord) -> Result<Vec<u8>> {
    let mut operations = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN - TITLE_SIZE;
    operations.extend(text_line("F2", TITLE_SIZE, MARGIN, y, REPORT_TITLE));
    y -= LINE_HEIGHT * 2;

    for (column, value) in record.fields() {
        operations.extend(text_line("F1", BODY_SIZE, MARGIN, y, &format!("{column}: {value}")));
        y = (y - LINE_HEIGHT).max(0);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().map_err(pdf_error)?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![Object::Reference(page_id)],
        "Count" => Object::Integer(1),
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(pdf_error)?;
    Ok(bytes)
}

/// Writes and serves reports from one directory
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render and store a report, returning its file name
    ///
    /// An existing report for the same user and second is overwritten.
    pub async fn write(&self, record: &PredictionRecord) -> Result<String> {
        let filename = report_filename(&record.username, &record.timestamp);
        let bytes = render(record)?;

        fs::create_dir_all(&self.output_dir).await?;
        fs::write(self.output_dir.join(&filename), &bytes).await?;

        info!(file = %filename, bytes = bytes.len(), "Wrote prediction report");
        Ok(filename)
    }

    /// Read back a stored report by file name
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(PredictorError::InvalidInput(format!(
                "invalid report name: {filename}"
            )));
        }

        let path = self.output_dir.join(filename);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %filename, "Report not found");
                Err(PredictorError::NotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
