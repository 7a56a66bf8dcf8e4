//! Parameter tables parsed from model replies

use crate::engines::vision::is_no_text_reply;
use crate::error::OcrError;
use serde::{Deserialize, Serialize};

pub const PARAMETER_COLUMN: &str = "Parameter";
pub const VALUE_COLUMN: &str = "Value";

/// Parameter/value pairs extracted from one document, in reply order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable {
    pub entries: Vec<(String, String)>,
}

/// A row of the combined multi-document table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRow {
    #[serde(rename = "Parameter")]
    pub parameter: String,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "Document")]
    pub document: String,
}

impl ParameterTable {
    /// Parse a reply given as CSV (optionally fenced) or as a Markdown table.
    ///
    /// The header row must name both required columns; any text before it is
    /// ignored. The table ends with its fence, or at the first blank line
    /// (first non-table line for Markdown), so notes after it are not rows.
    /// Without the required columns the table is rejected.
    pub fn parse(reply: &str) -> Result<Self, OcrError> {
        if is_no_text_reply(reply) {
            return Err(OcrError::SchemaMismatch("model found no text".to_string()));
        }

        let candidates = fenced_block(reply).into_iter().chain([reply.to_string()]);
        for candidate in candidates {
            let markdown = is_markdown_table(&candidate);
            for block in table_blocks(&candidate, markdown) {
                let rows = if markdown {
                    markdown_rows(&block)
                } else {
                    csv_rows(&block)
                };
                if let Some(entries) = entries_after_header(&rows) {
                    return Ok(Self { entries });
                }
            }
        }

        Err(OcrError::SchemaMismatch(format!(
            "reply has no '{}' and '{}' columns",
            PARAMETER_COLUMN, VALUE_COLUMN
        )))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn column(row: &[String], name: &str) -> Option<usize> {
    row.iter().position(|cell| cell.trim().eq_ignore_ascii_case(name))
}

fn entries_after_header(rows: &[Vec<String>]) -> Option<Vec<(String, String)>> {
    let (header_index, param_col, value_col) = rows.iter().enumerate().find_map(|(i, row)| {
        let param = column(row, PARAMETER_COLUMN)?;
        let value = column(row, VALUE_COLUMN)?;
        Some((i, param, value))
    })?;

    let entries = rows[header_index + 1..]
        .iter()
        .filter_map(|row| {
            let parameter = row.get(param_col)?.trim();
            let value = row.get(value_col)?.trim();
            if parameter.is_empty() {
                None
            } else {
                Some((parameter.to_string(), value.to_string()))
            }
        })
        .collect();
    Some(entries)
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Lines inside the first ``` fence; an unclosed fence runs to the end
fn fenced_block(reply: &str) -> Option<String> {
    let mut lines = reply.lines().skip_while(|line| !is_fence(line));
    lines.next()?;
    Some(lines.take_while(|line| !is_fence(line)).collect::<Vec<_>>().join("\n"))
}

/// Runs of consecutive table lines
fn table_blocks(text: &str, markdown: bool) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let in_table = if markdown {
            line.trim_start().starts_with('|')
        } else {
            !line.trim().is_empty()
        };
        if in_table {
            current.push(line);
        } else if !current.is_empty() {
            blocks.push(current.join("\n"));
            current.clear();
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

fn is_markdown_table(reply: &str) -> bool {
    reply.lines().any(|line| {
        let line = line.trim();
        line.starts_with('|') && line.len() > 1
    })
}

fn markdown_rows(reply: &str) -> Vec<Vec<String>> {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('|'))
        .map(|line| {
            line.trim_matches('|')
                .split('|')
                .map(|cell| cell.trim().to_string())
                .collect::<Vec<_>>()
        })
        // Drop the |---|---| separator
        .filter(|cells| {
            !cells
                .iter()
                .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
        })
        .collect()
}

fn csv_rows(data: &str) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    reader
        .records()
        .filter_map(|record| match record {
            Ok(record) => Some(record.iter().map(str::to_string).collect()),
            Err(e) => {
                tracing::debug!("Skipping unreadable CSV line: {}", e);
                None
            }
        })
        .collect()
}

/// Label a document gets in the combined table
pub fn document_label(file_name: &str, batch_size: usize) -> String {
    if batch_size > 1 {
        file_name.to_string()
    } else {
        "Default Document".to_string()
    }
}

/// Concatenate accepted tables, tagging each row with its document label
pub fn combine<'a, I>(tables: I) -> Vec<ParameterRow>
where
    I: IntoIterator<Item = (&'a str, &'a ParameterTable)>,
{
    tables
        .into_iter()
        .flat_map(|(label, table)| {
            table.entries.iter().map(move |(parameter, value)| ParameterRow {
                parameter: parameter.clone(),
                value: value.clone(),
                document: label.to_string(),
            })
        })
        .collect()
}

/// Parameters that every document in the combined table reports, first-seen order
pub fn common_parameters(rows: &[ParameterRow]) -> Vec<String> {
    let mut documents: Vec<&str> = Vec::new();
    for row in rows {
        if !documents.contains(&row.document.as_str()) {
            documents.push(&row.document);
        }
    }

    let mut common: Vec<String> = Vec::new();
    for row in rows {
        if common.contains(&row.parameter) {
            continue;
        }
        let everywhere = documents.iter().all(|doc| {
            rows.iter()
                .any(|r| r.document == *doc && r.parameter == row.parameter)
        });
        if everywhere {
            common.push(row.parameter.clone());
        }
    }
    common
}
