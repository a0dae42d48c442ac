//! Tabular text export of a query response
//!
//! Renders a [`QueryResponse`] as a delimited download:
//! - First row is header with column names
//! - One line per result row, `NULL` cells left empty
//! - Fields containing the delimiter, a quote or a line break are quoted,
//!   embedded quotes doubled
//!
//! ## Example
//!
//! ```csv
//! REGION,TOTAL
//! "North, East",1200
//! South,
//! ```

use crate::model::QueryResponse;

/// Rejected export request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    #[error("Unsupported export format '{0}'")]
    InvalidFormat(String),
}

/// A rendered download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub content_type: String,
    pub content_disposition: String,
    pub body: String,
}

/// Render `response` for download as `result.<format>`.
///
/// The format only names the file and MIME subtype; the body is always
/// comma-delimited. Formats must be short alphanumeric tokens since they end
/// up in response headers.
pub fn render(response: &QueryResponse, format: &str) -> Result<Export, ExportError> {
    if format.is_empty() || format.len() > 16 || !format.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ExportError::InvalidFormat(format.to_string()));
    }
    let format = format.to_ascii_lowercase();

    let mut body = String::new();
    let header = response
        .column_metas
        .iter()
        .map(|c| escape_field(&c.name))
        .collect::<Vec<_>>()
        .join(",");
    body.push_str(&header);
    body.push_str("\r\n");

    for row in &response.results {
        let line = row
            .iter()
            .map(|cell| cell.as_deref().map(escape_field).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(",");
        body.push_str(&line);
        body.push_str("\r\n");
    }

    Ok(Export {
        content_type: format!("text/{format};charset=utf-8"),
        content_disposition: format!("attachment; filename=\"result.{format}\""),
        body,
    })
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
