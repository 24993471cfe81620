// ABOUTME: Quoted CSV codec converting between Record sequences and a ledger document.
// ABOUTME: Every field is quoted on encode; decode uses a two-state scanner and reports malformed rows.

use thiserror::Error;

use crate::record::{Record, RecordError, Severity};

/// Column names of the ledger document, in stored order.
pub const COLUMNS: [&str; 7] = [
    "location",
    "severity",
    "description",
    "contactinfo",
    "timestamp",
    "status",
    "verified",
];

/// Why a data line could not be mapped to a Record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error(transparent)]
    Field(#[from] RecordError),
}

/// A data line that was skipped during decoding. `line_number` is 1-based
/// and counts the header as line 1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line_number}: {reason}")]
pub struct MalformedRow {
    pub line_number: usize,
    pub reason: MalformedReason,
}

/// Result of decoding a document: the records that parsed, plus every line
/// that was skipped so callers can report it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub records: Vec<Record>,
    pub skipped: Vec<MalformedRow>,
}

/// The header line without its terminator.
pub fn header() -> String {
    COLUMNS.join(",")
}

/// Encode records into a complete document: the header line followed by one
/// line per record. Every line, the last included, ends with `\n`.
pub fn encode(records: &[Record]) -> String {
    let mut out = header();
    out.push('\n');
    for record in records {
        push_row(&mut out, record);
    }
    out
}

/// Add one encoded record to the end of an existing document, leaving every
/// existing line untouched, malformed ones included. Blank text becomes a
/// fresh document. Fails if the document's header does not have one column
/// per Record field, since the new row would not decode under it.
pub fn append_row(document: &str, record: &Record) -> Result<String, MalformedReason> {
    if document.trim().is_empty() {
        return Ok(encode(std::slice::from_ref(record)));
    }

    let header_line = document.lines().next().unwrap_or("");
    let width = split_fields(header_line).len();
    if width != COLUMNS.len() {
        return Err(MalformedReason::FieldCount {
            expected: COLUMNS.len(),
            found: width,
        });
    }

    let mut out = String::with_capacity(document.len() + 128);
    out.push_str(document);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    push_row(&mut out, record);
    Ok(out)
}

fn push_row(out: &mut String, record: &Record) {
    let contact = record.contact_info.as_deref().unwrap_or("");
    let verified = if record.verified { "true" } else { "false" };
    let fields = [
        record.location.as_str(),
        record.severity.as_str(),
        record.description.as_str(),
        contact,
        record.timestamp.as_str(),
        record.status.as_str(),
        verified,
    ];
    for (i, value) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_quoted(out, value);
    }
    out.push('\n');
}

fn push_quoted(out: &mut String, value: &str) {
    out.push('"');
    for c in value.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
}

/// Decode a document. Empty text and header-only text both yield no records.
/// Lines whose field count differs from the header's, or whose fields do not
/// fit the Record schema, are skipped and listed in `Decoded::skipped`.
pub fn decode(text: &str) -> Decoded {
    let mut decoded = Decoded::default();
    let mut lines = text.lines().enumerate();

    let Some((_, header_line)) = lines.next() else {
        return decoded;
    };
    let columns: Vec<String> = split_fields(header_line.trim_start_matches('\u{feff}'))
        .into_iter()
        .map(|c| c.trim().trim_matches('"').to_string())
        .collect();

    for (index, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let line_number = index + 1;
        let fields = split_fields(line);

        if fields.len() != columns.len() {
            decoded.skipped.push(MalformedRow {
                line_number,
                reason: MalformedReason::FieldCount {
                    expected: columns.len(),
                    found: fields.len(),
                },
            });
            continue;
        }

        match record_from_fields(fields) {
            Ok(record) => decoded.records.push(record),
            Err(reason) => decoded.skipped.push(MalformedRow {
                line_number,
                reason,
            }),
        }
    }

    decoded
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    NotInQuotes,
    InQuotes,
}

/// Split one line into raw field values.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut state = ScanState::NotInQuotes;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (state, c) {
            (ScanState::InQuotes, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (ScanState::InQuotes, '"') => state = ScanState::NotInQuotes,
            (ScanState::NotInQuotes, '"') => state = ScanState::InQuotes,
            (ScanState::NotInQuotes, ',') => fields.push(std::mem::take(&mut field)),
            (_, other) => field.push(other),
        }
    }
    fields.push(field);

    fields
}

fn record_from_fields(fields: Vec<String>) -> Result<Record, MalformedReason> {
    let found = fields.len();
    let [
        location,
        severity,
        description,
        contact_info,
        timestamp,
        status,
        verified,
    ]: [String; 7] = fields.try_into().map_err(|_| MalformedReason::FieldCount {
        expected: COLUMNS.len(),
        found,
    })?;

    Ok(Record {
        location,
        severity: severity.parse::<Severity>()?,
        description,
        contact_info: if contact_info.is_empty() {
            None
        } else {
            Some(contact_info)
        },
        timestamp,
        status,
        verified: verified == "true",
    })
}
