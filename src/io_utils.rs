//! CSV exchange for the export → edit → save workflow.
//!
//! Exports always write UTF-8 with every field quoted so blank values and
//! leading zeros survive spreadsheet round trips. Edited files may arrive in
//! another encoding and are decoded through `encoding_rs`.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::{reconcile::EditedRow, snapshot::Snapshot};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

pub fn resolve_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(false)
        .from_reader(reader))
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    Ok(csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .from_writer(writer))
}

fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| {
            let (text, _, had_errors) = encoding.decode(field);
            if had_errors {
                Err(anyhow!(
                    "Failed to decode text with encoding {}",
                    encoding.name()
                ))
            } else {
                Ok(text.into_owned())
            }
        })
        .collect()
}

/// Writes the snapshot's canonical strings, headers first.
pub fn write_snapshot<W: Write>(writer: &mut csv::Writer<W>, snapshot: &Snapshot) -> Result<usize> {
    writer
        .write_record(snapshot.headers())
        .context("Writing output headers")?;
    for (idx, row) in snapshot.canonical_rows().iter().enumerate() {
        writer
            .write_record(row)
            .with_context(|| format!("Writing row {}", idx + 1))?;
    }
    writer.flush().context("Flushing output")?;
    Ok(snapshot.len())
}

/// Reads an edited CSV into headers plus one [`EditedRow`] per data row.
pub fn read_edited_rows(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<(Vec<String>, Vec<EditedRow>)> {
    let mut reader = open_csv_reader(path, delimiter)?;
    let headers = decode_record(reader.byte_headers()?, encoding)
        .with_context(|| format!("Decoding headers of {path:?}"))?;
    let mut rows = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} in {path:?}", idx + 2))?;
        let values = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} in {path:?}", idx + 2))?;
        rows.push(headers.iter().cloned().zip(values).collect::<EditedRow>());
    }
    Ok((headers, rows))
}
