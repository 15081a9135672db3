//! Rendering of command results as text tables, JSON or CSV

use anyhow::Context as _;
use serde::Serialize;
use std::{borrow::Cow, io::Write};

#[derive(
    clap::ValueEnum,
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Text,
    Json,
    Csv,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}

/// A record that has a fixed set of columns in text and CSV output
pub trait Tabular {
    const COLUMNS: &'static [&'static str];

    /// One value per entry in [`Self::COLUMNS`]
    fn row(&self) -> Vec<String>;
}

/// Formats an optional value, using an empty cell for `None`
#[inline]
pub fn cell<T: std::fmt::Display>(v: &Option<T>) -> String {
    v.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// Quotes a CSV field if it contains a delimiter, quote or line break
pub fn csv_field(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

fn write_csv_row<W: Write>(out: &mut W, fields: &[impl AsRef<str>]) -> std::io::Result<()> {
    let line = fields
        .iter()
        .map(|f| csv_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{line}")
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let cells: Vec<&str> = cells.collect();
    // Trailing empty cells would leave a dangling separator
    let keep = cells.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
    let mut s = cells[..keep]
        .iter()
        .zip(widths)
        .map(|(c, &w)| format!("{c:<w$}"))
        .collect::<Vec<_>>()
        .join(" | ");
    s.truncate(s.trim_end().len());
    s
}

fn write_table<W: Write>(
    out: &mut W,
    columns: &[&str],
    rows: &[Vec<String>],
) -> std::io::Result<()> {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (w, v) in widths.iter_mut().zip(row) {
            *w = (*w).max(v.chars().count());
        }
    }

    writeln!(out, "{}", table_line(columns.iter().copied(), &widths))?;
    writeln!(
        out,
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join(" | ")
    )?;

    for row in rows {
        writeln!(out, "{}", table_line(row.iter().map(String::as_str), &widths))?;
    }

    Ok(())
}

pub fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to serialize output")?;
    writeln!(out)?;
    Ok(())
}

pub fn write_list<W, T>(format: Format, out: &mut W, items: &[T]) -> anyhow::Result<()>
where
    W: Write,
    T: Serialize + Tabular,
{
    match format {
        Format::Json => write_json(out, items)?,
        Format::Csv => {
            write_csv_row(out, T::COLUMNS)?;
            for item in items {
                write_csv_row(out, &item.row())?;
            }
        }
        Format::Text => {
            let rows: Vec<_> = items.iter().map(Tabular::row).collect();
            write_table(out, T::COLUMNS, &rows)?;
        }
    }

    Ok(())
}

pub fn write_record<W, T>(format: Format, out: &mut W, item: &T) -> anyhow::Result<()>
where
    W: Write,
    T: Serialize + Tabular,
{
    match format {
        Format::Json => write_json(out, item)?,
        Format::Csv => {
            write_csv_row(out, T::COLUMNS)?;
            write_csv_row(out, &item.row())?;
        }
        Format::Text => {
            let width = T::COLUMNS
                .iter()
                .map(|c| c.chars().count() + 1)
                .max()
                .unwrap_or_default();

            for (col, val) in T::COLUMNS.iter().zip(item.row()) {
                let key = format!("{col}:");
                writeln!(out, "{key:<width$} {val}")?;
            }
        }
    }

    Ok(())
}

/// Prints a collection of records to stdout
pub fn print_list<T: Serialize + Tabular>(format: Format, items: &[T]) -> anyhow::Result<()> {
    write_list(format, &mut std::io::stdout().lock(), items)
}

/// Prints a single record to stdout
pub fn print_record<T: Serialize + Tabular>(format: Format, item: &T) -> anyhow::Result<()> {
    write_record(format, &mut std::io::stdout().lock(), item)
}

/// Prints a document that has no tabular view, eg. a flow definition or a
/// search entry, as JSON regardless of the format
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    write_json(&mut std::io::stdout().lock(), value)
}

/// Prints a confirmation message in text mode, or the response that
/// confirmed it otherwise
pub fn print_outcome<T: Serialize + ?Sized>(
    format: Format,
    message: &str,
    response: &T,
) -> anyhow::Result<()> {
    match format {
        Format::Text => {
            println!("{}", nu_ansi_term::Color::Green.paint(message));
            Ok(())
        }
        Format::Json | Format::Csv => print_json(response),
    }
}

/// Tells the user how to get the next page, without polluting stdout
pub fn hint_next_page(format: Format, flag: &str, value: impl std::fmt::Display) {
    if format == Format::Text {
        eprintln!(
            "{}",
            nu_ansi_term::Style::new()
                .dimmed()
                .paint(format!("more results are available, use {flag} {value}"))
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Serialize)]
    struct Item {
        id: u32,
        name: &'static str,
        note: Option<&'static str>,
    }

    impl Tabular for Item {
        const COLUMNS: &'static [&'static str] = &["ID", "Name", "Note"];

        fn row(&self) -> Vec<String> {
            vec![self.id.to_string(), self.name.to_owned(), cell(&self.note)]
        }
    }

    fn items() -> Vec<Item> {
        vec![
            Item {
                id: 1,
                name: "alpha",
                note: Some("says \"hi\", twice"),
            },
            Item {
                id: 22,
                name: "b",
                note: None,
            },
        ]
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> anyhow::Result<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn text_lists_are_aligned_tables() {
        let text = render(|o| write_list(Format::Text, o, &items()));
        assert_eq!(
            text,
            "ID | Name  | Note\n\
             -- | ----- | ----------------\n\
             1  | alpha | says \"hi\", twice\n\
             22 | b\n"
        );
    }

    #[test]
    fn only_trailing_empty_cells_are_dropped() {
        let widths = [3, 4, 2];
        assert_eq!(table_line(["a", "", "z"].into_iter(), &widths), "a   |      | z");
        assert_eq!(table_line(["a", "", ""].into_iter(), &widths), "a");
        assert_eq!(table_line(["", "", ""].into_iter(), &widths), "");
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let csv = render(|o| write_list(Format::Csv, o, &items()));
        assert_eq!(
            csv,
            "ID,Name,Note\n1,alpha,\"says \"\"hi\"\", twice\"\n22,b,\n"
        );
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn json_lists_are_arrays() {
        let json = render(|o| write_list(Format::Json, o, &items()));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[1]["id"], 22);
        assert!(parsed[1]["note"].is_null());
    }

    #[test]
    fn text_records_are_key_value_lines() {
        let text = render(|o| write_record(Format::Text, o, &items()[1]));
        assert_eq!(text, "ID:   22\nName: b\nNote: \n");
    }

    #[test]
    fn csv_records_have_a_header() {
        let csv = render(|o| write_record(Format::Csv, o, &items()[0]));
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.starts_with("ID,Name,Note\n"));
    }
}
