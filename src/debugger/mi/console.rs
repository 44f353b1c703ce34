//! Parsers for console text that gdb never reports through structured MI records.

use crate::debugger::error::Error;
use crate::debugger::location::Location;
use crate::debugger::mi::value::{Tuple, Value};
use once_cell::sync;
use regex::Regex;
use std::collections::HashMap;

/// Quote text for `interpreter-exec console "<text>"`.
pub fn quote_console(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Column of a breakpoint table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub width: usize,
    pub offset: usize,
}

/// Fixed width layout of the `info breakpoints` table.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointTableLayout {
    columns: Vec<Column>,
}

impl BreakpointTableLayout {
    const HEADER_COLUMNS: [(&'static str, &'static str); 6] = [
        ("Num", "number"),
        ("Type", "type"),
        ("Disp", "disp"),
        ("Enb", "enabled"),
        ("Address", "addr"),
        ("What", "what"),
    ];

    /// Build the layout from `BreakpointTable.hdr` of `break-info`. Every column starts one
    /// character after the end of the previous one.
    pub fn from_mi_header(table: &Tuple) -> Result<Self, Error> {
        let mut offset = 0;
        let mut columns = vec![];
        for col in table.list("hdr")? {
            let col = col.as_tuple().ok_or(Error::MissingField("hdr"))?;
            let width = col.int("width")? as usize;
            columns.push(Column {
                name: col.text("col_name")?,
                width,
                offset,
            });
            offset += width + 1;
        }
        Ok(Self { columns })
    }

    /// Build the layout from the console header line, each column starts at its title.
    pub fn from_console_header(header: &str) -> Result<Self, Error> {
        check_header(header)?;
        let mut columns: Vec<Column> = vec![];
        let mut search_from = 0;
        for (title, name) in Self::HEADER_COLUMNS {
            let offset = header[search_from..]
                .find(title)
                .map(|i| i + search_from)
                .ok_or_else(|| Error::Parse {
                    text: header.to_string(),
                    pos: search_from,
                    msg: "breakpoint table column missing",
                })?;
            if let Some(prev) = columns.last_mut() {
                prev.width = offset - prev.offset - 1;
            }
            columns.push(Column {
                name: name.to_string(),
                width: 0,
                offset,
            });
            search_from = offset + title.len();
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

fn check_header(header: &str) -> Result<(), Error> {
    static HEADER_RE: sync::Lazy<Regex> = sync::Lazy::new(|| {
        Regex::new(r"^Num\s+Type\s+Disp\s+Enb\s+Address\s+What").expect("must compile")
    });
    if HEADER_RE.is_match(header) {
        Ok(())
    } else {
        Err(Error::Parse {
            text: header.to_string(),
            pos: 0,
            msg: "unexpected breakpoint table header",
        })
    }
}

fn slice_cell(line: &str, from: usize, to: Option<usize>) -> &str {
    let len = line.len();
    let from = from.min(len);
    let to = to.unwrap_or(len).min(len).max(from);
    line.get(from..to).unwrap_or_default()
}

/// Slice console rows of `info breakpoint N` into cells.
///
/// `lines[0]` is the table header and is checked, the `what` column is skipped and the
/// address column takes the rest of the line.
pub fn parse_tabular_breakpoint_info(
    layout: &BreakpointTableLayout,
    lines: &[String],
) -> Result<Vec<Tuple>, Error> {
    let Some((header, rows)) = lines.split_first() else {
        return Err(Error::Parse {
            text: String::new(),
            pos: 0,
            msg: "empty breakpoint table",
        });
    };
    check_header(header)?;

    let mut result = vec![];
    for line in rows.iter().filter(|l| !l.trim().is_empty()) {
        let mut row = Tuple::default();
        for col in &layout.columns {
            if col.name == "what" {
                continue;
            }
            let cell = if col.name == "addr" {
                slice_cell(line, col.offset, None)
            } else {
                slice_cell(line, col.offset, Some(col.offset + col.width))
            };
            row.insert(col.name.clone(), Value::from_bare(cell.trim()));
        }
        result.push(row);
    }
    Ok(result)
}

/// Parse console text like `0x0000000000401136 in get_a at test1.c:43` or
/// `main (argc=1, argv=0x7ffe) at test1.c:45` into a location.
pub fn parse_console_location(text: &str) -> Result<Location, Error> {
    static PC_RE: sync::Lazy<Regex> =
        sync::Lazy::new(|| Regex::new(r"^0x([0-9a-fA-F]+) in (.+)$").expect("must compile"));
    static NO_PC_RE: sync::Lazy<Regex> =
        sync::Lazy::new(|| Regex::new(r"^(\S+ \(.*\) at \S+)$").expect("must compile"));
    static PLACE_RE: sync::Lazy<Regex> = sync::Lazy::new(|| {
        Regex::new(r"^(\S+)(?: (\(.*\)))? at (\S+):(\d+)$").expect("must compile")
    });

    let text = text.trim();
    let (pc, rest) = if let Some((_, [hex, rest])) = PC_RE.captures(text).map(|c| c.extract()) {
        let pc = u64::from_str_radix(hex, 16).map_err(|_| Error::Location(text.to_string()))?;
        (Some(pc), rest)
    } else if NO_PC_RE.is_match(text) {
        (None, text)
    } else {
        return Err(Error::Location(text.to_string()));
    };

    if let Some(caps) = PLACE_RE.captures(rest) {
        // arguments stay in the identifier, overloads differ only there
        let ident = match caps.get(2) {
            Some(args) => format!("{}{}", &caps[1], args.as_str()),
            None => caps[1].to_string(),
        };
        let line = caps[4]
            .parse::<u32>()
            .map_err(|_| Error::Location(text.to_string()))?;
        return Location::new(Some(ident), Some((caps[3].to_string(), line)), pc);
    }
    match (rest.trim(), pc) {
        ("?", Some(pc)) => Ok(Location::from_pc(pc)),
        (_, Some(pc)) => Ok(Location::new(
            Some(rest.trim().to_string()),
            None,
            Some(pc),
        )?),
        _ => Err(Error::Location(text.to_string())),
    }
}

/// Parse `key = 'value'` and `key value` lines (`info proc` output).
pub fn parse_loose_dict<S: AsRef<str>>(lines: &[S]) -> Result<HashMap<String, String>, Error> {
    static QUOTED_RE: sync::Lazy<Regex> =
        sync::Lazy::new(|| Regex::new(r"^(.+?) += '(.+)'$").expect("must compile"));
    static PAIR_RE: sync::Lazy<Regex> =
        sync::Lazy::new(|| Regex::new(r"^(\S+) (\S+)$").expect("must compile"));

    let mut dict = HashMap::new();
    for line in lines.iter().map(AsRef::as_ref) {
        if let Some((_, [k, v])) = QUOTED_RE.captures(line).map(|c| c.extract()) {
            dict.insert(k.to_string(), v.to_string());
            continue;
        }
        if let Some((_, [k, v])) = PAIR_RE.captures(line).map(|c| c.extract()) {
            dict.insert(k.to_string(), v.to_string());
            continue;
        }
        return Err(Error::Parse {
            text: line.to_string(),
            pos: 0,
            msg: "not a key value line",
        });
    }
    Ok(dict)
}

/// Number of a new inferior from `add-inferior` output.
pub fn parse_added_inferior(text: &str) -> Option<u32> {
    static ADDED_RE: sync::Lazy<Regex> =
        sync::Lazy::new(|| Regex::new(r"Added inferior (\d+)").expect("must compile"));
    ADDED_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Compilation directory from `info source` output.
pub fn parse_compilation_dir<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    static COMP_DIR_RE: sync::Lazy<Regex> =
        sync::Lazy::new(|| Regex::new(r"^Compilation directory is (.+)$").expect("must compile"));
    lines.iter().find_map(|l| {
        COMP_DIR_RE
            .captures(l.as_ref())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Number of the outermost frame from `where` output.
pub fn parse_last_frame_number<S: AsRef<str>>(lines: &[S]) -> Option<u32> {
    static FRAME_RE: sync::Lazy<Regex> =
        sync::Lazy::new(|| Regex::new(r"^#(\d+)").expect("must compile"));
    lines.iter().rev().find_map(|l| {
        FRAME_RE
            .captures(l.as_ref())
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}
