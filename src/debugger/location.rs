use crate::debugger::error::Error;
use once_cell::sync;
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A position in a debuggee.
///
/// A location is known through up to three representations at once: a symbolic identifier,
/// a `file:line` pair and a program counter. At least one of them is always present.
#[derive(Debug, Clone)]
pub struct Location {
    identifier: Option<String>,
    place: Option<(String, u32)>,
    pc: Option<u64>,
}

impl Location {
    /// Create a location from raw parts.
    ///
    /// # Arguments
    ///
    /// * `identifier`: function or other symbol name
    /// * `place`: source file and line number
    /// * `pc`: program counter
    pub fn new(
        identifier: Option<String>,
        place: Option<(String, u32)>,
        pc: Option<u64>,
    ) -> Result<Self, Error> {
        if identifier.is_none() && place.is_none() && pc.is_none() {
            return Err(Error::Location(
                "one of identifier, file:line or pc required".to_string(),
            ));
        }
        Ok(Self {
            identifier,
            place,
            pc,
        })
    }

    pub fn from_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            place: None,
            pc: None,
        }
    }

    pub fn from_file_line(file: impl Into<String>, line: u32) -> Self {
        Self {
            identifier: None,
            place: Some((file.into(), line)),
            pc: None,
        }
    }

    pub fn from_pc(pc: u64) -> Self {
        Self {
            identifier: None,
            place: None,
            pc: Some(pc),
        }
    }

    /// Parse a user written location: `file:line`, `0xHEX` or an identifier without spaces.
    pub fn parse(text: &str) -> Result<Self, Error> {
        static FILE_LINE_RE: sync::Lazy<Regex> =
            sync::Lazy::new(|| Regex::new(r"^(.+):(\d+)$").expect("must compile"));
        static PC_RE: sync::Lazy<Regex> =
            sync::Lazy::new(|| Regex::new(r"^0x([0-9a-fA-F]+)$").expect("must compile"));
        static IDENT_RE: sync::Lazy<Regex> =
            sync::Lazy::new(|| Regex::new(r"^\S+$").expect("must compile"));

        if let Some((_, [file, line])) = FILE_LINE_RE.captures(text).map(|c| c.extract()) {
            let line = line
                .parse::<u32>()
                .map_err(|_| Error::Location(text.to_string()))?;
            return Ok(Self::from_file_line(file, line));
        }
        if let Some((_, [hex])) = PC_RE.captures(text).map(|c| c.extract()) {
            let pc = u64::from_str_radix(hex, 16).map_err(|_| Error::Location(text.to_string()))?;
            return Ok(Self::from_pc(pc));
        }
        if IDENT_RE.is_match(text) {
            return Ok(Self::from_identifier(text));
        }
        Err(Error::Location(text.to_string()))
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn file(&self) -> Option<&str> {
        self.place.as_ref().map(|(f, _)| f.as_str())
    }

    pub fn line(&self) -> Option<u32> {
        self.place.as_ref().map(|(_, l)| *l)
    }

    pub fn pc(&self) -> Option<u64> {
        self.pc
    }

    /// Compare with another location preferring `file:line`, then pc, then identifier.
    /// Locations without a common representation are never equal.
    pub fn soft_eq(&self, other: &Location) -> bool {
        if let (Some(a), Some(b)) = (&self.place, &other.place) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.pc, other.pc) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.identifier, &other.identifier) {
            return a == b;
        }
        false
    }

    /// The shortest text that [`Location::parse`] turns back into an equal location.
    pub fn shorthand(&self) -> String {
        if let Some(ref ident) = self.identifier {
            return ident.clone();
        }
        if let Some((ref file, line)) = self.place {
            return format!("{file}:{line}");
        }
        format!("{:#x}", self.pc.unwrap_or_default())
    }
}

/// Exact pc comparison wins over `file:line` which wins over identifiers.
impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.pc, other.pc) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.place, &other.place) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.identifier, &other.identifier) {
            return a == b;
        }
        false
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::parse(s)
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts = vec![];
        if let Some(pc) = self.pc {
            parts.push(format!("({pc:#x})"));
        }
        match (&self.identifier, &self.place) {
            (Some(ident), Some((file, line))) => parts.push(format!("{ident} at {file}:{line}")),
            (None, Some((file, line))) if self.pc.is_some() => {
                parts.push(format!("at {file}:{line}"))
            }
            (None, Some((file, line))) => parts.push(format!("{file}:{line}")),
            (Some(ident), None) => parts.push(ident.clone()),
            (None, None) => {}
        }
        f.write_str(&parts.join(" "))
    }
}
