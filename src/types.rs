// Shared data model: notice types, tabular cells and the record sets that
// make up one report.
use crate::util::Node;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tabled::Tabled;

/// Marker written wherever the source release has no value for a field.
pub const MISSING: &str = "N/A";

/// UK notice type codes carried in `documents[].noticeType`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NoticeType {
    Uk1,
    Uk2,
    Uk3,
    Uk4,
    Uk5,
    Uk6,
    Uk7,
    Uk12,
    Other(String),
}

/// Which flat schema a notice type maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Planning,
    Tender,
    AwardNotice,
    Termination,
}

impl NoticeType {
    pub fn parse(code: &str) -> Self {
        match code.trim() {
            "UK1" => NoticeType::Uk1,
            "UK2" => NoticeType::Uk2,
            "UK3" => NoticeType::Uk3,
            "UK4" => NoticeType::Uk4,
            "UK5" => NoticeType::Uk5,
            "UK6" => NoticeType::Uk6,
            "UK7" => NoticeType::Uk7,
            "UK12" => NoticeType::Uk12,
            other => NoticeType::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            NoticeType::Uk1 => "UK1",
            NoticeType::Uk2 => "UK2",
            NoticeType::Uk3 => "UK3",
            NoticeType::Uk4 => "UK4",
            NoticeType::Uk5 => "UK5",
            NoticeType::Uk6 => "UK6",
            NoticeType::Uk7 => "UK7",
            NoticeType::Uk12 => "UK12",
            NoticeType::Other(code) => code,
        }
    }

    pub fn family(&self) -> Option<Family> {
        match self {
            NoticeType::Uk1 | NoticeType::Uk2 | NoticeType::Uk3 => Some(Family::Planning),
            NoticeType::Uk4 => Some(Family::Tender),
            NoticeType::Uk5 | NoticeType::Uk6 | NoticeType::Uk7 => Some(Family::AwardNotice),
            NoticeType::Uk12 => Some(Family::Termination),
            NoticeType::Other(_) => None,
        }
    }

    /// Contract award (UK6) and contract details (UK7) notices: the ones that
    /// get one award-line record per award and count as "awarded".
    pub fn is_award_or_contract(&self) -> bool {
        matches!(self, NoticeType::Uk6 | NoticeType::Uk7)
    }
}

impl fmt::Display for NoticeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A sanitized scalar, ready for a spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Cell {
    pub fn empty() -> Self {
        Cell::Text(String::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the cell. Text is parsed, booleans never count.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
            Cell::Bool(_) => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Mapper output before sanitization, in column order.
pub type Record = Vec<(&'static str, Value)>;

/// Mapper output after sanitization, in column order.
pub type Row = Vec<(&'static str, Cell)>;

/// One named, column-ordered table (a sheet in the final report).
///
/// The column list is fixed by the first row pushed; every later row is
/// aligned to it so that no column is ever absent from a row.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    sheet: &'static str,
    columns: Vec<&'static str>,
    rows: Vec<Vec<Cell>>,
}

impl RecordSet {
    pub fn new(sheet: &'static str) -> Self {
        Self {
            sheet,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn sheet(&self) -> &'static str {
        self.sheet
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: Row) {
        if self.columns.is_empty() {
            self.columns = row.iter().map(|(name, _)| *name).collect();
            self.rows.push(row.into_iter().map(|(_, cell)| cell).collect());
            return;
        }
        let mut cells = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let cell = row
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, cell)| cell.clone())
                .unwrap_or_else(|| Cell::Text(MISSING.to_string()));
            cells.push(cell);
        }
        self.rows.push(cells);
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == name)
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&Cell> {
        let idx = self.column(name)?;
        self.rows.get(row)?.get(idx)
    }

    /// Every cell of one column, top to bottom. Empty when the column is unknown.
    pub fn column_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Cell> + 'a {
        let idx = self.column(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }

    /// Re-run scalar cleanup on every cell (second sanitization pass).
    pub fn map_cells(&mut self, f: impl Fn(Cell) -> Cell) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                let taken = std::mem::replace(cell, Cell::empty());
                *cell = f(taken);
            }
        }
    }
}

/// Which releases a run keeps, resolved before the core sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgFilter {
    All,
    Buyer(String),
}

impl OrgFilter {
    /// A release belongs to the organisation when its buyer id matches, or,
    /// when no buyer id is published, when any listed party matches.
    pub fn matches(&self, release: &Value) -> bool {
        let ppon = match self {
            OrgFilter::All => return true,
            OrgFilter::Buyer(ppon) => ppon.as_str(),
        };
        let release = Node::new(release);
        match release.get("buyer").get("id").value() {
            Some(Value::Null) | None => release
                .get("parties")
                .items()
                .any(|party| party.get("id").as_str() == Some(ppon)),
            Some(id) => id.as_str() == Some(ppon),
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct SummaryRow {
    #[serde(rename = "Range")]
    #[tabled(rename = "Range")]
    pub range: String,
    #[serde(rename = "Award Count")]
    #[tabled(rename = "Award Count")]
    pub award_count: usize,
    #[serde(rename = "Closed Unawarded Count")]
    #[tabled(rename = "Closed Unawarded Count")]
    pub closed_unawarded_count: usize,
}

/// Everything one transformation pass produces.
#[derive(Debug, Clone)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub planning: RecordSet,
    pub tenders: RecordSet,
    pub award_notices: RecordSet,
    pub lots: RecordSet,
    pub award_lines: RecordSet,
    pub terminations: RecordSet,
    pub closed_unawarded: RecordSet,
    pub summary: Vec<SummaryRow>,
}

impl Report {
    /// Record sets in sheet order.
    pub fn sheets(&self) -> [&RecordSet; 7] {
        [
            &self.planning,
            &self.tenders,
            &self.award_notices,
            &self.lots,
            &self.award_lines,
            &self.terminations,
            &self.closed_unawarded,
        ]
    }
}
