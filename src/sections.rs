//! Report sections: the fixed, ordered list of things extracted from a
//! company charter, their structured shapes, and how each one lays itself
//! out as table rows in the rendered report.
//!
//! The order of [`SectionKind::ALL`] is the order of the final report.
//! [`SectionKind`] derives `Ord` in that same order, so any
//! `BTreeMap<SectionKind, _>` iterates in report order no matter in which
//! order chunk results arrived.

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Characters reserved for list numbering when packing items into a cell.
const NUMBERING_ALLOWANCE: usize = 10;

/// One named section of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    GeneralInformation,
    Shareholders,
    Administration,
    LegalRepresentative,
    NotaryInformation,
}

impl SectionKind {
    /// Every section, in report order.
    pub const ALL: [SectionKind; 5] = [
        SectionKind::GeneralInformation,
        SectionKind::Shareholders,
        SectionKind::Administration,
        SectionKind::LegalRepresentative,
        SectionKind::NotaryInformation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::GeneralInformation => "general_information",
            SectionKind::Shareholders => "shareholders",
            SectionKind::Administration => "administration",
            SectionKind::LegalRepresentative => "legal_representative",
            SectionKind::NotaryInformation => "notary_information",
        }
    }

    /// Human-readable heading used by the renderer.
    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::GeneralInformation => "General Information",
            SectionKind::Shareholders => "Share Capital",
            SectionKind::Administration => "Administration",
            SectionKind::LegalRepresentative => "Legal Representatives",
            SectionKind::NotaryInformation => "Notary",
        }
    }

    /// JSON schema of the section's structured value, sent to the model.
    pub fn json_schema(&self) -> Value {
        let schema = match self {
            SectionKind::GeneralInformation => schema_for!(GeneralInformation),
            SectionKind::Shareholders => schema_for!(ShareCapital),
            SectionKind::Administration => schema_for!(Administration),
            SectionKind::LegalRepresentative => schema_for!(LegalRepresentative),
            SectionKind::NotaryInformation => schema_for!(NotaryInformation),
        };
        serde_json::to_value(schema).unwrap_or_default()
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| format!("unknown report section '{}'", s))
    }
}

// ── Section shapes ───────────────────────────────────────────────────────

/// General information about the company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GeneralInformation {
    /// The registered name of the company
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub name: String,
    /// The date the company was registered
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub expedition_date: String,
    /// The city where the company was registered
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub expedition_city: String,
    /// The duration of the company in years
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub duration: String,
    /// A list of the company's corporate purposes
    pub social_object: Vec<String>,
    /// The nationality of the company, given by the country it was registered in
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub nationality: String,
    /// Does the company accept foreign members?
    pub open_to_foreigners: bool,
    /// The total amount of money invested in the company
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub fixed_social_capital: String,
    /// The total number of shares the company is made of
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub total_stock: String,
}

impl Default for GeneralInformation {
    fn default() -> Self {
        Self {
            name: String::new(),
            expedition_date: String::new(),
            expedition_city: String::new(),
            duration: String::new(),
            social_object: Vec::new(),
            nationality: String::new(),
            open_to_foreigners: true,
            fixed_social_capital: String::new(),
            total_stock: String::new(),
        }
    }
}

/// A single shareholder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Shareholder {
    /// Name of the shareholder
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub shareholder_name: String,
    /// Number of shares held by the shareholder
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub stock_units: String,
    /// Monetary value of the shares held by the shareholder
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub stocks_value: String,
}

/// The company's share capital.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ShareCapital {
    /// The list of the company's shareholders
    pub shareholders: Vec<Shareholder>,
}

/// A person with powers inside the company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Manager {
    /// Name of the manager
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub name: String,
    /// Position the manager holds inside the company
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub position: String,
    /// A list of the powers the manager holds inside the company
    pub powers: Vec<String>,
}

/// The company's administration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Administration {
    /// Every manager of the company. A manager is any member with powers inside the company.
    pub managers: Vec<Manager>,
}

/// The person who may represent the company in legal proceedings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LegalRepresentative {
    /// Name of the legal representative
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub name: String,
    /// Position the legal representative holds inside the company
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub position: String,
    /// Powers granted to the legal representative
    pub powers: Vec<String>,
}

/// The notary public who certified the company's creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NotaryInformation {
    /// Name of the notary public
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub notary_name: String,
    /// Deed number assigned by the notary's office
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub document_number: String,
    /// The notary's number
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub notary_number: String,
    /// The state in which the company was created
    #[serde(deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub entity_of_creation: String,
}

/// Models regularly answer `"stock_units": 500` for a string field.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

// ── Section values ───────────────────────────────────────────────────────

/// A validated structured value for one section.
///
/// Serialises as the bare section payload; the section name lives in the
/// surrounding map key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SectionValue {
    GeneralInformation(GeneralInformation),
    Shareholders(ShareCapital),
    Administration(Administration),
    LegalRepresentative(LegalRepresentative),
    NotaryInformation(NotaryInformation),
}

impl SectionValue {
    /// Validate a raw JSON payload against the shape of `kind`.
    pub fn from_json(kind: SectionKind, value: Value) -> Result<Self, serde_json::Error> {
        let value = match value {
            // Models occasionally return the payload as an escaped JSON string.
            Value::String(s) => serde_json::from_str(&s)?,
            other => other,
        };
        Ok(match kind {
            SectionKind::GeneralInformation => {
                SectionValue::GeneralInformation(serde_json::from_value(value)?)
            }
            SectionKind::Shareholders => SectionValue::Shareholders(serde_json::from_value(value)?),
            SectionKind::Administration => {
                SectionValue::Administration(serde_json::from_value(value)?)
            }
            SectionKind::LegalRepresentative => {
                SectionValue::LegalRepresentative(serde_json::from_value(value)?)
            }
            SectionKind::NotaryInformation => {
                SectionValue::NotaryInformation(serde_json::from_value(value)?)
            }
        })
    }

    pub fn kind(&self) -> SectionKind {
        match self {
            SectionValue::GeneralInformation(_) => SectionKind::GeneralInformation,
            SectionValue::Shareholders(_) => SectionKind::Shareholders,
            SectionValue::Administration(_) => SectionKind::Administration,
            SectionValue::LegalRepresentative(_) => SectionKind::LegalRepresentative,
            SectionValue::NotaryInformation(_) => SectionKind::NotaryInformation,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Rows of labelled cells for the rendered report.
    ///
    /// Each section owns its layout. List fields are packed into numbered
    /// cells of at most `cell_max_chars` characters; overflow continues on
    /// extra rows with the leading columns left blank.
    pub fn to_table_rows(&self, cell_max_chars: usize) -> Vec<Vec<String>> {
        match self {
            SectionValue::GeneralInformation(g) => general_rows(g, cell_max_chars),
            SectionValue::Shareholders(s) => shareholder_rows(s),
            SectionValue::Administration(a) => administration_rows(a, cell_max_chars),
            SectionValue::LegalRepresentative(r) => legal_rep_rows(r, cell_max_chars),
            SectionValue::NotaryInformation(n) => notary_rows(n),
        }
    }
}

fn row<const N: usize>(cells: [&str; N]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

fn general_rows(g: &GeneralInformation, cell_max_chars: usize) -> Vec<Vec<String>> {
    let purposes = pack_numbered(&g.social_object, cell_max_chars);
    let mut rows = vec![
        row(["Incorporation", ""]),
        row(["Company name", &g.name]),
        row(["Date of incorporation", &g.expedition_date]),
        row(["Registered office", &g.expedition_city]),
        row(["Duration", &g.duration]),
    ];
    push_continued(&mut rows, &["Corporate purpose"], &purposes);
    rows.extend([
        row(["Nationality", &g.nationality]),
        row([
            "Foreign members admitted",
            if g.open_to_foreigners { "Yes" } else { "No" },
        ]),
        row(["Minimum fixed share capital", &g.fixed_social_capital]),
        row(["Total shares or equity interests", &g.total_stock]),
    ]);
    rows
}

fn shareholder_rows(s: &ShareCapital) -> Vec<Vec<String>> {
    let mut rows = vec![
        row(["", "Share Capital", ""]),
        row(["Shareholders", "Number of shares", "Value"]),
    ];
    for holder in &s.shareholders {
        rows.push(row([
            &holder.shareholder_name,
            &holder.stock_units,
            &holder.stocks_value,
        ]));
    }
    rows
}

fn administration_rows(a: &Administration, cell_max_chars: usize) -> Vec<Vec<String>> {
    let mut rows = vec![
        row(["", "Administration", ""]),
        row(["Name", "Position", "Powers"]),
    ];
    for manager in &a.managers {
        let powers = pack_numbered(&manager.powers, cell_max_chars);
        push_continued(&mut rows, &[&manager.name, &manager.position], &powers);
    }
    rows
}

fn legal_rep_rows(r: &LegalRepresentative, cell_max_chars: usize) -> Vec<Vec<String>> {
    let mut rows = vec![
        row(["", "Legal Representatives", ""]),
        row(["Name", "Position", "Powers"]),
    ];
    let powers = pack_numbered(&r.powers, cell_max_chars);
    push_continued(&mut rows, &[&r.name, &r.position], &powers);
    rows
}

fn notary_rows(n: &NotaryInformation) -> Vec<Vec<String>> {
    vec![
        row(["", "Notary", "", ""]),
        row(["Deed number", "Notary name", "Notary number", "State"]),
        row([
            &n.document_number,
            &n.notary_name,
            &n.notary_number,
            &n.entity_of_creation,
        ]),
    ]
}

/// Push `lead` + first packed cell, then one row per remaining cell with the
/// lead columns blank.
fn push_continued(rows: &mut Vec<Vec<String>>, lead: &[&str], packed: &[String]) {
    let mut first: Vec<String> = lead.iter().map(|s| s.to_string()).collect();
    first.push(packed.first().cloned().unwrap_or_default());
    rows.push(first);

    for cell in packed.iter().skip(1) {
        let mut cont = vec![String::new(); lead.len()];
        cont.push(cell.clone());
        rows.push(cont);
    }
}

/// Number `items` ("1. …", "2. …") and pack them into cells whose text stays
/// within `cell_max_chars - 10` characters, one item per line.
///
/// A single item longer than the budget still gets a cell of its own.
pub fn pack_numbered(items: &[String], cell_max_chars: usize) -> Vec<String> {
    let budget = cell_max_chars.saturating_sub(NUMBERING_ALLOWANCE);
    let mut cells = Vec::new();
    let mut current = String::new();

    for (i, item) in items.iter().enumerate() {
        let entry = format!("{}. {}", i + 1, item);
        if current.is_empty() {
            current = entry;
        } else if current.chars().count() + item.chars().count() <= budget {
            current.push('\n');
            current.push_str(&entry);
        } else {
            cells.push(std::mem::take(&mut current));
            current = entry;
        }
    }
    if !current.is_empty() {
        cells.push(current);
    }
    cells
}
