use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Issue priority ordinal. `P0` is the most urgent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "PriorityRepr", into = "String")]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
    P3,
    P4,
    P5,
}

/// Frontmatter accepts both `P2` and `2`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PriorityRepr {
    Ordinal(u8),
    Label(String),
}

impl Priority {
    pub const ALL: [Priority; 6] = [
        Priority::P0,
        Priority::P1,
        Priority::P2,
        Priority::P3,
        Priority::P4,
        Priority::P5,
    ];

    /// Numeric ordinal, 0 for `P0` through 5 for `P5`
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Result<Self> {
        match Self::ALL.get(ordinal as usize) {
            Some(p) => Ok(*p),
            None => bail!("Priority ordinal out of range: {ordinal} (expected 0-5)"),
        }
    }

    pub fn is_p0(self) -> bool {
        self == Priority::P0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.ordinal())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('P')
            .or_else(|| trimmed.strip_prefix('p'))
            .unwrap_or(trimmed);
        match digits.parse::<u8>() {
            Ok(n) => Self::from_ordinal(n),
            Err(_) => bail!("Invalid priority '{s}' (expected P0-P5)"),
        }
    }
}

impl TryFrom<PriorityRepr> for Priority {
    type Error = String;

    fn try_from(value: PriorityRepr) -> std::result::Result<Self, Self::Error> {
        match value {
            PriorityRepr::Ordinal(n) => Priority::from_ordinal(n).map_err(|e| e.to_string()),
            PriorityRepr::Label(s) => s.parse().map_err(|e: anyhow::Error| e.to_string()),
        }
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.to_string()
    }
}

/// Immutable description of one unit of work, loaded once per run.
///
/// The orchestrator treats the rest of the issue document as opaque; only the
/// scheduling-relevant fields are modelled here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDescriptor {
    pub id: String,
    #[serde(default)]
    pub priority: Priority,
    /// Repository-relative paths the issue expects to touch
    #[serde(rename = "files", alias = "declared_files", default)]
    pub declared_files: BTreeSet<String>,
    /// Issue ids that must reach a terminal state first
    #[serde(rename = "blocked_by", alias = "declared_blockers", default)]
    pub declared_blockers: BTreeSet<String>,
}

impl IssueDescriptor {
    pub fn new(id: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            priority,
            declared_files: BTreeSet::new(),
            declared_blockers: BTreeSet::new(),
        }
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn with_blockers<I, S>(mut self, blockers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_blockers
            .extend(blockers.into_iter().map(Into::into));
        self
    }

    pub fn is_p0(&self) -> bool {
        self.priority.is_p0()
    }
}
