//! Issue store loading
//!
//! Issues are markdown documents with YAML frontmatter, one per file, in the
//! sprint's issues directory. Only the frontmatter is read.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::error::OrchestratorError;
use crate::models::IssueDescriptor;
use crate::parser::parse_from_markdown;
use crate::validation::{normalize_repo_path, validate_id};

/// Load every issue in `dir`, keeping only `selection` when it is non-empty.
///
/// Ids named in `selection` that have no issue file are a configuration error.
pub fn load_issues(dir: &Path, selection: &[String]) -> Result<Vec<IssueDescriptor>> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read issues directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();

    let mut issues = Vec::with_capacity(paths.len());
    for path in &paths {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read issue file: {}", path.display()))?;
        let issue: IssueDescriptor = parse_from_markdown(&content, "Issue")
            .with_context(|| format!("Invalid issue file: {}", path.display()))?;
        issues.push(issue);
    }

    let issues = normalize_issues(issues)?;
    select_issues(issues, selection)
}

/// Validate ids and normalize declared file paths.
///
/// Fails with every problem found, not just the first.
pub fn normalize_issues(issues: Vec<IssueDescriptor>) -> Result<Vec<IssueDescriptor>> {
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();
    let mut normalized = Vec::with_capacity(issues.len());

    for mut issue in issues {
        if let Err(e) = validate_id(&issue.id) {
            errors.push(format!("issue '{}': {e}", issue.id));
            continue;
        }
        if !seen.insert(issue.id.clone()) {
            errors.push(format!("duplicate issue id '{}'", issue.id));
            continue;
        }

        let mut files = BTreeSet::new();
        for file in &issue.declared_files {
            match normalize_repo_path(file) {
                Ok(path) => {
                    files.insert(path);
                }
                Err(e) => errors.push(format!("issue '{}': {e}", issue.id)),
            }
        }
        issue.declared_files = files;

        if issue.declared_blockers.contains(&issue.id) {
            errors.push(format!("issue '{}' declares itself as a blocker", issue.id));
        }

        normalized.push(issue);
    }

    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(OrchestratorError::InvalidConfig(errors).into())
    }
}

fn select_issues(issues: Vec<IssueDescriptor>, selection: &[String]) -> Result<Vec<IssueDescriptor>> {
    if selection.is_empty() {
        return Ok(issues);
    }

    let mut by_id: BTreeMap<String, IssueDescriptor> =
        issues.into_iter().map(|i| (i.id.clone(), i)).collect();

    let missing: Vec<String> = selection
        .iter()
        .filter(|id| !by_id.contains_key(*id))
        .map(|id| format!("sprint names unknown issue '{id}'"))
        .collect();
    if !missing.is_empty() {
        return Err(OrchestratorError::InvalidConfig(missing).into());
    }

    Ok(selection
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect())
}
