// src/dag/analyzer.rs

//! Static reference analysis of command sources.
//!
//! A command source is opaque to the engine; the only thing we extract from
//! it is the set of identifiers that name other declared targets. Those
//! become the target's inferred dependencies.

use std::collections::{BTreeSet, HashSet};

use regex::Regex;

use crate::errors::Result;
use crate::types::TargetName;

const IDENTIFIER_PATTERN: &str = r"[A-Za-z_][A-Za-z0-9_]*";

/// Collects identifiers from a command source and resolves them against the
/// set of declared target names.
#[derive(Debug, Clone)]
pub struct ReferenceAnalyzer {
    identifier: Regex,
}

impl ReferenceAnalyzer {
    pub fn new() -> Result<Self> {
        let identifier = Regex::new(IDENTIFIER_PATTERN)
            .map_err(|e| anyhow::anyhow!("compiling identifier pattern: {e}"))?;
        Ok(Self { identifier })
    }

    /// Every identifier-shaped token in `source`, in first-seen order.
    pub fn identifiers<'s>(&self, source: &'s str) -> Vec<&'s str> {
        let mut seen = HashSet::new();
        self.identifier
            .find_iter(source)
            .map(|m| m.as_str())
            .filter(|ident| seen.insert(*ident))
            .collect()
    }

    /// Identifiers in `source` that name a declared target other than
    /// `self_name`.
    pub fn references(
        &self,
        self_name: &str,
        source: &str,
        declared: &HashSet<&str>,
    ) -> BTreeSet<TargetName> {
        self.identifiers(source)
            .into_iter()
            .filter(|ident| *ident != self_name && declared.contains(ident))
            .map(str::to_string)
            .collect()
    }
}

/// Variables the shell or the process loader act on. A dependency exported
/// under one of these names would change how every dependent runs.
const RESERVED_ENV_NAMES: &[&str] = &[
    "BASH_ENV",
    "CDPATH",
    "ENV",
    "HOME",
    "IFS",
    "LANG",
    "LD_LIBRARY_PATH",
    "LD_PRELOAD",
    "OLDPWD",
    "PATH",
    "PS1",
    "PS2",
    "PS4",
    "PWD",
    "SHELL",
    "TMPDIR",
    "USER",
];

/// Prefix of the variables the shell evaluator sets itself.
const RESERVED_ENV_PREFIX: &str = "REPRODAG_";

/// Whether `name` is usable as a target name (and as an environment
/// variable for the shell evaluator).
pub fn is_valid_target_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !is_reserved_env_name(name)
}

fn is_reserved_env_name(name: &str) -> bool {
    RESERVED_ENV_NAMES.contains(&name) || name.starts_with(RESERVED_ENV_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_only_declared_names() {
        let analyzer = ReferenceAnalyzer::new().unwrap();
        let declared: HashSet<&str> = ["raw", "clean", "model"].into_iter().collect();

        let refs = analyzer.references(
            "model",
            "python fit.py --input \"$clean\" --base ${raw} --out model.pkl",
            &declared,
        );
        assert_eq!(
            refs.into_iter().collect::<Vec<_>>(),
            vec!["clean".to_string(), "raw".to_string()]
        );
    }

    #[test]
    fn partial_identifiers_do_not_match() {
        let analyzer = ReferenceAnalyzer::new().unwrap();
        let declared: HashSet<&str> = ["raw"].into_iter().collect();
        assert!(analyzer.references("x", "raw_data rawest draw", &declared).is_empty());
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_target_name("plot2"));
        assert!(is_valid_target_name("_tmp"));
        assert!(!is_valid_target_name("2plot"));
        assert!(!is_valid_target_name("a.csv"));
        assert!(!is_valid_target_name(""));
    }

    #[test]
    fn environment_names_are_reserved() {
        assert!(!is_valid_target_name("PATH"));
        assert!(!is_valid_target_name("IFS"));
        assert!(!is_valid_target_name("REPRODAG_SEED"));
        assert!(is_valid_target_name("path"));
        assert!(is_valid_target_name("HOMES"));
    }
}
