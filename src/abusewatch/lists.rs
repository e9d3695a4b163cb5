//! Static reference lists and the runtime flagged-account set

use crate::abusewatch::error::{DetectionError, DetectionResult};
use log::info;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Immutable identifier set loaded once at start-up.
///
/// The file format is one identifier per line; blank lines and lines starting
/// with `#` are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticList {
    entries: HashSet<String>,
}

impl StaticList {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parse(contents: &str) -> Self {
        Self::from_entries(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    pub fn from_file(path: impl AsRef<Path>) -> DetectionResult<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| DetectionError::ListLoad {
                path: path.to_path_buf(),
                source,
            })?;
        let list = Self::parse(&contents);
        info!("Loaded {} entries from {}", list.len(), path.display());
        Ok(list)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entries.contains(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accounts considered at risk, shared between the criteria that flag and consult them
#[derive(Debug, Clone, Default)]
pub struct FlaggedAccounts {
    accounts: Arc<RwLock<HashSet<String>>>,
}

impl FlaggedAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let flagged = Self::new();
        for account in accounts {
            flagged.flag(account);
        }
        flagged
    }

    /// Returns true if the account was not flagged before
    pub fn flag(&self, account: impl Into<String>) -> bool {
        self.accounts
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(account.into())
    }

    pub fn is_flagged(&self, account: &str) -> bool {
        self.accounts
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains(account)
    }

    pub fn len(&self) -> usize {
        self.accounts.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_skips_blank_and_comments() {
        let list = StaticList::parse("# known\n3.3.3.3\n\n  10.0.0.1  \n");
        assert_eq!(list.len(), 2);
        assert!(list.contains("10.0.0.1"));
        assert!(!list.contains("# known"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "spock@mozilla.com").unwrap();
        writeln!(file, "kirk@mozilla.com").unwrap();

        let list = StaticList::from_file(file.path()).unwrap();
        assert!(list.contains("kirk@mozilla.com"));
    }

    #[test]
    fn test_missing_file() {
        let err = StaticList::from_file("/nonexistent/abusewatch/list.txt").unwrap_err();
        assert!(matches!(err, DetectionError::ListLoad { .. }));
    }

    #[test]
    fn test_flagged_accounts_shared() {
        let flagged = FlaggedAccounts::new();
        let view = flagged.clone();
        assert!(flagged.flag("spock@mozilla.com"));
        assert!(!flagged.flag("spock@mozilla.com"));
        assert!(view.is_flagged("spock@mozilla.com"));
        assert_eq!(view.len(), 1);
    }
}
