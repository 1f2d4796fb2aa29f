//! Batch pre-flight detection of id, slug and storage path collisions
//!
//! The detector runs after normalization and before any store call. It never stops at the
//! first collision: every issue in the batch is collected so the operator can fix the input
//! in one pass.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateField {
    Id,
    Slug,
    StoragePath,
}

impl fmt::Display for DuplicateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateField::Id => f.write_str("id"),
            DuplicateField::Slug => f.write_str("slug"),
            DuplicateField::StoragePath => f.write_str("storage path"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateIssue {
    /// Batch or parent the uniqueness applies to, e.g. `workspaces` or `profiles of acme`
    pub scope: String,
    pub field: DuplicateField,
    pub value: String,
    /// 1-based index of the first record carrying `value`
    pub first_index: usize,
    /// 1-based index of the later record that collides with it
    pub duplicate_index: usize,
}

impl fmt::Display for DuplicateIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: records #{} and #{} share {} \"{}\"",
            self.scope, self.first_index, self.duplicate_index, self.field, self.value
        )
    }
}

/// The identity keys a record will be upserted under.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityKeys<'a> {
    pub id: Option<&'a str>,
    pub slug: Option<&'a str>,
    /// Object path for records that upload bytes
    pub storage_path: Option<&'a str>,
}

impl<'a> IdentityKeys<'a> {
    pub fn new(id: Option<&'a str>, slug: Option<&'a str>) -> Self {
        Self {
            id,
            slug,
            storage_path: None,
        }
    }

    pub fn with_storage_path(mut self, path: &'a str) -> Self {
        self.storage_path = Some(path);
        self
    }
}

/// Accumulates issues over every scope checked during one run.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    issues: Vec<DuplicateIssue>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks one scope; maps are local to the call.
    pub fn check<'a, I>(&mut self, scope: &str, keys: I)
    where
        I: IntoIterator<Item = IdentityKeys<'a>>,
    {
        let mut ids: HashMap<&str, usize> = HashMap::new();
        let mut slugs: HashMap<&str, usize> = HashMap::new();
        let mut paths: HashMap<&str, usize> = HashMap::new();

        for (position, key) in keys.into_iter().enumerate() {
            let index = position + 1;
            for (field, value, seen) in [
                (DuplicateField::Id, key.id, &mut ids),
                (DuplicateField::Slug, key.slug, &mut slugs),
                (DuplicateField::StoragePath, key.storage_path, &mut paths),
            ] {
                let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
                    continue;
                };
                match seen.get(value) {
                    Some(first_index) => self.issues.push(DuplicateIssue {
                        scope: scope.to_string(),
                        field,
                        value: value.to_string(),
                        first_index: *first_index,
                        duplicate_index: index,
                    }),
                    None => {
                        seen.insert(value, index);
                    }
                }
            }
        }
    }

    pub fn issues(&self) -> &[DuplicateIssue] {
        &self.issues
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn into_issues(self) -> Vec<DuplicateIssue> {
        self.issues
    }
}
