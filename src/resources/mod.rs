//! The tenant-scoped entities of the office CRM.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::{backend::Row, cpf};

pub mod attendances;
pub mod categories;
pub mod category_types;
pub mod indicated;
pub mod voters;

pub use attendances::{Attendance, AttendanceDraft, AttendanceFilters, AttendancePatch, AttendanceStatus, Attendances};
pub use categories::{Categories, Category, CategoryDraft, CategoryFilters, CategoryPatch};
pub use category_types::{CategoryType, CategoryTypeDraft, CategoryTypeFilters, CategoryTypePatch, CategoryTypes};
pub use indicated::{Indicated, IndicatedDraft, IndicatedFilters, IndicatedPatch, IndicatedRecord};
pub use voters::{Voter, VoterDraft, VoterFilters, VoterPatch, Voters};

/// Normalizes one text field; `None` means "store NULL".
type Normalize = fn(&str) -> Option<String>;

pub(crate) fn trimmed(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub(crate) fn upper(value: &str) -> Option<String> {
    trimmed(value).map(|v| v.to_uppercase())
}

pub(crate) fn digits(value: &str) -> Option<String> {
    let value = cpf::digits(value);
    (!value.is_empty()).then_some(value)
}

/// The non-blank value of an optional filter.
pub(crate) fn filter_value(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Assembles the row sent to the backend.
///
/// `put` is for inserts: a blank value leaves the column out. `patch` is for
/// updates: an absent value leaves the column alone, a blank one clears it.
#[derive(Default)]
pub(crate) struct RowBuilder {
    row: Row,
}

impl RowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.row.insert(column.to_string(), value.into());
        self
    }

    pub fn put(self, column: &str, value: Option<&str>, normalize: Normalize) -> Self {
        match value.and_then(normalize) {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    pub fn patch(self, column: &str, value: Option<&str>, normalize: Normalize) -> Self {
        match value {
            Some(v) => match normalize(v) {
                Some(v) => self.set(column, v),
                None => self.set(column, Value::Null),
            },
            None => self,
        }
    }

    pub fn build(self) -> Row {
        self.row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizers() {
        assert_eq!(trimmed("  a b "), Some("a b".to_string()));
        assert_eq!(trimmed("   "), None);
        assert_eq!(upper(" são paulo "), Some("SÃO PAULO".to_string()));
        assert_eq!(digits("(11) 98765-4321"), Some("11987654321".to_string()));
        assert_eq!(digits("--"), None);
    }

    #[test]
    fn put_skips_blanks_and_patch_clears_them() {
        let row = RowBuilder::new()
            .put("nome", Some(" ana "), upper)
            .put("cidade", Some(" "), upper)
            .put("bairro", None, upper)
            .build();
        assert_eq!(Value::Object(row), json!({"nome": "ANA"}));

        let row = RowBuilder::new()
            .patch("cidade", Some(""), upper)
            .patch("bairro", None, upper)
            .patch("cep", Some("01310-100"), digits)
            .build();
        assert_eq!(Value::Object(row), json!({"cidade": null, "cep": "01310100"}));
    }

    #[test]
    fn blank_filters_are_ignored() {
        assert_eq!(filter_value(&Some("  x ".to_string())), Some("x"));
        assert_eq!(filter_value(&Some("  ".to_string())), None);
        assert_eq!(filter_value(&None), None);
    }
}
