use serde::{Deserialize, Serialize};

/// Header names accepted as the indicator title
pub const TITLE_SYNONYMS: &[&str] = &["title", "name", "label", "indicator", "nom", "indicateur"];

/// Header names accepted as the indicator description
pub const DESCRIPTION_SYNONYMS: &[&str] = &[
    "description",
    "desc",
    "details",
    "definition",
    "détails",
    "définition",
];

/// A resolved column: its header and its position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub name: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ColumnMapping {
    pub title: Option<ColumnRef>,
    pub description: Option<ColumnRef>,
}

/// Picks the title and description columns from a header list
pub struct ColumnMapper;

impl ColumnMapper {
    /// Title falls back to the first column and description to the second.
    /// The two lookups are independent of each other.
    pub fn map(headers: &[String]) -> ColumnMapping {
        let title = find_synonym(headers, TITLE_SYNONYMS).or_else(|| positional(headers, 0));
        let description =
            find_synonym(headers, DESCRIPTION_SYNONYMS).or_else(|| positional(headers, 1));

        ColumnMapping { title, description }
    }
}

fn find_synonym(headers: &[String], synonyms: &[&str]) -> Option<ColumnRef> {
    headers
        .iter()
        .position(|h| synonyms.contains(&h.trim().to_lowercase().as_str()))
        .map(|index| ColumnRef {
            name: headers[index].clone(),
            index,
        })
}

fn positional(headers: &[String], index: usize) -> Option<ColumnRef> {
    headers.get(index).map(|name| ColumnRef {
        name: name.clone(),
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::cleaner::Cleaner;
    use crate::pipeline::table::Table;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn names(mapping: &ColumnMapping) -> (Option<&str>, Option<&str>) {
        (
            mapping.title.as_ref().map(|c| c.name.as_str()),
            mapping.description.as_ref().map(|c| c.name.as_str()),
        )
    }

    #[test]
    fn test_synonyms_after_cleaning() {
        let cleaned = Cleaner::clean(Table::new(headers(&["Name", "Description", "Year"]), vec![]));
        let mapping = ColumnMapper::map(&cleaned.columns);
        assert_eq!(names(&mapping), (Some("name"), Some("description")));
        assert_eq!(mapping.title.unwrap().index, 0);
        assert_eq!(mapping.description.unwrap().index, 1);
    }

    #[test]
    fn test_raw_headers_match_case_insensitively() {
        let mapping = ColumnMapper::map(&headers(&["Year", "Description", "Name"]));
        assert_eq!(names(&mapping), (Some("Name"), Some("Description")));
    }

    #[test]
    fn test_positional_fallback() {
        let mapping = ColumnMapper::map(&headers(&["A", "B", "C"]));
        assert_eq!(names(&mapping), (Some("A"), Some("B")));
    }

    #[test]
    fn test_synonyms_found_anywhere() {
        let mapping = ColumnMapper::map(&headers(&["code", "définition", "année", "indicateur"]));
        assert_eq!(names(&mapping), (Some("indicateur"), Some("définition")));
        assert_eq!(mapping.title.unwrap().index, 3);
    }

    #[test]
    fn test_first_matching_header_wins() {
        let mapping = ColumnMapper::map(&headers(&["label", "title", "desc", "details"]));
        assert_eq!(names(&mapping), (Some("label"), Some("desc")));
    }

    #[test]
    fn test_single_column_is_title_only() {
        let mapping = ColumnMapper::map(&headers(&["valeur"]));
        assert_eq!(names(&mapping), (Some("valeur"), None));
    }

    #[test]
    fn test_description_falls_back_to_second_column_even_if_title() {
        // "name" is the title synonym; without a description synonym the
        // second column is used regardless of what it holds.
        let mapping = ColumnMapper::map(&headers(&["code", "name"]));
        assert_eq!(names(&mapping), (Some("name"), Some("name")));
    }

    #[test]
    fn test_no_columns() {
        assert_eq!(ColumnMapper::map(&[]), ColumnMapping::default());
    }
}
