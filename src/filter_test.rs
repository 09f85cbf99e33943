use super::*;

#[derive(Debug, Clone, PartialEq)]
struct Row {
    first_name: &'static str,
    last_name: &'static str,
    status: &'static str,
}

impl Searchable for Row {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.first_name, self.last_name]
    }

    fn tab_value(&self) -> Option<&str> {
        Some(self.status)
    }
}

fn rows() -> Vec<Row> {
    vec![
        Row { first_name: "Emma", last_name: "Johnson", status: "checked_in" },
        Row { first_name: "Liam", last_name: "Davis", status: "expected" },
        Row { first_name: "Olivia", last_name: "Martinez", status: "checked_out" },
        Row { first_name: "Noah", last_name: "Emmanuel", status: "checked_in" },
    ]
}

#[test]
fn contains_ignore_case_matches_any_case() {
    assert!(contains_ignore_case("Science Museum Adventure", "museum"));
    assert!(contains_ignore_case("science", "SCIENCE"));
    assert!(contains_ignore_case("Ærøskøbing", "ærø"));
    assert!(!contains_ignore_case("Art Room", "lab"));
}

#[test]
fn empty_needle_matches_everything() {
    assert!(contains_ignore_case("anything", ""));
}

#[test]
fn search_is_case_insensitive_for_every_casing() {
    for query in ["emma", "EMMA", "Emma", "eMmA"] {
        let result = ListFilter::new(Some(query), None).apply(rows());
        let names: Vec<_> = result.iter().map(|r| r.first_name).collect();
        assert_eq!(names, vec!["Emma", "Noah"], "query {query:?}");
    }
}

#[test]
fn empty_search_is_identity() {
    for query in [None, Some(""), Some("   ")] {
        assert_eq!(ListFilter::new(query, None).apply(rows()), rows());
    }
}

#[test]
fn all_tab_is_identity() {
    for tab in [None, Some("all"), Some("ALL"), Some("")] {
        let filter = ListFilter::new(None, tab);
        assert!(filter.is_identity());
        assert_eq!(filter.apply(rows()), rows());
    }
}

#[test]
fn tab_filter_is_exact_equality() {
    let result = ListFilter::new(None, Some("checked_in")).apply(rows());
    assert_eq!(result.len(), 2);
    assert!(result.iter().all(|r| r.status == "checked_in"));

    let none = ListFilter::new(None, Some("checked")).apply(rows());
    assert!(none.is_empty());
}

#[test]
fn search_and_tab_compose_with_and() {
    let result = ListFilter::new(Some("em"), Some("checked_in")).apply(rows());
    let names: Vec<_> = result.iter().map(|r| r.first_name).collect();
    assert_eq!(names, vec!["Emma", "Noah"]);

    let result = ListFilter::new(Some("davis"), Some("checked_in")).apply(rows());
    assert!(result.is_empty());
}

#[test]
fn filtering_preserves_order() {
    let result = ListFilter::new(Some("a"), None).apply(rows());
    let names: Vec<_> = result.iter().map(|r| r.first_name).collect();
    assert_eq!(names, vec!["Emma", "Liam", "Olivia", "Noah"]);
}

#[test]
fn normalize_helpers() {
    assert_eq!(normalize_search(Some("  art ")), Some("art"));
    assert_eq!(normalize_search(Some(" ")), None);
    assert_eq!(normalize_tab(Some("All")), None);
    assert_eq!(normalize_tab(Some("signed")), Some("signed"));
}

#[test]
fn like_pattern_wraps_and_escapes() {
    assert_eq!(like_pattern("art"), "%art%");
    assert_eq!(like_pattern("100%"), "%100\\%%");
    assert_eq!(like_pattern("a_b"), "%a\\_b%");
    assert_eq!(like_pattern("c:\\x"), "%c:\\\\x%");
}
