//! List filtering shared by every listing endpoint.
//!
//! Two filters compose with AND:
//! - search: case-insensitive substring match over a record's searchable fields
//! - tab: equality on one selected value, where `"all"` selects everything
//!
//! Database-backed listings push the same semantics into SQL via
//! [`like_pattern`] and `ILIKE`; in-memory listings use [`ListFilter::apply`].

/// The tab value that disables tab filtering.
pub const ALL: &str = "all";

/// A record that can be matched by a search box and a tab bar.
pub trait Searchable {
    /// Fields checked by the search box.
    fn search_fields(&self) -> Vec<&str>;

    /// Value compared against the selected tab.
    fn tab_value(&self) -> Option<&str> {
        None
    }
}

/// Case-insensitive substring containment.
#[must_use]
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Normalize a raw search string; blank input means "no search".
#[must_use]
pub fn normalize_search(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Normalize a raw tab value; blank input and `"all"` mean "no tab filter".
#[must_use]
pub fn normalize_tab(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(ALL))
}

/// `ILIKE` pattern matching `query` anywhere, with wildcards escaped.
#[must_use]
pub fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter<'a> {
    search: Option<&'a str>,
    tab: Option<&'a str>,
}

impl<'a> ListFilter<'a> {
    #[must_use]
    pub fn new(search: Option<&'a str>, tab: Option<&'a str>) -> Self {
        Self { search: normalize_search(search), tab: normalize_tab(tab) }
    }

    /// True when the filter selects every record.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.search.is_none() && self.tab.is_none()
    }

    #[must_use]
    pub fn matches<T: Searchable>(&self, item: &T) -> bool {
        let search_ok = self.search.is_none_or(|query| {
            item.search_fields()
                .iter()
                .any(|field| contains_ignore_case(field, query))
        });
        let tab_ok = self
            .tab
            .is_none_or(|tab| item.tab_value() == Some(tab));
        search_ok && tab_ok
    }

    /// Keep matching records in their original order.
    #[must_use]
    pub fn apply<T: Searchable>(&self, items: Vec<T>) -> Vec<T> {
        if self.is_identity() {
            return items;
        }
        items
            .into_iter()
            .filter(|item| self.matches(item))
            .collect()
    }
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod tests;
