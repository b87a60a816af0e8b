//! Order-preserving header multimap with case-insensitive lookup.

/// Header collection of one HTTP message.
///
/// Entries keep the name casing and relative order they were parsed or
/// appended with, so a re-serialized head matches the original byte-for-byte
/// apart from headers the caller adds. Lookups are ASCII case-insensitive
/// per RFC 9110.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, keeping any existing entries with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Returns the first value for `name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `name` in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.append("Host", "example.com");
        assert_eq!(headers.get("host"), Some("example.com"));
        assert_eq!(headers.get("HOST"), Some("example.com"));
        assert_eq!(headers.get("Host"), Some("example.com"));
        assert_eq!(headers.get("location"), None);
    }

    #[test]
    fn append_keeps_duplicates_in_order() {
        let mut headers = Headers::new();
        headers.append("Via", "a");
        headers.append("Accept", "*/*");
        headers.append("Via", "b");
        assert_eq!(headers.get("via"), Some("a"));
        let all: Vec<_> = headers.get_all("via").collect();
        assert_eq!(all, vec!["a", "b"]);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn iteration_preserves_insertion_order_and_casing() {
        let mut headers = Headers::new();
        headers.append("X-First", "1");
        headers.append("x-second", "2");
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("X-First", "1"), ("x-second", "2")]);
    }
}
