use std::{fmt, str::FromStr};

use crate::Result;


/// Ordered, multi-valued set of URL query parameters.
///
/// Order of insertion is preserved, and a name may appear more than once,
/// as in `?tag=a&tag=b`. Lookups by name see the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parses an `application/x-www-form-urlencoded` query string.
    ///
    /// A leading `?` is ignored.
    pub fn parse(query: &str) -> Result<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        Ok(Self(serde_urlencoded::from_str(query)?))
    }

    /// Parses the query portion of a URI such as `/items?page=2#top`.
    ///
    /// A URI without `?` yields an empty set.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let uri = uri.split_once('#').map_or(uri, |(head, _)| head);
        match uri.split_once('?') {
            Some((_, query)) => Self::parse(query),
            None => Ok(Self::new()),
        }
    }

    pub fn to_query_string(&self) -> Result<String> {
        Ok(serde_urlencoded::to_string(&self.0)?)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(n, _)| n == name)
    }

    /// Sets `name` to `value`.
    ///
    /// The first occurrence keeps its position and every later occurrence is
    /// dropped. If `name` is missing, the pair is appended.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter().position(|(n, _)| *n == name) {
            Some(index) => {
                self.0[index].1 = value;
                let mut i = 0;
                self.0.retain(|(n, _)| {
                    let keep = i <= index || *n != name;
                    i += 1;
                    keep
                });
            }
            None => self.0.push((name, value)),
        }
    }
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Removes every occurrence of `name`. Returns `true` if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let len = self.0.len();
        self.0.retain(|(n, _)| n != name);
        self.0.len() != len
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromStr for QueryParams {
    type Err = crate::Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.to_query_string().map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for QueryParams {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}
