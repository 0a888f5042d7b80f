use std::collections::BTreeMap;

use url::Url;

use crate::{RestCallError, Result};

/// Values substituted into `{name}` placeholders of an operation path.
pub type PathParams = BTreeMap<String, String>;

/// Ordered multi-map of query parameters.
///
/// Keys keep their first-insertion order and every key keeps its values in
/// the order they were added.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct QueryParams {
    entries: Vec<(String, Vec<String>)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` to the values of `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
        self
    }

    /// Replaces every value of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        self.entries.retain(|(name, _)| *name != key);
        self.entries.push((key, vec![value.into()]));
        self
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, values)| values.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattened `(key, value)` pairs in wire order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(key, values)| {
            values
                .iter()
                .map(move |value| (key.as_str(), value.as_str()))
        })
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.add(key, value);
        }
        params
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Declarative URL: base, `{name}` path template and parameters.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UrlBuilder {
    pub base_url: String,
    pub operation_path: String,
    pub path_params: PathParams,
    pub query_params: QueryParams,
}

impl UrlBuilder {
    pub fn new(base_url: impl Into<String>, operation_path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            operation_path: operation_path.into(),
            ..Self::default()
        }
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.add(key, value);
        self
    }

    pub fn build(&self) -> Result<Url> {
        build_url(
            &self.base_url,
            &self.operation_path,
            &self.path_params,
            &self.query_params,
        )
    }
}

/// Resolves `path_template` against `base` and attaches the query string.
///
/// Placeholders without a matching path parameter stay in the path as-is.
/// A non-empty `query` replaces any query the template carried.
pub fn build_url(
    base: &str,
    path_template: &str,
    path_params: &PathParams,
    query: &QueryParams,
) -> Result<Url> {
    let base_url = Url::parse(base).map_err(|source| RestCallError::InvalidUrl {
        url: base.to_owned(),
        source,
    })?;

    let path = substitute_path(path_template, path_params);
    let mut url = base_url
        .join(&path)
        .map_err(|source| RestCallError::InvalidUrl { url: path, source })?;

    if !query.is_empty() {
        url.query_pairs_mut().clear().extend_pairs(query.pairs());
    }

    Ok(url)
}

/// Replaces every `{name}` token that has a value in `params`.
pub fn substitute_path(template: &str, params: &PathParams) -> String {
    let mut resolved = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        resolved.push_str(&rest[..open]);
        let tail = &rest[open..];
        match tail.find('}') {
            Some(close) => {
                let name = &tail[1..close];
                match params.get(name) {
                    Some(value) => resolved.push_str(value),
                    None => resolved.push_str(&tail[..=close]),
                }
                rest = &tail[close + 1..];
            }
            None => {
                resolved.push_str(tail);
                rest = "";
            }
        }
    }
    resolved.push_str(rest);
    resolved
}
