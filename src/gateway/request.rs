//! Typed view of a raw invocation mapping.
//!
//! The gateway hands over an untyped JSON object of the form
//! `{"image": "<base64 | scheme://bucket/key>", "pages": "1-3,5"}`. Everything
//! here is validated before any byte is fetched or any model is touched.

use crate::gateway::error::{InvocationError, RetrievalCause};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;

static SCHEME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://(.*)$").expect("Invalid storage URI regex")
});

static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^/]+)/(.+)$").expect("Invalid storage location regex"));

/// An object reference of the form `scheme://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUri {
    /// Lower-cased scheme, such as `s3`.
    pub scheme: String,
    /// Bucket (or host, for HTTP sources).
    pub bucket: String,
    /// Object key (or path).
    pub key: String,
}

impl StorageUri {
    /// Whether `value` has the shape of a URI rather than inline data.
    pub fn looks_like_uri(value: &str) -> bool {
        SCHEME_RE.is_match(value.trim())
    }

    /// Parses `scheme://bucket/key`.
    pub fn parse(value: &str) -> Result<Self, InvocationError> {
        let value = value.trim();
        let invalid = || {
            InvocationError::retrieval(
                value,
                RetrievalCause::InvalidUri,
                None::<crate::core::errors::SimpleError>,
            )
        };
        let captures = SCHEME_RE.captures(value).ok_or_else(invalid)?;
        let location = LOCATION_RE.captures(&captures[2]).ok_or_else(invalid)?;
        Ok(Self {
            scheme: captures[1].to_ascii_lowercase(),
            bucket: location[1].to_string(),
            key: location[2].to_string(),
        })
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

/// Where the payload bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Base64 text, possibly with a `data:` prefix.
    Inline(String),
    /// External storage object.
    Remote(StorageUri),
}

/// A set of 1-based page numbers, kept as sorted, merged inclusive ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    ranges: Vec<RangeInclusive<u32>>,
}

impl PageSelection {
    /// Parses a comma-separated list of page numbers and `a-b` ranges.
    ///
    /// # Examples
    ///
    /// ```
    /// use oar_ocr_gateway::gateway::PageSelection;
    ///
    /// let pages = PageSelection::parse("5, 1-3,2").unwrap();
    /// assert_eq!(pages.resolve(5).unwrap(), vec![1, 2, 3, 5]);
    /// ```
    pub fn parse(expression: &str) -> Result<Self, InvocationError> {
        let mut ranges = Vec::new();
        for token in expression.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(InvocationError::validation(format!(
                    "invalid page selection '{expression}': empty token"
                )));
            }
            let range = match token.split_once('-') {
                Some((start, end)) => {
                    let start = parse_page_number(start, expression)?;
                    let end = parse_page_number(end, expression)?;
                    if start > end {
                        return Err(InvocationError::validation(format!(
                            "invalid page selection '{expression}': range {start}-{end} is reversed"
                        )));
                    }
                    start..=end
                }
                None => {
                    let page = parse_page_number(token, expression)?;
                    page..=page
                }
            };
            ranges.push(range);
        }
        Ok(Self::from_ranges(ranges))
    }

    /// A selection of one page.
    pub fn single(page: u32) -> Result<Self, InvocationError> {
        if page == 0 {
            return Err(InvocationError::validation(
                "invalid page selection: page numbers start at 1",
            ));
        }
        Ok(Self::from_ranges(vec![page..=page]))
    }

    fn from_ranges(mut ranges: Vec<RangeInclusive<u32>>) -> Self {
        ranges.sort_by_key(|r| *r.start());
        let mut merged: Vec<RangeInclusive<u32>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if *range.start() <= last.end().saturating_add(1) => {
                    if range.end() > last.end() {
                        *last = *last.start()..=*range.end();
                    }
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    /// Highest selected page.
    pub fn max_page(&self) -> u32 {
        self.ranges.last().map(|r| *r.end()).unwrap_or(0)
    }

    /// Whether `page` is selected.
    pub fn contains(&self, page: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(&page))
    }

    /// Checks the selection against a document of `page_count` pages and
    /// expands it to ascending page numbers.
    pub fn resolve(&self, page_count: u32) -> Result<Vec<u32>, InvocationError> {
        let max = self.max_page();
        if max > page_count {
            return Err(InvocationError::validation(format!(
                "page {max} is out of range: document has {page_count} page(s)"
            )));
        }
        Ok(self.ranges.iter().flat_map(|r| r.clone()).collect())
    }
}

fn parse_page_number(text: &str, expression: &str) -> Result<u32, InvocationError> {
    let text = text.trim();
    let page: u32 = text.parse().map_err(|_| {
        InvocationError::validation(format!(
            "invalid page selection '{expression}': '{text}' is not a page number"
        ))
    })?;
    if page == 0 {
        return Err(InvocationError::validation(format!(
            "invalid page selection '{expression}': page numbers start at 1"
        )));
    }
    Ok(page)
}

/// A validated invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    /// Payload source.
    pub image: ImageSource,
    /// Page selection; `None` means every page. Only consulted for PDFs.
    pub pages: Option<PageSelection>,
}

impl InvocationRequest {
    /// Validates a raw invocation mapping.
    pub fn from_value(raw: &Value) -> Result<Self, InvocationError> {
        let object = raw
            .as_object()
            .ok_or_else(|| InvocationError::validation("request must be a JSON object"))?;

        let image = match object.get("image") {
            None | Some(Value::Null) => {
                return Err(InvocationError::validation(
                    "missing required parameter: image",
                ));
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(InvocationError::validation(
                    "missing required parameter: image",
                ));
            }
            Some(Value::String(s)) => s,
            Some(_) => {
                return Err(InvocationError::validation(
                    "parameter 'image' must be a string",
                ));
            }
        };

        let image = if StorageUri::looks_like_uri(image) {
            ImageSource::Remote(StorageUri::parse(image)?)
        } else {
            ImageSource::Inline(image.clone())
        };

        let pages = match object.get("pages") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(PageSelection::parse(s)?),
            Some(Value::Number(n)) => {
                let page = n
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        InvocationError::validation(format!(
                            "invalid page selection '{n}': not a page number"
                        ))
                    })?;
                Some(PageSelection::single(page)?)
            }
            Some(_) => {
                return Err(InvocationError::validation(
                    "parameter 'pages' must be a string",
                ));
            }
        };

        Ok(Self { image, pages })
    }
}
