//! Navigator that replays pages from a JSON file
//!
//! Useful for dry runs of a job definition and for exercising the store and
//! checkpoint logic without a live source. The file looks like:
//!
//! ```json
//! {
//!   "total_pages": 2,
//!   "pages": [
//!     { "page": 1, "items": [
//!         { "name": "Alpha University",
//!           "records": [ { "institution": "Alpha University", "program": "Accounting" } ] },
//!         { "name": "Broken entry", "fail": true }
//!     ] }
//!   ]
//! }
//! ```
//!
//! `total_pages` may be omitted, in which case discovery reports the count as
//! unknown. An item marked `"fail": true` reports an extraction error.

use crate::crawler::navigator::{NavResult, Navigator, NavigatorError, UNKNOWN_TOTAL_PAGES};
use crate::record::Record;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    total_pages: Option<u32>,
    pages: Vec<FixturePage>,
}

#[derive(Debug, Deserialize)]
struct FixturePage {
    page: u32,
    #[serde(default)]
    items: Vec<FixtureItem>,
}

/// One listed item and the records it yields
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureItem {
    pub name: String,
    #[serde(default)]
    records: Vec<Map<String, Value>>,
    #[serde(default)]
    fail: bool,
}

impl fmt::Display for FixtureItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Replays a fixed set of pages
#[derive(Debug)]
pub struct FixtureNavigator {
    pages: BTreeMap<u32, Vec<FixtureItem>>,
    total_pages: u32,
    current_page: u32,
}

impl FixtureNavigator {
    /// Loads a fixture file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|e| HarvestError::Fixture(format!("{}: {}", path.display(), e)))
    }

    /// Parses fixture JSON
    pub fn from_json(content: &str) -> Result<Self> {
        let file: FixtureFile = serde_json::from_str(content)?;

        let mut pages = BTreeMap::new();
        for page in file.pages {
            if page.page == 0 {
                return Err(HarvestError::Fixture("page numbers start at 1".to_string()));
            }
            if pages.insert(page.page, page.items).is_some() {
                return Err(HarvestError::Fixture(format!(
                    "page {} is listed twice",
                    page.page
                )));
            }
        }

        Ok(Self {
            pages,
            total_pages: file.total_pages.unwrap_or(UNKNOWN_TOTAL_PAGES),
            current_page: 0,
        })
    }

    /// Number of pages the fixture contains
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Navigator for FixtureNavigator {
    type Item = FixtureItem;

    async fn discover_total_pages(&mut self) -> NavResult<u32> {
        Ok(self.total_pages)
    }

    async fn go_to_page(&mut self, page: u32) -> NavResult<bool> {
        if self.pages.contains_key(&page) {
            self.current_page = page;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn current_page_number(&mut self) -> NavResult<u32> {
        Ok(self.current_page)
    }

    async fn list_items(&mut self) -> NavResult<Vec<FixtureItem>> {
        Ok(self
            .pages
            .get(&self.current_page)
            .cloned()
            .unwrap_or_default())
    }

    async fn extract_records(&mut self, item: &FixtureItem) -> NavResult<Vec<Record>> {
        if item.fail {
            return Err(NavigatorError::Extraction(format!(
                "fixture item '{}' is marked as failing",
                item.name
            )));
        }

        Ok(item
            .records
            .iter()
            .map(|fields| {
                fields
                    .iter()
                    .fold(Record::new(self.current_page), |record, (name, value)| {
                        record.field(name.as_str(), value_text(value))
                    })
            })
            .collect())
    }
}
