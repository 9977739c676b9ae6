//! The application directory: scraping the portal's application list and
//! keeping a local copy of it.
//!
//! The on-disk file is a JSON object keyed by the string form of each
//! application id. It is rewritten whole on every refresh that returns rows
//! and deleted whenever the session is invalidated.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::cookies::remove_if_present;
use crate::fetcher::PageFetcher;
use crate::landmarks::{self, ROW_CELL_TAG, ROW_ID_CELL, ROW_NAME_CELL};
use crate::navigator::Document;
use crate::session::PortalSession;
use crate::types::{ApplicationRecord, PortalError, PortalResult};

/// Outcome of reading the directory cache from disk.
#[derive(Debug)]
pub enum DirectoryLoad {
    Loaded(BTreeMap<u64, ApplicationRecord>),
    Missing,
    Corrupt(String),
}

impl DirectoryLoad {
    pub fn into_records(self) -> BTreeMap<u64, ApplicationRecord> {
        match self {
            DirectoryLoad::Loaded(records) => records,
            DirectoryLoad::Missing | DirectoryLoad::Corrupt(_) => BTreeMap::new(),
        }
    }
}

/// File-backed storage for the application directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    path: PathBuf,
}

impl DirectoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the cached directory. Never fails; see [`DirectoryLoad`].
    pub fn load(&self) -> DirectoryLoad {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return DirectoryLoad::Missing,
            Err(e) => return DirectoryLoad::Corrupt(e.to_string()),
        };
        match serde_json::from_str::<BTreeMap<String, ApplicationRecord>>(&text) {
            Ok(by_key) => DirectoryLoad::Loaded(
                by_key
                    .into_values()
                    .map(|record| (record.id, record))
                    .collect(),
            ),
            Err(e) => DirectoryLoad::Corrupt(e.to_string()),
        }
    }

    /// Replace the file with `records`.
    ///
    /// The old file is removed first and the new content is written to a
    /// sibling temp file that is renamed into place, so the path never holds
    /// a half-written directory.
    pub fn replace(&self, records: &BTreeMap<u64, ApplicationRecord>) -> PortalResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let by_key: BTreeMap<String, &ApplicationRecord> = records
            .iter()
            .map(|(id, record)| (id.to_string(), record))
            .collect();
        let json = serde_json::to_string_pretty(&by_key)?;

        let tmp = self.tmp_path();
        remove_if_present(&self.path)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn delete(&self) -> PortalResult<()> {
        remove_if_present(&self.path)?;
        remove_if_present(&self.tmp_path())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

/// What a refresh did to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The listing had rows; memory and disk now hold exactly these.
    Replaced(usize),
    /// The listing had no rows; nothing was touched.
    EmptyListing,
}

/// The portal's applications, keyed by id.
#[derive(Debug)]
pub struct ApplicationDirectory {
    records: BTreeMap<u64, ApplicationRecord>,
    store: DirectoryStore,
}

impl ApplicationDirectory {
    /// An empty directory backed by `store`, ignoring what is on disk.
    pub fn new(store: DirectoryStore) -> Self {
        Self {
            records: BTreeMap::new(),
            store,
        }
    }

    /// A directory seeded from the cache file. A missing or unreadable file
    /// yields an empty directory.
    pub fn open(store: DirectoryStore) -> Self {
        let records = match store.load() {
            DirectoryLoad::Loaded(records) => {
                tracing::debug!(
                    "Loaded {} applications from {}",
                    records.len(),
                    store.path().display()
                );
                records
            }
            DirectoryLoad::Missing => BTreeMap::new(),
            DirectoryLoad::Corrupt(reason) => {
                tracing::warn!(
                    "Ignoring unreadable directory cache {}: {reason}",
                    store.path().display()
                );
                BTreeMap::new()
            }
        };
        Self { records, store }
    }

    pub fn records(&self) -> &BTreeMap<u64, ApplicationRecord> {
        &self.records
    }

    pub fn get(&self, id: u64) -> Option<&ApplicationRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn store(&self) -> &DirectoryStore {
        &self.store
    }

    /// Fetch the application list and, if it has rows, replace the directory
    /// in memory and on disk.
    ///
    /// Any malformed row fails the whole refresh; a partial directory is
    /// never stored.
    pub fn refresh<F: PageFetcher>(
        &mut self,
        session: &mut PortalSession<F>,
    ) -> PortalResult<RefreshOutcome> {
        let path = resolve_listing_endpoint(session)?;
        let page = session.fetch_authenticated(&path)?;
        if !page.is_success() {
            return Err(PortalError::FetchFailed {
                path,
                status: page.status,
            });
        }

        let rows = parse_listing(&page.body)?;
        if rows.is_empty() {
            tracing::info!(
                "Application list is empty; keeping {} cached applications",
                self.records.len()
            );
            return Ok(RefreshOutcome::EmptyListing);
        }

        self.records = rows.into_iter().map(|record| (record.id, record)).collect();
        self.store.replace(&self.records)?;
        tracing::info!(
            "Stored {} applications in {}",
            self.records.len(),
            self.store.path().display()
        );
        Ok(RefreshOutcome::Replaced(self.records.len()))
    }
}

/// Path of the full application list, scraped once per process from the
/// manage-applications page and remembered on the session.
pub fn resolve_listing_endpoint<F: PageFetcher>(
    session: &mut PortalSession<F>,
) -> PortalResult<String> {
    let endpoints = session.endpoints().ok_or(PortalError::NotAuthenticated)?;
    if let Some(path) = &endpoints.application_list_path {
        return Ok(path.clone());
    }

    let manage_apps_path = endpoints.manage_apps_path.clone();
    let page = session.fetch_authenticated(&manage_apps_path)?;
    if !page.is_success() {
        return Err(PortalError::FetchFailed {
            path: manage_apps_path,
            status: page.status,
        });
    }

    let path = {
        let document = Document::parse(&page.body);
        let link = document.first(&landmarks::SEE_ALL_LINK)?.ok_or_else(|| {
            PortalError::structure(
                landmarks::SEE_ALL_LINK.name,
                "no 'See All' link on the manage applications page",
            )
        })?;
        link.require_attr(&landmarks::SEE_ALL_LINK, "href")?
            .to_string()
    };

    session.record_listing_path(path.clone())?;
    Ok(path)
}

/// Extract every application row from a listing page.
pub fn parse_listing(body: &str) -> PortalResult<Vec<ApplicationRecord>> {
    let document = Document::parse(body);
    let rows = document.query(&landmarks::RESULT_ROWS)?;

    let mut records = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let cells = row.children_named(ROW_CELL_TAG);

        let anchor = cells
            .get(ROW_NAME_CELL)
            .map(|cell| cell.query(&landmarks::ROW_NAME_LINK))
            .transpose()?
            .and_then(|links| links.into_iter().next())
            .ok_or_else(|| {
                PortalError::structure(
                    landmarks::ROW_NAME_LINK.name,
                    format!("row {index} has no name link"),
                )
            })?;
        let name = anchor.text();
        if name.is_empty() {
            return Err(PortalError::structure(
                landmarks::ROW_NAME_LINK.name,
                format!("row {index} has an empty name"),
            ));
        }
        let detail_path = anchor
            .require_attr(&landmarks::ROW_NAME_LINK, "href")?
            .to_string();

        let id_text = cells
            .get(ROW_ID_CELL)
            .map(|cell| cell.query(&landmarks::ROW_ID_TEXT))
            .transpose()?
            .and_then(|paragraphs| paragraphs.into_iter().next())
            .map(|p| p.text())
            .ok_or_else(|| {
                PortalError::structure(
                    landmarks::ROW_ID_TEXT.name,
                    format!("row {index} has no id cell"),
                )
            })?;
        let id = id_text.parse::<u64>().map_err(|_| {
            PortalError::structure(
                landmarks::ROW_ID_TEXT.name,
                format!("row {index}: '{id_text}' is not a numeric id"),
            )
        })?;

        records.push(ApplicationRecord {
            id,
            name,
            detail_path,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(rows: &str) -> String {
        format!(
            r#"<html><body>
               <div id="software-result-list"><div class="resultList"><table>
                 <tr class="column-headers"><td>Name</td><td>Type</td><td>Version</td><td>Status</td><td>Apple ID</td></tr>
                 {rows}
               </table></div></div>
               </body></html>"#
        )
    }

    fn row(name: &str, link: &str, id: &str) -> String {
        format!(
            r#"<tr><td><div><a href="{link}"> {name} </a></div></td><td>iOS App</td><td>1.0</td>
               <td>Ready for Sale</td><td><p>{id}</p></td></tr>"#
        )
    }

    #[test]
    fn test_parse_listing_skips_header_row() {
        let body = listing(&format!(
            "{}{}",
            row("Weather Pro", "/woa/wo/app/1", "412345678"),
            row("Notes Lite", "/woa/wo/app/2", " 498765432 ")
        ));
        let records = parse_listing(&body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Weather Pro");
        assert_eq!(records[0].detail_path, "/woa/wo/app/1");
        assert_eq!(records[1].id, 498_765_432);
    }

    #[test]
    fn test_parse_listing_rejects_non_numeric_id() {
        let body = listing(&row("Weather Pro", "/woa/wo/app/1", "pending"));
        let err = parse_listing(&body).unwrap_err();
        assert!(matches!(
            err,
            PortalError::PageStructureChanged { landmark: "row-id-text", .. }
        ));
    }

    #[test]
    fn test_parse_listing_rejects_short_row() {
        let body = listing(r#"<tr><td><a href="/x">Short</a></td><td>iOS App</td></tr>"#);
        assert!(parse_listing(&body).unwrap_err().is_structural());
    }

    #[test]
    fn test_parse_listing_rejects_missing_anchor() {
        let body = listing(
            r#"<tr><td>No link</td><td></td><td></td><td></td><td><p>1</p></td></tr>"#,
        );
        let err = parse_listing(&body).unwrap_err();
        assert!(matches!(
            err,
            PortalError::PageStructureChanged { landmark: "row-name-link", .. }
        ));
    }

    #[test]
    fn test_parse_listing_outside_result_list_is_empty() {
        let body = format!("<table>{}</table>", row("Stray", "/x", "1"));
        assert!(parse_listing(&body).unwrap().is_empty());
    }

    #[test]
    fn test_store_replace_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("apps.json"));
        let mut records = BTreeMap::new();
        records.insert(
            7,
            ApplicationRecord {
                id: 7,
                name: "Seven".into(),
                detail_path: "/app/7".into(),
            },
        );
        store.replace(&records).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["7"]["link"], "/app/7");
        assert_eq!(raw["7"]["id"], 7);

        assert_eq!(store.load().into_records(), records);
        assert!(!dir.path().join("apps.json.tmp").exists());
    }

    #[test]
    fn test_store_load_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("apps.json"));
        assert!(matches!(store.load(), DirectoryLoad::Missing));

        std::fs::write(store.path(), "{ truncated").unwrap();
        assert!(matches!(store.load(), DirectoryLoad::Corrupt(_)));

        let directory = ApplicationDirectory::open(store.clone());
        assert!(directory.is_empty());

        store.delete().unwrap();
        store.delete().unwrap();
        assert!(!store.exists());
    }
}
