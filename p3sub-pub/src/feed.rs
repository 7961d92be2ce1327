use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use p3sub::coding::Timestamp;

/// One file in the feed directory at a point in time. Immutable snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedElement {
    /// Opaque handle used to read the element's bytes.
    pub path: PathBuf,
    /// Modification time, which is the element's position in the feed.
    pub mtime: Timestamp,
}

/// An element surrounded by its neighbors in feed order. This is the exact
/// shape the HTTP layer serializes into `prev`/`next` link headers.
pub type ElementWindow = (Option<FeedElement>, FeedElement, Option<FeedElement>);

/// Lazily cached, timestamp-ordered view of the feed directory.
///
/// The sequence is rebuilt from `read_dir` + `stat` on the first query
/// after an invalidation. Only regular files participate; ordering is
/// stable by `(mtime, name)` so ties are deterministic.
///
/// The cache sits behind its own short-lived mutex so readers (the GET
/// handler) and the watcher thread never contend with the delivery cycle's
/// registry lock.
pub struct FeedIndex {
    dir: PathBuf,
    elements: Mutex<Option<Arc<Vec<FeedElement>>>>,
}

impl FeedIndex {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            elements: Mutex::new(None),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Drops the cached sequence; the next query rematerializes it.
    pub fn invalidate(&self) {
        *self.elements.lock().unwrap() = None;
    }

    /// The newest element with its predecessor, or `None` on an empty feed.
    pub fn current(&self) -> io::Result<Option<ElementWindow>> {
        Ok(current_of(&self.snapshot()?))
    }

    /// The newest element with `mtime <= ts`, with its neighbors, or `None`
    /// if `ts` predates the whole feed.
    pub fn at(&self, ts: Timestamp) -> io::Result<Option<ElementWindow>> {
        Ok(at_of(&self.snapshot()?, ts))
    }

    /// All elements with `mtime > ts` in ascending order, preceded by the
    /// element they follow (if any).
    pub fn after(&self, ts: Timestamp) -> io::Result<(Option<FeedElement>, Vec<FeedElement>)> {
        Ok(after_of(&self.snapshot()?, ts))
    }

    /// Returns the cached sequence, materializing it if stale.
    fn snapshot(&self) -> io::Result<Arc<Vec<FeedElement>>> {
        let mut cache = self.elements.lock().unwrap();
        if let Some(elements) = &*cache {
            return Ok(elements.clone());
        }

        let elements = Arc::new(self.materialize()?);
        *cache = Some(elements.clone());
        Ok(elements)
    }

    fn materialize(&self) -> io::Result<Vec<FeedElement>> {
        let mut elements = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }

            elements.push(FeedElement {
                path: entry.path(),
                mtime: meta.modified()?.into(),
            });
        }

        elements.sort_by(|a, b| (a.mtime, &a.path).cmp(&(b.mtime, &b.path)));

        log::debug!("updated list of feed elements: {} entries", elements.len());
        for element in &elements {
            log::debug!("    {} at {}", element.path.display(), element.mtime);
        }

        Ok(elements)
    }
}

fn current_of(elements: &[FeedElement]) -> Option<ElementWindow> {
    let (last, rest) = elements.split_last()?;
    Some((rest.last().cloned(), last.clone(), None))
}

fn at_of(elements: &[FeedElement], ts: Timestamp) -> Option<ElementWindow> {
    // partition_point = number of elements with mtime <= ts
    let i = elements.partition_point(|el| el.mtime <= ts).checked_sub(1)?;
    Some((
        i.checked_sub(1).map(|p| elements[p].clone()),
        elements[i].clone(),
        elements.get(i + 1).cloned(),
    ))
}

fn after_of(elements: &[FeedElement], ts: Timestamp) -> (Option<FeedElement>, Vec<FeedElement>) {
    let i = elements.partition_point(|el| el.mtime <= ts);
    if i == elements.len() {
        return (None, Vec::new());
    }
    (
        i.checked_sub(1).map(|p| elements[p].clone()),
        elements[i..].to_vec(),
    )
}
