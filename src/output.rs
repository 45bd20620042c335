//! Persistence of matched facts.
//!
//! Files are first written next to their destination as `.<name>.tmp` and
//! then renamed over it, so readers never observe a half-written feed.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use prost::Message;
use tracing::debug;

use crate::fact::FactContainer;

/// Which files one cycle writes.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    /// GTFS-Realtime protobuf destination.
    pub path: PathBuf,
    /// Also write the JSON rendering next to `path`, extension swapped to `.json`.
    pub json: bool,
    /// Indent the JSON rendering.
    pub readable: bool,
}

impl OutputTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            json: false,
            readable: false,
        }
    }

    pub fn json_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }

    pub fn write(&self, container: &FactContainer) -> Result<()> {
        write_feed(&self.path, container)?;
        if self.json {
            write_json(&self.json_path(), container, self.readable)?;
        }
        Ok(())
    }
}

/// Writes the container as a GTFS-Realtime `FeedMessage`.
pub fn write_feed(path: &Path, container: &FactContainer) -> Result<()> {
    let bytes = container.to_feed_message().encode_to_vec();
    write_atomic(path, |w| Ok(w.write_all(&bytes)?))
}

/// Writes the JSON rendering of the container.
pub fn write_json(path: &Path, container: &FactContainer, readable: bool) -> Result<()> {
    let value = container.to_json();
    write_atomic(path, |w| {
        if readable {
            serde_json::to_writer_pretty(&mut *w, &value)?;
        } else {
            serde_json::to_writer(&mut *w, &value)?;
        }
        w.write_all(b"\n")?;
        Ok(())
    })
}

fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<fs::File>) -> Result<()>,
{
    let tmp = temp_path(path);
    debug!(path = %path.display(), tmp = %tmp.display(), "Writing output");

    let file = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let mut writer = BufWriter::new(file);
    fill(&mut writer).with_context(|| format!("writing {}", tmp.display()))?;
    writer
        .flush()
        .with_context(|| format!("writing {}", tmp.display()))?;
    drop(writer);

    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}
