//! Persistent virtual filesystem for the interpreter's working directory.
//!
//! The interpreter works in a scratch directory. Its contents survive the
//! session only through explicit syncs with persistent storage: one load at
//! mount time, then a store whenever the interpreter asks for it.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Populate the working directory from persistent storage.
    Load,
    /// Flush the working directory to persistent storage.
    Store,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncDirection::Load => write!(f, "load"),
            SyncDirection::Store => write!(f, "store"),
        }
    }
}

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("cannot create mount point {path}: {source}")]
    Mount {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("filesystem sync ({direction}) failed at {path}: {source}")]
    Sync {
        direction: SyncDirection,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("filesystem sync ({direction}) failed: {message}")]
    Backend {
        direction: SyncDirection,
        message: String,
    },
}

pub trait PersistentFs {
    /// Prepare the mount and populate it from storage.
    fn mount(&mut self) -> Result<(), VfsError>;

    fn sync(&mut self, direction: SyncDirection) -> Result<(), VfsError>;
}

impl<F: PersistentFs + ?Sized> PersistentFs for Box<F> {
    fn mount(&mut self) -> Result<(), VfsError> {
        (**self).mount()
    }

    fn sync(&mut self, direction: SyncDirection) -> Result<(), VfsError> {
        (**self).sync(direction)
    }
}

/// Working directory mirrored to and from a persistent directory.
#[derive(Debug, Clone)]
pub struct MirrorDir {
    working: PathBuf,
    persistent: PathBuf,
}

impl MirrorDir {
    pub fn new(working: impl Into<PathBuf>, persistent: impl Into<PathBuf>) -> Self {
        MirrorDir {
            working: working.into(),
            persistent: persistent.into(),
        }
    }

    pub fn working(&self) -> &Path {
        &self.working
    }

    pub fn persistent(&self) -> &Path {
        &self.persistent
    }
}

impl PersistentFs for MirrorDir {
    fn mount(&mut self) -> Result<(), VfsError> {
        for path in [&self.working, &self.persistent] {
            fs::create_dir_all(path).map_err(|source| VfsError::Mount {
                path: path.clone(),
                source,
            })?;
        }
        self.sync(SyncDirection::Load)
    }

    fn sync(&mut self, direction: SyncDirection) -> Result<(), VfsError> {
        let manifest = self.working.join(MANIFEST);
        let root = Path::new("");
        debug!(
            %direction,
            working = %self.working.display(),
            persistent = %self.persistent.display(),
            "filesystem sync"
        );

        let synced = match direction {
            SyncDirection::Load => read_manifest(&manifest).and_then(|stored| {
                let removable = |rel: &Path| stored.contains(rel);
                mirror(&self.persistent, &self.working, root, &removable)
            }),
            SyncDirection::Store => mirror(&self.working, &self.persistent, root, &|_| true),
        };
        synced
            .and_then(|()| write_manifest(&self.persistent, &manifest))
            .map_err(|(path, source)| VfsError::Sync {
                direction,
                path,
                source,
            })
    }
}

/// Lists, inside the working directory, what storage held after the last
/// sync. A load only removes working entries listed here, anything else
/// in the working directory was never ours.
const MANIFEST: &str = ".fire-term-manifest";

type MirrorResult<T = ()> = Result<T, (PathBuf, io::Error)>;

fn at(path: &Path) -> impl FnOnce(io::Error) -> (PathBuf, io::Error) + '_ {
    move |e| (path.to_path_buf(), e)
}

fn read_manifest(path: &Path) -> MirrorResult<HashSet<PathBuf>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text.lines().filter(|l| !l.is_empty()).map(PathBuf::from).collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(e) => Err((path.to_path_buf(), e)),
    }
}

fn write_manifest(persistent: &Path, path: &Path) -> MirrorResult {
    let mut stored = Vec::new();
    list(persistent, Path::new(""), &mut stored)?;
    let text: String = stored
        .iter()
        .map(|rel| format!("{}\n", rel.display()))
        .collect();
    fs::write(path, text).map_err(at(path))
}

fn list(root: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> MirrorResult {
    let dir = root.join(rel);
    for entry in fs::read_dir(&dir).map_err(at(&dir))? {
        let entry = entry.map_err(at(&dir))?;
        let rel = rel.join(entry.file_name());
        if entry.file_type().map_err(at(&dir))?.is_dir() {
            list(root, &rel, out)?;
        }
        out.push(rel);
    }
    Ok(())
}

/// Make `to` a copy of `from`: copy every entry over and remove entries that
/// no longer exist in `from`, as far as `removable` allows. `rel` is the path
/// of `to` below the top of the mirror.
fn mirror(from: &Path, to: &Path, rel: &Path, removable: &dyn Fn(&Path) -> bool) -> MirrorResult {
    // an unreadable source must not cost the target anything
    let mut sources = Vec::new();
    for entry in fs::read_dir(from).map_err(at(from))? {
        let entry = entry.map_err(at(from))?;
        if rel.join(entry.file_name()) != Path::new(MANIFEST) {
            sources.push(entry);
        }
    }
    let names: HashSet<OsString> = sources.iter().map(|e| e.file_name()).collect();

    if !to.is_dir() {
        if to.exists() {
            if !removable(rel) {
                return Ok(());
            }
            fs::remove_file(to).map_err(at(to))?;
        }
        fs::create_dir_all(to).map_err(at(to))?;
    }

    for entry in fs::read_dir(to).map_err(at(to))? {
        let entry = entry.map_err(at(to))?;
        let name = entry.file_name();
        let entry_rel = rel.join(&name);
        if names.contains(&name) || entry_rel == Path::new(MANIFEST) || !removable(&entry_rel) {
            continue;
        }
        let target = entry.path();
        let removed = if entry.file_type().map_err(at(&target))?.is_dir() {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        removed.map_err(at(&target))?;
    }

    for entry in sources {
        let source = entry.path();
        let entry_rel = rel.join(entry.file_name());
        let target = to.join(entry.file_name());
        if fs::metadata(&source).map_err(at(&source))?.is_dir() {
            mirror(&source, &target, &entry_rel, removable)?;
        } else {
            if target.is_dir() {
                if !removable(&entry_rel) {
                    continue;
                }
                fs::remove_dir_all(&target).map_err(at(&target))?;
            }
            fs::copy(&source, &target).map_err(at(&source))?;
        }
    }

    Ok(())
}
