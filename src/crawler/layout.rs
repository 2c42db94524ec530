//! On-disk layout of the download tree:
//! `<root>/<keyword>/<site>_<index>.<ext>` plus a `<site>_done` marker per
//! engine once a keyword has at least one image from it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::crawler::keywords::Keyword;
use crate::crawler::site::Engine;

pub fn keyword_dir(root: &Path, keyword: &Keyword) -> PathBuf {
    root.join(keyword.dir_name())
}

pub fn image_path(dir: &Path, site_name: &str, index: usize, extension: &str) -> PathBuf {
    dir.join(format!("{}_{:04}.{}", site_name, index, extension))
}

pub fn marker_path(root: &Path, keyword: &Keyword, engine: Engine) -> PathBuf {
    keyword_dir(root, keyword).join(format!("{}_done", engine.name()))
}

pub fn is_done(root: &Path, keyword: &Keyword, engine: Engine) -> bool {
    marker_path(root, keyword, engine).exists()
}

/// Creates the empty completion marker.
pub fn mark_done(root: &Path, keyword: &Keyword, engine: Engine) -> io::Result<PathBuf> {
    let path = marker_path(root, keyword, engine);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, b"")?;
    Ok(path)
}
