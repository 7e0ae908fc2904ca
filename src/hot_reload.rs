// Shader hot-reload
//
// Watches the directories holding the compiled shaders and remembers which
// watched files changed. The render loop polls `take_changed` once per frame.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct ShaderWatcher {
    _watcher: RecommendedWatcher,
    changed: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl ShaderWatcher {
    pub fn new(shaders: &[&Path]) -> Result<Self> {
        let watched = shaders
            .iter()
            .map(|path| {
                path.canonicalize()
                    .with_context(|| format!("Cannot watch missing shader {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;

        let changed = Arc::new(Mutex::new(BTreeSet::new()));

        let sink = changed.clone();
        let files = watched.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !is_content_change(&event.kind) {
                    return;
                }
                let mut sink = sink.lock();
                for path in event.paths.iter().filter(|p| is_watched(&files, p)) {
                    sink.insert(path.clone());
                }
            }
            Err(e) => log::warn!("Shader watcher error: {}", e),
        })
        .context("Failed to create shader watcher")?;

        for dir in watched_dirs(&watched) {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {}", dir.display()))?;
            log::info!("Watching {} for shader changes", dir.display());
        }

        Ok(Self {
            _watcher: watcher,
            changed,
        })
    }

    /// Files changed since the last call
    pub fn take_changed(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.changed.lock()).into_iter().collect()
    }
}

/// Editors and glslc either rewrite in place or replace the file
fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

pub fn is_watched(watched: &[PathBuf], changed: &Path) -> bool {
    watched.iter().any(|w| w == changed)
}

/// Parent directories of `files`, each listed once
pub fn watched_dirs(files: &[PathBuf]) -> BTreeSet<PathBuf> {
    files
        .iter()
        .filter_map(|f| f.parent())
        .map(Path::to_path_buf)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

    #[test]
    fn only_exact_paths_match() {
        let watched = vec![
            PathBuf::from("/game/dat/shaders/default.vert.glsl.spv"),
            PathBuf::from("/game/dat/shaders/default.frag.glsl.spv"),
        ];
        assert!(is_watched(&watched, Path::new("/game/dat/shaders/default.frag.glsl.spv")));
        assert!(!is_watched(&watched, Path::new("/game/dat/shaders/default.frag.glsl")));
        assert!(!is_watched(&watched, Path::new("/other/default.vert.glsl.spv")));
    }

    #[test]
    fn shaders_in_one_directory_share_a_watch() {
        let files = vec![
            PathBuf::from("/game/dat/shaders/default.vert.glsl.spv"),
            PathBuf::from("/game/dat/shaders/default.frag.glsl.spv"),
            PathBuf::from("/game/mods/custom.frag.spv"),
        ];
        let dirs: Vec<_> = watched_dirs(&files).into_iter().collect();
        assert_eq!(
            dirs,
            vec![PathBuf::from("/game/dat/shaders"), PathBuf::from("/game/mods")]
        );
    }

    #[test]
    fn writes_and_creates_count_as_changes() {
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(!is_content_change(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn missing_shader_cannot_be_watched() {
        assert!(ShaderWatcher::new(&[Path::new("dat/shaders/missing.spv")]).is_err());
    }
}
