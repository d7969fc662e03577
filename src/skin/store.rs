use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lru::LruCache;

use crate::skin::artifact::Skin;
use crate::skin::codec::{self, SkinFiles};

pub const SKIN_FILE_NAME: &str = "skin.png";
pub const GEOMETRY_FILE_NAME: &str = "geometry.json";

const CACHE_CAPACITY: usize = 32;

/// Outcome of offering a wire artifact to the store.
#[derive(Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Written(PathBuf),
    /// Nothing to cache: no usable geometry, a persona model, or an
    /// artifact already present on disk.
    Skipped,
}

#[derive(Debug)]
pub enum SkinLoadError {
    NotFound(PathBuf),
    Decode(String),
}

impl std::fmt::Display for SkinLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkinLoadError::NotFound(path) => write!(f, "no stored skin at {}", path.display()),
            SkinLoadError::Decode(message) => write!(f, "stored skin unreadable: {}", message),
        }
    }
}

impl std::error::Error for SkinLoadError {}

/// On-disk artifact directory keyed by sanitized geometry identifier,
/// fronted by an LRU cache for the synthesis direction.
pub struct SkinStore {
    base: PathBuf,
    cache: Mutex<LruCache<String, Skin>>,
}

impl SkinStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap();
        Self {
            base: base.into(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory a dotted identifier maps to.
    pub fn artifact_dir(&self, dotted_id: &str) -> PathBuf {
        self.base.join(codec::sanitize_identifier(dotted_id))
    }

    /// Writes the on-disk representation of a wire artifact. Skip
    /// outcomes are normal and silent; only real encode or I/O failures
    /// surface as errors.
    ///
    /// The existence check is advisory: two writers racing on the same
    /// identifier can both pass it and both write. The second write
    /// replaces identical content, so the cache stays consistent.
    pub fn save(&self, skin: &Skin) -> Result<SaveOutcome, String> {
        let planned =
            codec::plan_files(skin).map_err(|err| format!("skin encode failed: {}", err))?;
        let Some(files) = planned else {
            return Ok(SaveOutcome::Skipped);
        };
        let dir = self.base.join(&files.rel_path);
        if dir.exists() {
            return Ok(SaveOutcome::Skipped);
        }
        self.write_files(&dir, &files)?;
        Ok(SaveOutcome::Written(dir))
    }

    pub(crate) fn write_files(&self, dir: &Path, files: &SkinFiles) -> Result<(), String> {
        fs::create_dir_all(dir)
            .map_err(|err| format!("skin dir create failed for {}: {}", dir.display(), err))?;
        let geometry_path = dir.join(GEOMETRY_FILE_NAME);
        fs::write(&geometry_path, &files.geometry).map_err(|err| {
            format!("geometry write failed for {}: {}", geometry_path.display(), err)
        })?;
        let png_path = dir.join(SKIN_FILE_NAME);
        fs::write(&png_path, &files.png)
            .map_err(|err| format!("skin write failed for {}: {}", png_path.display(), err))?;
        Ok(())
    }

    /// Synthesizes a wire artifact from a stored directory. The caller
    /// supplies the identity token; cached hits are re-stamped with it.
    pub fn load(&self, dotted_id: &str, skin_id: &str) -> Result<Skin, SkinLoadError> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(dotted_id) {
                let mut skin = hit.clone();
                skin.skin_id = skin_id.to_string();
                return Ok(skin);
            }
        }

        let dir = self.artifact_dir(dotted_id);
        let png = read_artifact_file(&dir.join(SKIN_FILE_NAME))?;
        let geometry = read_artifact_file(&dir.join(GEOMETRY_FILE_NAME))?;
        let skin = codec::skin_from_files(&png, &geometry, skin_id.to_string())
            .map_err(|err| SkinLoadError::Decode(err.to_string()))?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(dotted_id.to_string(), skin.clone());
        }
        Ok(skin)
    }
}

fn read_artifact_file(path: &Path) -> Result<Vec<u8>, SkinLoadError> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(SkinLoadError::NotFound(path.to_path_buf()))
        }
        Err(err) => Err(SkinLoadError::Decode(format!(
            "read failed for {}: {}",
            path.display(),
            err
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skin::artifact::DEFAULT_RESOURCE_PATCH;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    static STORE_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store() -> SkinStore {
        let dir = std::env::temp_dir().join(format!(
            "skinrelay-store-test-{}-{}",
            std::process::id(),
            STORE_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();
        SkinStore::new(dir)
    }

    fn cacheable_skin(identifier: &str) -> Skin {
        let geometry = format!(
            r#"{{"minecraft:geometry":[{{"description":{{"identifier":"{}"}}}}]}}"#,
            identifier
        );
        Skin::synthesized(
            "wire-id".to_string(),
            2,
            2,
            (0u8..16).collect(),
            geometry.into_bytes(),
        )
    }

    #[test]
    fn save_writes_both_files() {
        let store = temp_store();
        let outcome = store.save(&cacheable_skin("geometry.guild.knight")).unwrap();
        let dir = store.artifact_dir("geometry.guild.knight");
        assert_eq!(outcome, SaveOutcome::Written(dir.clone()));
        assert!(dir.join(SKIN_FILE_NAME).is_file());
        assert!(dir.join(GEOMETRY_FILE_NAME).is_file());
    }

    #[test]
    fn save_skips_existing_directory() {
        let store = temp_store();
        let skin = cacheable_skin("geometry.guild.mage");
        assert!(matches!(
            store.save(&skin).unwrap(),
            SaveOutcome::Written(_)
        ));
        assert_eq!(store.save(&skin).unwrap(), SaveOutcome::Skipped);
    }

    #[test]
    fn save_skips_uncacheable_artifacts() {
        let store = temp_store();
        let mut no_geometry = cacheable_skin("geometry.any");
        no_geometry.geometry = b"{}".to_vec();
        assert_eq!(store.save(&no_geometry).unwrap(), SaveOutcome::Skipped);

        let persona = cacheable_skin("geometry.persona.custom");
        assert_eq!(store.save(&persona).unwrap(), SaveOutcome::Skipped);
    }

    #[test]
    fn load_round_trips_written_artifact() {
        let store = temp_store();
        let skin = cacheable_skin("geometry.guild.druid");
        store.save(&skin).unwrap();

        let loaded = store.load("geometry.guild.druid", "session-skin-id").unwrap();
        assert_eq!(loaded.skin_id, "session-skin-id");
        assert_eq!(loaded.width, 2);
        assert_eq!(loaded.height, 2);
        assert_eq!(loaded.pixel_data, skin.pixel_data);
        assert_eq!(loaded.geometry, skin.geometry);
        assert_eq!(loaded.resource_patch, DEFAULT_RESOURCE_PATCH.as_bytes());
        assert!(loaded.trusted);
    }

    #[test]
    fn load_missing_artifact_is_not_found() {
        let store = temp_store();
        match store.load("geometry.never.stored", "id") {
            Err(SkinLoadError::NotFound(_)) => {}
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn load_serves_cached_artifact_after_files_vanish() {
        let store = temp_store();
        let skin = cacheable_skin("geometry.guild.paladin");
        store.save(&skin).unwrap();
        store.load("geometry.guild.paladin", "first").unwrap();

        fs::remove_dir_all(store.artifact_dir("geometry.guild.paladin")).unwrap();
        let cached = store.load("geometry.guild.paladin", "second").unwrap();
        assert_eq!(cached.skin_id, "second");
        assert_eq!(cached.pixel_data, skin.pixel_data);
    }

    // The exists-check in save() is advisory only. Both writers passing
    // it and writing concurrently must succeed; last writer wins.
    #[test]
    fn concurrent_unchecked_writes_tolerated() {
        let store = Arc::new(temp_store());
        let skin = cacheable_skin("geometry.guild.raced");
        let files = codec::plan_files(&skin).unwrap().unwrap();
        let dir = store.base().join(&files.rel_path);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let files = files.clone();
                    let dir = dir.clone();
                    scope.spawn(move || store.write_files(&dir, &files))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for result in results {
            assert!(result.is_ok());
        }
        assert!(dir.join(SKIN_FILE_NAME).is_file());
    }
}
