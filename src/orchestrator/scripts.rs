use crate::clock::Clock;
use crate::error::{FleetError, Result};
use crate::store::FleetStore;
use crate::types::{
    PlatformFamily, PlatformIdentity, Script, ScriptId, ScriptValidation, DEFAULT_OS_TYPE_MAP,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

/// Family whose scripts serve any platform without a dedicated one.
pub const GENERIC_FAMILY: &str = "linux";

const SCRIPTS_COLLECTION: &str = "scripts";

/// New script upload.
#[derive(Debug, Clone)]
pub struct ScriptUpload {
    pub name: String,
    pub platform_family: PlatformFamily,
    pub os_version: Option<String>,
    pub file_name: String,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct ScriptCatalog {
    store: Arc<dyn FleetStore>,
    clock: Arc<dyn Clock>,
}

impl ScriptCatalog {
    #[must_use]
    pub fn new(store: Arc<dyn FleetStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Pick the script for `platform`: exact version first, then the
    /// family's generic script, then a generic `linux` script.
    ///
    /// # Errors
    /// `ScriptNotFound` when nothing matches.
    pub async fn resolve(&self, platform: &PlatformIdentity) -> Result<Script> {
        let scripts = self.store.scripts_for_family(&platform.family).await?;

        let exact = platform.os_version.as_deref().and_then(|version| {
            scripts
                .iter()
                .find(|script| script.os_version.as_deref() == Some(version))
        });
        let generic = || scripts.iter().find(|script| script.os_version.is_none());

        if let Some(script) = exact.or_else(generic) {
            return Ok(script.clone());
        }

        let fallback_family = PlatformFamily::new(GENERIC_FAMILY);
        if platform.family == fallback_family {
            return Err(FleetError::ScriptNotFound);
        }
        self.store
            .scripts_for_family(&fallback_family)
            .await?
            .into_iter()
            .next()
            .ok_or(FleetError::ScriptNotFound)
    }

    /// What an agent checks a downloaded script against.
    ///
    /// # Errors
    /// `ScriptNotFound` for an unknown id.
    pub async fn validate(&self, script_id: &ScriptId) -> Result<ScriptValidation> {
        self.store
            .get_script(script_id)
            .await?
            .map(|script| ScriptValidation {
                id: script.id,
                name: script.name,
                sha256: script.sha256,
            })
            .ok_or(FleetError::ScriptNotFound)
    }

    /// Store a new script, computing its digest and download reference.
    ///
    /// # Errors
    /// `Validation` for a blank name or file name, or any store failure.
    pub async fn register(&self, upload: ScriptUpload) -> Result<Script> {
        let name = upload.name.trim().to_string();
        let file_name = upload.file_name.trim().to_string();
        if name.is_empty() {
            return Err(FleetError::Validation("name is required".to_string()));
        }
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(FleetError::Validation(
                "file name must be a plain file name".to_string(),
            ));
        }

        let id = ScriptId::generate();
        let script = Script {
            url: format!("/api/files/{SCRIPTS_COLLECTION}/{id}/{file_name}"),
            sha256: sha256_hex(&upload.body),
            id,
            name,
            platform_family: upload.platform_family,
            os_version: upload.os_version.filter(|v| !v.trim().is_empty()),
            file_name,
            created_at: self.clock.now(),
        };
        self.store.insert_script(script.clone()).await?;
        info!(
            script_id = %script.id,
            family = %script.platform_family,
            sha256 = %script.sha256,
            "Registered patch script"
        );
        Ok(script)
    }

    /// Write the built-in OS-type map. Existing entries are overwritten
    /// with the same values, so calling this on every start is harmless.
    ///
    /// # Errors
    /// Returns any store failure.
    pub async fn seed_default_os_types(&self) -> Result<usize> {
        for (os_type, family) in DEFAULT_OS_TYPE_MAP {
            self.store
                .map_os_type((*os_type).to_string(), PlatformFamily::new(family))
                .await?;
        }
        Ok(DEFAULT_OS_TYPE_MAP.len())
    }
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::{sha256_hex, ScriptCatalog, ScriptUpload};
    use crate::clock::ManualClock;
    use crate::error::FleetError;
    use crate::store::{CatalogStore, MemoryStore};
    use crate::types::{PlatformFamily, PlatformIdentity, ScriptId};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn upload(family: &str, version: Option<&str>, body: &str) -> ScriptUpload {
        ScriptUpload {
            name: format!("{family}-{}", version.unwrap_or("any")),
            platform_family: PlatformFamily::new(family),
            os_version: version.map(str::to_string),
            file_name: "patch.sh".into(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn catalog() -> (ScriptCatalog, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (ScriptCatalog::new(store.clone(), clock.clone()), store, clock)
    }

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn register_sets_digest_and_url() {
        let (catalog, _, _) = catalog();
        let script = catalog.register(upload("debian", None, "abc")).await.unwrap();
        assert_eq!(script.sha256, sha256_hex(b"abc"));
        assert_eq!(script.url, format!("/api/files/scripts/{}/patch.sh", script.id));

        let validation = catalog.validate(&script.id).await.unwrap();
        assert_eq!(validation.sha256, script.sha256);
        assert!(matches!(
            catalog.validate(&ScriptId::new("missing")).await,
            Err(FleetError::ScriptNotFound)
        ));
    }

    #[tokio::test]
    async fn exact_version_beats_generic() {
        let (catalog, _, clock) = catalog();
        let generic = catalog.register(upload("debian", None, "g")).await.unwrap();
        clock.advance(Duration::seconds(1));
        let bookworm = catalog.register(upload("debian", Some("12"), "b")).await.unwrap();

        let family = PlatformFamily::new("debian");
        let exact = catalog
            .resolve(&PlatformIdentity::new(family.clone(), Some("12".into())))
            .await
            .unwrap();
        assert_eq!(exact.id, bookworm.id);

        let other = catalog
            .resolve(&PlatformIdentity::new(family, Some("11".into())))
            .await
            .unwrap();
        assert_eq!(other.id, generic.id);
    }

    #[tokio::test]
    async fn linux_script_is_the_last_resort() {
        let (catalog, _, _) = catalog();
        let platform = PlatformIdentity::new(PlatformFamily::new("arch"), None);
        assert!(matches!(
            catalog.resolve(&platform).await,
            Err(FleetError::ScriptNotFound)
        ));

        let linux = catalog.register(upload("linux", None, "l")).await.unwrap();
        assert_eq!(catalog.resolve(&platform).await.unwrap().id, linux.id);
    }

    #[tokio::test]
    async fn seeding_maps_ubuntu_to_debian() {
        let (catalog, store, _) = catalog();
        catalog.seed_default_os_types().await.unwrap();
        assert_eq!(
            store.family_for_os_type(" Ubuntu ").await.unwrap(),
            Some(PlatformFamily::new("debian"))
        );
        assert_eq!(store.family_for_os_type("templeos").await.unwrap(), None);
    }
}
