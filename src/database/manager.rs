//! Database manager - owns the canonical artifact and the live reader handle

use crate::config::AppConfig;
use crate::database::freshness;
use crate::database::geoip2::GeoIP2Loader;
use crate::database::{
    DatabaseArtifact, DatabaseLoader, DownloadPolicy, GeoDatabase, LifecycleState, Location,
};
use crate::download::{self, Downloader, StagedArtifact};
use crate::error::{GeoIpError, Result};
use crate::utils::path;
use arc_swap::{ArcSwap, ArcSwapOption};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// An open reader bound to one artifact generation
pub struct ReaderHandle {
    database: Box<dyn GeoDatabase>,
    artifact: DatabaseArtifact,
    opened_at: SystemTime,
}

impl ReaderHandle {
    pub fn artifact(&self) -> &DatabaseArtifact {
        &self.artifact
    }

    pub fn opened_at(&self) -> SystemTime {
        self.opened_at
    }

    pub fn name(&self) -> &str {
        self.database.name()
    }

    /// Query the database for the variant this handle was opened for
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<Location>> {
        self.database.lookup(ip, self.artifact.variant)
    }
}

/// What a successful [`DatabaseManager::ensure_ready`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// Reader already open on the current artifact, nothing to do
    AlreadyLoaded,
    /// Existing local artifact was fresh and has been opened
    Opened,
    /// A new artifact was downloaded and installed
    Installed,
}

/// Database manager handles fetching, installing and opening the database
///
/// The manager is the only writer of the canonical artifact and of the
/// reader handle. Lookups take a snapshot of the handle per call and never
/// observe a half-installed generation.
///
/// # Thread Safety
///
/// DatabaseManager is thread-safe and can be shared across tasks using Arc.
pub struct DatabaseManager {
    data_dir: PathBuf,
    policy: ArcSwap<DownloadPolicy>,
    downloader: Downloader,
    loader: Arc<dyn DatabaseLoader>,
    reader: ArcSwapOption<ReaderHandle>,
    state: RwLock<LifecycleState>,
    /// Serialises refresh cycles so there is a single writer
    refresh_lock: tokio::sync::Mutex<()>,
}

impl DatabaseManager {
    /// Create a new manager storing its artifact in `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>, policy: DownloadPolicy, downloader: Downloader) -> Self {
        Self {
            data_dir: data_dir.into(),
            policy: ArcSwap::from_pointee(policy),
            downloader,
            loader: Arc::new(GeoIP2Loader),
            reader: ArcSwapOption::empty(),
            state: RwLock::new(LifecycleState::Absent),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a manager from application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let data_dir = config.data_dir()?;
        path::ensure_dir(&data_dir)?;

        let downloader = Downloader::with_timeout(config.database.download_timeout())?;
        Ok(Self::new(data_dir, config.database.download_policy(), downloader))
    }

    /// Replace the loader used to open artifacts
    pub fn with_loader(mut self, loader: Arc<dyn DatabaseLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Policy the next refresh cycle will use
    pub fn policy(&self) -> Arc<DownloadPolicy> {
        self.policy.load_full()
    }

    /// Install a reloaded policy; cycles already running keep their snapshot
    pub fn set_policy(&self, policy: DownloadPolicy) {
        self.policy.store(Arc::new(policy));
    }

    /// Canonical artifact for the current policy
    pub fn artifact(&self) -> DatabaseArtifact {
        DatabaseArtifact::new(&self.data_dir, self.policy.load().variant)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(LifecycleState::Unavailable)
    }

    fn set_state(&self, state: LifecycleState) {
        if let Ok(mut current) = self.state.write() {
            log::debug!("GeoIP database state: {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    /// The active reader, or `None` if no artifact was ever installed
    pub fn current_reader(&self) -> Option<Arc<ReaderHandle>> {
        self.reader.load_full()
    }

    /// Make sure a fresh artifact exists and a reader is open on it.
    ///
    /// Downloads only when the freshness policy asks for it. On failure the
    /// previous artifact and reader stay in place; the manager only becomes
    /// [`LifecycleState::Unavailable`] if it has no reader at all.
    pub async fn ensure_ready(&self) -> Result<ReadyOutcome> {
        let _guard = self.refresh_lock.lock().await;
        let policy = self.policy.load_full();
        let artifact = DatabaseArtifact::new(&self.data_dir, policy.variant);

        let refresh = match freshness::needs_refresh(
            &artifact.path,
            artifact.modified(),
            SystemTime::now(),
            &policy,
        ) {
            Ok(refresh) => refresh,
            Err(e) => {
                log::error!("{}", e);
                self.settle();
                return Err(e);
            }
        };

        if refresh {
            return self.refresh_locked(&policy, &artifact).await;
        }

        if self.reader_bound_to(&artifact) {
            log::debug!("GeoIP database {:?} is up to date", artifact.path);
            return Ok(ReadyOutcome::AlreadyLoaded);
        }

        match self.open_and_publish(&artifact).await {
            Ok(()) => Ok(ReadyOutcome::Opened),
            Err(e) => {
                log::error!("{}", e);
                self.settle();
                Err(e)
            }
        }
    }

    /// Download and install a new artifact regardless of freshness
    pub async fn refresh(&self) -> Result<ReadyOutcome> {
        let _guard = self.refresh_lock.lock().await;
        let policy = self.policy.load_full();
        let artifact = DatabaseArtifact::new(&self.data_dir, policy.variant);
        self.refresh_locked(&policy, &artifact).await
    }

    /// Run [`DatabaseManager::ensure_ready`] as a background one-shot task
    pub fn spawn_ensure_ready(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<ReadyOutcome>> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.ensure_ready().await })
    }

    /// Fetch and unwrap the artifact for the current policy without opening it
    pub async fn download_database(&self) -> Result<DatabaseArtifact> {
        let _guard = self.refresh_lock.lock().await;
        let policy = self.policy.load_full();
        let artifact = DatabaseArtifact::new(&self.data_dir, policy.variant);

        let result = match self.download_locked(&policy).await {
            Ok(staged) => self.commit(staged, &artifact),
            Err(e) => Err(e),
        };
        if result.is_err() || self.current_reader().is_some() {
            self.settle();
        }
        result.map(|()| artifact)
    }

    async fn refresh_locked(&self, policy: &DownloadPolicy, artifact: &DatabaseArtifact) -> Result<ReadyOutcome> {
        match self.install_locked(policy, artifact).await {
            Ok(()) => Ok(ReadyOutcome::Installed),
            Err(e) => {
                if self.current_reader().is_none() && artifact.exists() {
                    match self.open_and_publish(artifact).await {
                        Ok(()) => log::warn!("Using stale GeoIP database {:?}", artifact.path),
                        Err(open_err) => log::error!("{}", open_err),
                    }
                }
                self.settle();
                Err(e)
            }
        }
    }

    /// Download, open the staged copy, then replace the artifact and publish.
    ///
    /// A staged copy that fails to open is dropped and the canonical file
    /// keeps its previous contents.
    async fn install_locked(&self, policy: &DownloadPolicy, artifact: &DatabaseArtifact) -> Result<()> {
        let staged = self.download_locked(policy).await?;

        let database = self
            .open_database(staged.path())
            .await
            .inspect_err(|e| log::error!("Downloaded GeoIP database is unusable: {}", e))?;

        self.commit(staged, artifact)?;
        self.publish(artifact, database);
        Ok(())
    }

    async fn download_locked(&self, policy: &DownloadPolicy) -> Result<StagedArtifact> {
        self.try_download(policy)
            .await
            .inspect_err(|e| log::error!("{}", e))
    }

    async fn try_download(&self, policy: &DownloadPolicy) -> Result<StagedArtifact> {
        let url = policy.resolve_url()?;

        log::info!("Downloading GeoIP database... This may take a while depending on your Internet speed.");
        self.set_state(LifecycleState::Downloading);
        let temp = self
            .downloader
            .fetch(&url, policy.license_key.as_deref(), &self.data_dir)
            .await?;

        self.set_state(LifecycleState::Extracting);
        let dir = self.data_dir.clone();
        tokio::task::spawn_blocking(move || download::stage_file(temp.path(), &url, &dir))
            .await
            .map_err(|e| GeoIpError::Other(format!("Extraction task failed: {}", e)))?
    }

    fn commit(&self, staged: StagedArtifact, artifact: &DatabaseArtifact) -> Result<()> {
        let written = staged
            .commit(&artifact.path)
            .inspect_err(|e| log::error!("{}", e))?;
        log::info!("Installed GeoIP database {:?} ({} bytes)", artifact.path, written);
        Ok(())
    }

    async fn open_database(&self, path: &Path) -> Result<Box<dyn GeoDatabase>> {
        let loader = Arc::clone(&self.loader);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || loader.open(&path))
            .await
            .map_err(|e| GeoIpError::Other(format!("Database open task failed: {}", e)))?
    }

    async fn open_and_publish(&self, artifact: &DatabaseArtifact) -> Result<()> {
        let database = self.open_database(&artifact.path).await?;
        self.publish(artifact, database);
        Ok(())
    }

    /// Swap in a handle for `artifact`; the old one is released once the
    /// last in-flight lookup drops it.
    fn publish(&self, artifact: &DatabaseArtifact, database: Box<dyn GeoDatabase>) {
        let handle = ReaderHandle {
            database,
            artifact: artifact.clone(),
            opened_at: SystemTime::now(),
        };
        let previous = self.reader.swap(Some(Arc::new(handle)));
        self.set_state(LifecycleState::Ready);

        match previous {
            Some(_) => log::info!("Reloaded GeoIP database from {:?}", artifact.path),
            None => log::info!("Opened GeoIP database {:?}", artifact.path),
        }
    }

    fn reader_bound_to(&self, artifact: &DatabaseArtifact) -> bool {
        self.current_reader()
            .is_some_and(|handle| handle.artifact == *artifact)
    }

    fn settle(&self) {
        if self.current_reader().is_some() {
            self.set_state(LifecycleState::Ready);
        } else {
            self.set_state(LifecycleState::Unavailable);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Variant;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Reads the artifact as text and reports it as the country of every address
    struct TextDatabase(String);

    impl GeoDatabase for TextDatabase {
        fn name(&self) -> &str {
            "text"
        }

        fn lookup(&self, _ip: IpAddr, _variant: Variant) -> Result<Option<Location>> {
            Ok(Some(Location {
                country: Some(self.0.clone()),
                country_code: None,
                city: None,
            }))
        }
    }

    #[derive(Default)]
    struct TextLoader {
        opens: AtomicUsize,
    }

    impl DatabaseLoader for TextLoader {
        fn open(&self, path: &Path) -> Result<Box<dyn GeoDatabase>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let text = std::fs::read_to_string(path)?;
            Ok(Box::new(TextDatabase(text)))
        }
    }

    fn manager(dir: &Path, policy: DownloadPolicy) -> (DatabaseManager, Arc<TextLoader>) {
        let loader = Arc::new(TextLoader::default());
        let manager = DatabaseManager::new(dir, policy, Downloader::new().unwrap())
            .with_loader(loader.clone());
        (manager, loader)
    }

    fn offline_policy(download_if_missing: bool) -> DownloadPolicy {
        DownloadPolicy {
            url_template: "http://127.0.0.1:9/{LICENSEKEY}/geo.mmdb".to_string(),
            license_key: None,
            download_if_missing,
            ..DownloadPolicy::default()
        }
    }

    #[test]
    fn test_database_manager_creation() {
        let temp = TempDir::new().unwrap();
        let (manager, _) = manager(temp.path(), DownloadPolicy::default());
        assert_eq!(manager.state(), LifecycleState::Absent);
        assert!(manager.current_reader().is_none());
        assert_eq!(manager.artifact().path, temp.path().join("GeoIP2-Country.mmdb"));
    }

    #[tokio::test]
    async fn test_missing_artifact_without_download() {
        let temp = TempDir::new().unwrap();
        let (manager, loader) = manager(temp.path(), offline_policy(false));

        let err = manager.ensure_ready().await.unwrap_err();
        assert!(matches!(err, GeoIpError::MissingArtifact(_)));
        assert_eq!(manager.state(), LifecycleState::Unavailable);
        assert!(manager.current_reader().is_none());
        assert_eq!(loader.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fresh_local_artifact_is_opened_once() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("GeoIP2-Country.mmdb"), "Germany").unwrap();
        let (manager, loader) = manager(temp.path(), offline_policy(true));

        assert_eq!(manager.ensure_ready().await.unwrap(), ReadyOutcome::Opened);
        assert_eq!(manager.ensure_ready().await.unwrap(), ReadyOutcome::AlreadyLoaded);
        assert_eq!(loader.opens.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), LifecycleState::Ready);

        let reader = manager.current_reader().unwrap();
        let location = reader.lookup("8.8.8.8".parse().unwrap()).unwrap().unwrap();
        assert_eq!(location.country.as_deref(), Some("Germany"));
    }

    #[tokio::test]
    async fn test_config_error_keeps_previous_reader() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("GeoIP2-Country.mmdb"), "Germany").unwrap();
        let (manager, _) = manager(temp.path(), offline_policy(true));
        manager.ensure_ready().await.unwrap();

        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, GeoIpError::ConfigError(_)));
        assert_eq!(manager.state(), LifecycleState::Ready);
        assert!(manager.current_reader().is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_stale_copy() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("GeoIP2-Country.mmdb"), "Stale").unwrap();
        let (manager, _) = manager(temp.path(), offline_policy(true));

        assert!(manager.refresh().await.is_err());
        assert_eq!(manager.state(), LifecycleState::Ready);
        let reader = manager.current_reader().unwrap();
        let location = reader.lookup("8.8.8.8".parse().unwrap()).unwrap().unwrap();
        assert_eq!(location.country.as_deref(), Some("Stale"));
    }

    #[tokio::test]
    async fn test_set_policy_switches_variant() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("GeoIP2-Country.mmdb"), "Country").unwrap();
        std::fs::write(temp.path().join("GeoIP2-City.mmdb"), "City").unwrap();
        let (manager, _) = manager(temp.path(), offline_policy(true));
        manager.ensure_ready().await.unwrap();

        manager.set_policy(DownloadPolicy {
            variant: Variant::City,
            ..offline_policy(true)
        });
        assert_eq!(manager.ensure_ready().await.unwrap(), ReadyOutcome::Opened);
        let reader = manager.current_reader().unwrap();
        assert_eq!(reader.artifact().variant, Variant::City);
    }
}
