#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Interactive session for the ecosystem services map.
//!
//! A [`Session`] owns the download state machine
//! (`NotDownloaded -> Downloaded -> Loaded -> Rendered`), the memoized
//! download and load results, and the configuration. Front ends (the web
//! server and the CLI) drive it one interaction at a time:
//! [`Session::download`] on explicit request, [`Session::render`] on
//! every pass, [`Session::refresh`] when the user asks for fresh data.

pub mod cache;
pub mod config;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ecosystem_map_dataset::LoadError;
use ecosystem_map_feature_models::FeatureTable;
use ecosystem_map_filter::{ALL_USERS, FilterWarning, filter_by_users, is_all_users, unique_users};
use ecosystem_map_mergin::{
    Credentials, DownloadSummary, MerginClient, MerginError, ProgressCallback, ProjectDownloader,
    ProjectPath,
};
use ecosystem_map_render::{MapBuild, build_map};
use ecosystem_map_service_models::catalog;

use crate::cache::TtlCache;
use crate::config::AppConfig;

/// Errors surfaced to the user by a session interaction.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A render was requested before any data was downloaded.
    #[error("Please download the MLA637 data before viewing the map")]
    NotDownloaded,

    /// The download failed; the session is back to `NotDownloaded`.
    #[error("Error downloading project: {0}")]
    Download(#[from] MerginError),

    /// The snapshot could not be loaded; the session stays `Downloaded`.
    #[error("Error loading data: {0}")]
    Load(#[from] LoadError),
}

/// Where the session is in the download/render flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No snapshot is available.
    NotDownloaded,
    /// A snapshot was downloaded at `at`.
    Downloaded { at: DateTime<Utc> },
    /// The snapshot was loaded into a table of `features` rows.
    Loaded {
        downloaded_at: DateTime<Utc>,
        features: usize,
    },
    /// A map with `markers` markers was built.
    Rendered {
        downloaded_at: DateTime<Utc>,
        markers: usize,
    },
}

impl SessionState {
    /// When the current snapshot was downloaded, if there is one.
    #[must_use]
    pub const fn downloaded_at(&self) -> Option<DateTime<Utc>> {
        match *self {
            Self::NotDownloaded => None,
            Self::Downloaded { at } => Some(at),
            Self::Loaded { downloaded_at, .. } | Self::Rendered { downloaded_at, .. } => {
                Some(downloaded_at)
            }
        }
    }

    #[must_use]
    pub const fn is_downloaded(&self) -> bool {
        self.downloaded_at().is_some()
    }
}

/// Reads a snapshot file into a feature table.
pub trait SnapshotLoader: Send + Sync {
    /// # Errors
    ///
    /// Returns [`LoadError`] if the snapshot is missing or unreadable.
    fn load(&self, path: &Path, layer: Option<&str>) -> Result<FeatureTable, LoadError>;
}

/// Loads GeoPackage snapshots from disk.
pub struct GpkgLoader;

impl SnapshotLoader for GpkgLoader {
    fn load(&self, path: &Path, layer: Option<&str>) -> Result<FeatureTable, LoadError> {
        ecosystem_map_dataset::load_snapshot(path, layer)
    }
}

/// Downloads from Mergin Maps, reading credentials from the environment
/// at download time so a missing secret only fails the download.
pub struct MerginDownloader {
    base_url: String,
}

impl MerginDownloader {
    #[must_use]
    pub const fn new(base_url: String) -> Self {
        Self { base_url }
    }
}

#[async_trait::async_trait]
impl ProjectDownloader for MerginDownloader {
    async fn download_project(
        &self,
        project: &ProjectPath,
        dest: &Path,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<DownloadSummary, MerginError> {
        let client = MerginClient::new(&self.base_url, Credentials::from_env()?)?;
        client.download_project(project, dest, progress).await
    }
}

/// Sidebar statistics for the current filter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stats {
    /// "All Users" is selected.
    AllUsers { total_points: usize, total_users: usize },
    /// Specific users are selected.
    Selection {
        filtered_points: usize,
        selected_users: usize,
    },
    /// The data has no user column.
    NoUserColumn { total_points: usize },
}

impl Stats {
    /// Label/value pairs in display order.
    #[must_use]
    pub fn metrics(&self) -> Vec<(&'static str, usize)> {
        match *self {
            Self::AllUsers {
                total_points,
                total_users,
            } => vec![("Total Points", total_points), ("Total Users", total_users)],
            Self::Selection {
                filtered_points,
                selected_users,
            } => vec![
                ("Filtered Points", filtered_points),
                ("Selected Users", selected_users),
            ],
            Self::NoUserColumn { total_points } => vec![("Total Points", total_points)],
        }
    }
}

/// Everything a front end needs to draw one pass.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// The column usernames were read from, if any.
    pub user_column: Option<String>,
    /// `["All Users"]` followed by the sorted unique usernames.
    pub user_options: Vec<String>,
    /// The effective selection.
    pub selected_users: Vec<String>,
    pub stats: Stats,
    /// Rows left after the user filter.
    pub filtered: FeatureTable,
    pub map: MapBuild,
    pub warnings: Vec<FilterWarning>,
}

/// One interactive session.
pub struct Session {
    config: AppConfig,
    downloader: Arc<dyn ProjectDownloader>,
    loader: Arc<dyn SnapshotLoader>,
    state: SessionState,
    downloads: TtlCache<(ProjectPath, PathBuf), DownloadSummary>,
    tables: TtlCache<(PathBuf, Option<String>), Arc<FeatureTable>>,
}

impl Session {
    #[must_use]
    pub fn new(
        config: AppConfig,
        downloader: Arc<dyn ProjectDownloader>,
        loader: Arc<dyn SnapshotLoader>,
    ) -> Self {
        let ttl = config.cache.ttl();
        Self {
            config,
            downloader,
            loader,
            state: SessionState::NotDownloaded,
            downloads: TtlCache::new(ttl),
            tables: TtlCache::new(ttl),
        }
    }

    /// A session backed by Mergin Maps and the GeoPackage loader.
    #[must_use]
    pub fn with_default_backends(config: AppConfig) -> Self {
        let downloader = Arc::new(MerginDownloader::new(config.mergin.url.clone()));
        Self::new(config, downloader, Arc::new(GpkgLoader))
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Treats an existing snapshot on disk as downloaded, using its
    /// modification time. Returns `true` if one was found.
    pub fn adopt_existing_snapshot(&mut self) -> bool {
        let path = self.config.snapshot_path();
        let Ok(metadata) = std::fs::metadata(&path) else {
            return false;
        };
        if !metadata.is_file() {
            return false;
        }

        let at = metadata
            .modified()
            .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
        log::info!("Using existing snapshot {} ({at})", path.display());
        self.state = SessionState::Downloaded { at };
        true
    }

    /// Replaces the local snapshot with a fresh download.
    ///
    /// A successful download for the same project and directory within
    /// the cache TTL is reused without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Download`] on failure. The local directory
    /// may already have been removed, so the state becomes
    /// [`SessionState::NotDownloaded`].
    pub async fn download(
        &mut self,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<DownloadSummary, SessionError> {
        let key = (
            self.config.mergin.project.clone(),
            self.config.snapshot.dir.clone(),
        );

        if let Some(summary) = self.downloads.get(&key) {
            log::info!("Reusing download of {} from cache", key.0);
            if !self.state.is_downloaded() {
                self.state = SessionState::Downloaded { at: Utc::now() };
            }
            return Ok(summary);
        }

        match self
            .downloader
            .download_project(&key.0, &key.1, progress)
            .await
        {
            Ok(summary) => {
                log::info!(
                    "Downloaded {} {} ({} files)",
                    key.0,
                    summary.version,
                    summary.files
                );
                self.downloads.insert(key, summary.clone());
                self.tables.invalidate();
                self.state = SessionState::Downloaded { at: Utc::now() };
                Ok(summary)
            }
            Err(e) => {
                log::error!("Error downloading project: {e}");
                self.state = SessionState::NotDownloaded;
                Err(e.into())
            }
        }
    }

    /// Clears the memoized download and load results so the next
    /// interaction re-executes them.
    pub fn refresh(&mut self) {
        log::info!("Clearing cached downloads and tables");
        self.downloads.invalidate();
        self.tables.invalidate();
    }

    /// Loads the snapshot table, from cache when still valid.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotDownloaded`] before a download, or
    /// [`SessionError::Load`] if the snapshot cannot be read. The state is
    /// left at `Downloaded` on failure.
    pub fn load(&mut self) -> Result<Arc<FeatureTable>, SessionError> {
        let Some(downloaded_at) = self.state.downloaded_at() else {
            return Err(SessionError::NotDownloaded);
        };

        let key = (
            self.config.snapshot_path(),
            self.config.snapshot.layer.clone(),
        );

        let table = if let Some(table) = self.tables.get(&key) {
            table
        } else {
            match self.loader.load(&key.0, key.1.as_deref()) {
                Ok(table) => {
                    let table = Arc::new(table);
                    self.tables.insert(key, Arc::clone(&table));
                    table
                }
                Err(e) => {
                    log::error!("Error loading data: {e}");
                    self.state = SessionState::Downloaded { at: downloaded_at };
                    return Err(e.into());
                }
            }
        };

        self.state = SessionState::Loaded {
            downloaded_at,
            features: table.len(),
        };
        Ok(table)
    }

    /// Runs one render pass for the selected users.
    ///
    /// An empty selection means "All Users". When the data has no user
    /// column, the selection is ignored and a warning is returned.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn render(&mut self, selected: &[String]) -> Result<RenderOutput, SessionError> {
        let table = self.load()?;
        let users = &self.config.users;

        let user_column = users.resolve(&table).map(ToString::to_string);
        let mut warnings = Vec::new();

        let (user_options, selected_users, filtered, stats) = if let Some(column) = &user_column {
            let known = unique_users(&table, column);
            let selected_users = if selected.is_empty() {
                vec![ALL_USERS.to_string()]
            } else {
                selected.to_vec()
            };

            let result = filter_by_users(&table, &selected_users, users);
            warnings.extend(result.warning);
            let filtered = result.table.into_owned();

            let stats = if is_all_users(&selected_users) {
                Stats::AllUsers {
                    total_points: table.len(),
                    total_users: known.len(),
                }
            } else {
                Stats::Selection {
                    filtered_points: filtered.len(),
                    selected_users: selected_users.len(),
                }
            };

            let options = std::iter::once(ALL_USERS.to_string()).chain(known).collect();
            (options, selected_users, filtered, stats)
        } else {
            let warning = FilterWarning::NoUserColumn {
                available: table.columns().to_vec(),
            };
            log::warn!("{warning}");
            warnings.push(warning);
            (
                vec![ALL_USERS.to_string()],
                vec![ALL_USERS.to_string()],
                (*table).clone(),
                Stats::NoUserColumn {
                    total_points: table.len(),
                },
            )
        };

        let map = build_map(&filtered, catalog(), &self.config.map.options);

        if let Some(downloaded_at) = self.state.downloaded_at() {
            self.state = SessionState::Rendered {
                downloaded_at,
                markers: map.document.marker_count(),
            };
        }

        log::info!(
            "Rendered {} of {} features ({} markers, {} layers)",
            filtered.len(),
            table.len(),
            map.document.marker_count(),
            map.document.layers.len()
        );

        Ok(RenderOutput {
            user_column,
            user_options,
            selected_users,
            stats,
            filtered,
            map,
            warnings,
        })
    }

    /// Unique non-empty usernames in the loaded table.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn known_users(&mut self) -> Result<BTreeSet<String>, SessionError> {
        let table = self.load()?;
        Ok(self
            .config
            .users
            .resolve(&table)
            .map(|column| unique_users(&table, column))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ecosystem_map_feature_models::{FeatureRow, Point};
    use ecosystem_map_mergin::null_progress;

    use super::*;

    struct MockDownloader {
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockDownloader {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait::async_trait]
    impl ProjectDownloader for MockDownloader {
        async fn download_project(
            &self,
            _project: &ProjectPath,
            _dest: &Path,
            _progress: Arc<dyn ProgressCallback>,
        ) -> Result<DownloadSummary, MerginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MerginError::Auth("invalid credentials".to_string()));
            }
            Ok(DownloadSummary {
                version: "v3".to_string(),
                files: 1,
                bytes: 10,
            })
        }
    }

    struct MockLoader {
        calls: AtomicUsize,
        table: Option<FeatureTable>,
    }

    impl MockLoader {
        fn new(table: Option<FeatureTable>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                table,
            })
        }
    }

    impl SnapshotLoader for MockLoader {
        fn load(&self, path: &Path, _layer: Option<&str>) -> Result<FeatureTable, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.table
                .clone()
                .ok_or_else(|| LoadError::MissingSnapshot(path.to_path_buf()))
        }
    }

    fn survey(user_column: &str) -> FeatureTable {
        let rows = [
            (Some((-1.0, 53.0)), "1", "alice"),
            (Some((-1.2, 53.2)), "13", "bob"),
            (None, "2", "alice"),
            (Some((-1.4, 53.4)), "", "carol"),
        ];

        FeatureTable::new(
            vec![
                "provisioning_type".to_string(),
                "regulating_type".to_string(),
                "cultural_type".to_string(),
                "supporting_type".to_string(),
                user_column.to_string(),
            ],
            rows.iter()
                .map(|(point, codes, user)| {
                    FeatureRow::new(
                        point.map(|(x, y)| Point::new(x, y)),
                        vec![(*codes).into(), "".into(), "".into(), "".into(), (*user).into()],
                    )
                })
                .collect(),
        )
        .unwrap()
    }

    fn session(downloader: Arc<MockDownloader>, loader: Arc<MockLoader>) -> Session {
        Session::new(AppConfig::default(), downloader, loader)
    }

    fn users(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn render_before_download_is_refused() {
        let loader = MockLoader::new(Some(survey("Your name")));
        let mut s = session(MockDownloader::new(false), loader.clone());

        assert!(matches!(s.render(&[]), Err(SessionError::NotDownloaded)));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(s.state(), SessionState::NotDownloaded);
    }

    #[tokio::test]
    async fn failed_download_stays_not_downloaded() {
        let downloader = MockDownloader::new(true);
        let mut s = session(downloader.clone(), MockLoader::new(None));

        let err = s.download(null_progress()).await.unwrap_err();

        assert!(matches!(err, SessionError::Download(_)));
        assert_eq!(s.state(), SessionState::NotDownloaded);

        // Failures are not cached.
        let _ = s.download(null_progress()).await;
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn download_is_memoized_until_refresh() {
        let downloader = MockDownloader::new(false);
        let mut s = session(downloader.clone(), MockLoader::new(None));

        s.download(null_progress()).await.unwrap();
        assert!(s.state().is_downloaded());
        s.download(null_progress()).await.unwrap();
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);

        s.refresh();
        s.download(null_progress()).await.unwrap();
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn all_users_render_reports_totals() {
        let loader = MockLoader::new(Some(survey("Your name")));
        let mut s = session(MockDownloader::new(false), loader.clone());
        s.download(null_progress()).await.unwrap();

        let out = s.render(&[]).unwrap();

        assert_eq!(out.user_column.as_deref(), Some("Your name"));
        assert_eq!(out.user_options, users(&[ALL_USERS, "alice", "bob", "carol"]));
        assert_eq!(out.selected_users, users(&[ALL_USERS]));
        assert_eq!(
            out.stats,
            Stats::AllUsers {
                total_points: 4,
                total_users: 3
            }
        );
        assert_eq!(out.filtered.len(), 4);
        assert!(out.warnings.is_empty());
        assert!(matches!(s.state(), SessionState::Rendered { markers, .. } if markers > 0));

        // Second pass hits the table cache.
        s.render(&[]).unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn selected_users_filter_the_map() {
        let mut s = session(MockDownloader::new(false), MockLoader::new(Some(survey("Your name"))));
        s.download(null_progress()).await.unwrap();

        let out = s.render(&users(&["alice"])).unwrap();

        assert_eq!(
            out.stats,
            Stats::Selection {
                filtered_points: 2,
                selected_users: 1
            }
        );
        // alice's second row has no geometry; only the food marker remains.
        assert_eq!(out.map.document.marker_count(), 1);
        assert_eq!(out.stats.metrics()[0], ("Filtered Points", 2));
    }

    #[tokio::test]
    async fn missing_user_column_warns_and_shows_everything() {
        let mut s = session(MockDownloader::new(false), MockLoader::new(Some(survey("notes"))));
        s.download(null_progress()).await.unwrap();

        let out = s.render(&users(&["alice"])).unwrap();

        assert_eq!(out.user_column, None);
        assert_eq!(out.stats, Stats::NoUserColumn { total_points: 4 });
        assert_eq!(out.filtered.len(), 4);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.stats.metrics(), vec![("Total Points", 4)]);
    }

    #[tokio::test]
    async fn load_failure_keeps_downloaded_state() {
        let loader = MockLoader::new(None);
        let mut s = session(MockDownloader::new(false), loader.clone());
        s.download(null_progress()).await.unwrap();

        assert!(matches!(s.render(&[]), Err(SessionError::Load(_))));
        assert!(matches!(s.state(), SessionState::Downloaded { .. }));

        // Failures are retried on the next interaction.
        let _ = s.render(&[]);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_reloads_the_table() {
        let loader = MockLoader::new(Some(survey("Your name")));
        let mut s = session(MockDownloader::new(false), loader.clone());

        s.download(null_progress()).await.unwrap();
        s.render(&[]).unwrap();
        s.refresh();
        s.download(null_progress()).await.unwrap();
        s.render(&[]).unwrap();

        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn known_users_are_sorted() {
        let mut s = session(MockDownloader::new(false), MockLoader::new(Some(survey("username"))));
        s.download(null_progress()).await.unwrap();

        let known: Vec<_> = s.known_users().unwrap().into_iter().collect();
        assert_eq!(known, users(&["alice", "bob", "carol"]));
    }
}
