//! Install orchestration - bottle pours and source builds.
//!
//! [`Installer`] drives one package from descriptor to installed keg:
//!
//! ```text
//! installed? ──yes──> skip
//!     │no
//! install dependencies ─> select source ─┬─ bottle: download ─> verify ─> extract ─> place
//!                                        └─ source: download ─> verify ─> extract ─> locate root
//!                                                   ─> detect build system ─> run commands
//!                                     ─> write receipt ─> verify installation ─> installed
//! ```
//!
//! Everything up to placement happens in a scratch directory under the cache, so a
//! failure never leaves a registered half-installed keg behind: if anything fails after
//! the keg was created, the keg is discarded. The receipt is written only after the
//! files are in place.
//!
//! # Examples
//!
//! ```no_run
//! use pourover::{Config, FormulaDirectory, HostPlatform, InstallOptions, Installer, SilentReporter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> pourover::Result<()> {
//!     let installer = Installer::new(
//!         Config::from_env(),
//!         InstallOptions::default(),
//!         Arc::new(FormulaDirectory::new("./formulae")),
//!         Arc::new(HostPlatform),
//!         Arc::new(SilentReporter),
//!     )?;
//!
//!     let result = installer.install("hello").await;
//!     println!("{} {} in {:?}", result.name, result.version, result.duration);
//!     Ok(())
//! }
//! ```

use crate::build::{self, BuildEnvironment};
use crate::cellar::Cellar;
use crate::config::Config;
use crate::download::{ArtifactKind, Downloader, FetchRequest};
use crate::error::{ErrorType, InstallError, Result};
use crate::extract;
use crate::formula::{Formula, FormulaProvider};
use crate::options::{self, InstallOptions, InstallSource};
use crate::platform::PlatformTagProvider;
use crate::receipt::InstallReceipt;
use crate::reporter::Reporter;
use crate::verify;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a top-level install call. Not persisted.
#[derive(Debug)]
pub struct InstallResult {
    pub name: String,
    /// Empty when the descriptor could not be loaded
    pub version: String,
    pub duration: Duration,
    /// `None` when the install failed before a source was chosen, or was skipped
    pub source: Option<InstallSource>,
    pub success: bool,
    pub error: Option<InstallError>,
}

/// What [`Installer::install_formula`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed { source: InstallSource, keg: PathBuf },
    AlreadyInstalled,
    /// Dry run: nothing was downloaded, built, or written
    Planned { source: InstallSource, url: String },
}

impl InstallOutcome {
    pub fn source(&self) -> Option<InstallSource> {
        match self {
            InstallOutcome::Installed { source, .. } | InstallOutcome::Planned { source, .. } => {
                Some(*source)
            }
            InstallOutcome::AlreadyInstalled => None,
        }
    }
}

/// Installs packages into a Cellar.
///
/// Holds one HTTP client for all downloads, including those of dependencies. Output
/// goes through the injected [`Reporter`]; nothing here prints directly.
pub struct Installer {
    pub(crate) config: Config,
    pub(crate) cellar: Cellar,
    pub(crate) options: InstallOptions,
    pub(crate) formulae: Arc<dyn FormulaProvider>,
    platform: Arc<dyn PlatformTagProvider>,
    downloader: Downloader,
    pub(crate) reporter: Arc<dyn Reporter>,
}

impl Installer {
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the HTTP client cannot be created.
    pub fn new(
        config: Config,
        options: InstallOptions,
        formulae: Arc<dyn FormulaProvider>,
        platform: Arc<dyn PlatformTagProvider>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        let downloader = Downloader::new(&config, reporter.clone())?;
        Ok(Self {
            cellar: Cellar::new(config.cellar.clone()),
            config,
            options,
            formulae,
            platform,
            downloader,
            reporter,
        })
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    pub fn cellar(&self) -> &Cellar {
        &self.cellar
    }

    pub fn platform_tag(&self) -> String {
        self.platform.platform_tag()
    }

    /// Whether `formula` would be poured from a bottle on this platform
    pub fn should_use_bottle(&self, formula: &Formula) -> bool {
        options::should_use_bottle(&self.options, formula, &self.platform_tag())
    }

    pub(crate) fn select_source(&self, formula: &Formula) -> InstallSource {
        options::select_source(&self.options, formula, &self.platform_tag())
    }

    /// True iff a directory for `name` exists in the Cellar
    pub fn is_formula_installed(&self, name: &str) -> Result<bool> {
        self.cellar.is_installed(name)
    }

    /// Look up `name` and install it with its dependencies.
    ///
    /// Never fails; the outcome, including any error, is in the returned
    /// [`InstallResult`].
    pub async fn install(&self, name: &str) -> InstallResult {
        let start = Instant::now();

        let formula = match self.formulae.formula(name) {
            Ok(formula) => formula,
            Err(e) => {
                return InstallResult {
                    name: name.to_string(),
                    version: String::new(),
                    duration: start.elapsed(),
                    source: None,
                    success: false,
                    error: Some(e.with_platform(self.platform_tag())),
                };
            }
        };

        let outcome = self.install_formula(&formula).await;
        let duration = start.elapsed();
        match outcome {
            Ok(outcome) => InstallResult {
                name: formula.name,
                version: formula.version,
                duration,
                source: outcome.source(),
                success: true,
                error: None,
            },
            Err(e) => {
                // Dependencies are handled before the source is picked
                let source = (e.kind() != ErrorType::DependencyError)
                    .then(|| self.select_source(&formula));
                InstallResult {
                    name: formula.name,
                    version: formula.version,
                    duration,
                    source,
                    success: false,
                    error: Some(e),
                }
            }
        }
    }

    /// Install an already loaded descriptor, requested by the user
    pub async fn install_formula(&self, formula: &Formula) -> Result<InstallOutcome> {
        self.install_chain(formula, Vec::new(), true).await
    }

    /// `chain` holds the packages whose installs are in flight above this one
    pub(crate) fn install_chain<'a>(
        &'a self,
        formula: &'a Formula,
        mut chain: Vec<String>,
        on_request: bool,
    ) -> BoxFuture<'a, Result<InstallOutcome>> {
        async move {
            let tag = self.platform_tag();

            if chain.contains(&formula.name) {
                chain.push(formula.name.clone());
                return Err(InstallError::new(
                    ErrorType::DependencyError,
                    format!("dependency cycle detected: {}", chain.join(" -> ")),
                )
                .with_operation("install dependencies")
                .with_formula(&formula.name)
                .with_platform(tag)
                .with_suggestion("Check the dependency lists of the formulae in the cycle"));
            }

            if self.is_formula_installed(&formula.name)? {
                self.reporter
                    .info(&format!("{} is already installed", formula.name));
                return Ok(InstallOutcome::AlreadyInstalled);
            }

            chain.push(formula.name.clone());
            let result = self.install_new(formula, &chain, on_request, &tag).await;
            result.map_err(|e| {
                e.with_formula(&formula.name)
                    .with_version(&formula.version)
                    .with_platform(&tag)
            })
        }
        .boxed()
    }

    async fn install_new(
        &self,
        formula: &Formula,
        chain: &[String],
        on_request: bool,
        tag: &str,
    ) -> Result<InstallOutcome> {
        let name = &formula.name;

        // Step 1: Dependencies, depth first
        self.install_dependencies_in_chain(formula, chain).await?;

        // Step 2: Pick bottle or source
        let source = self.select_source(formula);
        let url = self.artifact_url(formula, source, tag)?;
        tracing::info!(formula = %name, version = %formula.version, source = ?source, "installing");

        if self.options.dry_run {
            self.reporter.info(&format!(
                "Would install {} {} from {} ({})",
                name, formula.version, source, url
            ));
            return Ok(InstallOutcome::Planned { source, url });
        }

        self.reporter.info(&format!(
            "Installing {} {} from {}",
            name, formula.version, source
        ));

        // Step 3: Scratch space for extraction and builds
        fs::create_dir_all(&self.config.tmp_dir)
            .map_err(|e| InstallError::io(&self.config.tmp_dir, e).with_operation("install"))?;
        let tmp = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", name, formula.version))
            .tempdir_in(&self.config.tmp_dir)
            .map_err(|e| InstallError::io(&self.config.tmp_dir, e).with_operation("install"))?;

        let placed = match source {
            InstallSource::Bottle => self.pour_bottle(formula, tag, tmp.path()).await,
            InstallSource::Source => self.build_from_source(formula, tmp.path()).await,
        };

        // Step 4: Receipt, then post-install checks
        let result = match placed {
            Ok(keg) => self
                .finish_install(formula, source, on_request, &keg)
                .map(|()| keg),
            Err(e) => Err(e),
        };

        if self.options.keep_tmp {
            let kept = tmp.keep();
            self.reporter
                .info(&format!("Kept temporary files in {}", kept.display()));
        }

        match result {
            Ok(keg) => {
                self.reporter.success(&format!(
                    "Installed {} {} ({})",
                    name, formula.version, source
                ));
                Ok(InstallOutcome::Installed { source, keg })
            }
            Err(e) => {
                self.cellar.discard(name, &formula.version);
                tracing::debug!(formula = %name, error = %e, "install failed, discarded keg");
                Err(e)
            }
        }
    }

    /// URL of the artifact to fetch, or why there is none
    fn artifact_url(&self, formula: &Formula, source: InstallSource, tag: &str) -> Result<String> {
        match source {
            InstallSource::Bottle => formula
                .bottle_for(tag)
                .map(|bottle| bottle.url.clone())
                .ok_or_else(|| {
                    InstallError::configuration(format!(
                        "no bottle available for {} on {}",
                        formula.name, tag
                    ))
                    .with_operation("select source")
                    .with_suggestion("Drop --force-bottle to build from source instead")
                }),
            InstallSource::Source => formula
                .source
                .as_ref()
                .filter(|archive| !archive.url.is_empty())
                .map(|archive| archive.url.clone())
                .ok_or_else(|| {
                    let mut err = InstallError::configuration(format!(
                        "no source archive declared for {}",
                        formula.name
                    ))
                    .with_operation("select source");
                    if formula.has_bottle_for(tag) {
                        err = err.with_suggestion("Drop --build-from-source to pour the bottle");
                    } else {
                        err = err.with_suggestion(format!("No bottle is available for {} either", tag));
                    }
                    err
                }),
        }
    }

    async fn pour_bottle(&self, formula: &Formula, tag: &str, tmp: &Path) -> Result<PathBuf> {
        let name = &formula.name;
        let bottle = formula.bottle_for(tag).ok_or_else(|| {
            InstallError::configuration(format!("no bottle available for {} on {}", name, tag))
        })?;

        let dest = self.config.downloads_dir().join(format!(
            "{}--{}.{}.bottle.tar.gz",
            name, formula.version, tag
        ));
        let archive = self
            .downloader
            .fetch(&FetchRequest {
                label: name,
                url: &bottle.url,
                dest: &dest,
                sha256: &bottle.sha256,
                size: bottle.size,
                kind: ArtifactKind::Bottle,
                strict: self.options.strict_verification,
            })
            .await?;

        self.reporter.start_spinner(&format!("Pouring {}", name));
        let placed = self.place_bottle(formula, &archive, tmp);
        self.reporter.stop_spinner(placed.is_ok());
        placed
    }

    fn place_bottle(&self, formula: &Formula, archive: &Path, tmp: &Path) -> Result<PathBuf> {
        let extract_dir = tmp.join("bottle");
        extract::extract_archive(archive, &extract_dir)?;
        let root = extract::bottle_root(&extract_dir, &formula.name, &formula.version)?;

        let keg = self.cellar.create_keg(&formula.name, &formula.version)?;
        extract::move_contents(&root, &keg)?;
        Ok(keg)
    }

    async fn build_from_source(&self, formula: &Formula, tmp: &Path) -> Result<PathBuf> {
        let name = &formula.name;
        let archive = formula
            .source
            .as_ref()
            .ok_or_else(|| InstallError::configuration(format!("no source archive declared for {}", name)))?;

        let dest = self
            .config
            .downloads_dir()
            .join(format!("{}--{}", name, archive_file_name(&archive.url, formula)));
        let tarball = self
            .downloader
            .fetch(&FetchRequest {
                label: name,
                url: &archive.url,
                dest: &dest,
                sha256: &archive.sha256,
                size: archive.size,
                kind: ArtifactKind::Source,
                strict: self.options.strict_verification,
            })
            .await?;

        let extract_dir = tmp.join("src");
        extract::extract_archive(&tarball, &extract_dir)?;
        let source_dir = extract::find_source_directory(&extract_dir)?;
        self.reporter
            .debug(&format!("Source root: {}", source_dir.display()));

        let keg = self.cellar.create_keg(name, &formula.version)?;
        self.build_and_install(formula, &source_dir, &keg).await?;
        Ok(keg)
    }

    /// Detect the build system of `source_dir` and install into `keg`.
    ///
    /// # Errors
    ///
    /// Returns a `BuildError` if `source_dir` does not exist, no build system is
    /// recognized, or a build command fails.
    pub async fn build_and_install(&self, formula: &Formula, source_dir: &Path, keg: &Path) -> Result<()> {
        if !source_dir.is_dir() {
            return Err(InstallError::build(format!(
                "cannot build {}: source directory {} does not exist",
                formula.name,
                source_dir.display()
            ))
            .with_formula(&formula.name)
            .with_version(&formula.version));
        }

        let plan = build::detect_build_system(source_dir, keg)
            .map_err(|e| e.with_formula(&formula.name).with_version(&formula.version))?;
        self.reporter.debug(&format!(
            "Detected {} build system ({} command(s))",
            plan.label(),
            plan.commands.len()
        ));

        let bin = keg.join("bin");
        fs::create_dir_all(&bin).map_err(|e| InstallError::io(&bin, e).with_operation("build"))?;

        let env = BuildEnvironment {
            compiler: self.options.compiler.clone(),
            debug_symbols: self.options.debug_symbols,
            verbose: self.options.verbose,
            timeout: self.config.build_timeout,
        };

        // Build output goes straight to the terminal in verbose mode
        let spinner = !self.options.verbose;
        if spinner {
            self.reporter.start_spinner(&format!(
                "Building {} {} ({})",
                formula.name,
                formula.version,
                plan.label()
            ));
        }
        let result = build::run_plan(&plan, source_dir, &env).await;
        if spinner {
            self.reporter.stop_spinner(result.is_ok());
        }

        result.map_err(|e| e.with_formula(&formula.name).with_version(&formula.version))
    }

    /// Write the receipt of a user-requested install of `formula`
    pub fn write_install_receipt(&self, formula: &Formula, source: InstallSource) -> Result<PathBuf> {
        self.write_receipt(formula, source, true)
    }

    fn write_receipt(&self, formula: &Formula, source: InstallSource, on_request: bool) -> Result<PathBuf> {
        let keg = self.cellar.keg_path(&formula.name, &formula.version);
        let receipt = InstallReceipt::new(formula, source, &self.options, &self.platform_tag(), on_request);
        receipt.write(&keg)
    }

    fn finish_install(&self, formula: &Formula, source: InstallSource, on_request: bool, keg: &Path) -> Result<()> {
        let receipt_path = self.write_receipt(formula, source, on_request)?;
        tracing::debug!(receipt = %receipt_path.display(), "wrote install receipt");

        let outcome = verify::verify_installation(keg, &formula.artifacts);
        if outcome.success {
            self.reporter.debug(&format!("Verified {}: {}", formula.name, outcome.summary));
            return Ok(());
        }

        let failed: Vec<String> = outcome.failed_checks().map(|c| c.detail.clone()).collect();
        let message = format!(
            "installation of {} failed verification: {} ({})",
            formula.name,
            outcome.summary,
            failed.join("; ")
        );
        if self.options.strict_verification {
            Err(InstallError::verification(message))
        } else {
            self.reporter.warning(&message);
            Ok(())
        }
    }
}

/// File name for a cached source archive, keeping the URL's extension
fn archive_file_name(url: &str, formula: &Formula) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}.tar.gz", formula.name, formula.version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FormulaIndex;
    use crate::platform::FixedPlatform;
    use crate::reporter::SilentReporter;

    const TAG: &str = "x86_64_linux";

    fn installer(root: &Path, options: InstallOptions, formulae: FormulaIndex) -> Installer {
        Installer::new(
            Config::with_prefix(root),
            options,
            Arc::new(formulae),
            Arc::new(FixedPlatform::new(TAG)),
            Arc::new(SilentReporter),
        )
        .unwrap()
    }

    fn formula(name: &str) -> Formula {
        Formula {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_archive_file_name() {
        let f = formula("hello");
        assert_eq!(
            archive_file_name("https://ftp.gnu.org/gnu/hello/hello-2.12.1.tar.gz", &f),
            "hello-2.12.1.tar.gz"
        );
        assert_eq!(
            archive_file_name("https://example.com/dl/hello.tgz?token=abc", &f),
            "hello.tgz"
        );
        assert_eq!(archive_file_name("https://example.com/", &f), "hello-1.0.0.tar.gz");
    }

    #[test]
    fn test_should_use_bottle_uses_platform_provider() {
        let dir = tempfile::tempdir().unwrap();
        let with_bottle = formula("hello").with_bottle(TAG, "https://example.com/b.tar.gz", "ab");
        let other_platform = formula("hello").with_bottle("arm64_sequoia", "https://example.com/b.tar.gz", "ab");

        let inst = installer(dir.path(), InstallOptions::default(), FormulaIndex::new());
        assert!(inst.should_use_bottle(&with_bottle));
        assert!(!inst.should_use_bottle(&other_platform));
    }

    #[test]
    fn test_write_install_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let options = InstallOptions {
            compiler: Some("gcc".to_string()),
            ..Default::default()
        };
        let inst = installer(dir.path(), options, FormulaIndex::new());
        let f = Formula {
            name: "test-formula".to_string(),
            version: "1.0.0".to_string(),
            dependencies: vec!["dep1".to_string(), "dep2".to_string()],
            ..Default::default()
        };

        inst.cellar().create_keg("test-formula", "1.0.0").unwrap();
        let path = inst.write_install_receipt(&f, InstallSource::Source).unwrap();
        assert_eq!(path, inst.cellar().receipt_path("test-formula", "1.0.0"));

        let contents = fs::read_to_string(&path).unwrap();
        for expected in ["test-formula", "1.0.0", "dep1", "dep2", "gcc"] {
            assert!(contents.contains(expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_write_install_receipt_without_keg_fails() {
        let dir = tempfile::tempdir().unwrap();
        let inst = installer(dir.path(), InstallOptions::default(), FormulaIndex::new());
        assert!(inst
            .write_install_receipt(&formula("ghost"), InstallSource::Bottle)
            .is_err());
    }

    #[tokio::test]
    async fn test_build_and_install_missing_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let inst = installer(dir.path(), InstallOptions::default(), FormulaIndex::new());
        let err = inst
            .build_and_install(&formula("hello"), &dir.path().join("nope"), &dir.path().join("keg"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorType::BuildError);
        assert!(err.to_string().contains("build"));
    }

    #[tokio::test]
    async fn test_build_and_install_no_build_system() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("README"), "").unwrap();

        let inst = installer(dir.path(), InstallOptions::default(), FormulaIndex::new());
        let err = inst
            .build_and_install(&formula("hello"), &src, &dir.path().join("keg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("build"));
        assert_eq!(err.context().formula.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_install_unknown_formula() {
        let dir = tempfile::tempdir().unwrap();
        let inst = installer(dir.path(), InstallOptions::default(), FormulaIndex::new());
        let result = inst.install("nope").await;
        assert!(!result.success);
        let err = result.error.unwrap();
        assert_eq!(err.kind(), ErrorType::FormulaNotFoundError);
        assert_eq!(err.context().platform.as_deref(), Some(TAG));
    }

    #[tokio::test]
    async fn test_already_installed_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let inst = installer(
            dir.path(),
            InstallOptions::default(),
            [formula("hello")].into_iter().collect(),
        );
        inst.cellar().create_keg("hello", "0.9.0").unwrap();

        let outcome = inst.install_formula(&formula("hello")).await.unwrap();
        assert_eq!(outcome, InstallOutcome::AlreadyInstalled);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let options = InstallOptions {
            dry_run: true,
            ..Default::default()
        };
        let f = formula("hello").with_bottle(TAG, "https://example.invalid/hello.tar.gz", "ab");
        let inst = installer(dir.path(), options, FormulaIndex::new());

        let outcome = inst.install_formula(&f).await.unwrap();
        assert_eq!(outcome.source(), Some(InstallSource::Bottle));
        assert!(!inst.is_formula_installed("hello").unwrap());
        assert!(!dir.path().join("cache").exists());
    }

    #[tokio::test]
    async fn test_no_artifact_for_selected_source() {
        let dir = tempfile::tempdir().unwrap();
        let inst = installer(dir.path(), InstallOptions::default(), FormulaIndex::new());

        let err = inst.install_formula(&formula("bare")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorType::ConfigurationError);
        assert!(!inst.is_formula_installed("bare").unwrap());

        let forced = installer(
            dir.path(),
            InstallOptions {
                force_bottle: true,
                ..Default::default()
            },
            FormulaIndex::new(),
        );
        let err = forced.install_formula(&formula("bare")).await.unwrap_err();
        assert!(err.to_string().contains("no bottle"));
    }
}
