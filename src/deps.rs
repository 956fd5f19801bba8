//! Dependency installation.
//!
//! Dependencies are installed one at a time, in declared order, before the package
//! that needs them. Runtime dependencies come first, then build dependencies (only
//! when the package itself is going to be built). The first failure stops the whole
//! call; later siblings are never attempted.
//!
//! Installs share the Cellar and the scratch directories, so nothing here runs
//! concurrently.

use crate::error::{InstallError, Result};
use crate::formula::Formula;
use crate::install::Installer;
use crate::options::InstallSource;

impl Installer {
    /// Install every missing dependency of `formula`.
    ///
    /// # Errors
    ///
    /// Returns a `DependencyError` naming `formula` and the first dependency that
    /// failed; the dependency's own error is kept as the cause.
    pub async fn install_dependencies(&self, formula: &Formula) -> Result<()> {
        self.install_dependencies_in_chain(formula, std::slice::from_ref(&formula.name))
            .await
    }

    pub(crate) async fn install_dependencies_in_chain(&self, formula: &Formula, chain: &[String]) -> Result<()> {
        for dep in dependencies_to_install(formula, self.select_source(formula)) {
            if self
                .is_formula_installed(dep)
                .map_err(|e| InstallError::dependency(&formula.name, dep, e))?
            {
                tracing::debug!(formula = %formula.name, dependency = %dep, "dependency already installed");
                continue;
            }

            self.reporter
                .info(&format!("Installing dependency {} for {}", dep, formula.name));

            let result = match self.formulae.formula(dep) {
                Ok(dep_formula) => self
                    .install_chain(&dep_formula, chain.to_vec(), false)
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                tracing::warn!(formula = %formula.name, dependency = %dep, error = %e, "dependency failed");
                return Err(InstallError::dependency(&formula.name, dep, e));
            }
        }

        Ok(())
    }
}

/// Runtime dependencies, then build dependencies for source builds
fn dependencies_to_install(formula: &Formula, source: InstallSource) -> impl Iterator<Item = &String> {
    let build_deps = match source {
        InstallSource::Source => formula.build_dependencies.as_slice(),
        InstallSource::Bottle => &[],
    };
    formula.dependencies.iter().chain(build_deps.iter())
}
