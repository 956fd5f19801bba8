use anyhow::{Context, Result, bail};
use colored::Colorize;
use pourover::{
    Cellar, Config, ConsoleReporter, FixedPlatform, FormulaDirectory, FormulaProvider, HostPlatform,
    InstallOptions, Installer, PlatformTagProvider, Reporter,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct InstallArgs {
    pub formulae: Vec<String>,
    pub formula_dir: PathBuf,
    pub options: InstallOptions,
    pub platform: Option<String>,
    pub retries: u32,
}

pub async fn install(args: InstallArgs) -> Result<()> {
    if args.formulae.is_empty() {
        bail!("no formulae given");
    }

    let reporter = Arc::new(ConsoleReporter::new(args.options.verbose));
    let platform: Arc<dyn PlatformTagProvider> = match args.platform {
        Some(tag) => Arc::new(FixedPlatform::new(tag)),
        None => Arc::new(HostPlatform),
    };
    let installer = Installer::new(
        Config::from_env(),
        args.options,
        Arc::new(FormulaDirectory::new(&args.formula_dir)),
        platform,
        reporter.clone(),
    )?;

    if installer.options().dry_run {
        reporter.info("Dry run mode - no packages will be installed");
    }

    let mut failures = Vec::new();
    for name in &args.formulae {
        let mut attempt = 0;
        loop {
            let result = installer.install(name).await;
            let Some(err) = result.error else {
                reporter.debug(&format!(
                    "{} {} finished in {:.1}s",
                    result.name,
                    result.version,
                    result.duration.as_secs_f64()
                ));
                break;
            };

            // Retry is the caller's call, bounded by both the policy and --retries
            let policy = err.retry_policy();
            if policy.can_retry && attempt < policy.max_retries.min(args.retries) {
                attempt += 1;
                reporter.warning(&format!(
                    "{} (retry {} in {}s)",
                    err,
                    attempt,
                    policy.retry_delay.as_secs()
                ));
                tokio::time::sleep(policy.retry_delay).await;
                continue;
            }

            reporter.render_error(&err);
            failures.push(name.clone());
            break;
        }
    }

    if !failures.is_empty() {
        bail!("failed to install: {}", failures.join(", "));
    }
    Ok(())
}

pub fn verify(name: &str, formula_dir: Option<&Path>) -> Result<()> {
    let config = Config::from_env();
    let cellar = Cellar::new(config.cellar.clone());
    let keg = cellar
        .installed_versions(name)?
        .into_iter()
        .next()
        .with_context(|| format!("{} is not installed", name))?;

    let artifacts = match formula_dir {
        Some(dir) => FormulaDirectory::new(dir).formula(name)?.artifacts,
        None => vec![],
    };

    let outcome = pourover::verify::verify_installation(&keg.path, &artifacts);
    println!("{} {} {}", "==>".blue().bold(), keg.name.bold(), keg.version);
    for check in &outcome.checks {
        let mark = if check.passed { "✓".green() } else { "✗".red() };
        println!("  {} {}: {}", mark, check.name, check.detail);
    }

    if !outcome.success {
        bail!("{} failed verification: {}", name, outcome.summary);
    }
    println!("{} {}", "✓".green(), outcome.summary);
    Ok(())
}

pub fn detect(dir: &Path, prefix: Option<PathBuf>) -> Result<()> {
    let prefix = prefix.unwrap_or_else(|| Config::from_env().prefix);
    let plan = pourover::detect_build_system(dir, &prefix)?;

    println!("{} {}", "Build system:".bold(), plan.label().cyan());
    for (i, command) in plan.commands.iter().enumerate() {
        println!("  {}. {}", i + 1, command.join(" "));
    }
    Ok(())
}

pub fn platform() {
    println!("{}", HostPlatform.platform_tag());
}
