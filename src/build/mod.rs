//! Build system detection.
//!
//! A source tree is matched against an ordered table of build systems. The first
//! entry whose marker files are all present at the root wins, so more specific
//! systems come first: a CMake project that still has a `Makefile` from an earlier
//! build is a CMake project.
//!
//! Detection returns a [`BuildPlan`]: a list of argument vectors run without a shell
//! from the source root, with the install prefix substituted in.

mod runner;

pub use runner::{BuildEnvironment, run_plan};

use crate::error::{InstallError, Result};
use std::fmt;
use std::path::Path;

/// Supported build ecosystems, in detection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildSystem {
    AutotoolsGenerate,
    Autotools,
    CMake,
    Meson,
    PythonSetuptools,
    PythonPip,
    Cargo,
    GoModules,
    Npm,
    Ninja,
    Bazel,
    Makefile,
}

impl BuildSystem {
    /// Detection order. Earlier entries shadow later ones.
    pub const ALL: [BuildSystem; 12] = [
        BuildSystem::AutotoolsGenerate,
        BuildSystem::Autotools,
        BuildSystem::CMake,
        BuildSystem::Meson,
        BuildSystem::PythonSetuptools,
        BuildSystem::PythonPip,
        BuildSystem::Cargo,
        BuildSystem::GoModules,
        BuildSystem::Npm,
        BuildSystem::Ninja,
        BuildSystem::Bazel,
        BuildSystem::Makefile,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BuildSystem::AutotoolsGenerate => "autotools-generate",
            BuildSystem::Autotools => "autotools",
            BuildSystem::CMake => "cmake",
            BuildSystem::Meson => "meson",
            BuildSystem::PythonSetuptools => "python-setuptools",
            BuildSystem::PythonPip => "python-pip",
            BuildSystem::Cargo => "rust-cargo",
            BuildSystem::GoModules => "go-modules",
            BuildSystem::Npm => "npm",
            BuildSystem::Ninja => "ninja",
            BuildSystem::Bazel => "bazel",
            BuildSystem::Makefile => "makefile",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }

    /// Files that must all exist at the source root
    pub fn markers(&self) -> &'static [&'static str] {
        match self {
            BuildSystem::AutotoolsGenerate => &["configure.ac", "Makefile.am"],
            BuildSystem::Autotools => &["configure"],
            BuildSystem::CMake => &["CMakeLists.txt"],
            BuildSystem::Meson => &["meson.build"],
            BuildSystem::PythonSetuptools => &["setup.py"],
            BuildSystem::PythonPip => &["pyproject.toml"],
            BuildSystem::Cargo => &["Cargo.toml"],
            BuildSystem::GoModules => &["go.mod"],
            BuildSystem::Npm => &["package.json"],
            BuildSystem::Ninja => &["build.ninja"],
            BuildSystem::Bazel => &["WORKSPACE", "BUILD"],
            BuildSystem::Makefile => &["Makefile"],
        }
    }

    pub fn matches(&self, source_dir: &Path) -> bool {
        self.markers()
            .iter()
            .all(|marker| source_dir.join(marker).exists())
    }

    /// Commands that build and install into `prefix`
    pub fn commands(&self, prefix: &Path) -> Vec<Vec<String>> {
        let prefix = prefix.display().to_string();
        let bin = Path::new(&prefix).join("bin").display().to_string();

        let plan: Vec<Vec<String>> = match self {
            BuildSystem::AutotoolsGenerate => vec![
                argv(&["autoreconf", "-i"]),
                vec!["./configure".into(), format!("--prefix={}", prefix)],
                argv(&["make"]),
                argv(&["make", "install"]),
            ],
            BuildSystem::Autotools => vec![
                vec!["./configure".into(), format!("--prefix={}", prefix)],
                argv(&["make"]),
                argv(&["make", "install"]),
            ],
            BuildSystem::CMake => vec![
                vec![
                    "cmake".into(),
                    "-S".into(),
                    ".".into(),
                    "-B".into(),
                    "build".into(),
                    format!("-DCMAKE_INSTALL_PREFIX={}", prefix),
                ],
                argv(&["cmake", "--build", "build"]),
                argv(&["cmake", "--install", "build"]),
            ],
            BuildSystem::Meson => vec![
                vec![
                    "meson".into(),
                    "setup".into(),
                    "build".into(),
                    format!("--prefix={}", prefix),
                ],
                argv(&["ninja", "-C", "build"]),
                argv(&["ninja", "-C", "build", "install"]),
            ],
            BuildSystem::PythonSetuptools => vec![
                argv(&["python3", "setup.py", "build"]),
                vec![
                    "python3".into(),
                    "setup.py".into(),
                    "install".into(),
                    format!("--prefix={}", prefix),
                ],
            ],
            BuildSystem::PythonPip => vec![vec![
                "pip3".into(),
                "install".into(),
                format!("--prefix={}", prefix),
                ".".into(),
            ]],
            BuildSystem::Cargo => vec![
                argv(&["cargo", "build", "--release"]),
                vec![
                    "cargo".into(),
                    "install".into(),
                    "--path".into(),
                    ".".into(),
                    "--root".into(),
                    prefix,
                ],
            ],
            // A trailing separator makes `go build` treat -o as a directory
            BuildSystem::GoModules => vec![vec![
                "go".into(),
                "build".into(),
                "-o".into(),
                format!("{}/", bin),
                "./...".into(),
            ]],
            BuildSystem::Npm => vec![
                argv(&["npm", "install"]),
                argv(&["npm", "run", "build", "--if-present"]),
                vec![
                    "npm".into(),
                    "install".into(),
                    "--global".into(),
                    "--prefix".into(),
                    prefix,
                    ".".into(),
                ],
            ],
            BuildSystem::Ninja => vec![argv(&["ninja"]), argv(&["ninja", "install"])],
            BuildSystem::Bazel => vec![
                argv(&["bazel", "build", "//..."]),
                vec!["cp".into(), "-RL".into(), "bazel-bin/.".into(), bin],
            ],
            BuildSystem::Makefile => vec![argv(&["make"]), argv(&["make", "install"])],
        };
        plan
    }

    /// Remediation hints for a failure of this build system
    pub fn suggestions(&self, failed_command: &str) -> Vec<String> {
        let mut out: Vec<String> = match self {
            BuildSystem::AutotoolsGenerate => vec![
                "Install autoconf, automake, and libtool (autoreconf needs all three)".into(),
                "Check config.log in the source directory for the failing test".into(),
            ],
            BuildSystem::Autotools => vec![
                "Check config.log in the source directory for the failing test".into(),
                "Make sure pkg-config can find the formula's dependencies".into(),
            ],
            BuildSystem::CMake => vec![
                "Check the CMake version required by CMakeLists.txt".into(),
                "Inspect build/CMakeFiles/CMakeError.log for configure failures".into(),
                "Set CMAKE_PREFIX_PATH if dependencies are not found".into(),
            ],
            BuildSystem::Meson => vec![
                "Install meson and ninja".into(),
                "Inspect build/meson-logs/meson-log.txt".into(),
            ],
            BuildSystem::PythonSetuptools => vec![
                "Make sure python3 and setuptools are installed".into(),
                "Check that the Python headers are available for C extensions".into(),
            ],
            BuildSystem::PythonPip => vec![
                "Make sure pip3 is installed and up to date".into(),
                "Check the build-system requirements in pyproject.toml".into(),
            ],
            BuildSystem::Cargo => vec![
                "Update the Rust toolchain with `rustup update`".into(),
                "Check that Cargo.lock is compatible with the installed cargo".into(),
                "Make sure the crate defines at least one binary target".into(),
            ],
            BuildSystem::GoModules => vec![
                "Check the module path declared in go.mod".into(),
                "Make sure the installed Go toolchain satisfies the go directive in go.mod".into(),
                "Check GOFLAGS and GOPROXY in your environment".into(),
            ],
            BuildSystem::Npm => vec![
                "Check the Node.js version required by package.json (engines)".into(),
                "Remove node_modules and package-lock.json and try again".into(),
            ],
            BuildSystem::Ninja => vec![
                "Make sure ninja is installed".into(),
                "Check that build.ninja defines an install target".into(),
            ],
            BuildSystem::Bazel => vec![
                "Check the Bazel version pinned in .bazelversion".into(),
                "Run `bazel clean --expunge` and try again".into(),
            ],
            BuildSystem::Makefile => vec![
                "Check that the Makefile honours PREFIX or DESTDIR for installation".into(),
                "Make sure the required compiler is installed".into(),
            ],
        };
        if !failed_command.is_empty() {
            out.push(format!("Re-run `{}` in the source directory to reproduce", failed_command));
        }
        out
    }
}

impl fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// The detected system and the commands to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub system: BuildSystem,
    pub commands: Vec<Vec<String>>,
}

impl BuildPlan {
    pub fn label(&self) -> &'static str {
        self.system.label()
    }
}

/// Detect the build system of `source_dir` and plan an install into `install_prefix`
pub fn detect_build_system(source_dir: &Path, install_prefix: &Path) -> Result<BuildPlan> {
    if !source_dir.is_dir() {
        return Err(InstallError::build(format!(
            "source directory for build does not exist: {}",
            source_dir.display()
        ))
        .with_operation("detect build system"));
    }

    BuildSystem::ALL
        .into_iter()
        .find(|system| system.matches(source_dir))
        .map(|system| {
            tracing::debug!(system = %system, dir = %source_dir.display(), "detected build system");
            BuildPlan {
                system,
                commands: system.commands(install_prefix),
            }
        })
        .ok_or_else(|| {
            InstallError::build(format!(
                "no build system detected in {}",
                source_dir.display()
            ))
            .with_operation("detect build system")
            .with_suggestions(build_system_suggestions("unknown", ""))
        })
}

/// True if `dir` has a marker of any supported build system at its root
pub fn has_build_marker(dir: &Path) -> bool {
    BuildSystem::ALL.iter().any(|system| system.matches(dir))
}

/// Suggestions for a failed build, by build-system label. Never empty.
pub fn build_system_suggestions(label: &str, failed_command: &str) -> Vec<String> {
    match BuildSystem::from_label(label) {
        Some(system) => system.suggestions(failed_command),
        None => {
            let mut out = vec![
                "Check that the archive contains a supported build system \
                 (configure, CMakeLists.txt, meson.build, Cargo.toml, go.mod, Makefile, ...)"
                    .to_string(),
                "Install the formula from a bottle instead if one is available".to_string(),
                "Re-run with --verbose to see the full build output".to_string(),
            ];
            if !failed_command.is_empty() {
                out.push(format!("Re-run `{}` manually to reproduce", failed_command));
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree(markers: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for marker in markers {
            fs::write(dir.path().join(marker), "").unwrap();
        }
        dir
    }

    fn detect(markers: &[&str]) -> Result<BuildPlan> {
        let dir = tree(markers);
        detect_build_system(dir.path(), Path::new("/opt/pour/Cellar/x/1.0"))
    }

    #[test]
    fn test_cmake_only() {
        let plan = detect(&["CMakeLists.txt"]).unwrap();
        assert_eq!(plan.label(), "cmake");
        assert_eq!(plan.commands.len(), 3);
        assert_eq!(
            plan.commands[0],
            vec![
                "cmake",
                "-S",
                ".",
                "-B",
                "build",
                "-DCMAKE_INSTALL_PREFIX=/opt/pour/Cellar/x/1.0"
            ]
        );
    }

    #[test]
    fn test_go_modules_only() {
        let plan = detect(&["go.mod"]).unwrap();
        assert_eq!(plan.label(), "go-modules");
        assert_eq!(plan.commands.len(), 1);
        assert!(plan.commands[0].iter().any(|a| a.starts_with("/opt/pour/Cellar/x/1.0/bin")));
    }

    #[test]
    fn test_autotools_generate() {
        let plan = detect(&["configure.ac", "Makefile.am"]).unwrap();
        assert_eq!(plan.label(), "autotools-generate");
        assert_eq!(plan.commands.len(), 4);
        assert_eq!(plan.commands[0], vec!["autoreconf", "-i"]);
        assert_eq!(
            plan.commands[1],
            vec!["./configure", "--prefix=/opt/pour/Cellar/x/1.0"]
        );
    }

    #[test]
    fn test_configure_ac_alone_is_not_autotools_generate() {
        assert!(detect(&["configure.ac"]).is_err());
    }

    #[test]
    fn test_no_markers_fails() {
        let err = detect(&["README.md"]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorType::BuildError);
        assert!(err.to_string().contains("no build system"));
        assert!(!err.suggestions().is_empty());
    }

    #[test]
    fn test_missing_source_dir_fails() {
        let err = detect_build_system(Path::new("/nonexistent/src"), Path::new("/p")).unwrap_err();
        assert!(err.to_string().contains("build"));
    }

    #[test]
    fn test_every_system_detected_from_its_own_markers() {
        let expected_lengths = [
            (BuildSystem::AutotoolsGenerate, 4),
            (BuildSystem::Autotools, 3),
            (BuildSystem::CMake, 3),
            (BuildSystem::Meson, 3),
            (BuildSystem::PythonSetuptools, 2),
            (BuildSystem::PythonPip, 1),
            (BuildSystem::Cargo, 2),
            (BuildSystem::GoModules, 1),
            (BuildSystem::Npm, 3),
            (BuildSystem::Ninja, 2),
            (BuildSystem::Bazel, 2),
            (BuildSystem::Makefile, 2),
        ];
        for (system, len) in expected_lengths {
            let plan = detect(system.markers()).unwrap();
            assert_eq!(plan.system, system);
            assert_eq!(plan.commands.len(), len, "{}", system);
        }
    }

    #[test]
    fn test_priority_order() {
        // Generated Makefile next to CMakeLists.txt
        assert_eq!(detect(&["CMakeLists.txt", "Makefile"]).unwrap().label(), "cmake");
        // configure shipped alongside its sources
        assert_eq!(
            detect(&["configure", "configure.ac", "Makefile.am"]).unwrap().label(),
            "autotools-generate"
        );
        assert_eq!(detect(&["configure", "Makefile"]).unwrap().label(), "autotools");
        assert_eq!(detect(&["setup.py", "pyproject.toml"]).unwrap().label(), "python-setuptools");
        assert_eq!(detect(&["meson.build", "build.ninja"]).unwrap().label(), "meson");
        assert_eq!(detect(&["WORKSPACE", "Makefile"]).unwrap().label(), "makefile");
    }

    #[test]
    fn test_commands_are_argument_vectors() {
        for system in BuildSystem::ALL {
            for cmd in system.commands(Path::new("/prefix with space")) {
                assert!(!cmd.is_empty());
                assert!(!cmd[0].contains(' '), "{:?}", cmd);
            }
        }
    }

    #[test]
    fn test_labels_round_trip() {
        for system in BuildSystem::ALL {
            assert_eq!(BuildSystem::from_label(system.label()), Some(system));
        }
        assert_eq!(BuildSystem::from_label("unknown"), None);
    }

    #[test]
    fn test_suggestions_never_empty() {
        for system in BuildSystem::ALL {
            assert!(!build_system_suggestions(system.label(), "").is_empty());
        }
        assert!(!build_system_suggestions("unknown", "").is_empty());

        let go = build_system_suggestions("go-modules", "go build");
        assert!(go.iter().any(|s| s.contains("go.mod")));
        assert!(go.iter().any(|s| s.contains("GOFLAGS")));
        assert!(go.iter().any(|s| s.contains("go build")));
    }

    #[test]
    fn test_has_build_marker() {
        assert!(has_build_marker(tree(&["Makefile"]).path()));
        assert!(!has_build_marker(tree(&["README"]).path()));
    }
}
