//! OpenFOAM case directory utilities

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Directories every runnable case must have
pub const REQUIRED_DIRS: [&str; 3] = ["0", "system", "constant"];

/// Version used when nothing is installed under the install root
pub const FALLBACK_VERSION: &str = "openfoam12";

const DECOMPOSE_DICT: &str = "system/decomposeParDict";
const CONTROL_DICT: &str = "system/controlDict";

const PROFILING_SWITCHES: &str = "\
InfoSwitches
{
    time 1;
}

DebugSwitches
{
    // 0 = off, 1 = on
    InfoSwitch          1;
    TimeRegistry        1;
}
";

#[derive(Debug, Error)]
pub enum CaseError {
    #[error("{path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("{path} does not contain the required directories 0, system and constant (missing: {missing})")]
    MissingDirs { path: PathBuf, missing: String },

    #[error("{path} not found")]
    MissingFile { path: PathBuf },

    #[error("{path} has no numberOfSubdomains entry")]
    NoSubdomainsEntry { path: PathBuf },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type CaseResult<T> = std::result::Result<T, CaseError>;

/// A validated case directory
#[derive(Debug, Clone)]
pub struct CaseDir {
    root: PathBuf,
}

impl CaseDir {
    /// Open `path`, checking that `0`, `system` and `constant` exist
    pub fn open(path: impl Into<PathBuf>) -> CaseResult<Self> {
        let root = path.into();
        if !root.is_dir() {
            return Err(CaseError::NotADirectory { path: root });
        }

        let missing: Vec<&str> = REQUIRED_DIRS
            .iter()
            .copied()
            .filter(|dir| !root.join(dir).is_dir())
            .collect();
        if !missing.is_empty() {
            return Err(CaseError::MissingDirs {
                path: root,
                missing: missing.join(", "),
            });
        }

        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Rewrite every `numberOfSubdomains` line of `system/decomposeParDict`
    pub fn set_subdomains(&self, cores: u32) -> CaseResult<usize> {
        let path = self.root.join(DECOMPOSE_DICT);
        let content = read_dict(&path)?;

        let (rewritten, replaced) = rewrite_subdomains(&content, cores);
        if replaced == 0 {
            return Err(CaseError::NoSubdomainsEntry { path });
        }

        write_dict(&path, &rewritten)?;
        tracing::info!(cores, path = %path.display(), "decomposeParDict updated");
        Ok(replaced)
    }

    /// `system/controlDict`, which mesh utilities need before they start
    pub fn control_dict(&self) -> CaseResult<PathBuf> {
        let path = self.root.join(CONTROL_DICT);
        if path.is_file() {
            Ok(path)
        } else {
            Err(CaseError::MissingFile { path })
        }
    }

    /// Replace the profiling switch blocks of `system/controlDict`
    pub fn enable_profiling(&self) -> CaseResult<()> {
        let path = self.root.join(CONTROL_DICT);
        let content = read_dict(&path)?;
        write_dict(&path, &insert_profiling_switches(&content))?;
        tracing::info!(path = %path.display(), "profiling switches written");
        Ok(())
    }

    /// Remove `processor*` directories left by a previous decomposition
    pub fn remove_processor_dirs(&self) -> CaseResult<Vec<String>> {
        let io_err = |source| CaseError::Io {
            path: self.root.clone(),
            source,
        };

        let mut removed = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("processor") || !entry.path().is_dir() {
                continue;
            }

            fs::remove_dir_all(entry.path()).map_err(|source| CaseError::Io {
                path: entry.path(),
                source,
            })?;
            tracing::debug!(dir = %name, "removed processor directory");
            removed.push(name);
        }

        removed.sort();
        Ok(removed)
    }
}

/// Installed OpenFOAM versions under `install_root`, sorted
///
/// Falls back to [`FALLBACK_VERSION`] when none is found.
pub fn detect_versions(install_root: &Path) -> Vec<String> {
    let mut versions: Vec<String> = match fs::read_dir(install_root) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("openfoam") || name.starts_with("OpenFOAM"))
            .collect(),
        Err(e) => {
            tracing::debug!(root = %install_root.display(), error = %e, "cannot list install root");
            Vec::new()
        }
    };

    if versions.is_empty() {
        tracing::warn!(
            root = %install_root.display(),
            "no OpenFOAM installation found, using {FALLBACK_VERSION}"
        );
        versions.push(FALLBACK_VERSION.to_string());
    }
    versions.sort();
    versions
}

fn rewrite_subdomains(content: &str, cores: u32) -> (String, usize) {
    let mut replaced = 0;
    let rewritten = content
        .split_inclusive('\n')
        .map(|line| {
            if line.contains("numberOfSubdomains") {
                replaced += 1;
                format!("numberOfSubdomains {cores};\n")
            } else {
                line.to_string()
            }
        })
        .collect();
    (rewritten, replaced)
}

/// Drop existing `InfoSwitches`/`DebugSwitches` blocks and insert fresh ones
/// before the last banner line (or at the end when there is none)
fn insert_profiling_switches(content: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut skipping = false;
    // Blank separator after a dropped block goes with it
    let mut after_block = false;

    for line in content.split_inclusive('\n') {
        if line.contains("InfoSwitches") || line.contains("DebugSwitches") {
            skipping = true;
            continue;
        }
        if skipping {
            if line.contains('}') {
                skipping = false;
                after_block = true;
            }
            continue;
        }
        if std::mem::take(&mut after_block) && line.trim().is_empty() {
            continue;
        }
        kept.push(line);
    }

    let insert_at = kept
        .iter()
        .rposition(|line| line.contains("*****"))
        .unwrap_or(kept.len());

    let mut out = String::with_capacity(content.len() + PROFILING_SWITCHES.len());
    for line in &kept[..insert_at] {
        out.push_str(line);
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(PROFILING_SWITCHES);
    for line in &kept[insert_at..] {
        out.push_str(line);
    }
    out
}

fn read_dict(path: &Path) -> CaseResult<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CaseError::MissingFile {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CaseError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_dict(path: &Path, content: &str) -> CaseResult<()> {
    fs::write(path, content).map_err(|source| CaseError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL_DICT_TEXT: &str = "\
FoamFile
{
    object      controlDict;
}
// * * * * * * * * * * * * * * * * * * * * * //

application     foamRun;

InfoSwitches
{
    time 0;
}

endTime         1;

// ************************************************************************* //
";

    fn make_case() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for sub in REQUIRED_DIRS {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        dir
    }

    #[test]
    fn test_open_requires_case_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("system")).unwrap();

        let err = CaseDir::open(dir.path()).unwrap_err();
        match err {
            CaseError::MissingDirs { missing, .. } => assert_eq!(missing, "0, constant"),
            other => panic!("unexpected error: {other}"),
        }

        let case = make_case();
        assert!(CaseDir::open(case.path()).is_ok());
        assert!(matches!(
            CaseDir::open(case.path().join("nope")),
            Err(CaseError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_set_subdomains_rewrites_entry() {
        let dir = make_case();
        let dict = dir.path().join(DECOMPOSE_DICT);
        fs::write(&dict, "method scotch;\n    numberOfSubdomains  4;\nend\n").unwrap();

        let case = CaseDir::open(dir.path()).unwrap();
        assert_eq!(case.set_subdomains(8).unwrap(), 1);
        assert_eq!(
            fs::read_to_string(&dict).unwrap(),
            "method scotch;\nnumberOfSubdomains 8;\nend\n"
        );
    }

    #[test]
    fn test_control_dict_required_for_mesh_check() {
        let dir = make_case();
        let case = CaseDir::open(dir.path()).unwrap();
        match case.control_dict() {
            Err(CaseError::MissingFile { path }) => assert!(path.ends_with(CONTROL_DICT)),
            other => panic!("unexpected result: {other:?}"),
        }

        fs::write(dir.path().join(CONTROL_DICT), CONTROL_DICT_TEXT).unwrap();
        assert_eq!(
            case.control_dict().unwrap(),
            dir.path().join("system").join("controlDict")
        );
    }

    #[test]
    fn test_set_subdomains_missing_dict() {
        let dir = make_case();
        let case = CaseDir::open(dir.path()).unwrap();
        assert!(matches!(
            case.set_subdomains(2),
            Err(CaseError::MissingFile { .. })
        ));

        fs::write(dir.path().join(DECOMPOSE_DICT), "method scotch;\n").unwrap();
        assert!(matches!(
            case.set_subdomains(2),
            Err(CaseError::NoSubdomainsEntry { .. })
        ));
    }

    #[test]
    fn test_profiling_switches_replace_old_blocks() {
        let out = insert_profiling_switches(CONTROL_DICT_TEXT);

        assert_eq!(out.matches("InfoSwitches").count(), 1);
        assert_eq!(out.matches("DebugSwitches").count(), 1);
        assert!(!out.contains("time 0;"));
        assert!(out.contains("TimeRegistry        1;"));

        let switches = out.find("InfoSwitches").unwrap();
        let banner = out.rfind("*****").unwrap();
        assert!(switches < banner);
        assert!(out.find("endTime").unwrap() < switches);
        assert!(out.ends_with("// ************************************************************************* //\n"));
    }

    #[test]
    fn test_profiling_switches_append_without_banner() {
        let out = insert_profiling_switches("application foamRun;");
        assert!(out.starts_with("application foamRun;\nInfoSwitches\n"));
    }

    #[test]
    fn test_enable_profiling_is_repeatable() {
        let dir = make_case();
        let path = dir.path().join(CONTROL_DICT);
        fs::write(&path, CONTROL_DICT_TEXT).unwrap();

        let case = CaseDir::open(dir.path()).unwrap();
        case.enable_profiling().unwrap();
        let once = fs::read_to_string(&path).unwrap();
        case.enable_profiling().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), once);
    }

    #[test]
    fn test_remove_processor_dirs() {
        let dir = make_case();
        for sub in ["processor0", "processor1/constant"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        fs::write(dir.path().join("processor.txt"), "keep").unwrap();

        let case = CaseDir::open(dir.path()).unwrap();
        assert_eq!(
            case.remove_processor_dirs().unwrap(),
            vec!["processor0".to_string(), "processor1".to_string()]
        );
        assert!(!dir.path().join("processor0").exists());
        assert!(dir.path().join("processor.txt").exists());
        assert!(dir.path().join("system").exists());
    }

    #[test]
    fn test_detect_versions() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(detect_versions(root.path()), vec![FALLBACK_VERSION.to_string()]);

        for sub in ["openfoam11", "OpenFOAM-v2312", "paraview"] {
            fs::create_dir_all(root.path().join(sub)).unwrap();
        }
        assert_eq!(
            detect_versions(root.path()),
            vec!["OpenFOAM-v2312".to_string(), "openfoam11".to_string()]
        );
    }
}
