//! Pathname expansion against the host's directory listing

use std::path::{Path, PathBuf};

use super::pattern::{self, Mode};
use super::{Config, Options};
use crate::error::Result;

/// Expand a pattern into the sorted list of matching paths. Relative
/// patterns match below [`Config::dir`] and give relative results.
pub(crate) fn glob(cfg: &dyn Config, pat: &str, opts: &Options) -> Result<Vec<String>> {
    let base = cfg.dir();
    let (mut matches, rest) = match pat.strip_prefix('/') {
        Some(rest) => (vec!["/".to_string()], rest),
        None => (vec![String::new()], pat),
    };
    let comps: Vec<&str> = rest.split('/').filter(|c| !c.is_empty()).collect();
    let trailing_slash = pat.ends_with('/') && !comps.is_empty();

    for (i, comp) in comps.iter().enumerate() {
        let last = i + 1 == comps.len();
        let dirs_only = !last || trailing_slash;
        let mut next = Vec::new();

        if opts.glob_star && *comp == "**" {
            for m in &matches {
                if !last {
                    next.push(m.clone());
                }
                walk(cfg, &base, m, opts, !dirs_only, &mut next);
            }
        } else if pattern::has_meta(comp) {
            let mode = Mode {
                filenames: true,
                entire_string: true,
                no_case: opts.no_case_glob,
                ..Default::default()
            };
            let re = pattern::compile(comp, mode)?;
            let show_hidden = opts.dot_glob || comp.starts_with('.') || comp.starts_with("\\.");
            for m in &matches {
                let Ok(mut entries) = cfg.read_dir(&resolve(&base, m)) else {
                    continue;
                };
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                for entry in entries {
                    if entry.name == "." || entry.name == ".." {
                        continue;
                    }
                    if entry.name.starts_with('.') && !show_hidden {
                        continue;
                    }
                    if dirs_only && !entry.is_dir {
                        continue;
                    }
                    if re.is_match(&entry.name) {
                        next.push(join(m, &entry.name));
                    }
                }
            }
        } else {
            let name = pattern::unescape(comp);
            for m in &matches {
                let candidate = join(m, &name);
                if cfg.exists(&resolve(&base, &candidate)) {
                    next.push(candidate);
                }
            }
        }

        matches = next;
        if matches.is_empty() {
            break;
        }
    }

    if trailing_slash {
        for m in &mut matches {
            m.push('/');
        }
    }
    matches.sort();
    matches.dedup();
    Ok(matches)
}

/// Collect everything below `m` for `**`. Symlinked directories are listed
/// but not descended into.
fn walk(
    cfg: &dyn Config,
    base: &Path,
    m: &str,
    opts: &Options,
    include_files: bool,
    out: &mut Vec<String>,
) {
    let mut stack = vec![m.to_string()];
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = cfg.read_dir(&resolve(base, &dir)) else {
            continue;
        };
        entries.sort_by(|a, b| b.name.cmp(&a.name));
        for entry in entries {
            if entry.name.starts_with('.') && !opts.dot_glob {
                continue;
            }
            let path = join(&dir, &entry.name);
            if entry.is_dir {
                out.push(path.clone());
                if !entry.is_symlink {
                    stack.push(path);
                }
            } else if include_files {
                out.push(path);
            }
        }
    }
}

fn resolve(base: &Path, m: &str) -> PathBuf {
    if m.is_empty() {
        base.to_path_buf()
    } else {
        base.join(m)
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::testing::TestConfig;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn setup() -> (tempfile::TempDir, TestConfig) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/main.rs"), "").unwrap();
        fs::write(root.join("src/nested/lib.rs"), "").unwrap();
        fs::write(root.join("README.md"), "").unwrap();
        fs::write(root.join("Cargo.toml"), "").unwrap();
        let cfg = TestConfig {
            dir: root.to_path_buf(),
            ..Default::default()
        };
        (dir, cfg)
    }

    #[test]
    fn test_single_component() {
        let (_dir, cfg) = setup();
        let opts = Options::default();
        assert_eq!(glob(&cfg, "*.md", &opts).unwrap(), vec!["README.md"]);
        assert_eq!(
            glob(&cfg, "*", &opts).unwrap(),
            vec!["Cargo.toml", "README.md", "src"]
        );
    }

    #[test]
    fn test_multi_component_and_dirs_only() {
        let (_dir, cfg) = setup();
        let opts = Options::default();
        assert_eq!(glob(&cfg, "src/*.rs", &opts).unwrap(), vec!["src/main.rs"]);
        assert_eq!(glob(&cfg, "*/", &opts).unwrap(), vec!["src/"]);
        assert_eq!(
            glob(&cfg, "s*/n*/*.rs", &opts).unwrap(),
            vec!["src/nested/lib.rs"]
        );
    }

    #[test]
    fn test_hidden_entries() {
        let (_dir, cfg) = setup();
        let mut opts = Options::default();
        assert_eq!(glob(&cfg, ".g*", &opts).unwrap(), vec![".git"]);
        assert!(!glob(&cfg, "*", &opts).unwrap().contains(&".git".to_string()));
        opts.dot_glob = true;
        assert!(glob(&cfg, "*", &opts).unwrap().contains(&".git".to_string()));
    }

    #[test]
    fn test_globstar() {
        let (_dir, cfg) = setup();
        let mut opts = Options::default();
        assert_eq!(glob(&cfg, "**/*.rs", &opts).unwrap(), Vec::<String>::new());
        opts.glob_star = true;
        assert_eq!(
            glob(&cfg, "**/*.rs", &opts).unwrap(),
            vec!["src/main.rs", "src/nested/lib.rs"]
        );
    }

    #[test]
    fn test_no_case() {
        let (_dir, cfg) = setup();
        let opts = Options {
            no_case_glob: true,
            ..Default::default()
        };
        assert_eq!(glob(&cfg, "readme.*", &opts).unwrap(), vec!["README.md"]);
    }

    #[test]
    fn test_absolute_pattern() {
        let (dir, cfg) = setup();
        let opts = Options::default();
        let pat = format!("{}/*.toml", dir.path().display());
        assert_eq!(
            glob(&cfg, &pat, &opts).unwrap(),
            vec![format!("{}/Cargo.toml", dir.path().display())]
        );
    }
}
