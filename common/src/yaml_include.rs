use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use yaml_rust2::{Yaml, YamlLoader};

const INCLUDE_DIRECTIVE: &str = "!include";

#[derive(Debug, Error)]
pub enum YamlIncludeError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: yaml_rust2::ScanError,
    },
    #[error("Include cycle detected at {0}")]
    Cycle(PathBuf),
}

/// Loads a YAML file where lines of the form `!include other.yaml` pull in
/// other files relative to the including file. Keys of the including file
/// override keys from its includes; later includes override earlier ones.
pub fn load_yaml_with_includes(path: &Path) -> Result<Yaml, YamlIncludeError> {
    let mut stack = Vec::new();
    process_includes_recursive(path, &mut stack)
}

fn process_includes_recursive(
    path: &Path,
    stack: &mut Vec<PathBuf>,
) -> Result<Yaml, YamlIncludeError> {
    let path = path.to_path_buf();
    if stack.contains(&path) {
        return Err(YamlIncludeError::Cycle(path));
    }
    stack.push(path.clone());

    let contents = fs::read_to_string(&path).map_err(|source| YamlIncludeError::Read {
        path: path.clone(),
        source,
    })?;
    let base_path = path.parent().unwrap_or(Path::new(""));

    let (includes, rest): (Vec<&str>, Vec<&str>) = contents
        .lines()
        .partition(|&line| line.trim().starts_with(INCLUDE_DIRECTIVE));

    let mut merged_includes: Option<Yaml> = None;
    for line in includes {
        let include_path = line.trim()[INCLUDE_DIRECTIVE.len()..].trim();
        let included = process_includes_recursive(&base_path.join(include_path), stack)?;
        merged_includes = Some(match merged_includes {
            Some(acc) => merge_yaml(&acc, &included),
            None => included,
        });
    }

    let rest_yamls =
        YamlLoader::load_from_str(&rest.join("\n")).map_err(|source| YamlIncludeError::Parse {
            path: path.clone(),
            source,
        })?;
    let merged_rest = rest_yamls
        .into_iter()
        .reduce(|acc, doc| merge_yaml(&acc, &doc));

    stack.pop();

    Ok(match (merged_includes, merged_rest) {
        (Some(includes), Some(rest)) => merge_yaml(&includes, &rest),
        (Some(includes), None) => includes,
        (None, Some(rest)) => rest,
        (None, None) => Yaml::Null,
    })
}

fn merge_yaml(base: &Yaml, override_yaml: &Yaml) -> Yaml {
    match (base, override_yaml) {
        (Yaml::Hash(base_hash), Yaml::Hash(override_hash)) => {
            let mut result = base_hash.clone();
            for (key, value) in override_hash {
                let merged = match base_hash.get(key) {
                    Some(base_value) => merge_yaml(base_value, value),
                    None => value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Yaml::Hash(result)
        }
        (base_value, Yaml::Null) => base_value.clone(),
        (_, override_value) => override_value.clone(),
    }
}
