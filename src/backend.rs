use crate::error::{AppError, AppResult};
use crate::openapi::{read_yaml, BACKEND_KEY};
use log::debug;
use serde_yaml::Value;
use std::path::Path;

/// Check every `x-google-backend` in a converted document.
///
/// Each annotation must be a mapping with a non-empty string `address`; the first
/// one that is not fails with the dotted location of the object carrying it. A
/// document without any annotation fails with [`AppError::BackendAbsent`].
///
/// Returns the number of annotations found.
pub fn validate_backend(doc: &Value, file: &Path) -> AppResult<usize> {
    let mut found = 0;
    walk(doc, "", file, &mut found)?;
    if found == 0 {
        return Err(AppError::BackendAbsent(file.to_path_buf()));
    }
    Ok(found)
}

pub fn validate_backend_file(path: &Path) -> AppResult<usize> {
    let doc: Value = read_yaml(path)?;
    validate_backend(&doc, path)
}

fn walk(value: &Value, location: &str, file: &Path, found: &mut usize) -> AppResult<()> {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let key = key_segment(key);
                if key == BACKEND_KEY {
                    *found += 1;
                    if !has_address(child) {
                        return Err(AppError::MissingBackendAddress {
                            location: location.to_string(),
                            file: file.to_path_buf(),
                        });
                    }
                    debug!("{} at {} ok", BACKEND_KEY, location);
                }
                walk(child, &join(location, &key), file, found)?;
            }
        }
        Value::Sequence(items) => {
            for (index, child) in items.iter().enumerate() {
                walk(child, &join(location, &index.to_string()), file, found)?;
            }
        }
        Value::Tagged(tagged) => walk(&tagged.value, location, file, found)?,
        _ => {}
    }
    Ok(())
}

fn has_address(annotation: &Value) -> bool {
    matches!(annotation.get("address"), Some(Value::String(address)) if !address.is_empty())
}

fn key_segment(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn join(location: &str, key: &str) -> String {
    if location.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", location, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(text: &str) -> AppResult<usize> {
        let doc: Value = serde_yaml::from_str(text).expect("valid yaml");
        validate_backend(&doc, Path::new("gateway/app-swagger.yaml"))
    }

    #[test]
    fn test_counts_annotations() {
        let count = check(
            r#"
swagger: "2.0"
x-google-backend:
  address: https://default.run.app
paths:
  /users:
    get:
      x-google-backend:
        address: https://users.run.app
        path_translation: APPEND_PATH_TO_ADDRESS
"#,
        )
        .expect("valid document");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_missing_address_names_operation_path() {
        let err = check(
            r#"
paths:
  /users:
    get:
      x-google-backend:
        address: https://users.run.app
  /orders:
    post:
      x-google-backend:
        deadline: 30
"#,
        )
        .expect_err("address missing");
        match err {
            AppError::MissingBackendAddress { location, .. } => assert_eq!(location, "paths./orders.post"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_address_rejected() {
        let err = check("paths:\n  /a:\n    get:\n      x-google-backend:\n        address: ''\n").expect_err("empty");
        assert!(err.to_string().contains("paths./a.get"));
    }

    #[test]
    fn test_non_mapping_annotation_rejected() {
        let err = check("x-google-backend: https://x\n").expect_err("not a mapping");
        match err {
            AppError::MissingBackendAddress { location, .. } => assert_eq!(location, ""),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_absent_annotation_is_distinct_error() {
        let err = check("swagger: '2.0'\npaths:\n  /a:\n    get: {}\n").expect_err("absent");
        assert!(matches!(err, AppError::BackendAbsent(_)));
    }

    #[test]
    fn test_annotations_inside_sequences_are_found() {
        let count = check("items:\n  - x-google-backend:\n      address: https://a\n").expect("valid");
        assert_eq!(count, 1);
    }
}
