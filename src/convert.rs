/*!
    Format conversion between Swagger 2.0 and OpenAPI 3.0.

    The conversions themselves are done by external command line tools (run through
    `npx`); this module decides when to call them, where their output goes, and makes
    sure whatever they write is re-emitted through our own YAML writer.
*/

use crate::backend::validate_backend_file;
use crate::error::{AppError, AppResult};
use crate::openapi::{read_yaml, SpecFormat};
use log::{debug, info};
use serde_yaml::Value;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

/// External converters and validators the pipeline shells out to.
pub trait ExternalTools {
    /// Convert a Swagger 2.0 document at `input` into OpenAPI 3.0 at `output`.
    fn swagger2_to_openapi3(&self, input: &Path, output: &Path) -> AppResult<()>;
    /// Convert an OpenAPI 3.0 document at `input` into Swagger 2.0 YAML at `output`.
    fn openapi3_to_swagger2(&self, input: &Path, output: &Path) -> AppResult<()>;
    /// Schema-validate a Swagger 2.0 document.
    fn validate_swagger(&self, path: &Path) -> AppResult<()>;
}

/// Runs the Node tooling via `npx`.
pub struct NpxTools;

impl NpxTools {
    fn run(tool: &str, args: &[&OsStr]) -> AppResult<std::process::Output> {
        debug!("Running npx {} {:?}", tool, args);
        let output = Command::new("npx").arg(tool).args(args).output()?;
        if !output.status.success() {
            return Err(AppError::ExternalTool {
                tool: tool.to_string(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output)
    }
}

impl ExternalTools for NpxTools {
    fn swagger2_to_openapi3(&self, input: &Path, output: &Path) -> AppResult<()> {
        Self::run("swagger2openapi", &[OsStr::new("-o"), output.as_os_str(), input.as_os_str()])?;
        Ok(())
    }

    fn openapi3_to_swagger2(&self, input: &Path, output: &Path) -> AppResult<()> {
        let result = Self::run(
            "api-spec-converter",
            &[
                OsStr::new("-f"),
                OsStr::new("openapi_3"),
                OsStr::new("-t"),
                OsStr::new("swagger_2"),
                OsStr::new("-s"),
                OsStr::new("yaml"),
                input.as_os_str(),
            ],
        )?;
        std::fs::write(output, result.stdout)?;
        Ok(())
    }

    fn validate_swagger(&self, path: &Path) -> AppResult<()> {
        Self::run("swagger-cli", &[OsStr::new("validate"), path.as_os_str()])?;
        Ok(())
    }
}

/// Where the OpenAPI 3.0 rendition of a Swagger 2.0 service spec is written.
pub fn converted_path(service_file: &Path, gateway: &str, generate_dir: &Path) -> PathBuf {
    let stem = service_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    generate_dir.join(format!("{}-converted-{}.yaml", stem, gateway))
}

/// Make sure `file` is an OpenAPI 3.0 document.
///
/// OpenAPI 3.0.x files are returned as-is. Swagger 2.0 files are converted into
/// `generate_dir` and the path of the converted copy is returned. Anything else
/// is an [`AppError::UnsupportedFormat`].
pub fn normalize(tools: &dyn ExternalTools, file: &Path, gateway: &str, generate_dir: &Path) -> AppResult<PathBuf> {
    let doc: Value = read_yaml(file)?;
    match SpecFormat::detect(&doc) {
        Some(SpecFormat::OpenApi30) => {
            debug!("Spec is already OpenAPI 3.0.x: {}", file.display());
            Ok(file.to_path_buf())
        }
        Some(SpecFormat::Swagger2) => {
            info!("Converting Swagger 2.0 spec to OpenAPI 3.0: {}", file.display());
            std::fs::create_dir_all(generate_dir)?;
            let converted = converted_path(file, gateway, generate_dir);
            tools.swagger2_to_openapi3(file, &converted)?;

            let converted_doc: Value = read_yaml(&converted)?;
            std::fs::write(&converted, serde_yaml::to_string(&converted_doc)?)?;
            Ok(converted)
        }
        None => Err(AppError::UnsupportedFormat(file.to_path_buf())),
    }
}

/// Output path of the Swagger 2.0 rendition of a gateway spec.
pub fn swagger_path(gateway_file: &Path) -> PathBuf {
    let stem = gateway_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    gateway_file.with_file_name(format!("{}-swagger.yaml", stem))
}

/// Convert every OpenAPI 3.0 gateway spec in `gateway_dir` to Swagger 2.0 and gate
/// the result on the external validator and the backend address check.
///
/// Returns the Swagger files written.
pub fn convert_gateway_specs(tools: &dyn ExternalTools, gateway_dir: &Path) -> AppResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(gateway_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "yaml").unwrap_or(false))
        .collect();
    files.sort();

    let mut written = Vec::new();
    for file in files {
        let doc: Value = read_yaml(&file)?;
        if SpecFormat::detect(&doc) != Some(SpecFormat::OpenApi30) {
            info!("Skipping {} (not OpenAPI 3.0)", file.display());
            continue;
        }
        let out = swagger_path(&file);
        tools.openapi3_to_swagger2(&file, &out)?;
        tools.validate_swagger(&out)?;
        let count = validate_backend_file(&out)?;
        info!(
            "Converted and validated: {} -> {} ({} backend annotations)",
            file.display(),
            out.display(),
            count
        );
        written.push(out);
    }
    Ok(written)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Stand-in for the npx tools: writes canned documents and records calls.
    #[derive(Default)]
    pub(crate) struct FakeTools {
        pub openapi3: String,
        pub swagger2: String,
        pub calls: RefCell<Vec<String>>,
    }

    impl ExternalTools for FakeTools {
        fn swagger2_to_openapi3(&self, input: &Path, output: &Path) -> AppResult<()> {
            self.calls.borrow_mut().push(format!("to3 {}", input.display()));
            std::fs::write(output, &self.openapi3)?;
            Ok(())
        }

        fn openapi3_to_swagger2(&self, input: &Path, output: &Path) -> AppResult<()> {
            self.calls.borrow_mut().push(format!("to2 {}", input.display()));
            std::fs::write(output, &self.swagger2)?;
            Ok(())
        }

        fn validate_swagger(&self, path: &Path) -> AppResult<()> {
            self.calls.borrow_mut().push(format!("validate {}", path.display()));
            Ok(())
        }
    }

    #[test]
    fn test_openapi3_is_returned_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("users.yaml");
        std::fs::write(&file, "openapi: 3.0.1\npaths: {}\n").expect("write");
        let tools = FakeTools::default();

        let out = normalize(&tools, &file, "app", &dir.path().join(".generate")).expect("normalize");
        assert_eq!(out, file);
        assert!(tools.calls.borrow().is_empty());
        assert!(!dir.path().join(".generate").exists());
    }

    #[test]
    fn test_swagger2_is_converted_and_rewritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("legacy.yaml");
        std::fs::write(&file, "swagger: '2.0'\npaths: {}\n").expect("write");
        let tools = FakeTools {
            openapi3: r#"{"openapi": "3.0.0", "paths": {"/a": {"get": {"summary": "a"}}}}"#.to_string(),
            ..Default::default()
        };

        let generate_dir = dir.path().join(".generate");
        let out = normalize(&tools, &file, "app", &generate_dir).expect("normalize");
        assert_eq!(out, generate_dir.join("legacy-converted-app.yaml"));

        let rewritten = std::fs::read_to_string(&out).expect("read converted");
        assert!(rewritten.starts_with("openapi: 3.0.0\n"), "not re-emitted as YAML: {}", rewritten);
    }

    #[test]
    fn test_unknown_version_is_unsupported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("new.yaml");
        std::fs::write(&file, "openapi: 3.1.0\n").expect("write");

        let err = normalize(&FakeTools::default(), &file, "app", dir.path()).expect_err("3.1 is unsupported");
        assert!(matches!(err, AppError::UnsupportedFormat(p) if p == file));
    }

    #[test]
    fn test_convert_skips_non_openapi3_and_validates_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("app.yaml"), "openapi: 3.0.0\npaths: {}\n").expect("write");
        std::fs::write(dir.path().join("old-swagger.yaml"), "swagger: '2.0'\n").expect("write");
        let tools = FakeTools {
            swagger2: "swagger: '2.0'\npaths:\n  /a:\n    get:\n      x-google-backend:\n        address: https://svc\n"
                .to_string(),
            ..Default::default()
        };

        let written = convert_gateway_specs(&tools, dir.path()).expect("convert");
        assert_eq!(written, vec![dir.path().join("app-swagger.yaml")]);
        assert_eq!(tools.calls.borrow().len(), 2);
    }

    #[test]
    fn test_convert_fails_when_backend_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("app.yaml"), "openapi: 3.0.0\npaths: {}\n").expect("write");
        let tools = FakeTools { swagger2: "swagger: '2.0'\npaths: {}\n".to_string(), ..Default::default() };

        let err = convert_gateway_specs(&tools, dir.path()).expect_err("no backend annotation");
        assert!(matches!(err, AppError::BackendAbsent(_)));
    }
}
