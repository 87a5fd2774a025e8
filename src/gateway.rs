/*!
    Gateway spec generation.

    `GatewaySpecBuilder` turns the gateway configuration plus the per-service specs into
    one merged OpenAPI 3.0 document per gateway. Every gateway is built in memory
    first; files are only touched once all of them succeeded, and then through staging
    files renamed into place, so a failing run never leaves a mix of old and new
    gateway specs behind.
*/

use crate::config::{Gateway, GatewayConfig, Layout};
use crate::convert::{normalize, ExternalTools};
use crate::error::{AppError, AppResult, MissingSpecs};
use crate::merge::merge_mappings;
use crate::openapi::{read_yaml, GatewaySpec, ServiceSpec, BACKEND_KEY, HTTP_METHODS};
use colored::*;
use log::{debug, error, info, warn};
use serde_yaml::{Mapping, Value};
use similar::{ChangeTag, TextDiff};
use std::path::PathBuf;

/// A gateway spec rendered in memory and not yet written.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltGateway {
    pub id: String,
    pub path: PathBuf,
    pub yaml: String,
}

pub struct GatewaySpecBuilder<'a> {
    layout: &'a Layout,
    tools: &'a dyn ExternalTools,
}

impl<'a> GatewaySpecBuilder<'a> {
    pub fn new(layout: &'a Layout, tools: &'a dyn ExternalTools) -> Self {
        GatewaySpecBuilder { layout, tools }
    }

    /// Every declared service whose spec file does not exist, grouped per gateway.
    pub fn missing_services(&self, config: &GatewayConfig) -> Vec<MissingSpecs> {
        config
            .gateways
            .iter()
            .filter_map(|gateway| {
                let services: Vec<String> = gateway
                    .services
                    .iter()
                    .filter(|s| !self.layout.service_spec(s).exists())
                    .cloned()
                    .collect();
                if services.is_empty() {
                    None
                } else {
                    Some(MissingSpecs { gateway: gateway.id.clone(), services })
                }
            })
            .collect()
    }

    /// Merge all services of one gateway into a fresh document.
    pub fn build_gateway(&self, gateway: &Gateway) -> AppResult<GatewaySpec> {
        let mut spec = GatewaySpec::for_gateway(gateway);
        let mut fallback: Option<Value> = None;

        for service in &gateway.services {
            let file = self.layout.service_spec(service);
            if !file.exists() {
                return Err(AppError::MissingServices(vec![MissingSpecs {
                    gateway: gateway.id.clone(),
                    services: vec![service.clone()],
                }]));
            }

            // The fallback comes from the spec as written, before any conversion.
            if fallback.is_none() {
                let original: ServiceSpec = read_yaml(&file)?;
                fallback = original.backend.filter(|b| !b.is_null());
                if fallback.is_some() {
                    debug!("Using top-level {} of service '{}' as fallback", BACKEND_KEY, service);
                }
            }

            let normalized = normalize(self.tools, &file, &gateway.id, &self.layout.generate_dir)?;
            let service_spec: ServiceSpec = read_yaml(&normalized)?;
            debug!(
                "Merging service '{}' ({} paths) into gateway '{}'",
                service,
                service_spec.paths.len(),
                gateway.id
            );

            merge_mappings(&mut spec.paths, service_spec.paths);
            if let Some(components) = service_spec.components {
                merge_mappings(&mut spec.components.schemas, components.schemas);
                merge_mappings(&mut spec.components.security_schemes, components.security_schemes);
                merge_mappings(&mut spec.components.responses, components.responses);
            }
        }

        if let Some(backend) = &fallback {
            let applied = apply_backend_fallback(&mut spec.paths, backend);
            debug!("Applied fallback {} to {} operations of '{}'", BACKEND_KEY, applied, gateway.id);
        }
        Ok(spec)
    }

    /// Build every gateway in memory. Missing service specs of all gateways are
    /// reported together before anything is merged.
    pub fn build_all(&self, config: &GatewayConfig) -> AppResult<Vec<BuiltGateway>> {
        let missing = self.missing_services(config);
        if !missing.is_empty() {
            for m in &missing {
                error!("Missing service specs for gateway '{}': {}", m.gateway, m.services.join(", "));
            }
            return Err(AppError::MissingServices(missing));
        }

        config
            .gateways
            .iter()
            .map(|gateway| {
                info!("Building gateway spec: {}", gateway.id);
                let spec = self.build_gateway(gateway)?;
                Ok(BuiltGateway {
                    id: gateway.id.clone(),
                    path: self.layout.gateway_spec(&gateway.id),
                    yaml: spec.to_yaml()?,
                })
            })
            .collect()
    }

    /// Write built gateways through staging files, renaming them into place only
    /// after every staging write succeeded.
    pub fn write_all(&self, built: &[BuiltGateway]) -> AppResult<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.layout.gateway_dir)?;

        let mut staged = Vec::with_capacity(built.len());
        for gateway in built {
            let staging = self.layout.gateway_dir.join(format!(".{}.yaml.tmp", gateway.id));
            if let Err(e) = std::fs::write(&staging, &gateway.yaml) {
                for (path, _) in &staged {
                    let _ = std::fs::remove_file(path);
                }
                let _ = std::fs::remove_file(&staging);
                return Err(AppError::Io(e));
            }
            staged.push((staging, gateway.path.clone()));
        }

        let mut written = Vec::with_capacity(staged.len());
        let mut pending = staged.into_iter();
        while let Some((staging, target)) = pending.next() {
            if let Err(e) = std::fs::rename(&staging, &target) {
                error!("Failed to move {} into place: {}", target.display(), e);
                let _ = std::fs::remove_file(&staging);
                for (rest, _) in pending {
                    let _ = std::fs::remove_file(rest);
                }
                return Err(AppError::Io(e));
            }
            info!("Generated gateway spec: {}", target.display());
            written.push(target);
        }
        Ok(written)
    }

    /// Build and write all gateways.
    pub fn build(&self, config: &GatewayConfig) -> AppResult<Vec<PathBuf>> {
        let built = self.build_all(config)?;
        self.write_all(&built)
    }
}

/// Give every operation without its own backend annotation a copy of `backend`.
///
/// Returns how many operations were annotated.
pub fn apply_backend_fallback(paths: &mut Mapping, backend: &Value) -> usize {
    let mut applied = 0;
    for (_, item) in paths.iter_mut() {
        let Some(item) = item.as_mapping_mut() else { continue };
        for (method, operation) in item.iter_mut() {
            let is_operation = method
                .as_str()
                .map(|m| HTTP_METHODS.contains(&m.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !is_operation {
                continue;
            }
            let Some(operation) = operation.as_mapping_mut() else { continue };
            let annotated = operation.get(BACKEND_KEY).map(|b| !b.is_null()).unwrap_or(false);
            if !annotated {
                operation.insert(Value::String(BACKEND_KEY.to_string()), backend.clone());
                applied += 1;
            }
        }
    }
    applied
}

/// Unified diff of `old` against `new`, or `None` when they are identical.
pub fn render_diff(old: &str, new: &str, label: &str) -> Option<String> {
    let old_header = format!("{} (on disk)", label);
    let new_header = format!("{} (generated)", label);
    let diff = TextDiff::from_lines(old, new);
    let mut unified_diff = diff.unified_diff();
    let unified_diff_builder = unified_diff.context_radius(3).header(&old_header, &new_header);

    let mut has_diffs = false;
    let mut output_buffer = String::new();
    for hunk in unified_diff_builder.iter_hunks() {
        has_diffs = true;
        output_buffer.push_str(&format!("@@ {} @@\n", hunk.header()));
        for change in hunk.iter_changes() {
            match change.tag() {
                ChangeTag::Delete => output_buffer.push_str(&format!("{}\n", format!("- {}", change.value().trim_end()).red())),
                ChangeTag::Insert => output_buffer.push_str(&format!("{}\n", format!("+ {}", change.value().trim_end()).green())),
                ChangeTag::Equal => output_buffer.push_str(&format!("  {}\n", change.value().trim_end())),
            }
        }
    }
    has_diffs.then_some(output_buffer)
}

/// Print what `build` would change on disk without writing anything.
///
/// Returns whether any gateway spec differs.
pub fn preview(built: &[BuiltGateway]) -> AppResult<bool> {
    let mut changed = false;
    for gateway in built {
        let current = match std::fs::read_to_string(&gateway.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} does not exist yet", gateway.path.display());
                String::new()
            }
            Err(e) => return Err(AppError::Io(e)),
        };
        match render_diff(&current, &gateway.yaml, &gateway.id) {
            Some(diff) => {
                changed = true;
                println!("--- {} (on disk)", gateway.id);
                println!("+++ {} (generated)", gateway.id);
                print!("{}", diff);
            }
            None => println!("{}: up to date", gateway.id),
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::tests::FakeTools;
    use std::path::Path;

    fn layout(root: &Path) -> Layout {
        let layout = Layout::from_root(root);
        std::fs::create_dir_all(&layout.services_dir).expect("services dir");
        layout
    }

    fn write_service(layout: &Layout, name: &str, body: &str) {
        std::fs::write(layout.service_spec(name), body).expect("write service");
    }

    fn config(json: &str) -> GatewayConfig {
        GatewayConfig::from_json(json).expect("parse config")
    }

    const USERS: &str = r#"openapi: 3.0.0
x-google-backend:
  address: https://users.run.app
paths:
  /users:
    get:
      operationId: listUsers
      responses:
        '200':
          $ref: '#/components/responses/Ok'
components:
  schemas:
    User:
      type: object
      properties:
        id: {type: string}
  responses:
    Ok:
      description: ok
"#;

    const ORDERS: &str = r#"openapi: 3.0.0
paths:
  /orders:
    get:
      operationId: listOrders
    post:
      operationId: createOrder
      x-google-backend:
        address: https://orders.run.app
    parameters:
      - name: tenant
        in: header
components:
  schemas:
    User:
      properties:
        email: {type: string}
    Order:
      type: object
  securitySchemes:
    api_key:
      type: apiKey
      name: key
      in: query
"#;

    const APP_CONFIG: &str = r#"{"gateways": {"app": {"name": "App API Gateway", "description": "App", "version": "1.0.0",
        "hosts": [{"url": "https://app.example.com", "description": "prod"}], "services": ["users", "orders"]}}}"#;

    #[test]
    fn test_build_merges_paths_and_components() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout(dir.path());
        write_service(&layout, "users", USERS);
        write_service(&layout, "orders", ORDERS);
        let tools = FakeTools::default();
        let builder = GatewaySpecBuilder::new(&layout, &tools);

        let spec = builder.build_gateway(&config(APP_CONFIG).gateways[0]).expect("build");

        assert_eq!(spec.info.title, "App API Gateway");
        assert_eq!(spec.servers[0].url, "https://app.example.com");
        assert!(spec.paths.contains_key("/users"));
        assert!(spec.paths.contains_key("/orders"));

        let user = spec.components.schemas.get("User").expect("User schema");
        assert_eq!(user["type"], Value::from("object"));
        assert!(user["properties"].get("id").is_some());
        assert!(user["properties"].get("email").is_some());
        assert!(spec.components.schemas.contains_key("Order"));
        assert!(spec.components.security_schemes.contains_key("api_key"));
        assert!(spec.components.responses.contains_key("Ok"));
    }

    #[test]
    fn test_fallback_backend_applied_to_unannotated_operations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout(dir.path());
        write_service(&layout, "users", USERS);
        write_service(&layout, "orders", ORDERS);
        let tools = FakeTools::default();
        let builder = GatewaySpecBuilder::new(&layout, &tools);

        let spec = builder.build_gateway(&config(APP_CONFIG).gateways[0]).expect("build");
        let orders = spec.paths.get("/orders").expect("orders path");

        assert_eq!(orders["get"][BACKEND_KEY]["address"], Value::from("https://users.run.app"));
        assert_eq!(orders["post"][BACKEND_KEY]["address"], Value::from("https://orders.run.app"));
        assert!(orders["parameters"].is_sequence());
        assert_eq!(spec.paths.get("/users").expect("users path")["get"][BACKEND_KEY]["address"], Value::from("https://users.run.app"));
    }

    #[test]
    fn test_fallback_comes_from_original_swagger_spec() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout(dir.path());
        write_service(
            &layout,
            "legacy",
            "swagger: '2.0'\nx-google-backend:\n  address: https://legacy.run.app\npaths: {}\n",
        );
        let tools = FakeTools {
            openapi3: "openapi: 3.0.0\npaths:\n  /legacy:\n    get:\n      operationId: legacy\n".to_string(),
            ..Default::default()
        };
        let builder = GatewaySpecBuilder::new(&layout, &tools);
        let cfg = config(r#"{"gateways": {"app": {"name": "App", "hosts": [{"url": "u"}], "services": ["legacy"]}}}"#);

        let spec = builder.build_gateway(&cfg.gateways[0]).expect("build");
        assert_eq!(spec.paths.get("/legacy").expect("legacy path")["get"][BACKEND_KEY]["address"], Value::from("https://legacy.run.app"));
        assert!(layout.generate_dir.join("legacy-converted-app.yaml").exists());
    }

    #[test]
    fn test_missing_services_abort_without_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout(dir.path());
        write_service(&layout, "users", USERS);
        let tools = FakeTools::default();
        let builder = GatewaySpecBuilder::new(&layout, &tools);
        let cfg = config(
            r#"{"gateways": {
                "app": {"name": "App", "hosts": [{"url": "u"}], "services": ["users"]},
                "dashboard": {"name": "Dash", "hosts": [{"url": "u"}], "services": ["users", "billing", "audit"]}
            }}"#,
        );

        let err = builder.build(&cfg).expect_err("missing services");
        match err {
            AppError::MissingServices(missing) => assert_eq!(
                missing,
                vec![MissingSpecs {
                    gateway: "dashboard".into(),
                    services: vec!["billing".into(), "audit".into()],
                }]
            ),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!layout.gateway_spec("dashboard").exists());
        assert!(!layout.gateway_spec("app").exists());
    }

    #[test]
    fn test_build_is_byte_identical_across_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout(dir.path());
        write_service(&layout, "users", USERS);
        write_service(&layout, "orders", ORDERS);
        let tools = FakeTools::default();
        let builder = GatewaySpecBuilder::new(&layout, &tools);
        let cfg = config(APP_CONFIG);

        let first = builder.build(&cfg).expect("first build");
        let first_bytes = std::fs::read(&first[0]).expect("read");
        let second = builder.build(&cfg).expect("second build");
        let second_bytes = std::fs::read(&second[0]).expect("read");

        assert_eq!(first, vec![layout.gateway_spec("app")]);
        assert_eq!(first_bytes, second_bytes);
        assert!(!layout.gateway_dir.join(".app.yaml.tmp").exists());
    }

    #[test]
    fn test_unsupported_service_format_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout(dir.path());
        write_service(&layout, "users", "openapi: 3.1.0\npaths: {}\n");
        let tools = FakeTools::default();
        let builder = GatewaySpecBuilder::new(&layout, &tools);
        let cfg = config(r#"{"gateways": {"app": {"hosts": [{"url": "u"}], "services": ["users"]}}}"#);

        let err = builder.build(&cfg).expect_err("unsupported");
        assert!(matches!(err, AppError::UnsupportedFormat(_)));
        assert!(!layout.gateway_spec("app").exists());
    }

    fn staging_files(layout: &Layout) -> Vec<String> {
        std::fs::read_dir(&layout.gateway_dir)
            .expect("gateway dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".yaml.tmp"))
            .collect()
    }

    #[test]
    fn test_later_gateway_failure_keeps_existing_specs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout(dir.path());
        std::fs::create_dir_all(&layout.gateway_dir).expect("gateway dir");
        std::fs::write(layout.gateway_spec("app"), "OLD").expect("seed app spec");
        write_service(&layout, "users", USERS);
        write_service(&layout, "reports", "openapi: 3.1.0\npaths: {}\n");
        let tools = FakeTools::default();
        let builder = GatewaySpecBuilder::new(&layout, &tools);
        let cfg = config(
            r#"{"gateways": {
                "app": {"name": "App", "hosts": [{"url": "u"}], "services": ["users"]},
                "dashboard": {"name": "Dash", "hosts": [{"url": "u"}], "services": ["reports"]}
            }}"#,
        );

        let err = builder.build(&cfg).expect_err("dashboard has an unsupported service");
        assert!(matches!(err, AppError::UnsupportedFormat(_)));
        assert_eq!(std::fs::read_to_string(layout.gateway_spec("app")).expect("read app"), "OLD");
        assert!(!layout.gateway_spec("dashboard").exists());
        assert!(staging_files(&layout).is_empty());
    }

    #[test]
    fn test_failed_rename_removes_remaining_staging_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout(dir.path());
        // A non-empty directory where a spec should go makes the rename fail.
        let blocked = layout.gateway_spec("dashboard");
        std::fs::create_dir_all(&blocked).expect("blocking dir");
        std::fs::write(blocked.join("keep"), "x").expect("blocking file");
        let tools = FakeTools::default();
        let builder = GatewaySpecBuilder::new(&layout, &tools);
        let built: Vec<BuiltGateway> = ["app", "dashboard", "partners"]
            .iter()
            .map(|id| BuiltGateway {
                id: id.to_string(),
                path: layout.gateway_spec(id),
                yaml: format!("id: {}\n", id),
            })
            .collect();

        let err = builder.write_all(&built).expect_err("rename onto a directory");
        assert!(matches!(err, AppError::Io(_)));
        assert!(staging_files(&layout).is_empty());
        assert!(!layout.gateway_spec("partners").exists());
    }

    #[test]
    fn test_merge_keys_are_resolved_in_service_specs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = layout(dir.path());
        write_service(
            &layout,
            "users",
            r#"openapi: 3.0.0
x-common: &common
  tags: [users]
  x-google-backend:
    address: https://users.run.app
paths:
  /users:
    get:
      <<: *common
      operationId: listUsers
"#,
        );
        let tools = FakeTools::default();
        let builder = GatewaySpecBuilder::new(&layout, &tools);
        let cfg = config(r#"{"gateways": {"app": {"hosts": [{"url": "u"}], "services": ["users"]}}}"#);

        let written = builder.build(&cfg).expect("build");
        let text = std::fs::read_to_string(&written[0]).expect("read");
        assert!(!text.contains("<<"));
        let doc: Value = serde_yaml::from_str(&text).expect("parse");
        let get = &doc["paths"]["/users"]["get"];
        assert_eq!(get["operationId"], Value::from("listUsers"));
        assert_eq!(get["tags"][0], Value::from("users"));
        assert_eq!(get[BACKEND_KEY]["address"], Value::from("https://users.run.app"));
    }

    #[test]
    fn test_render_diff_reports_changes_only() {
        assert!(render_diff("a: 1\n", "a: 1\n", "app").is_none());
        let diff = render_diff("a: 1\n", "a: 2\n", "app").expect("diff");
        assert!(diff.contains("a: 1"));
        assert!(diff.contains("a: 2"));
    }
}
