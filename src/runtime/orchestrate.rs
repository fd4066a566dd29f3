//! HTTP dispatch and the create/update/read/delete lifecycle.
//!
//! The dispatcher is backend-switchable: `host` issues real calls through a
//! blocking agent, `scripted` serves responses from an in-process rule table
//! so whole drive loops can run without a live target.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::time::Duration;

use crate::{
    ChainContext, DroverError, DroverResult, EndpointDescriptor, Finding, FindingKind,
    Generator, HttpMethod,
};

use rand_chacha::ChaCha20Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpBackend {
    Host,
    Scripted,
}

impl clap::ValueEnum for HttpBackend {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Host, Self::Scripted]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Host => clap::builder::PossibleValue::new("host"),
            Self::Scripted => clap::builder::PossibleValue::new("scripted"),
        })
    }
}

/// One canned response for the scripted backend. `remaining == u64::MAX`
/// means unlimited.
#[derive(Debug, Clone)]
pub struct ScriptedRule {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub body: String,
    pub remaining: u64,
}

impl ScriptedRule {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            status,
            body: body.into(),
            remaining: u64::MAX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponseData {
    pub status: u16,
    pub body: String,
}

/// Record of one dispatched call, kept for summaries and assertions.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

pub struct HttpDispatcher {
    backend: HttpBackend,
    base_url: String,
    agent: Option<ureq::Agent>,
    auth_token: Option<String>,
    rules: Vec<ScriptedRule>,
    calls: Vec<DispatchRecord>,
}

impl HttpDispatcher {
    pub fn host(
        base_url: impl Into<String>,
        timeout: Duration,
        auth_token: Option<String>,
    ) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            backend: HttpBackend::Host,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent: Some(agent),
            auth_token,
            rules: Vec::new(),
            calls: Vec::new(),
        }
    }

    pub fn scripted() -> Self {
        Self {
            backend: HttpBackend::Scripted,
            base_url: String::new(),
            agent: None,
            auth_token: None,
            rules: Vec::new(),
            calls: Vec::new(),
        }
    }

    pub fn backend(&self) -> HttpBackend {
        self.backend
    }

    pub fn script(&mut self, rule: ScriptedRule) {
        self.rules.push(rule);
    }

    pub fn calls(&self) -> &[DispatchRecord] {
        &self.calls
    }

    /// Issue one call. `path` is relative to the configured base URL. A
    /// non-2xx response is returned as data; only transport-level problems
    /// are errors.
    pub fn dispatch(
        &mut self,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> DroverResult<HttpResponseData> {
        let method = method.to_ascii_uppercase();
        if !matches!(
            method.as_str(),
            "GET" | "POST" | "PUT" | "PATCH" | "DELETE"
        ) {
            return Err(DroverError::InvalidArgument(format!(
                "unsupported http method {method:?}"
            )));
        }

        self.calls.push(DispatchRecord {
            method: method.clone(),
            path: path.to_string(),
            body: body.map(str::to_string),
        });

        match self.backend {
            HttpBackend::Host => self.dispatch_host(&method, path, body),
            HttpBackend::Scripted => self.dispatch_scripted(&method, path),
        }
    }

    fn dispatch_host(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> DroverResult<HttpResponseData> {
        let Some(agent) = &self.agent else {
            return Err(DroverError::RequestFailed(
                "host dispatcher has no agent".to_string(),
            ));
        };
        let url = format!("{}{}", self.base_url, path);
        let mut request = agent
            .request(method, &url)
            .set("Content-Type", "application/json");
        if let Some(token) = &self.auth_token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        let result = match body {
            Some(payload) => request.send_string(payload),
            None => request.call(),
        };
        let response = match result {
            Ok(response) => response,
            // Non-2xx arrives as an error in ureq; surface it as a response.
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => {
                return Err(DroverError::RequestFailed(format!(
                    "{method} {url}: {err}"
                )));
            }
        };

        let status = response.status();
        let body = response.into_string().map_err(|err| {
            DroverError::RequestFailed(format!("body read failed for {method} {url}: {err}"))
        })?;
        Ok(HttpResponseData { status, body })
    }

    fn dispatch_scripted(&mut self, method: &str, path: &str) -> DroverResult<HttpResponseData> {
        let Some(idx) = self
            .rules
            .iter()
            .position(|r| r.remaining > 0 && r.method == method && r.path == path)
        else {
            return Err(DroverError::RequestFailed(format!(
                "no scripted response matches {method} {path}"
            )));
        };
        let rule = &mut self.rules[idx];
        if rule.remaining != u64::MAX {
            rule.remaining -= 1;
        }
        Ok(HttpResponseData {
            status: rule.status,
            body: rule.body.clone(),
        })
    }
}

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleRole {
    Create,
    Update,
    Read,
    Delete,
}

impl LifecycleRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Read => "read",
            Self::Delete => "delete",
        }
    }
}

/// The cataloged endpoints filling each lifecycle role. Create is
/// load-bearing; the others are optional.
#[derive(Debug, Clone)]
pub struct LifecyclePlan {
    pub create: EndpointDescriptor,
    pub update: Option<EndpointDescriptor>,
    pub read: Option<EndpointDescriptor>,
    pub delete: Option<EndpointDescriptor>,
}

impl LifecyclePlan {
    pub fn from_catalog(endpoints: &[EndpointDescriptor]) -> DroverResult<Self> {
        let create = endpoints
            .iter()
            .find(|e| e.method == HttpMethod::Post)
            .cloned()
            .ok_or_else(|| {
                DroverError::InvalidArgument(
                    "catalog has no POST endpoint to create with".to_string(),
                )
            })?;
        let update = endpoints
            .iter()
            .find(|e| e.method == HttpMethod::Put)
            .cloned();
        let read = endpoints
            .iter()
            .find(|e| e.method == HttpMethod::Get && e.path.contains('{'))
            .cloned();
        let delete = endpoints
            .iter()
            .find(|e| e.method == HttpMethod::Delete)
            .cloned();
        Ok(Self {
            create,
            update,
            read,
            delete,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub role: LifecycleRole,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub ok: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IterationReport {
    pub calls: Vec<CallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    pub completed: bool,
}

/// Run one lifecycle iteration. HTTP-level failures become findings on the
/// report; an `Err` from here means a contract violation (e.g. an unresolved
/// schema reached generation), which the Driver also treats as
/// iteration-local.
pub fn run_iteration(
    plan: &LifecyclePlan,
    generator: &Generator,
    dispatcher: &mut HttpDispatcher,
    id_field: &str,
    ctx: &mut ChainContext,
    rng: &mut ChaCha20Rng,
) -> DroverResult<IterationReport> {
    let mut report = IterationReport::default();

    let create = &plan.create;
    let body = request_body(create, generator, ctx, rng)?;
    let response = match dispatcher.dispatch(create.method.as_str(), &create.path, body.as_deref())
    {
        Ok(response) => response,
        Err(err) => {
            fail(
                &mut report,
                FindingKind::Transport,
                "create_failed",
                format!("{} {}: {err}", create.method, create.path),
            );
            return Ok(report);
        }
    };

    let ok = is_success(response.status);
    report.calls.push(CallRecord {
        role: LifecycleRole::Create,
        method: create.method.as_str().to_string(),
        path: create.path.clone(),
        status: response.status,
        ok,
    });
    if !ok {
        let err = DroverError::UnexpectedStatus {
            method: create.method.as_str().to_string(),
            path: create.path.clone(),
            status: response.status,
        };
        fail(
            &mut report,
            FindingKind::Status,
            "create_status",
            format!("{err}; body: {}", snippet(&response.body)),
        );
        return Ok(report);
    }

    let Some(correlation) = extract_correlation(&response.body, id_field) else {
        fail(
            &mut report,
            FindingKind::Correlation,
            "missing_correlation_id",
            format!(
                "create response has no {id_field:?} field; body: {}",
                snippet(&response.body)
            ),
        );
        return Ok(report);
    };
    let correlation_str = correlation_to_string(&correlation);
    // Bind under the leaf segment so `{id}` placeholders and `id` properties
    // both see it, even when the extraction path is nested (`data.id`).
    let leaf = id_field.rsplit('.').next().unwrap_or(id_field);
    ctx.bind(leaf, correlation);
    report.correlation = Some(correlation_str.clone());

    for (role, endpoint) in [
        (LifecycleRole::Update, plan.update.as_ref()),
        (LifecycleRole::Read, plan.read.as_ref()),
        (LifecycleRole::Delete, plan.delete.as_ref()),
    ] {
        let Some(endpoint) = endpoint else {
            continue;
        };
        let path = template_path(&endpoint.path, ctx, &correlation_str);
        let body = request_body(endpoint, generator, ctx, rng)?;
        match dispatcher.dispatch(endpoint.method.as_str(), &path, body.as_deref()) {
            Ok(response) => {
                let ok = is_success(response.status);
                report.calls.push(CallRecord {
                    role,
                    method: endpoint.method.as_str().to_string(),
                    path: path.clone(),
                    status: response.status,
                    ok,
                });
                if !ok {
                    tracing::warn!(
                        "{} {} returned {}; body: {}",
                        endpoint.method,
                        path,
                        response.status,
                        snippet(&response.body)
                    );
                    report.findings.push(Finding {
                        kind: FindingKind::Status,
                        title: format!("{}_status", role.as_str()),
                        message: format!(
                            "{} {} returned {}",
                            endpoint.method, path, response.status
                        ),
                    });
                }
            }
            Err(err) => {
                tracing::warn!("{} {} failed: {err}", endpoint.method, path);
                report.findings.push(Finding {
                    kind: FindingKind::Transport,
                    title: format!("{}_failed", role.as_str()),
                    message: format!("{} {}: {err}", endpoint.method, path),
                });
            }
        }
    }

    report.completed = true;
    Ok(report)
}

fn request_body(
    endpoint: &EndpointDescriptor,
    generator: &Generator,
    ctx: &ChainContext,
    rng: &mut ChaCha20Rng,
) -> DroverResult<Option<String>> {
    let Some(schema) = &endpoint.request_schema else {
        return Ok(None);
    };
    let value = generator.generate(schema, None, ctx, rng)?;
    let body = serde_json::to_string(&value).map_err(|err| {
        DroverError::InvalidArgument(format!("serialize request body: {err}"))
    })?;
    Ok(Some(body))
}

fn fail(report: &mut IterationReport, kind: FindingKind, title: &str, message: String) {
    tracing::warn!("{title}: {message}");
    report.findings.push(Finding {
        kind,
        title: title.to_string(),
        message,
    });
}

/// Substitute every `{name}` placeholder: a ChainContext binding of that
/// name wins, otherwise the correlation identifier fills in.
pub fn template_path(template: &str, ctx: &ChainContext, fallback: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match ctx.get(name) {
                    Some(value) => out.push_str(&correlation_to_string(value)),
                    None => out.push_str(fallback),
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unbalanced brace: emit the rest verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Pull the correlation value out of a JSON response body at a dot-path
/// (`id`, `data.id`). Only strings and numbers qualify.
pub fn extract_correlation(body: &str, field_path: &str) -> Option<Value> {
    let root: Value = serde_json::from_str(body).ok()?;
    let mut current = &root;
    for segment in field_path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    match current {
        Value::String(_) | Value::Number(_) => Some(current.clone()),
        _ => None,
    }
}

pub fn correlation_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn snippet(body: &str) -> String {
    const LIMIT: usize = 120;
    if body.chars().count() <= LIMIT {
        body.to_string()
    } else {
        let cut: String = body.chars().take(LIMIT).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rng_from_seed, Catalog, SpecDocument};
    use serde_json::json;

    #[test]
    fn template_substitutes_bound_and_fallback_placeholders() {
        let mut ctx = ChainContext::default();
        ctx.bind("group", json!("g1"));
        assert_eq!(
            template_path("/group/{group}/item/{id}", &ctx, "7"),
            "/group/g1/item/7"
        );
        assert_eq!(template_path("/plain", &ctx, "7"), "/plain");
    }

    #[test]
    fn numeric_correlation_values_template_without_quotes() {
        let id = extract_correlation(r#"{"id": 42}"#, "id").expect("id");
        assert_eq!(correlation_to_string(&id), "42");
        let mut ctx = ChainContext::default();
        ctx.bind("id", id);
        assert_eq!(template_path("/user/{id}", &ctx, "x"), "/user/42");
    }

    #[test]
    fn extraction_follows_nested_paths() {
        let body = r#"{"data": {"user": {"id": "abc"}}}"#;
        let value = extract_correlation(body, "data.user.id").expect("nested id");
        assert_eq!(correlation_to_string(&value), "abc");
    }

    #[test]
    fn extraction_rejects_missing_and_structured_values() {
        assert!(extract_correlation(r#"{"name": "x"}"#, "id").is_none());
        assert!(extract_correlation(r#"{"id": {"nested": true}}"#, "id").is_none());
        assert!(extract_correlation("not json", "id").is_none());
    }

    #[test]
    fn scripted_rules_match_and_deplete() {
        let mut dispatcher = HttpDispatcher::scripted();
        let mut rule = ScriptedRule::new("get", "/once", 200, "first");
        rule.remaining = 1;
        dispatcher.script(rule);
        dispatcher.script(ScriptedRule::new("get", "/once", 503, "after"));

        let first = dispatcher.dispatch("GET", "/once", None).expect("first");
        assert_eq!((first.status, first.body.as_str()), (200, "first"));
        let second = dispatcher.dispatch("GET", "/once", None).expect("second");
        assert_eq!(second.status, 503);
        assert!(dispatcher.dispatch("POST", "/once", None).is_err());
    }

    fn widget_plan() -> LifecyclePlan {
        let doc = json!({
            "paths": {
                "/widget": {
                    "post": {
                        "parameters": [
                            {"name": "body", "in": "body", "schema": {"$ref": "#/definitions/WidgetInput"}}
                        ],
                        "responses": {"200": {"schema": {"$ref": "#/definitions/Widget"}}}
                    }
                },
                "/widget/{id}": {
                    "get": {"responses": {"200": {"schema": {"$ref": "#/definitions/Widget"}}}},
                    "put": {
                        "parameters": [
                            {"name": "body", "in": "body", "schema": {"$ref": "#/definitions/WidgetInput"}}
                        ],
                        "responses": {"200": {"schema": {"$ref": "#/definitions/Widget"}}}
                    },
                    "delete": {"responses": {"200": {"description": "gone"}}}
                }
            },
            "definitions": {
                "WidgetInput": {"type": "object", "properties": {"name": {"type": "string"}}},
                "Widget": {"type": "object", "properties": {
                    "id": {"type": "string"},
                    "name": {"type": "string"}
                }}
            }
        });
        let spec = SpecDocument::parse(doc.to_string().as_bytes()).expect("spec");
        let catalog = Catalog::build(&spec).expect("catalog");
        LifecyclePlan::from_catalog(&catalog.endpoints).expect("plan")
    }

    #[test]
    fn plan_maps_methods_onto_roles() {
        let plan = widget_plan();
        assert_eq!(plan.create.path, "/widget");
        assert_eq!(plan.update.as_ref().expect("update").path, "/widget/{id}");
        assert_eq!(plan.read.as_ref().expect("read").path, "/widget/{id}");
        assert_eq!(plan.delete.as_ref().expect("delete").path, "/widget/{id}");
    }

    #[test]
    fn iteration_chains_the_created_id_into_follow_up_paths() {
        let plan = widget_plan();
        let mut dispatcher = HttpDispatcher::scripted();
        dispatcher.script(ScriptedRule::new("post", "/widget", 200, r#"{"id": "7"}"#));
        dispatcher.script(ScriptedRule::new("put", "/widget/7", 200, "{}"));
        dispatcher.script(ScriptedRule::new("get", "/widget/7", 200, r#"{"id": "7"}"#));
        dispatcher.script(ScriptedRule::new("delete", "/widget/7", 200, "\"gone\""));

        let generator = Generator::new();
        let mut ctx = ChainContext::default();
        let mut rng = rng_from_seed(7);
        let report = run_iteration(&plan, &generator, &mut dispatcher, "id", &mut ctx, &mut rng)
            .expect("iteration");

        assert!(report.completed);
        assert_eq!(report.correlation.as_deref(), Some("7"));
        let roles: Vec<LifecycleRole> = report.calls.iter().map(|c| c.role).collect();
        assert_eq!(
            roles,
            [
                LifecycleRole::Create,
                LifecycleRole::Update,
                LifecycleRole::Read,
                LifecycleRole::Delete
            ]
        );
        assert!(report.calls.iter().all(|c| c.ok));
        assert!(report.findings.is_empty());
    }

    #[test]
    fn missing_correlation_field_skips_every_follow_up_call() {
        let plan = widget_plan();
        let mut dispatcher = HttpDispatcher::scripted();
        dispatcher.script(ScriptedRule::new(
            "post",
            "/widget",
            200,
            r#"{"name": "anonymous"}"#,
        ));

        let generator = Generator::new();
        let mut ctx = ChainContext::default();
        let mut rng = rng_from_seed(7);
        let report = run_iteration(&plan, &generator, &mut dispatcher, "id", &mut ctx, &mut rng)
            .expect("iteration");

        assert!(!report.completed);
        assert!(report.correlation.is_none());
        assert_eq!(report.calls.len(), 1);
        assert_eq!(dispatcher.calls().len(), 1, "no path was templated");
        assert!(report
            .findings
            .iter()
            .any(|f| f.title == "missing_correlation_id"));
    }

    #[test]
    fn non_2xx_after_create_continues_the_iteration() {
        let plan = widget_plan();
        let mut dispatcher = HttpDispatcher::scripted();
        dispatcher.script(ScriptedRule::new("post", "/widget", 200, r#"{"id": "7"}"#));
        dispatcher.script(ScriptedRule::new("put", "/widget/7", 500, "boom"));
        dispatcher.script(ScriptedRule::new("get", "/widget/7", 200, r#"{"id": "7"}"#));
        dispatcher.script(ScriptedRule::new("delete", "/widget/7", 200, "\"gone\""));

        let generator = Generator::new();
        let mut ctx = ChainContext::default();
        let mut rng = rng_from_seed(7);
        let report = run_iteration(&plan, &generator, &mut dispatcher, "id", &mut ctx, &mut rng)
            .expect("iteration");

        assert!(report.completed);
        assert_eq!(report.calls.len(), 4);
        assert!(report.findings.iter().any(|f| f.title == "update_status"));
        let delete = report.calls.iter().find(|c| c.role == LifecycleRole::Delete);
        assert!(delete.expect("delete ran").ok);
    }

    #[test]
    fn create_non_2xx_is_load_bearing() {
        let plan = widget_plan();
        let mut dispatcher = HttpDispatcher::scripted();
        dispatcher.script(ScriptedRule::new("post", "/widget", 400, "bad"));

        let generator = Generator::new();
        let mut ctx = ChainContext::default();
        let mut rng = rng_from_seed(7);
        let report = run_iteration(&plan, &generator, &mut dispatcher, "id", &mut ctx, &mut rng)
            .expect("iteration");

        assert!(!report.completed);
        assert_eq!(report.calls.len(), 1);
        assert!(report.findings.iter().any(|f| f.title == "create_status"));
    }
}
