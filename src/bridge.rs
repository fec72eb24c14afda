//! Request/response surface the UI talks to.
//!
//! Requests are handled one at a time, each to completion, so a refresh never
//! interleaves with a listing or a launch.

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::LaunchError;
use crate::plugin::launcher::{DetachedSpawner, ProcessLauncher, ProcessSpawner};
use crate::plugin::platform::Platform;
use crate::plugin::registry::{PluginRegistry, SerializedPlugin};
use crate::plugin::resolver::{Context, LaunchPlan, LaunchResolver};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    ListPlugins,
    ReloadPlugins,
    #[serde(rename_all = "camelCase")]
    LaunchPlugin {
        plugin_id: String,
        #[serde(default)]
        context: Context,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Plugins(Vec<SerializedPlugin>),
    Launched(LaunchPlan),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    fn success(data: ResponseData) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(code: &'static str, message: String) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody { code, message }),
        }
    }
}

impl From<LaunchError> for Response {
    fn from(err: LaunchError) -> Self {
        Self::failure(err.code(), err.to_string())
    }
}

/// Written when a response cannot be encoded, so a caller still gets one line.
const ENCODE_FAILURE: &str =
    r#"{"ok":false,"error":{"code":"internal","message":"response could not be encoded"}}"#;

pub struct PluginHost<S = DetachedSpawner> {
    registry: PluginRegistry,
    resolver: LaunchResolver,
    launcher: ProcessLauncher<S>,
}

impl PluginHost {
    pub fn new(registry: PluginRegistry) -> Self {
        Self::with_parts(
            registry,
            LaunchResolver::new(Platform::current()),
            ProcessLauncher::new(),
        )
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let registry =
            PluginRegistry::new(config.plugin_roots()).with_cache_interval(config.cache_interval());
        Self::new(registry)
    }
}

impl<S: ProcessSpawner> PluginHost<S> {
    pub fn with_parts(
        registry: PluginRegistry,
        resolver: LaunchResolver,
        launcher: ProcessLauncher<S>,
    ) -> Self {
        Self {
            registry,
            resolver,
            launcher,
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn launcher(&self) -> &ProcessLauncher<S> {
        &self.launcher
    }

    pub fn list_plugins(&self) -> Vec<SerializedPlugin> {
        self.registry.refresh(false);
        self.registry.list()
    }

    /// Like [`list_plugins`](Self::list_plugins) but ignores the cache interval.
    pub fn reload_plugins(&self) -> Vec<SerializedPlugin> {
        self.registry.refresh(true);
        self.registry.list()
    }

    /// Resolve and spawn. A process is created only if every check passes.
    pub fn launch_plugin(&self, plugin_id: &str, context: &Context) -> Result<LaunchPlan, LaunchError> {
        let plan = self.resolver.resolve(&self.registry, plugin_id, context)?;
        self.launcher.launch(&plan)?;
        Ok(plan)
    }

    pub fn handle(&self, request: Request) -> Response {
        match request {
            Request::ListPlugins => Response::success(ResponseData::Plugins(self.list_plugins())),
            Request::ReloadPlugins => Response::success(ResponseData::Plugins(self.reload_plugins())),
            Request::LaunchPlugin { plugin_id, context } => {
                match self.launch_plugin(&plugin_id, &context) {
                    Ok(plan) => Response::success(ResponseData::Launched(plan)),
                    Err(err) => {
                        tracing::warn!(plugin = %plugin_id, "launch failed: {err}");
                        err.into()
                    }
                }
            }
        }
    }

    /// One JSON request line in, one JSON response line out. Never fails:
    /// an encoding error becomes an `internal` error response.
    pub fn handle_line(&self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(err) => Response::failure("bad_request", err.to_string()),
        };
        encode(&response)
    }
}

fn encode(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|err| {
        tracing::error!("failed to encode response: {err}");
        serde_json::to_string(&Response::failure("internal", err.to_string()))
            .unwrap_or_else(|_| ENCODE_FAILURE.to_string())
    })
}
