//! Command routing: one handler per IPC command name, each translating
//! between the wire envelope and [`cyberred_sessions::SessionManager`] calls.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use cyberred_config::ConfigHandle;
use cyberred_protocol::{error_codes, ErrorShape, Request, Response};
use cyberred_sessions::{Error as SessionError, SessionManager};
use serde_json::json;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SessionsList,
    EngagementStart,
    EngagementAttach,
    EngagementDetach,
    EngagementPause,
    EngagementResume,
    EngagementStop,
    DaemonStop,
    DaemonConfigReload,
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "sessions.list" => Self::SessionsList,
            "engagement.start" => Self::EngagementStart,
            "engagement.attach" => Self::EngagementAttach,
            "engagement.detach" => Self::EngagementDetach,
            "engagement.pause" => Self::EngagementPause,
            "engagement.resume" => Self::EngagementResume,
            "engagement.stop" => Self::EngagementStop,
            "daemon.stop" => Self::DaemonStop,
            "daemon.config.reload" => Self::DaemonConfigReload,
            _ => return Err(()),
        })
    }
}

/// Outcome of dispatching one request, including any side effect the server
/// needs to act on beyond the response it writes back to the client.
pub struct Dispatched {
    pub response: Response,
    pub effect: Option<Effect>,
}

pub enum Effect {
    /// A client attached to an engagement's event stream under this
    /// subscription id; the server should start forwarding events.
    Subscribed { subscription_id: String, engagement_id: String },
    /// A client detached; the server should stop forwarding events.
    Unsubscribed { subscription_id: String },
    /// The daemon was asked to shut down.
    ShutdownRequested,
}

pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    shutdown: Arc<Notify>,
    config: Arc<ConfigHandle>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>, shutdown: Arc<Notify>, config: Arc<ConfigHandle>) -> Self {
        Self { sessions, shutdown, config }
    }

    pub async fn dispatch(&self, request: Request) -> Dispatched {
        let request_id = request.request_id.clone();
        let Ok(command) = Command::from_str(&request.command) else {
            return Dispatched {
                response: Response::err(request_id, ErrorShape::new(error_codes::PROTOCOL_ERROR, format!("unknown command: {}", request.command))),
                effect: None,
            };
        };

        match command {
            Command::SessionsList => self.handle_sessions_list(request_id).await,
            Command::EngagementStart => self.handle_engagement_start(request).await,
            Command::EngagementAttach => self.handle_engagement_attach(request).await,
            Command::EngagementDetach => self.handle_engagement_detach(request).await,
            Command::EngagementPause => self.handle_engagement_pause(request).await,
            Command::EngagementResume => self.handle_engagement_resume(request).await,
            Command::EngagementStop => self.handle_engagement_stop(request).await,
            Command::DaemonStop => self.handle_daemon_stop(request_id),
            Command::DaemonConfigReload => self.handle_daemon_config_reload(request_id),
        }
    }

    fn required_string(request: &Request, key: &str) -> Result<String, Response> {
        request
            .params
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Response::err(request.request_id.clone(), ErrorShape::new(error_codes::PROTOCOL_ERROR, format!("missing required parameter: {key}"))))
    }

    async fn handle_sessions_list(&self, request_id: String) -> Dispatched {
        let summaries = self.sessions.list_engagements().await;
        let data = json!({
            "engagements": summaries.iter().map(|s| json!({
                "id": s.id,
                "state": s.state,
                "agent_count": s.agent_count,
                "finding_count": s.finding_count,
                "created_at": s.created_at.to_rfc3339(),
            })).collect::<Vec<_>>()
        });
        Dispatched { response: Response::ok(request_id, data), effect: None }
    }

    async fn handle_engagement_start(&self, request: Request) -> Dispatched {
        let config_path = match Self::required_string(&request, "config_path") {
            Ok(v) => PathBuf::from(v),
            Err(response) => return Dispatched { response, effect: None },
        };
        let ignore_warnings = request.params.get("ignore_warnings").and_then(|v| v.as_bool()).unwrap_or(false);

        let result = async {
            let engagement_id = self.sessions.create_engagement(config_path).await?;
            let state = self.sessions.start_engagement(&engagement_id, ignore_warnings).await?;
            Ok::<_, SessionError>((engagement_id, state))
        }
        .await;

        let response = match result {
            Ok((id, state)) => Response::ok(request.request_id, json!({"id": id, "state": state})),
            Err(err) => session_error_response(request.request_id, err),
        };
        Dispatched { response, effect: None }
    }

    async fn handle_engagement_attach(&self, request: Request) -> Dispatched {
        let engagement_id = match Self::required_string(&request, "engagement_id") {
            Ok(v) => v,
            Err(response) => return Dispatched { response, effect: None },
        };

        let summary = match self.sessions.get_summary(&engagement_id).await {
            Ok(s) => s,
            Err(err) => return Dispatched { response: session_error_response(request.request_id, err), effect: None },
        };

        match self.sessions.subscribe_to_engagement(&engagement_id).await {
            Ok(subscription_id) => {
                let data = json!({
                    "engagement_id": engagement_id,
                    "state": summary.state,
                    "agent_count": summary.agent_count,
                    "finding_count": summary.finding_count,
                    "subscription_id": subscription_id,
                    "agents": summary.agents,
                    "findings": summary.findings,
                });
                Dispatched {
                    response: Response::ok(request.request_id, data),
                    effect: Some(Effect::Subscribed { subscription_id, engagement_id }),
                }
            }
            Err(err) => Dispatched { response: session_error_response(request.request_id, err), effect: None },
        }
    }

    async fn handle_engagement_detach(&self, request: Request) -> Dispatched {
        let subscription_id = match Self::required_string(&request, "subscription_id") {
            Ok(v) => v,
            Err(response) => return Dispatched { response, effect: None },
        };
        self.sessions.unsubscribe(&subscription_id).await;
        Dispatched {
            response: Response::ok(request.request_id, json!({"detached": true, "subscription_id": subscription_id})),
            effect: Some(Effect::Unsubscribed { subscription_id }),
        }
    }

    async fn handle_engagement_pause(&self, request: Request) -> Dispatched {
        let engagement_id = match Self::required_string(&request, "engagement_id") {
            Ok(v) => v,
            Err(response) => return Dispatched { response, effect: None },
        };
        let response = match self.sessions.pause_engagement(&engagement_id).await {
            Ok(state) => Response::ok(request.request_id, json!({"id": engagement_id, "state": state})),
            Err(err) => session_error_response(request.request_id, err),
        };
        Dispatched { response, effect: None }
    }

    async fn handle_engagement_resume(&self, request: Request) -> Dispatched {
        let engagement_id = match Self::required_string(&request, "engagement_id") {
            Ok(v) => v,
            Err(response) => return Dispatched { response, effect: None },
        };
        let response = match self.sessions.resume_engagement(&engagement_id).await {
            Ok(state) => Response::ok(request.request_id, json!({"id": engagement_id, "state": state})),
            Err(err) => session_error_response(request.request_id, err),
        };
        Dispatched { response, effect: None }
    }

    async fn handle_engagement_stop(&self, request: Request) -> Dispatched {
        let engagement_id = match Self::required_string(&request, "engagement_id") {
            Ok(v) => v,
            Err(response) => return Dispatched { response, effect: None },
        };
        let response = match self.sessions.stop_engagement(&engagement_id).await {
            Ok((state, checkpoint_path)) => {
                Response::ok(request.request_id, json!({"id": engagement_id, "state": state, "checkpoint_path": checkpoint_path}))
            }
            Err(err) => session_error_response(request.request_id, err),
        };
        Dispatched { response, effect: None }
    }

    fn handle_daemon_stop(&self, request_id: String) -> Dispatched {
        self.shutdown.notify_one();
        Dispatched {
            response: Response::ok(request_id, json!({"stopping": true})),
            effect: Some(Effect::ShutdownRequested),
        }
    }

    fn handle_daemon_config_reload(&self, request_id: String) -> Dispatched {
        let result = self.config.reload();
        let data = json!({
            "reloaded": !result.has_errors(),
            "diagnostics": result.diagnostics.iter().map(|d| json!({
                "severity": d.severity.to_string(),
                "path": d.path,
                "message": d.message,
            })).collect::<Vec<_>>(),
        });
        Dispatched { response: Response::ok(request_id, data), effect: None }
    }
}

fn session_error_response(request_id: String, err: SessionError) -> Response {
    Response::err(request_id, ErrorShape::from(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyberred_collab::{NoopCheckpointer, NoopPreFlightRunner};
    use crate::event_bus::ChannelEventBus;

    fn dispatcher() -> Dispatcher {
        let sessions = Arc::new(SessionManager::new(
            10,
            50,
            Arc::new(ChannelEventBus::new()),
            Arc::new(NoopCheckpointer),
            Arc::new(NoopPreFlightRunner),
        ));
        // No config.yaml needs to exist on disk: ConfigHandle falls back to
        // defaults on construction, and reload() is a no-op when the path
        // is missing, so a bare path (no live tempdir to keep around) is fine.
        let config = ConfigHandle::new(std::env::temp_dir().join("cyberred-dispatch-test"));
        Dispatcher::new(sessions, Arc::new(Notify::new()), config)
    }

    fn request(command: &str, params: serde_json::Value) -> Request {
        Request { command: command.into(), params, request_id: "r-1".into() }
    }

    #[tokio::test]
    async fn unknown_command_is_a_protocol_error() {
        let dispatcher = dispatcher();
        let dispatched = dispatcher.dispatch(request("not.a.command", json!({}))).await;
        assert_eq!(dispatched.response.status, cyberred_protocol::Status::Error);
    }

    #[tokio::test]
    async fn sessions_list_starts_empty() {
        let dispatcher = dispatcher();
        let dispatched = dispatcher.dispatch(request("sessions.list", json!({}))).await;
        assert_eq!(dispatched.response.data.unwrap()["engagements"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn attach_requires_engagement_id() {
        let dispatcher = dispatcher();
        let dispatched = dispatcher.dispatch(request("engagement.attach", json!({}))).await;
        assert_eq!(dispatched.response.status, cyberred_protocol::Status::Error);
    }

    #[tokio::test]
    async fn start_then_attach_yields_subscription_effect() {
        let dispatcher = dispatcher();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("acme.yaml");
        std::fs::write(&config_path, "name: acme\n").unwrap();

        let start = dispatcher
            .dispatch(request("engagement.start", json!({"config_path": config_path.to_str().unwrap()})))
            .await;
        let engagement_id = start.response.data.unwrap()["id"].as_str().unwrap().to_string();

        let attach = dispatcher.dispatch(request("engagement.attach", json!({"engagement_id": engagement_id}))).await;
        assert!(matches!(attach.effect, Some(Effect::Subscribed { .. })));
    }

    #[tokio::test]
    async fn daemon_stop_notifies_shutdown() {
        let dispatcher = dispatcher();
        let dispatched = dispatcher.dispatch(request("daemon.stop", json!({}))).await;
        assert!(matches!(dispatched.effect, Some(Effect::ShutdownRequested)));
    }

    #[tokio::test]
    async fn daemon_config_reload_is_a_noop_without_a_config_file() {
        let dispatcher = dispatcher();
        let dispatched = dispatcher.dispatch(request("daemon.config.reload", json!({}))).await;
        assert_eq!(dispatched.response.status, cyberred_protocol::Status::Ok);
        assert_eq!(dispatched.response.data.unwrap()["reloaded"], json!(true));
    }
}
