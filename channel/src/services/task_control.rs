//! HTTP task control
//!
//! `POST {api}/tasks/{id}/{action}` with an optional bearer token.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use shared::{task_info, ControlResponse, TaskAction, TaskId};
use crate::error::{ChannelError, ChannelResult};
use crate::traits::TaskControl;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
#[cfg_attr(test, derive(Debug))]
pub struct HttpTaskControl {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpTaskControl {
    pub fn new(api_url: &str) -> ChannelResult<Self> {
        let base = Url::parse(api_url)?;
        if base.cannot_be_a_base() {
            return Err(ChannelError::config("apiUrl", format!("{api_url} cannot be used as a base URL")));
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, base, token: None })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, task_id: &TaskId, action: TaskAction) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["tasks", task_id.as_str(), action.as_str()]);
        }
        url
    }
}

#[async_trait]
impl TaskControl for HttpTaskControl {
    async fn execute(&self, task_id: &TaskId, action: TaskAction) -> ChannelResult<ControlResponse> {
        let url = self.endpoint(task_id, action);
        let mut request = self.client.post(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ControlResponse>().await {
                Ok(ControlResponse { message: Some(message), .. }) => message,
                _ => status.to_string(),
            };
            return Err(ChannelError::TaskControl {
                action: action.to_string(),
                task_id: task_id.to_string(),
                message,
            });
        }

        let body: ControlResponse = response.json().await?;
        task_info!(task_id, action = %action, success = body.success, "Task control request answered");
        Ok(body)
    }
}
