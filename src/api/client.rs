//! HTTP client for the schedule server.

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::{ApiHomeworkResponse, ApiScheduleResponse, ApiWriteResponse};
use super::types::{HomeworkTask, NotificationSettings};
use crate::error::SyncError;
use crate::queue::{MutationKind, MutationSink, QueuedMutation};
use crate::schedule::{GroupSelection, LessonRecord, LessonSource};

/// Transport timeout for every request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEDULE_PATH: &str = "api/schedule";
const HOMEWORK_PATH: &str = "api/schedule/homework";
const NOTIFICATION_SETTINGS_PATH: &str = "api/notifications/settings";

/// Schedule server client. Clone shares the connection pool.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  base: Url,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
    let mut base =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API url {}: {}", base_url, e))?;
    // Relative joins drop the last segment unless the path ends with a slash
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let client = Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  /// Lessons of `group` between `from` and `to`, both inclusive.
  pub async fn get_schedule(
    &self,
    group: &GroupSelection,
    from: NaiveDate,
    to: NaiveDate,
  ) -> Result<Vec<LessonRecord>, SyncError> {
    let mut url = self.endpoint(SCHEDULE_PATH)?;
    url
      .query_pairs_mut()
      .append_pair("faculty", &group.faculty)
      .append_pair("course", &group.course)
      .append_pair("group", &group.group)
      .append_pair("from", &from.format("%Y-%m-%d").to_string())
      .append_pair("to", &to.format("%Y-%m-%d").to_string());

    let response: ApiScheduleResponse = self.get_json(url).await?;
    let lessons = response.into_records(&group.group);
    debug!(group = %group.group, %from, %to, count = lessons.len(), "Fetched schedule");
    Ok(lessons)
  }

  /// All homework of a group.
  pub async fn get_group_homework(&self, group_id: &str) -> Result<Vec<HomeworkTask>, SyncError> {
    let mut url = self.endpoint(HOMEWORK_PATH)?;
    url
      .path_segments_mut()
      .map_err(|_| SyncError::Network(format!("API url cannot be a base: {}", self.base)))?
      .push(group_id);

    let response: ApiHomeworkResponse = self.get_json(url).await?;
    Ok(
      response
        .homework
        .into_iter()
        .map(|h| h.into_task(group_id))
        .collect(),
    )
  }

  pub async fn get_notification_settings(&self) -> Result<NotificationSettings, SyncError> {
    let url = self.endpoint(NOTIFICATION_SETTINGS_PATH)?;
    self.get_json(url).await
  }

  fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
    self
      .base
      .join(path)
      .map_err(|e| SyncError::Network(format!("Invalid endpoint {}: {}", path, e)))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let builder = self
      .client
      .request(method, url)
      .header(header::ACCEPT, "application/json");
    match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SyncError> {
    let response = self.request(Method::GET, url).send().await?;
    let response = Self::check_response(response).await?;
    let status = response.status().as_u16();
    response.json().await.map_err(|e| SyncError::Rejected {
      status,
      message: format!("Failed to parse response: {}", e),
    })
  }

  /// Map non-success statuses to [`SyncError`] with the body as message.
  async fn check_response(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::from_status(status.as_u16(), &body))
  }

  async fn write_homework(&self, kind: &MutationKind) -> Result<(), SyncError> {
    let url = self.endpoint(HOMEWORK_PATH)?;
    let builder = match kind {
      MutationKind::AddHomework {
        lesson_id,
        group_id,
        homework_text,
      } => self.request(Method::POST, url).form(&[
        ("lesson_id", lesson_id.as_str()),
        ("group_id", group_id.as_str()),
        ("homework_text", homework_text.as_str()),
      ]),
      MutationKind::UpdateHomework {
        lesson_id,
        group_id,
        homework_text,
      } => self.request(Method::PUT, url).form(&[
        ("lesson_id", lesson_id.as_str()),
        ("group_id", group_id.as_str()),
        ("homework_text", homework_text.as_str()),
      ]),
      MutationKind::DeleteHomework {
        lesson_id,
        group_id,
      } => self
        .request(Method::DELETE, url)
        .form(&[("lesson_id", lesson_id.as_str()), ("group_id", group_id.as_str())]),
    };

    let response = Self::check_response(builder.send().await?).await?;
    let status = response.status().as_u16();
    // Some deployments answer with an empty body
    let body = response.text().await?;
    if body.trim().is_empty() {
      return Ok(());
    }
    let answer: ApiWriteResponse = serde_json::from_str(&body).map_err(|e| SyncError::Rejected {
      status,
      message: format!("Failed to parse response: {}", e),
    })?;
    if answer.success {
      Ok(())
    } else {
      Err(SyncError::Rejected {
        status,
        message: answer.message,
      })
    }
  }
}

impl LessonSource for ApiClient {
  async fn fetch_lessons(
    &self,
    group: &GroupSelection,
    from: NaiveDate,
    to: NaiveDate,
  ) -> Result<Vec<LessonRecord>, SyncError> {
    self.get_schedule(group, from, to).await
  }
}

impl MutationSink for ApiClient {
  async fn submit(&self, mutation: &QueuedMutation) -> Result<(), SyncError> {
    debug!(id = %mutation.id, action = mutation.kind.action(), "Submitting homework write");
    self.write_homework(&mutation.kind).await
  }
}
