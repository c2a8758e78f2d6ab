//! Attach a generated title/summary to an existing group.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, GenerateError};
use crate::providers::TextGenerator;
use crate::store::Store;
use crate::types::{ErrorEvent, ErrorGroup, Summarized};

pub struct SummaryAttacher {
  store: Arc<dyn Store>,
  generator: Arc<dyn TextGenerator>,
  event_limit: usize,
  title_max_chars: usize,
  timeout: Duration,
}

impl SummaryAttacher {
  pub fn new(
    store: Arc<dyn Store>,
    generator: Arc<dyn TextGenerator>,
    event_limit: usize,
    title_max_chars: usize,
    timeout: Duration,
  ) -> Self {
    Self {
      store,
      generator,
      event_limit,
      title_max_chars,
      timeout,
    }
  }

  /// Summarize the group behind `cluster_key` from its most recent events.
  ///
  /// The store is written only after a complete response has been parsed, so a
  /// failed or timed-out generation leaves title/summary untouched.
  pub async fn summarize(&self, cluster_key: &str) -> Result<Summarized, EngineError> {
    let group = self
      .store
      .group_by_key(cluster_key)
      .await?
      .ok_or_else(|| EngineError::not_found(format!("group {}", cluster_key)))?;

    let events = self
      .store
      .recent_events(&group.service, &group.error_type, self.event_limit)
      .await?;
    if events.is_empty() {
      tracing::error!(cluster_key, group_id = group.id, "group has no stored events");
      return Err(EngineError::NoData(format!("no events for group {}", cluster_key)));
    }

    let prompt = build_prompt(&group, &events);
    let text = match tokio::time::timeout(self.timeout, self.generator.generate(&prompt, self.timeout)).await {
      Ok(Ok(text)) => text,
      Ok(Err(e)) => return Err(summarization_failed(cluster_key, e)),
      Err(_) => return Err(summarization_failed(cluster_key, GenerateError::Timeout)),
    };

    let (title, summary) = parse_response(&text, self.title_max_chars)
      .ok_or_else(|| summarization_failed(cluster_key, GenerateError::Malformed("empty response".into())))?;

    let group_id = self
      .store
      .apply_summary(cluster_key, &title, &summary)
      .await?
      .ok_or_else(|| EngineError::not_found(format!("group {}", cluster_key)))?;

    tracing::info!(cluster_key, group_id, "summary attached");

    Ok(Summarized {
      group_id,
      cluster_key: cluster_key.to_string(),
      title,
      summary,
    })
  }
}

fn summarization_failed(cluster_key: &str, e: GenerateError) -> EngineError {
  tracing::warn!(cluster_key, error = %e, "summary generation failed");
  EngineError::Summarization(e.to_string())
}

/// Deterministic prompt: group metadata, then event messages newest first.
pub fn build_prompt(group: &ErrorGroup, events: &[ErrorEvent]) -> String {
  let context: Vec<String> = events
    .iter()
    .map(|e| format!("- [{}] {}", e.timestamp.to_rfc3339(), e.message))
    .collect();

  format!(
    "You are an SRE assistant.\n\
     Service: {}\n\
     Error type: {}\n\
     Total occurrences (approx): {}\n\
     \n\
     Recent error messages:\n\
     {}\n\
     \n\
     Please return:\n\
     1. A short title for this error group.\n\
     2. A 3-4 sentence summary of likely cause / impact.\n\
     3. 3 concrete next steps for an engineer.\n",
    group.service,
    group.error_type,
    group.count,
    context.join("\n")
  )
}

/// Split a response into (title, summary).
///
/// Title: first line, trimmed and cut to `title_max_chars` characters.
/// Summary: the remaining lines, or the whole response when it has one line.
/// `None` for an empty response.
pub fn parse_response(text: &str, title_max_chars: usize) -> Option<(String, String)> {
  let text = text.trim();
  if text.is_empty() {
    return None;
  }

  let mut lines = text.lines();
  let first = lines.next().unwrap_or_default().trim();
  let rest: Vec<&str> = lines.collect();

  let title: String = first.chars().take(title_max_chars).collect();
  let summary = if rest.is_empty() {
    text.to_string()
  } else {
    rest.join("\n").trim().to_string()
  };
  Some((title, summary))
}
