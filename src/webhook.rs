//! Webhook payload structures and event classification

use serde::Deserialize;
use tracing::{debug, info};

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// The subset of a GitHub push payload needed to deploy.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub deleted: bool,
    // GitHub sends `null` here for branch deletions
    #[serde(default, deserialize_with = "null_as_default")]
    pub head_commit: Commit,
    pub repository: Repository,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub clone_url: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Strips `refs/heads/` from a push ref. Refs without the prefix are returned unchanged.
pub fn branch_from_ref(git_ref: &str) -> &str {
    git_ref.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(git_ref)
}

/// Everything the dispatcher needs to know about an accepted push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub repository: String,
    pub branch: String,
    pub clone_url: String,
    pub commit_id: String,
}

impl From<PushEvent> for PushTarget {
    fn from(event: PushEvent) -> Self {
        Self {
            branch: branch_from_ref(&event.git_ref).to_string(),
            repository: event.repository.full_name,
            clone_url: event.repository.clone_url,
            commit_id: event.head_commit.id,
        }
    }
}

/// What the webhook handler should do with a verified request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Client error; the string is returned as the response body.
    Rejected(String),
    /// Success without a deploy; the string is returned as the response body.
    Acknowledged(&'static str),
    Dispatch(PushTarget),
}

/// Decides the fate of an event once its signature has been verified.
///
/// `body` is only decoded for `push` events.
pub fn classify(event_type: Option<&str>, body: &[u8]) -> Classification {
    let Some(event_type) = event_type else {
        return Classification::Rejected(format!("missing {} header", EVENT_HEADER));
    };

    match event_type {
        "ping" => {
            info!("Received ping event");
            return Classification::Acknowledged("pong");
        }
        "push" => info!("Received push event"),
        other => {
            info!("Received unknown event: {}", other);
            return Classification::Rejected(format!("unknown {}: {}", EVENT_HEADER, other));
        }
    }

    let event: PushEvent = match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(e) => {
            info!("Could not decode push payload: {}", e);
            return Classification::Rejected("invalid JSON payload".to_string());
        }
    };

    if event.deleted {
        info!("Skipping deleted branch: {}", event.git_ref);
        return Classification::Acknowledged("");
    }

    let target = PushTarget::from(event);
    debug!(?target, "Push accepted for dispatch");
    Classification::Dispatch(target)
}
