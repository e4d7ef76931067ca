// Workflow identity derivation
//
// An identity is a pure function of business keys. It doubles as the
// engine's deduplication key, so nothing time- or randomness-based may ever
// enter it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version prefix shared by every identity scheme
pub const IDENTITY_VERSION: &str = "v1";

/// The kinds of workflow this crate starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowKind {
    /// Keyed by organization id and domain
    CustomDomainRegistration,
    /// Keyed by the inbound Slack event id
    SlackEvent,
}

impl WorkflowKind {
    /// Namespace segment embedded in the identity
    pub fn namespace(self) -> &'static str {
        match self {
            Self::CustomDomainRegistration => "custom-domain-registration",
            Self::SlackEvent => "slack-event",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Stable identity of one logical workflow run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowIdentity(String);

impl WorkflowIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for WorkflowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkflowIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<WorkflowIdentity> for String {
    fn from(identity: WorkflowIdentity) -> Self {
        identity.0
    }
}

/// Derive the identity for `kind` from its business keys
///
/// Keys are joined with `:` under a `v1:{namespace}:` prefix. A `%` or `:`
/// inside a key is percent-escaped, so distinct key tuples can never render
/// to the same identity. Keys without those characters appear verbatim.
///
/// ```
/// use gram_background::identity::{derive_identity, WorkflowKind};
///
/// let id = derive_identity(WorkflowKind::CustomDomainRegistration, &["org_1", "docs.acme.dev"]);
/// assert_eq!(id.as_str(), "v1:custom-domain-registration:org_1:docs.acme.dev");
/// ```
pub fn derive_identity(kind: WorkflowKind, keys: &[&str]) -> WorkflowIdentity {
    let mut identity = format!("{IDENTITY_VERSION}:{}", kind.namespace());
    for key in keys {
        identity.push(':');
        push_escaped(&mut identity, key);
    }
    WorkflowIdentity(identity)
}

/// Identity of a custom domain registration run
pub fn custom_domain_registration_identity(org_id: &str, domain: &str) -> WorkflowIdentity {
    derive_identity(WorkflowKind::CustomDomainRegistration, &[org_id, domain])
}

/// Identity of a Slack event command run
pub fn slack_event_identity(event_id: &str) -> WorkflowIdentity {
    derive_identity(WorkflowKind::SlackEvent, &[event_id])
}

fn push_escaped(out: &mut String, key: &str) {
    for c in key.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
}
