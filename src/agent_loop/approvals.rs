//! Tool authorization: which calls may run without asking, and the types
//! used to ask.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::tools::ToolClass;
use crate::types::ToolCall;

/// Gate verdict for a single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    AutoApprove,
    NeedsConfirmation,
}

/// Session and config state the rules look at.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationContext<'a> {
    /// Global bypass ("yolo") flag.
    pub bypass: bool,
    /// Tools the user asked not to be asked about again.
    pub approved_tools: &'a BTreeSet<String>,
    /// Tools allowed by the active template.
    pub allowed_tools: &'a [String],
}

/// One way a call can be allowed without confirmation.
pub trait AuthorizationRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first.
    fn priority(&self) -> u16;

    fn allows(&self, call: &ToolCall, class: ToolClass, ctx: &AuthorizationContext<'_>) -> bool;
}

/// Read-only tools never need confirmation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyRule;

impl AuthorizationRule for ReadOnlyRule {
    fn name(&self) -> &'static str {
        "read_only"
    }

    fn priority(&self) -> u16 {
        200
    }

    fn allows(&self, _call: &ToolCall, class: ToolClass, _ctx: &AuthorizationContext<'_>) -> bool {
        class.is_read_only()
    }
}

/// Tools named by the active template's allow-list.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowedToolsRule;

impl AuthorizationRule for AllowedToolsRule {
    fn name(&self) -> &'static str {
        "allowed_tools"
    }

    fn priority(&self) -> u16 {
        210
    }

    fn allows(&self, call: &ToolCall, _class: ToolClass, ctx: &AuthorizationContext<'_>) -> bool {
        ctx.allowed_tools.iter().any(|name| name == &call.name)
    }
}

/// Session-wide bypass.
#[derive(Debug, Clone, Copy, Default)]
pub struct BypassRule;

impl AuthorizationRule for BypassRule {
    fn name(&self) -> &'static str {
        "bypass"
    }

    fn priority(&self) -> u16 {
        300
    }

    fn allows(&self, _call: &ToolCall, _class: ToolClass, ctx: &AuthorizationContext<'_>) -> bool {
        ctx.bypass
    }
}

/// Tools approved with "don't ask again".
#[derive(Debug, Clone, Copy, Default)]
pub struct RememberedToolsRule;

impl AuthorizationRule for RememberedToolsRule {
    fn name(&self) -> &'static str {
        "remembered_tools"
    }

    fn priority(&self) -> u16 {
        310
    }

    fn allows(&self, call: &ToolCall, _class: ToolClass, ctx: &AuthorizationContext<'_>) -> bool {
        ctx.approved_tools.contains(&call.name)
    }
}

/// Ordered rule set deciding [`Authorization`] for each call.
#[derive(Clone)]
pub struct AuthorizationGate {
    rules: Vec<Arc<dyn AuthorizationRule>>,
}

impl Default for AuthorizationGate {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(ReadOnlyRule),
            Arc::new(AllowedToolsRule),
            Arc::new(BypassRule),
            Arc::new(RememberedToolsRule),
        ])
    }
}

impl AuthorizationGate {
    pub fn new(mut rules: Vec<Arc<dyn AuthorizationRule>>) -> Self {
        rules.sort_by_key(|rule| rule.priority());
        Self { rules }
    }

    /// Confirm everything that is not explicitly allowed, reads included.
    pub fn strict() -> Self {
        Self::new(vec![
            Arc::new(AllowedToolsRule),
            Arc::new(BypassRule),
            Arc::new(RememberedToolsRule),
        ])
    }

    pub fn authorize(
        &self,
        call: &ToolCall,
        class: ToolClass,
        ctx: &AuthorizationContext<'_>,
    ) -> Authorization {
        match self.rules.iter().find(|rule| rule.allows(call, class, ctx)) {
            Some(rule) => {
                tracing::trace!(tool = %call.name, rule = rule.name(), "auto-approved");
                Authorization::AutoApprove
            }
            None => Authorization::NeedsConfirmation,
        }
    }
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

/// A confirmation request handed to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmationRequest {
    pub call: ToolCall,
    pub class: ToolClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    /// Diff or other preview rendered by the tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

/// User answer to a [`ConfirmationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ConfirmationDecision {
    Approve,
    /// Approve and stop asking for this tool in the session.
    ApproveAndRemember,
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guidance: Option<String>,
    },
    /// Reject and cancel the whole run.
    Abort,
}

impl ConfirmationDecision {
    pub fn allows_execution(&self) -> bool {
        matches!(self, Self::Approve | Self::ApproveAndRemember)
    }
}

/// Async confirmation callback.
pub type ConfirmationHandler =
    Arc<dyn Fn(ConfirmationRequest) -> BoxFuture<'static, ConfirmationDecision> + Send + Sync>;

/// Tool output fed back to the model when the user declines a call.
pub fn rejection_message(tool_name: &str, guidance: Option<&str>) -> String {
    let guidance = guidance.map(str::trim).filter(|text| !text.is_empty());
    let guidance_line = match guidance {
        Some(text) => format!("User guidance:\n{text}"),
        None => "User cancelled without additional instructions.".to_string(),
    };
    format!(
        "Tool '{tool_name}' execution cancelled before running.\n{guidance_line}\n\
         Do not assume the operation succeeded; request updated guidance or offer alternatives."
    )
}
