//! Picks the flow an event runs, in priority order.

use crate::config::SkillsConfig;
use crate::context::Context;
use crate::event::{Event, EventType};

use super::{FlowError, FlowKind};

/// The flow chosen for an event, with the skill it is bound to when the
/// binding is known before the flow runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Flow to run.
    pub flow: FlowKind,
    /// Skill bound by configuration (lifecycle, beacon) or by the event (push).
    pub skill: Option<String>,
}

impl Route {
    fn new(flow: FlowKind, skill: Option<String>) -> Self {
        Self { flow, skill }
    }
}

/// Pick the flow for `event`, in priority order: lifecycle events, beacon,
/// push, then start_conversation / reply / btw depending on `context`.
///
/// # Errors
///
/// Returns [`FlowError::Skip`] when a lifecycle or beacon event has no skill
/// configured, when the beacon sub-type is not recognised, or when a push
/// event names no intent.
pub fn select_flow(
    event: &Event,
    context: Option<&Context>,
    bindings: &SkillsConfig,
) -> Result<Route, FlowError> {
    let lifecycle = match event.event_type {
        EventType::Follow => Some(FlowKind::Follow),
        EventType::Unfollow => Some(FlowKind::Unfollow),
        EventType::Join => Some(FlowKind::Join),
        EventType::Leave => Some(FlowKind::Leave),
        _ => None,
    };
    if let Some(flow) = lifecycle {
        let skill = bindings
            .lifecycle(event.event_type)
            .ok_or_else(|| FlowError::skip(format!("no {flow} skill configured")))?;
        return Ok(Route::new(flow, Some(skill.to_owned())));
    }

    match event.event_type {
        EventType::Beacon => {
            let kind = event
                .beacon_kind()
                .ok_or_else(|| FlowError::skip("unrecognized beacon type"))?;
            let skill = bindings.beacon_skill(kind).ok_or_else(|| {
                FlowError::skip(format!("no beacon {} skill configured", kind.as_str()))
            })?;
            Ok(Route::new(FlowKind::Beacon, Some(skill.to_owned())))
        }
        EventType::Push => {
            let intent = event
                .push_intent()
                .ok_or_else(|| FlowError::skip("push event names no intent"))?;
            Ok(Route::new(FlowKind::Push, Some(intent.to_owned())))
        }
        _ => Ok(match context {
            None => Route::new(FlowKind::StartConversation, None),
            Some(context) if context.confirming.is_some() => Route::new(FlowKind::Reply, None),
            Some(_) => Route::new(FlowKind::Btw, None),
        }),
    }
}
