//! Phases shared by every flow variant.

use crate::skill::Skill;
use crate::toolkit::Bot;

use super::FlowError;

/// Start a conversation with `skill`: queue its required parameters, run
/// `begin`, then move on to collection or completion.
pub(super) async fn open(skill: &dyn Skill, bot: &mut Bot<'_>) -> Result<(), FlowError> {
    bot.context_mut().require(skill.required_parameters());
    skill.begin(bot).await?;
    advance(skill, bot).await
}

/// Ask for the next pending parameter, or run `finish` when none is left.
///
/// Does nothing while paused or while a question is already outstanding.
pub(super) async fn advance(skill: &dyn Skill, bot: &mut Bot<'_>) -> Result<(), FlowError> {
    if bot.is_paused() || bot.context().confirming.is_some() {
        return Ok(());
    }
    let next = bot.context().to_confirm.first().map(|p| p.name.clone());
    match next {
        Some(name) => bot.ask(&name).await,
        None => skill.finish(bot).await,
    }
}
