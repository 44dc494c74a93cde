//! Facebook Messenger message schema and the LINE → Facebook translation rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::line::{LineAction, LineColumn, LineMessage, LineTemplate};
use super::{parse, CompileError, MessageKind, FACEBOOK_BUTTONS_MAX, FACEBOOK_GENERIC_MAX_ELEMENTS};
use crate::provider::Provider;

/// An outbound Facebook message object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FacebookMessage {
    /// Text, optionally with quick replies.
    Text(FacebookText),
    /// Media or template attachment.
    Attachment(FacebookAttachment),
}

/// Text message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookText {
    /// Message body.
    pub text: String,
    /// Choice set shown under the text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<QuickReply>,
}

impl FacebookText {
    /// Build a plain text message.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quick_replies: Vec::new(),
        }
    }
}

/// One quick reply choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickReply {
    /// `text`, `location`, `user_phone_number`, ...
    pub content_type: String,
    /// Label shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Payload delivered back with the quick reply event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl QuickReply {
    /// Build a text quick reply.
    pub fn text(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_owned(),
            title: Some(title.into()),
            payload: Some(payload.into()),
        }
    }
}

/// Attachment message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookAttachment {
    /// The attachment.
    pub attachment: Attachment,
}

/// A typed attachment with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Attachment {
    /// Image by URL.
    Image(MediaPayload),
    /// Video by URL.
    Video(MediaPayload),
    /// Audio by URL.
    Audio(MediaPayload),
    /// File by URL.
    File(MediaPayload),
    /// Structured template.
    Template(FacebookTemplate),
}

/// Media attachment payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Media URL.
    pub url: String,
}

/// Template attachment payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "template_type", rename_all = "snake_case")]
pub enum FacebookTemplate {
    /// Text with up to three buttons.
    Button {
        /// Body text.
        text: String,
        /// Buttons.
        buttons: Vec<FacebookButton>,
    },
    /// Horizontally scrollable elements.
    Generic {
        /// Elements.
        elements: Vec<GenericElement>,
    },
    /// Any template type without a translation rule.
    #[serde(other)]
    Other,
}

/// One element of a generic template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericElement {
    /// Element title.
    pub title: String,
    /// Optional subtitle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Optional element image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Element buttons, at most three.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<FacebookButton>,
}

/// A template button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FacebookButton {
    /// Sends `payload` back as a postback event.
    Postback {
        /// Button label.
        title: String,
        /// Postback payload.
        payload: String,
    },
    /// Opens a web page.
    WebUrl {
        /// Button label.
        title: String,
        /// Target URL.
        url: String,
    },
    /// Any button type without a translation rule.
    #[serde(other)]
    Other,
}

fn unsupported(kind: MessageKind, reason: impl Into<String>) -> CompileError {
    CompileError::unsupported(kind, Provider::Line, Provider::Facebook, reason)
}

/// Translate a LINE message object of the given kind into Facebook schema.
pub(crate) fn from_line(kind: MessageKind, message: &Value) -> Result<Value, CompileError> {
    let compiled = match kind {
        MessageKind::Text
        | MessageKind::Image
        | MessageKind::Video
        | MessageKind::Audio
        | MessageKind::Template => {
            let source: LineMessage = parse(kind, Provider::Line, message)?;
            line_to_facebook(kind, source, message)?
        }
        MessageKind::File
        | MessageKind::Location
        | MessageKind::Sticker
        | MessageKind::Imagemap
        | MessageKind::QuickReply => {
            return Err(unsupported(kind, "Facebook has no equivalent message"));
        }
    };
    serde_json::to_value(compiled).map_err(|error| CompileError::Malformed {
        kind,
        provider: Provider::Facebook,
        error,
    })
}

fn media(attachment: fn(MediaPayload) -> Attachment, url: String) -> FacebookMessage {
    FacebookMessage::Attachment(FacebookAttachment {
        attachment: attachment(MediaPayload { url }),
    })
}

fn line_to_facebook(
    kind: MessageKind,
    source: LineMessage,
    raw: &Value,
) -> Result<FacebookMessage, CompileError> {
    match source {
        LineMessage::Text { text } => Ok(FacebookMessage::Text(FacebookText::new(text))),
        LineMessage::Image {
            original_content_url,
            ..
        } => Ok(media(Attachment::Image, original_content_url)),
        LineMessage::Video {
            original_content_url,
            ..
        } => Ok(media(Attachment::Video, original_content_url)),
        LineMessage::Audio {
            original_content_url,
            ..
        } => Ok(media(Attachment::Audio, original_content_url)),
        LineMessage::Template { template, .. } => match template {
            LineTemplate::Buttons { text, actions, .. }
            | LineTemplate::Confirm { text, actions } => {
                if actions.iter().any(LineAction::is_uri) {
                    actions_to_button_template(text, actions)
                } else {
                    actions_to_quick_replies(text, actions)
                }
            }
            LineTemplate::Carousel { columns } => carousel_to_generic(columns),
            LineTemplate::Other => {
                let template_type = raw
                    .pointer("/template/type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                Err(unsupported(
                    kind,
                    format!("{template_type} template has no Facebook equivalent"),
                ))
            }
        },
    }
}

/// A Facebook button template holds at most three buttons.
fn actions_to_button_template(
    text: String,
    actions: Vec<LineAction>,
) -> Result<FacebookMessage, CompileError> {
    if actions.len() > FACEBOOK_BUTTONS_MAX {
        return Err(unsupported(
            MessageKind::Template,
            format!(
                "template has {} actions, Facebook allows {FACEBOOK_BUTTONS_MAX} buttons",
                actions.len()
            ),
        ));
    }
    let buttons = actions_to_buttons(actions)?;
    Ok(FacebookMessage::Attachment(FacebookAttachment {
        attachment: Attachment::Template(FacebookTemplate::Button { text, buttons }),
    }))
}

/// Without a link, a buttons or confirm template is a choice set and its
/// answers become quick replies.
fn actions_to_quick_replies(
    text: String,
    actions: Vec<LineAction>,
) -> Result<FacebookMessage, CompileError> {
    let quick_replies = actions
        .into_iter()
        .map(|action| match action {
            LineAction::Postback { label, data, .. } => Ok(QuickReply::text(label, data)),
            LineAction::Message { label, text } => Ok(QuickReply::text(label, text)),
            LineAction::Uri { .. } | LineAction::Other => Err(unsupported(
                MessageKind::Template,
                "action type has no Facebook quick reply",
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FacebookMessage::Text(FacebookText {
        text,
        quick_replies,
    }))
}

fn carousel_to_generic(columns: Vec<LineColumn>) -> Result<FacebookMessage, CompileError> {
    if columns.len() > FACEBOOK_GENERIC_MAX_ELEMENTS {
        return Err(unsupported(
            MessageKind::Template,
            format!(
                "carousel has {} columns, Facebook allows {FACEBOOK_GENERIC_MAX_ELEMENTS} elements",
                columns.len()
            ),
        ));
    }

    let mut elements = Vec::with_capacity(columns.len());
    for column in columns {
        if column.actions.len() > FACEBOOK_BUTTONS_MAX {
            return Err(unsupported(
                MessageKind::Template,
                format!(
                    "carousel column has {} actions, Facebook allows {FACEBOOK_BUTTONS_MAX} buttons",
                    column.actions.len()
                ),
            ));
        }
        let (title, subtitle) = match column.title {
            Some(title) => (title, Some(column.text)),
            None => (column.text, None),
        };
        elements.push(GenericElement {
            title,
            subtitle,
            image_url: column.thumbnail_image_url,
            buttons: actions_to_buttons(column.actions)?,
        });
    }

    Ok(FacebookMessage::Attachment(FacebookAttachment {
        attachment: Attachment::Template(FacebookTemplate::Generic { elements }),
    }))
}

fn actions_to_buttons(actions: Vec<LineAction>) -> Result<Vec<FacebookButton>, CompileError> {
    actions
        .into_iter()
        .map(|action| match action {
            LineAction::Postback { label, data, .. } => Ok(FacebookButton::Postback {
                title: label,
                payload: data,
            }),
            LineAction::Message { label, text } => Ok(FacebookButton::Postback {
                title: label,
                payload: text,
            }),
            LineAction::Uri { label, uri } => Ok(FacebookButton::WebUrl {
                title: label,
                url: uri,
            }),
            LineAction::Other => Err(unsupported(
                MessageKind::Template,
                "action type has no Facebook button",
            )),
        })
        .collect()
}
