//! LINE message schema and the Facebook → LINE translation rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::facebook::{
    Attachment, FacebookAttachment, FacebookButton, FacebookTemplate, FacebookText,
    GenericElement, QuickReply,
};
use super::{
    parse, CompileError, MessageKind, LINE_BUTTONS_MAX_ACTIONS, LINE_CAROUSEL_MAX_COLUMNS,
    LINE_COLUMN_MAX_ACTIONS, QUICK_REPLY_BUTTONS_THRESHOLD,
};
use crate::provider::Provider;

/// An outbound LINE message object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LineMessage {
    /// Plain text message.
    Text {
        /// Message body.
        text: String,
    },
    /// Image message.
    Image {
        /// Full-size image URL.
        original_content_url: String,
        /// Preview image URL.
        preview_image_url: String,
    },
    /// Video message.
    Video {
        /// Video file URL.
        original_content_url: String,
        /// Preview image URL.
        preview_image_url: String,
    },
    /// Audio message.
    Audio {
        /// Audio file URL.
        original_content_url: String,
        /// Length of the audio in milliseconds.
        duration: u64,
    },
    /// Template message.
    Template {
        /// Fallback text for clients that cannot render templates.
        alt_text: String,
        /// The template body.
        template: LineTemplate,
    },
}

impl LineMessage {
    /// Build a plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Body of a LINE template message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LineTemplate {
    /// Buttons template, up to four actions.
    Buttons {
        /// Optional header image.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thumbnail_image_url: Option<String>,
        /// Optional title.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Body text.
        text: String,
        /// Actions shown as buttons.
        actions: Vec<LineAction>,
    },
    /// Confirm template with two actions.
    Confirm {
        /// Body text.
        text: String,
        /// Actions shown as buttons.
        actions: Vec<LineAction>,
    },
    /// Carousel of columns.
    Carousel {
        /// The carousel columns.
        columns: Vec<LineColumn>,
    },
    /// Any template type without a translation rule.
    #[serde(other)]
    Other,
}

/// One column of a LINE carousel template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineColumn {
    /// Optional column image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_image_url: Option<String>,
    /// Optional column title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Column text.
    pub text: String,
    /// Column actions, at most three.
    pub actions: Vec<LineAction>,
}

/// An action attached to a LINE template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineAction {
    /// Sends `data` back to the bot as a postback event.
    Postback {
        /// Button label.
        label: String,
        /// Postback payload.
        data: String,
        /// Text echoed into the chat when tapped.
        #[serde(
            default,
            rename = "displayText",
            skip_serializing_if = "Option::is_none"
        )]
        display_text: Option<String>,
    },
    /// Sends `text` as if the user typed it.
    Message {
        /// Button label.
        label: String,
        /// Text sent on tap.
        text: String,
    },
    /// Opens a URI.
    Uri {
        /// Button label.
        label: String,
        /// Target URI.
        uri: String,
    },
    /// Any action type without a translation rule.
    #[serde(other)]
    Other,
}

impl LineAction {
    /// Whether this action opens a link rather than talking to the bot.
    pub fn is_uri(&self) -> bool {
        matches!(self, Self::Uri { .. })
    }
}

fn unsupported(kind: MessageKind, reason: impl Into<String>) -> CompileError {
    CompileError::unsupported(kind, Provider::Facebook, Provider::Line, reason)
}

/// Translate a Facebook message object of the given kind into LINE schema.
pub(crate) fn from_facebook(kind: MessageKind, message: &Value) -> Result<Value, CompileError> {
    let compiled = match kind {
        MessageKind::Text => {
            let source: FacebookText = parse(kind, Provider::Facebook, message)?;
            LineMessage::text(source.text)
        }
        MessageKind::QuickReply => {
            let source: FacebookText = parse(kind, Provider::Facebook, message)?;
            quick_replies_to_line(source)?
        }
        MessageKind::Image
        | MessageKind::Video
        | MessageKind::Audio
        | MessageKind::File
        | MessageKind::Template => {
            let source: FacebookAttachment = parse(kind, Provider::Facebook, message)?;
            attachment_to_line(kind, source.attachment, message)?
        }
        MessageKind::Location | MessageKind::Sticker | MessageKind::Imagemap => {
            return Err(unsupported(kind, "not a Facebook message kind"));
        }
    };
    serde_json::to_value(compiled).map_err(|error| CompileError::Malformed {
        kind,
        provider: Provider::Line,
        error,
    })
}

fn quick_replies_to_line(source: FacebookText) -> Result<LineMessage, CompileError> {
    // LINE rejects a buttons template without actions.
    if source.quick_replies.is_empty() {
        return Ok(LineMessage::text(source.text));
    }
    if source.quick_replies.len() > QUICK_REPLY_BUTTONS_THRESHOLD {
        debug!(
            choices = source.quick_replies.len(),
            "too many quick replies for a buttons template, sending text only"
        );
        return Ok(LineMessage::text(source.text));
    }

    let actions = source
        .quick_replies
        .into_iter()
        .map(quick_reply_to_action)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LineMessage::Template {
        alt_text: source.text.clone(),
        template: LineTemplate::Buttons {
            thumbnail_image_url: None,
            title: None,
            text: source.text,
            actions,
        },
    })
}

fn quick_reply_to_action(reply: QuickReply) -> Result<LineAction, CompileError> {
    if reply.content_type != "text" {
        return Err(unsupported(
            MessageKind::QuickReply,
            format!("{} quick reply has no LINE action", reply.content_type),
        ));
    }
    Ok(LineAction::Postback {
        label: reply.title.unwrap_or_default(),
        data: reply.payload.unwrap_or_default(),
        display_text: None,
    })
}

fn attachment_to_line(
    kind: MessageKind,
    attachment: Attachment,
    raw: &Value,
) -> Result<LineMessage, CompileError> {
    match attachment {
        Attachment::Image(media) => Ok(LineMessage::Image {
            original_content_url: media.url.clone(),
            preview_image_url: media.url,
        }),
        Attachment::Audio(_) => Err(unsupported(
            kind,
            "Facebook audio carries no duration, which LINE requires",
        )),
        Attachment::Video(_) => Err(unsupported(
            kind,
            "Facebook video carries no preview image, which LINE requires",
        )),
        Attachment::File(_) => Err(unsupported(kind, "LINE has no outbound file message")),
        Attachment::Template(FacebookTemplate::Button { text, buttons }) => {
            if buttons.len() > LINE_BUTTONS_MAX_ACTIONS {
                return Err(unsupported(
                    kind,
                    format!(
                        "button template has {} buttons, LINE allows {LINE_BUTTONS_MAX_ACTIONS}",
                        buttons.len()
                    ),
                ));
            }
            let actions = buttons_to_actions(buttons)?;
            Ok(LineMessage::Template {
                alt_text: text.clone(),
                template: LineTemplate::Buttons {
                    thumbnail_image_url: None,
                    title: None,
                    text,
                    actions,
                },
            })
        }
        Attachment::Template(FacebookTemplate::Generic { elements }) => {
            generic_to_carousel(elements)
        }
        Attachment::Template(FacebookTemplate::Other) => {
            let template_type = raw
                .pointer("/attachment/payload/template_type")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            Err(unsupported(
                kind,
                format!("{template_type} template has no LINE equivalent"),
            ))
        }
    }
}

fn generic_to_carousel(elements: Vec<GenericElement>) -> Result<LineMessage, CompileError> {
    if elements.len() > LINE_CAROUSEL_MAX_COLUMNS {
        return Err(unsupported(
            MessageKind::Template,
            format!(
                "generic template has {} elements, LINE allows {LINE_CAROUSEL_MAX_COLUMNS} columns",
                elements.len()
            ),
        ));
    }

    let alt_text = elements
        .first()
        .map(|e| e.title.clone())
        .unwrap_or_default();
    let mut columns = Vec::with_capacity(elements.len());
    for element in elements {
        if element.buttons.len() > LINE_COLUMN_MAX_ACTIONS {
            return Err(unsupported(
                MessageKind::Template,
                format!(
                    "generic element has {} buttons, LINE allows {LINE_COLUMN_MAX_ACTIONS} per column",
                    element.buttons.len()
                ),
            ));
        }
        let (title, text) = match element.subtitle {
            Some(subtitle) => (Some(element.title), subtitle),
            None => (None, element.title),
        };
        columns.push(LineColumn {
            thumbnail_image_url: element.image_url,
            title,
            text,
            actions: buttons_to_actions(element.buttons)?,
        });
    }

    Ok(LineMessage::Template {
        alt_text,
        template: LineTemplate::Carousel { columns },
    })
}

fn buttons_to_actions(buttons: Vec<FacebookButton>) -> Result<Vec<LineAction>, CompileError> {
    buttons
        .into_iter()
        .map(|button| match button {
            FacebookButton::Postback { title, payload } => Ok(LineAction::Postback {
                label: title,
                data: payload,
                display_text: None,
            }),
            FacebookButton::WebUrl { title, url } => Ok(LineAction::Uri { label: title, uri: url }),
            FacebookButton::Other => Err(unsupported(
                MessageKind::Template,
                "button type has no LINE action",
            )),
        })
        .collect()
}
