use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString, IntoStaticStr};

/// The kinds of edit the service knows how to perform, without their parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ActionKind {
    Rotate,
    Crop,
    Blur,
    Brightness,
    Contrast,
    Generate,
    Unknown,
}

impl ActionKind {
    /// Whether this kind operates on an uploaded image.
    pub fn requires_image(self) -> bool {
        !matches!(self, ActionKind::Generate | ActionKind::Unknown)
    }
}

/// A validated edit request.
///
/// Either `Unknown`, or a kind with every one of its parameters present and correctly typed.
/// Build these with [`Action::from_proposal`] so that malformed input collapses to `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Rotate {
        angle: f64,
    },
    Crop {
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
    },
    Blur {
        radius: f64,
    },
    Brightness {
        level: f64,
    },
    Contrast {
        level: f64,
    },
    Generate {
        prompt: String,
    },
    Unknown,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Rotate { .. } => ActionKind::Rotate,
            Action::Crop { .. } => ActionKind::Crop,
            Action::Blur { .. } => ActionKind::Blur,
            Action::Brightness { .. } => ActionKind::Brightness,
            Action::Contrast { .. } => ActionKind::Contrast,
            Action::Generate { .. } => ActionKind::Generate,
            Action::Unknown => ActionKind::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Action::Unknown)
    }

    /// Normalize a raw JSON proposal (from a language model or the keyword parser) into an action.
    ///
    /// The kind is read from the `action` field, or `kind` if that is missing.
    /// Anything that fails [`validate`] becomes `Action::Unknown`.
    pub fn from_proposal(proposal: &Value) -> Action {
        let Some(params) = proposal.as_object() else {
            return Action::Unknown;
        };
        let kind = params
            .get("action")
            .or_else(|| params.get("kind"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !validate(kind, params) {
            return Action::Unknown;
        }
        let num = |key: &str| params.get(key).and_then(Value::as_f64).unwrap_or_default();
        match kind.parse::<ActionKind>() {
            Ok(ActionKind::Rotate) => Action::Rotate { angle: num("angle") },
            Ok(ActionKind::Crop) => Action::Crop {
                left: num("left"),
                top: num("top"),
                right: num("right"),
                bottom: num("bottom"),
            },
            Ok(ActionKind::Blur) => Action::Blur {
                radius: num("radius"),
            },
            Ok(ActionKind::Brightness) => Action::Brightness {
                level: num("level"),
            },
            Ok(ActionKind::Contrast) => Action::Contrast {
                level: num("level"),
            },
            Ok(ActionKind::Generate) => Action::Generate {
                prompt: params
                    .get("prompt")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            },
            Ok(ActionKind::Unknown) | Err(_) => Action::Unknown,
        }
    }
}

/// Check that `kind` is a supported action and that `params` carries its parameters with the right types.
///
/// Numeric parameters must be JSON numbers; numerals inside strings are rejected.
/// No range checks happen here: a negative blur radius is still a valid blur.
pub fn validate(kind: &str, params: &Map<String, Value>) -> bool {
    let is_number = |key: &str| params.get(key).is_some_and(Value::is_number);
    match kind.parse::<ActionKind>() {
        Ok(ActionKind::Rotate) => is_number("angle"),
        Ok(ActionKind::Crop) => ["left", "top", "right", "bottom"]
            .into_iter()
            .all(is_number),
        Ok(ActionKind::Blur) => is_number("radius"),
        Ok(ActionKind::Brightness | ActionKind::Contrast) => is_number("level"),
        Ok(ActionKind::Generate) => params
            .get("prompt")
            .and_then(Value::as_str)
            .is_some_and(|prompt| !prompt.trim().is_empty()),
        Ok(ActionKind::Unknown) | Err(_) => false,
    }
}
