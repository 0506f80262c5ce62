use crate::model::ModelKey;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RigEvent {
    ExpressionStarted { name: String },
    ExpressionCancelled { name: String },
    ExpressionFinished { name: String },
    MotionClipStarted { duration: f32 },
    MotionClipFinished,
    SwitchRequested { target: String },
    SwitchRejected { target: String, reason: String },
    SwitchCompleted { from: Option<ModelKey>, to: ModelKey },
    SwitchFailed { target: String, reason: String },
    ModelRetired { model: ModelKey },
}

impl RigEvent {
    pub fn switch_failed(target: &str, error: &anyhow::Error) -> Self {
        RigEvent::SwitchFailed { target: target.to_string(), reason: format!("{error:#}") }
    }
}

impl fmt::Display for RigEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RigEvent::ExpressionStarted { name } => write!(f, "ExpressionStarted name={name}"),
            RigEvent::ExpressionCancelled { name } => write!(f, "ExpressionCancelled name={name}"),
            RigEvent::ExpressionFinished { name } => write!(f, "ExpressionFinished name={name}"),
            RigEvent::MotionClipStarted { duration } => write!(f, "MotionClipStarted duration={duration:.3}"),
            RigEvent::MotionClipFinished => write!(f, "MotionClipFinished"),
            RigEvent::SwitchRequested { target } => write!(f, "SwitchRequested target={target}"),
            RigEvent::SwitchRejected { target, reason } => {
                write!(f, "SwitchRejected target={target} reason={reason}")
            }
            RigEvent::SwitchCompleted { from, to } => match from {
                Some(from) => write!(f, "SwitchCompleted from={from} to={to}"),
                None => write!(f, "SwitchCompleted to={to}"),
            },
            RigEvent::SwitchFailed { target, reason } => write!(f, "SwitchFailed target={target} reason={reason}"),
            RigEvent::ModelRetired { model } => write!(f, "ModelRetired model={model}"),
        }
    }
}

#[derive(Default)]
pub struct EventBus {
    events: Vec<RigEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: RigEvent) {
        log::debug!("[events] {event}");
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<RigEvent> {
        self.events.drain(..).collect()
    }
}
