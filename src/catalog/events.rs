use serde::Serialize;
use tracing::info;

use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeEventKind {
    Connected,
    Disconnected,
    Created,
    DecommissionStarted,
    Recommissioned,
    AssignedToPool,
    DebugLevelChanged,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeEvent {
    pub kind: NodeEventKind,
    pub system: String,
    pub node_id: Option<NodeId>,
    pub node_name: Option<String>,
    pub actor: Option<String>,
    pub description: String,
}

impl NodeEvent {
    pub fn new(
        kind: NodeEventKind,
        system: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            system: system.into(),
            node_id: None,
            node_name: None,
            actor: None,
            description: String::new(),
        }
    }

    pub fn node(
        mut self,
        id: &NodeId,
        name: &str,
    ) -> Self {
        self.node_id = Some(id.clone());
        self.node_name = Some(name.to_string());
        self
    }

    pub fn actor(
        mut self,
        actor: Option<&str>,
    ) -> Self {
        self.actor = actor.map(str::to_string);
        self
    }

    pub fn description(
        mut self,
        description: impl Into<String>,
    ) -> Self {
        self.description = description.into();
        self
    }
}

/// Fire-and-forget activity notifications
pub trait EventSink: Send + Sync + 'static {
    fn dispatch(
        &self,
        event: NodeEvent,
    );
}

/// Sink that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn dispatch(
        &self,
        event: NodeEvent,
    ) {
        info!(
            kind = ?event.kind,
            node_id = ?event.node_id,
            node_name = ?event.node_name,
            actor = ?event.actor,
            "{}",
            event.description
        );
    }
}
